use std::fmt::Write as _;

use crate::backup::BackupHandle;
use crate::error::Error;
use crate::orchestrator::{Failure, PhaseOutcome, PhaseStatus, Report};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// The one-line verdict for a failed run.
pub fn failure_line(failure: &Failure) -> String {
    return format!(
        "FAILED: {} phase: {} ({})",
        failure.phase,
        failure.error,
        failure.error.kind()
    );
}

/// One line per phase: phase, file, and what happened.
pub fn outcome_line(outcome: &PhaseOutcome) -> String {
    let file = outcome.file.display();
    let what = match &outcome.status {
        PhaseStatus::AlreadyPatched { hash } => format!("already patched ({})", hash.short()),
        PhaseStatus::BackedUp { count } => format!("{count} snapshots written"),
        PhaseStatus::Patched { after, before, detail } => {
            format!("patched {detail} ({} -> {})", before.short(), after.short())
        },
        PhaseStatus::Unchanged { hash } => format!("unchanged ({})", hash.short()),
        PhaseStatus::Validated { records } => format!("{records} records valid"),
    };
    return format!("{:<9} {file}  {what}", outcome.phase);
}

/// Render markdown to stderr with bold headings.
pub fn print_markdown(md: &str) {
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigNotFound { path } => format!("\
# Error: Config Not Found

`{}` does not exist.

## Fix

Check the `--config` path, or omit it to use `.medpatch.toml` or the built-in defaults.
", path.display()),

        Error::InvalidConfig { reason } => format!("\
# Error: Invalid Config

{reason}
"),

        Error::InvalidPattern { label, reason } => format!("\
# Error: Invalid Pattern

Pattern `{label}` does not compile:

    {reason}
"),

        Error::TomlDe(e) => format!("\
# Error: Invalid TOML

{e}
"),

        Error::FunctionNotFound { file, function } => format!("\
# Error: Function Not Found

`{}` has no `function {function}(...) {{` declaration.

## Fix

Restore the function, or set `script.function` in `.medpatch.toml`.
", file.display()),

        Error::InsertionPointNotFound { file, tried } => format!("\
# Error: Insertion Point Not Found

No anchor pattern matched `{}`. Tried, in order: {}.

## Fix

Add a `<p><b>Target:</b> ...</p>` line to the drug card, or configure
`[[markup.anchors]]` to match the current markup.
", file.display(), tried.join(", ")),

        Error::UnbalancedStructure { file, function, opened_at } => format!("\
# Error: Unbalanced Structure

The body of `{function}` in `{}` opens at byte {opened_at} but its braces never balance.

## Fix

Check for unbalanced braces in the function. Braces inside strings or comments
count unless `script.skip_literals = true`.
", file.display()),

        _ => format!("\
# Error: {}

{e}
", e.kind()),
    };
}

/// Render a failed run: the error, the phase at fault, and where the backups are.
pub fn render_failure(failure: &Failure) -> String {
    let mut out = render_error(&failure.error);
    let _ = write!(out, "\n## Phase\n\nThe run stopped in the `{}` phase.\n", failure.phase);

    if !failure.completed.is_empty() {
        out.push_str("\n## Completed before the failure\n\n");
        for outcome in &failure.completed {
            let _ = writeln!(out, "- {}", outcome_line(outcome));
        }
    }

    render_recovery(&mut out, &failure.backups);
    return out;
}

/// The one-line verdict for a successful run.
pub fn success_line(report: &Report) -> String {
    let patched = report
        .outcomes
        .iter()
        .filter(|o| return matches!(o.status, PhaseStatus::Patched { .. }))
        .count();
    if patched == 0 {
        return "OK: already patched, nothing to do".to_string();
    }
    let files: Vec<String> = report
        .outcomes
        .iter()
        .filter(|o| return matches!(o.status, PhaseStatus::Patched { .. }))
        .map(|o| return o.file.display().to_string())
        .collect();
    return format!("OK: patched {} ({} backups taken)", files.join(", "), report.backups.len());
}

/// Append how to roll back by hand from the snapshots.
fn render_recovery(out: &mut String, backups: &[BackupHandle]) {
    if backups.is_empty() {
        out.push_str("\n## Recovery\n\nNo file was modified.\n");
        return;
    }
    out.push_str("\n## Recovery\n\nEarlier phases may have written their files. To roll back, restore:\n\n");
    for b in backups {
        let _ = writeln!(out, "    cp {} {}    # sha256 {}", b.backup.display(), b.original.display(), b.hash.short());
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::hasher::hash_bytes;
    use crate::orchestrator::Phase;

    fn failure(backups: Vec<BackupHandle>) -> Failure {
        return Failure {
            backups,
            completed: Vec::new(),
            error: Error::FunctionNotFound {
                file: PathBuf::from("medchem/app.js"),
                function: "loadDrug".to_string(),
            },
            phase: Phase::Script,
        };
    }

    #[test]
    fn failure_line_names_phase_and_kind() {
        let line = failure_line(&failure(Vec::new()));
        assert_eq!(
            line,
            "FAILED: script phase: function not found: `loadDrug` in medchem/app.js (FunctionNotFound)"
        );
    }

    #[test]
    fn failure_render_lists_restore_commands() {
        let md = render_failure(&failure(vec![BackupHandle {
            backup: PathBuf::from("_backups/app.js.bak"),
            hash: hash_bytes(b""),
            original: PathBuf::from("medchem/app.js"),
        }]));
        assert!(md.starts_with("# Error: Function Not Found"));
        assert!(md.contains("stopped in the `script` phase"));
        assert!(md.contains("cp _backups/app.js.bak medchem/app.js    # sha256 e3b0c44298fc"));
    }

    #[test]
    fn failure_without_backups_says_nothing_changed() {
        let md = render_failure(&failure(Vec::new()));
        assert!(md.contains("No file was modified."));
    }

    #[test]
    fn success_line_for_no_op_run() {
        let report = Report {
            backups: Vec::new(),
            outcomes: vec![PhaseOutcome {
                file: PathBuf::from("medchem/index.html"),
                phase: Phase::Markup,
                status: PhaseStatus::AlreadyPatched { hash: hash_bytes(b"x") },
            }],
        };
        assert_eq!(success_line(&report), "OK: already patched, nothing to do");
    }
}
