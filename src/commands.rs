//! CLI commands for medpatch: apply, status.

use std::path::Path;
use std::process::ExitCode;

use crate::config::PatchConfig;
use crate::diagnostics;
use crate::error;
use crate::orchestrator::{Orchestrator, TargetState};

/// Run every patch phase against the project at `root`.
///
/// Prints per-phase lines to stderr and one verdict line to stdout.
/// Exit 0 on success, 1 when the run aborts.
///
/// # Errors
///
/// Returns config loading errors; failures inside the run are reported and
/// mapped to the exit code instead.
pub fn apply(root: &Path, config_path: Option<&Path>) -> Result<ExitCode, error::Error> {
    let config = PatchConfig::load(root, config_path)?;
    let mut orchestrator = Orchestrator::new(config);

    return match orchestrator.run() {
        Ok(report) => {
            for outcome in &report.outcomes {
                eprintln!("{}", diagnostics::outcome_line(outcome));
            }
            println!("{}", diagnostics::success_line(&report));
            Ok(ExitCode::SUCCESS)
        },
        Err(failure) => {
            diagnostics::print_markdown(&diagnostics::render_failure(&failure));
            println!("{}", diagnostics::failure_line(&failure));
            Ok(ExitCode::FAILURE)
        },
    };
}

/// Report which targets a run would change, without touching anything.
/// Exit 0 when nothing is pending, 1 otherwise.
///
/// # Errors
///
/// Returns config loading errors and errors reading the targets.
pub fn status(root: &Path, config_path: Option<&Path>) -> Result<ExitCode, error::Error> {
    let config = PatchConfig::load(root, config_path)?;
    let statuses = Orchestrator::new(config).inspect()?;

    let mut pending = 0_usize;
    for s in &statuses {
        let what = match &s.state {
            TargetState::Missing => "MISSING".to_string(),
            TargetState::Patched => "patched".to_string(),
            TargetState::Pending { detail } => format!("PENDING ({detail})"),
        };
        if s.state != TargetState::Patched {
            pending = pending.saturating_add(1);
        }
        println!("{:<7} {}  {what}", s.kind, s.path.display());
    }

    if pending == 0 {
        println!("All targets patched");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{pending} of {} targets pending", statuses.len());
    return Ok(ExitCode::from(1));
}
