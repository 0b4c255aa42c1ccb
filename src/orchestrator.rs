//! Patch orchestrator: back up all targets, then patch markup, script and
//! data in that order, then validate the data file.
//!
//! Each patch phase checks its own idempotency marker and is a no-op when the
//! file is already patched. The first error aborts the run; writes made by
//! earlier phases stay in place and the backups are the rollback point.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::anchor;
use crate::backup::{BackupHandle, BackupManager};
use crate::config::PatchConfig;
use crate::error::Error;
use crate::hasher::{ContentHash, hash_bytes};
use crate::merger;
use crate::planner;
use crate::span;
use crate::types::{Placement, TargetKind};

/// Failure of a run, with everything done before it.
#[derive(Debug, thiserror::Error)]
#[error("{phase} phase failed: {error}")]
pub struct Failure {
    /// Snapshots taken before the failure.
    pub backups: Vec<BackupHandle>,
    /// Phases that finished before the failing one.
    pub completed: Vec<PhaseOutcome>,
    /// What went wrong.
    #[source]
    pub error: Error,
    /// Phase at fault.
    pub phase: Phase,
}

/// Drives one patch run over the configured targets.
pub struct Orchestrator {
    config: PatchConfig,
    state: RunState,
}

/// Run phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Existence check and snapshot of all three targets.
    Backup,
    /// Markup splice.
    Markup,
    /// Script splice.
    Script,
    /// Record merge.
    Data,
    /// Read-back of the data file.
    Validate,
}

/// What one phase did.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    /// File the phase worked on (the backup directory for `Backup`).
    pub file: PathBuf,
    /// Phase that produced this outcome.
    pub phase: Phase,
    /// Result of the phase.
    pub status: PhaseStatus,
}

/// Per-phase result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Marker already present; nothing written.
    AlreadyPatched {
        /// Digest of the untouched file.
        hash: ContentHash,
    },
    /// All targets snapshotted.
    BackedUp {
        /// Number of snapshots written.
        count: usize,
    },
    /// File rewritten.
    Patched {
        /// Digest after the write.
        after: ContentHash,
        /// Digest before the write.
        before: ContentHash,
        /// How the insertion point or change was chosen.
        detail: String,
    },
    /// Nothing to change; nothing written.
    Unchanged {
        /// Digest of the untouched file.
        hash: ContentHash,
    },
    /// Data file re-parsed and every record complete.
    Validated {
        /// Number of records checked.
        records: usize,
    },
}

/// Successful run.
#[derive(Debug, Default)]
pub struct Report {
    /// Snapshots taken during the run.
    pub backups: Vec<BackupHandle>,
    /// One outcome per phase, in order.
    pub outcomes: Vec<PhaseOutcome>,
}

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Stopped at the first fatal error in this phase.
    Aborted(Phase),
    /// Every phase succeeded or was a no-op.
    Done,
    /// Executing this phase.
    Running(Phase),
    /// Not run yet.
    Start,
}

/// Read-only view of one target, for `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    /// Which target.
    pub kind: TargetKind,
    /// Path inspected.
    pub path: PathBuf,
    /// Patch state.
    pub state: TargetState,
}

/// Patch state of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetState {
    /// The file does not exist.
    Missing,
    /// Already patched; a run would not change it.
    Patched,
    /// A run would change it.
    Pending {
        /// Why.
        detail: String,
    },
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 5] = [Self::Backup, Self::Markup, Self::Script, Self::Data, Self::Validate];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Backup => "backup",
            Self::Data => "data",
            Self::Markup => "markup",
            Self::Script => "script",
            Self::Validate => "validate",
        };
        return f.pad(name);
    }
}

impl Orchestrator {
    /// Report what a run would do, without writing or backing up anything.
    ///
    /// # Errors
    ///
    /// Returns read errors, and `Error::ParseError` / `Error::MalformedCollection`
    /// for an unreadable data file.
    pub fn inspect(&self) -> Result<Vec<TargetStatus>, Error> {
        let markup = &self.config.markup;
        let script = &self.config.script;
        let data = &self.config.data;

        let markup_state = marker_state(&markup.path, &markup.marker)?;
        let script_state = marker_state(&script.path, &script.marker)?;
        let data_state = if data.path.exists() {
            let text = read_text(&data.path)?;
            let doc = parse_json(&data.path, &text)?;
            let incomplete = merger::count_incomplete(&data.path, &doc, &data.collection_key, &data.defaults)?;
            if incomplete == 0 {
                TargetState::Patched
            } else {
                TargetState::Pending {
                    detail: format!("{incomplete} records missing default fields"),
                }
            }
        } else {
            TargetState::Missing
        };

        return Ok(vec![
            TargetStatus { kind: TargetKind::Markup, path: markup.path.clone(), state: markup_state },
            TargetStatus { kind: TargetKind::Script, path: script.path.clone(), state: script_state },
            TargetStatus { kind: TargetKind::Data, path: data.path.clone(), state: data_state },
        ]);
    }

    /// Orchestrator over `config`, in the `Start` state.
    pub fn new(config: PatchConfig) -> Self {
        return Self {
            config,
            state: RunState::Start,
        };
    }

    /// Execute every phase in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns a `Failure` naming the phase at fault and carrying the
    /// outcomes and backups completed before it.
    pub fn run(&mut self) -> Result<Report, Failure> {
        let mut report = Report::default();

        for phase in Phase::ALL {
            self.state = RunState::Running(phase);
            let _span = tracing::info_span!("phase", %phase).entered();

            match self.run_phase(phase, &mut report.backups) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    tracing::error!(%error, "aborting run");
                    self.state = RunState::Aborted(phase);
                    return Err(Failure {
                        backups: report.backups,
                        completed: report.outcomes,
                        error,
                        phase,
                    });
                },
            }
        }

        self.state = RunState::Done;
        return Ok(report);
    }

    /// Current state of the run.
    pub const fn state(&self) -> RunState {
        return self.state;
    }

    /// Verify all three targets exist, then snapshot each one. Nothing is
    /// written when any target is missing.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingFile` or the backup manager's I/O errors.
    fn backup_all(&self, backups: &mut Vec<BackupHandle>) -> Result<PhaseOutcome, Error> {
        let targets = [&self.config.markup.path, &self.config.script.path, &self.config.data.path];
        if let Some(missing) = targets.iter().find(|p| return !p.exists()) {
            return Err(Error::MissingFile { path: (*missing).clone() });
        }

        let mut manager = BackupManager::new(&self.config.backup_dir);
        for path in targets {
            backups.push(manager.backup(path)?);
        }

        return Ok(PhaseOutcome {
            file: self.config.backup_dir.clone(),
            phase: Phase::Backup,
            status: PhaseStatus::BackedUp { count: backups.len() },
        });
    }

    /// Merge default fields into every record; write only when something changed.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseError`, `Error::MalformedCollection`,
    /// `Error::SerializationError`, or write errors.
    fn patch_data(&self) -> Result<PhaseOutcome, Error> {
        let data = &self.config.data;
        let text = read_text(&data.path)?;
        let before = hash_bytes(text.as_bytes());
        let doc = parse_json(&data.path, &text)?;

        let merged = merger::merge(&data.path, &doc, &data.collection_key, &data.defaults)?;
        if !merged.changed() {
            tracing::info!(file = %data.path.display(), records = merged.records, "all records complete");
            return Ok(outcome(Phase::Data, &data.path, PhaseStatus::Unchanged { hash: before }));
        }

        let output = merger::serialize_checked(&data.path, &merged.document)?;
        write_atomic(&data.path, &output)?;
        tracing::info!(file = %data.path.display(), added = merged.added, records = merged.records, "merged defaults");

        return Ok(outcome(
            Phase::Data,
            &data.path,
            PhaseStatus::Patched {
                after: hash_bytes(output.as_bytes()),
                before,
                detail: format!("{} fields added across {} records", merged.added, merged.records),
            },
        ));
    }

    /// Splice the markup block after the first matching anchor.
    ///
    /// # Errors
    ///
    /// Returns `Error::InsertionPointNotFound` when no anchor matches, or I/O errors.
    fn patch_markup(&self) -> Result<PhaseOutcome, Error> {
        let markup = &self.config.markup;
        let html = read_text(&markup.path)?;
        let before = hash_bytes(html.as_bytes());

        if html.contains(&markup.marker) {
            tracing::info!(file = %markup.path.display(), "markup already patched");
            return Ok(outcome(Phase::Markup, &markup.path, PhaseStatus::AlreadyPatched { hash: before }));
        }

        let found = anchor::locate(&html, &markup.anchors).ok_or_else(|| {
            return Error::InsertionPointNotFound {
                file: markup.path.clone(),
                tried: markup.anchors.iter().map(|a| return a.label.clone()).collect(),
            };
        })?;
        let fragment = planner::markup_fragment(&markup.block);
        let patched = splice_at(&markup.path, &html, found.offset, &fragment, &found.label)?;

        write_atomic(&markup.path, &patched)?;
        tracing::info!(file = %markup.path.display(), anchor = %found.label, offset = found.offset, "markup patched");

        return Ok(outcome(
            Phase::Markup,
            &markup.path,
            PhaseStatus::Patched {
                after: hash_bytes(patched.as_bytes()),
                before,
                detail: format!("after anchor `{}`", found.label),
            },
        ));
    }

    /// Splice the script block into the named function.
    ///
    /// # Errors
    ///
    /// Returns `Error::FunctionNotFound`, `Error::UnbalancedStructure`,
    /// `Error::InsertionPointNotFound`, or I/O errors.
    fn patch_script(&self) -> Result<PhaseOutcome, Error> {
        let script = &self.config.script;
        let js = read_text(&script.path)?;
        let before = hash_bytes(js.as_bytes());

        if js.contains(&script.marker) {
            tracing::info!(file = %script.path.display(), "script already patched");
            return Ok(outcome(Phase::Script, &script.path, PhaseStatus::AlreadyPatched { hash: before }));
        }

        let fn_span = span::extract(&script.path, &js, &script.function, script.scan_mode)?;
        let insertion = planner::plan(&js, &fn_span, &script.preferred_anchor);
        let fragment = planner::script_fragment(&script.block, insertion.placement);
        let point = match insertion.placement {
            Placement::BeforeAnchor => "preferred anchor",
            Placement::BeforeClose => "closing brace",
        };
        let patched = splice_at(&script.path, &js, insertion.offset, &fragment, point)?;

        write_atomic(&script.path, &patched)?;
        let detail = match insertion.placement {
            Placement::BeforeAnchor => format!("in `{}` before preferred anchor", script.function),
            Placement::BeforeClose => format!("at end of `{}`", script.function),
        };
        tracing::info!(file = %script.path.display(), offset = insertion.offset, %detail, "script patched");

        return Ok(outcome(
            Phase::Script,
            &script.path,
            PhaseStatus::Patched {
                after: hash_bytes(patched.as_bytes()),
                before,
                detail,
            },
        ));
    }

    /// Dispatch one phase.
    ///
    /// # Errors
    ///
    /// Whatever the phase returns.
    fn run_phase(&self, phase: Phase, backups: &mut Vec<BackupHandle>) -> Result<PhaseOutcome, Error> {
        return match phase {
            Phase::Backup => self.backup_all(backups),
            Phase::Data => self.patch_data(),
            Phase::Markup => self.patch_markup(),
            Phase::Script => self.patch_script(),
            Phase::Validate => self.validate_data(),
        };
    }

    /// Re-read the data file: it must parse, and a fresh merge must find
    /// nothing left to add. Runs after the data write, so a failure here
    /// cannot undo it; the backup is the way back.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseError` or `Error::MalformedCollection`.
    fn validate_data(&self) -> Result<PhaseOutcome, Error> {
        let data = &self.config.data;
        let text = read_text(&data.path)?;
        let doc = parse_json(&data.path, &text)?;

        let check = merger::merge(&data.path, &doc, &data.collection_key, &data.defaults)?;
        if check.changed() {
            return Err(Error::MalformedCollection {
                file: data.path.clone(),
                reason: format!("{} default fields still missing after merge", check.added),
            });
        }

        tracing::info!(file = %data.path.display(), records = check.records, "data file validated");
        return Ok(outcome(Phase::Validate, &data.path, PhaseStatus::Validated { records: check.records }));
    }
}

/// `Patched` when `marker` occurs in the file.
///
/// # Errors
///
/// Returns read errors other than not-found.
fn marker_state(path: &Path, marker: &str) -> Result<TargetState, Error> {
    if !path.exists() {
        return Ok(TargetState::Missing);
    }
    if read_text(path)?.contains(marker) {
        return Ok(TargetState::Patched);
    }
    return Ok(TargetState::Pending {
        detail: "marker absent".to_string(),
    });
}

fn outcome(phase: Phase, file: &Path, status: PhaseStatus) -> PhaseOutcome {
    return PhaseOutcome {
        file: file.to_path_buf(),
        phase,
        status,
    };
}

/// Parse JSON, mapping failure to `Error::ParseError`.
///
/// # Errors
///
/// Returns `Error::ParseError` with the parser's message.
fn parse_json(path: &Path, text: &str) -> Result<Value, Error> {
    return serde_json::from_str(text).map_err(|e| {
        return Error::ParseError {
            file: path.to_path_buf(),
            reason: e.to_string(),
        };
    });
}

/// Read a target as UTF-8 text.
///
/// # Errors
///
/// Returns `Error::MissingFile` if it vanished, `Error::Io` otherwise.
fn read_text(path: &Path) -> Result<String, Error> {
    return match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::MissingFile { path: path.to_path_buf() }),
        Err(e) => Err(Error::Io(e)),
        Ok(c) => Ok(c),
    };
}

/// Splice `fragment` into `document` at `offset`, chosen by `point`.
///
/// # Errors
///
/// Returns `Error::InsertionPointNotFound` if `offset` is not a char boundary.
fn splice_at(file: &Path, document: &str, offset: usize, fragment: &str, point: &str) -> Result<String, Error> {
    return planner::splice(document, offset, fragment).ok_or_else(|| {
        return Error::InsertionPointNotFound {
            file: file.to_path_buf(),
            tried: vec![format!("{point} at byte {offset}")],
        };
    });
}

/// Replace `path` with `contents` via a temp file in the same directory, so
/// the target is either fully old or fully new. Keeps the original permissions.
///
/// # Errors
///
/// Returns `Error::Io` if the temp file cannot be created, written, or renamed.
fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let dir = path
        .parent()
        .filter(|p| return !p.as_os_str().is_empty())
        .unwrap_or_else(|| return Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path).map_err(|e| return Error::Io(e.error))?;
    return Ok(());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, reason = "test code")]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    const HTML: &str = "<html>\n<section class=\"panel right\">\n  <h2>Drug Card</h2>\n  <p><b>Target:</b> D2 receptor</p>\n  <p><b>Notes:</b> <span id=\"notes\"></span></p>\n</section>\n</html>\n";
    const JS: &str = "let attempts = 0;\n\nfunction loadDrug(id) {\n  currentDrug = drugs.find(d => d.id === id);\n  if (!currentDrug) return;\n\n  // Reset attempts + feedback\n  attempts = 0;\n  feedback.textContent = \"\";\n}\n\nfunction checkAnswer() {\n  attempts++;\n}\n";
    const JSON: &str = "{\n  \"drugs\": [\n    {\n      \"id\": \"levodopa\",\n      \"half_life\": \"1.5 h\"\n    },\n    {\n      \"id\": \"carbidopa\"\n    }\n  ]\n}\n";

    fn fixture() -> (TempDir, PatchConfig) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("medchem/data")).unwrap();
        std::fs::write(root.join("medchem/index.html"), HTML).unwrap();
        std::fs::write(root.join("medchem/app.js"), JS).unwrap();
        std::fs::write(root.join("medchem/data/drugs.json"), JSON).unwrap();
        let config = PatchConfig::built_in(root).unwrap();
        return (tmp, config);
    }

    fn read(config_path: &Path) -> String {
        return std::fs::read_to_string(config_path).unwrap();
    }

    #[test]
    fn full_run_patches_all_three_files() {
        let (_tmp, config) = fixture();
        let mut orchestrator = Orchestrator::new(config.clone());
        let report = orchestrator.run().unwrap();

        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.backups.len(), 3);

        let html = read(&config.markup.path);
        assert!(html.contains("<p><b>Target:</b> D2 receptor</p>\n\n<hr>\n\n<p><b>PK / ADMET:</b>"));
        assert!(html.ends_with("<span id=\"clinical_pearls\"></span></p>\n  <p><b>Notes:</b> <span id=\"notes\"></span></p>\n</section>\n</html>\n"));

        let js = read(&config.script.path);
        let block_at = js.find("// ===== Expanded MedChem Fields =====").unwrap();
        let reset_at = js.find("\n  attempts = 0;").unwrap();
        assert!(block_at < reset_at);
        assert!(js.contains("// ===== End Expanded MedChem Fields =====\n\n\n  attempts = 0;"));
        assert!(js.ends_with("function checkAnswer() {\n  attempts++;\n}\n"));

        let data: Value = serde_json::from_str(&read(&config.data.path)).unwrap();
        assert_eq!(data["drugs"][0]["half_life"], "1.5 h");
        assert_eq!(data["drugs"][1]["half_life"], "");
        assert_eq!(data["drugs"][1]["physchem"]["pka"], "");
    }

    #[test]
    fn second_run_is_a_no_op() {
        let (_tmp, config) = fixture();
        Orchestrator::new(config.clone()).run().unwrap();
        let after_first = [read(&config.markup.path), read(&config.script.path), read(&config.data.path)];

        let report = Orchestrator::new(config.clone()).run().unwrap();
        let after_second = [read(&config.markup.path), read(&config.script.path), read(&config.data.path)];
        assert_eq!(after_first, after_second);

        let statuses: Vec<&PhaseStatus> = report.outcomes.iter().map(|o| return &o.status).collect();
        assert!(matches!(statuses[1], PhaseStatus::AlreadyPatched { .. }));
        assert!(matches!(statuses[2], PhaseStatus::AlreadyPatched { .. }));
        assert!(matches!(statuses[3], PhaseStatus::Unchanged { .. }));
    }

    #[test]
    fn backups_hold_pre_run_content() {
        let (_tmp, config) = fixture();
        let report = Orchestrator::new(config.clone()).run().unwrap();
        assert_eq!(read(&config.backup_dir.join("index.html.bak")), HTML);
        assert_eq!(read(&config.backup_dir.join("app.js.bak")), JS);
        assert_eq!(read(&config.backup_dir.join("drugs.json.bak")), JSON);
        assert_eq!(report.backups[1].hash, hash_bytes(JS.as_bytes()));
    }

    #[test]
    fn missing_target_aborts_before_any_write() {
        let (_tmp, config) = fixture();
        std::fs::remove_file(&config.data.path).unwrap();

        let mut orchestrator = Orchestrator::new(config.clone());
        let failure = orchestrator.run().unwrap_err();

        assert_eq!(failure.phase, Phase::Backup);
        assert!(matches!(failure.error, Error::MissingFile { ref path } if *path == config.data.path));
        assert_eq!(orchestrator.state(), RunState::Aborted(Phase::Backup));
        assert!(failure.backups.is_empty());
        assert!(!config.backup_dir.exists());
        assert_eq!(read(&config.markup.path), HTML);
    }

    #[test]
    fn unanchored_markup_aborts_and_leaves_file_untouched() {
        let (_tmp, config) = fixture();
        std::fs::write(&config.markup.path, "<html><p>no card here</p></html>\n").unwrap();

        let failure = Orchestrator::new(config.clone()).run().unwrap_err();
        assert_eq!(failure.phase, Phase::Markup);
        assert!(matches!(failure.error, Error::InsertionPointNotFound { ref tried, .. } if tried.len() == 2));
        assert_eq!(read(&config.markup.path), "<html><p>no card here</p></html>\n");
        assert_eq!(read(&config.script.path), JS);
        assert_eq!(failure.completed.len(), 1);
    }

    #[test]
    fn missing_function_aborts_after_markup_write() {
        let (_tmp, config) = fixture();
        std::fs::write(&config.script.path, "function other() {}\n").unwrap();

        let failure = Orchestrator::new(config.clone()).run().unwrap_err();
        assert_eq!(failure.phase, Phase::Script);
        assert!(matches!(failure.error, Error::FunctionNotFound { .. }));
        assert!(read(&config.markup.path).contains("id=\"pk_admet\""));
        assert_eq!(read(&config.data.path), JSON);
        assert_eq!(read(&config.backup_dir.join("index.html.bak")), HTML);
    }

    #[test]
    fn unparseable_data_is_parse_error() {
        let (_tmp, config) = fixture();
        std::fs::write(&config.data.path, "{\"drugs\": [").unwrap();

        let failure = Orchestrator::new(config.clone()).run().unwrap_err();
        assert_eq!(failure.phase, Phase::Data);
        assert!(matches!(failure.error, Error::ParseError { .. }));
        assert_eq!(read(&config.data.path), "{\"drugs\": [");
    }

    #[test]
    fn function_without_anchor_gets_block_at_tail() {
        let (_tmp, config) = fixture();
        std::fs::write(&config.script.path, "function loadDrug(id) {\n  render(id);\n}\n").unwrap();

        Orchestrator::new(config.clone()).run().unwrap();
        let js = read(&config.script.path);
        assert!(js.starts_with("function loadDrug(id) {\n  render(id);\n\n\n  // ===== Expanded MedChem Fields ====="));
        assert!(js.ends_with("// ===== End Expanded MedChem Fields =====\n}\n"));
    }

    #[test]
    fn inspect_reports_pending_then_patched() {
        let (_tmp, config) = fixture();
        let before = Orchestrator::new(config.clone()).inspect().unwrap();
        assert!(before.iter().all(|s| return matches!(s.state, TargetState::Pending { .. })));
        assert_eq!(
            before[2].state,
            TargetState::Pending {
                detail: "2 records missing default fields".to_string()
            }
        );

        Orchestrator::new(config.clone()).run().unwrap();
        let after = Orchestrator::new(config).inspect().unwrap();
        assert!(after.iter().all(|s| return s.state == TargetState::Patched));
    }

    #[test]
    fn splice_inside_a_char_is_insertion_point_not_found() {
        let err = splice_at(Path::new("medchem/app.js"), "const s = \"é\";", 12, "x", "closing brace").unwrap_err();
        assert!(matches!(
            err,
            Error::InsertionPointNotFound { ref tried, .. } if tried == &["closing brace at byte 12".to_string()]
        ));
        assert_eq!(
            splice_at(Path::new("medchem/app.js"), "ab", 1, "x", "closing brace").unwrap(),
            "axb"
        );
    }
}
