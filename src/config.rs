use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Map, Value};

use crate::anchor::AnchorPattern;
use crate::defaults;
use crate::error::Error;
use crate::merger::DefaultFieldSet;
use crate::span::ScanMode;

/// Name of the optional per-project override file.
pub const CONFIG_FILE: &str = ".medpatch.toml";

/// Everything one patch run needs, resolved and compiled up front.
/// Paths are absolute or relative to the process working directory.
#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Directory receiving `<file name>.bak` snapshots.
    pub backup_dir: PathBuf,
    /// Record collection target.
    pub data: DataTarget,
    /// Markup document target.
    pub markup: MarkupTarget,
    /// Script target.
    pub script: ScriptTarget,
}

/// Data file settings.
#[derive(Debug, Clone)]
pub struct DataTarget {
    /// Top-level key holding the record list.
    pub collection_key: String,
    /// Fields merged into every record.
    pub defaults: DefaultFieldSet,
    /// Path to the JSON file.
    pub path: PathBuf,
}

/// Markup file settings.
#[derive(Debug, Clone)]
pub struct MarkupTarget {
    /// Anchor patterns in priority order.
    pub anchors: Vec<AnchorPattern>,
    /// Fragment spliced after the winning anchor.
    pub block: String,
    /// Idempotency marker; the block contains it.
    pub marker: String,
    /// Path to the HTML file.
    pub path: PathBuf,
}

/// Script file settings.
#[derive(Debug, Clone)]
pub struct ScriptTarget {
    /// Statements spliced into the function body.
    pub block: String,
    /// Name of the function receiving the block.
    pub function: String,
    /// Idempotency marker; the block contains it.
    pub marker: String,
    /// Path to the JavaScript file.
    pub path: PathBuf,
    /// Statement the block is placed above when present in the function.
    pub preferred_anchor: Regex,
    /// Brace scanner mode.
    pub scan_mode: ScanMode,
}

/// Raw TOML structure for `.medpatch.toml`. Every field is optional and
/// falls back to the built-in medchem value.
#[derive(serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MedpatchTomlConfig {
    backup_dir: String,
    data: DataSection,
    markup: MarkupSection,
    script: ScriptSection,
}

/// `[data]` table.
#[derive(serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DataSection {
    collection_key: String,
    defaults: Map<String, Value>,
    path: String,
}

/// `[markup]` table.
#[derive(serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MarkupSection {
    anchors: Vec<AnchorSpec>,
    block: String,
    marker: String,
    path: String,
}

/// One `[[markup.anchors]]` entry.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct AnchorSpec {
    label: String,
    pattern: String,
}

/// `[script]` table.
#[derive(serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ScriptSection {
    block: String,
    function: String,
    marker: String,
    path: String,
    preferred_anchor: String,
    skip_literals: bool,
}

impl Default for MedpatchTomlConfig {
    fn default() -> Self {
        return Self {
            backup_dir: defaults::BACKUP_DIR.to_string(),
            data: DataSection::default(),
            markup: MarkupSection::default(),
            script: ScriptSection::default(),
        };
    }
}

impl Default for DataSection {
    fn default() -> Self {
        return Self {
            collection_key: defaults::COLLECTION_KEY.to_string(),
            defaults: defaults::default_fields(),
            path: defaults::DATA_PATH.to_string(),
        };
    }
}

impl Default for MarkupSection {
    fn default() -> Self {
        return Self {
            anchors: vec![
                AnchorSpec {
                    label: "target-line".to_string(),
                    pattern: defaults::TARGET_LINE_PATTERN.to_string(),
                },
                AnchorSpec {
                    label: "panel-header".to_string(),
                    pattern: defaults::PANEL_HEADER_PATTERN.to_string(),
                },
            ],
            block: defaults::MARKUP_BLOCK.to_string(),
            marker: defaults::MARKUP_MARKER.to_string(),
            path: defaults::MARKUP_PATH.to_string(),
        };
    }
}

impl Default for ScriptSection {
    fn default() -> Self {
        return Self {
            block: defaults::SCRIPT_BLOCK.to_string(),
            function: defaults::FUNCTION_NAME.to_string(),
            marker: defaults::SCRIPT_MARKER.to_string(),
            path: defaults::SCRIPT_PATH.to_string(),
            preferred_anchor: defaults::PREFERRED_ANCHOR.to_string(),
            skip_literals: false,
        };
    }
}

impl PatchConfig {
    /// The built-in medchem configuration rooted at `root`.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in pattern stops compiling.
    pub fn built_in(root: &Path) -> Result<Self, Error> {
        return Self::from_raw(root, MedpatchTomlConfig::default());
    }

    /// Load config for the project at `root`.
    ///
    /// With `explicit`, that file must exist. Without it, `<root>/.medpatch.toml`
    /// is read if present and built-in defaults are used otherwise. A file that
    /// exists but is malformed is an error: never silently falls back to
    /// defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` for a missing explicit file, `Error::Io`
    /// if reading fails, `Error::TomlDe` for malformed TOML, and
    /// `Error::InvalidPattern` / `Error::InvalidConfig` from validation.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, Error> {
        let path = explicit.map_or_else(|| return root.join(CONFIG_FILE), Path::to_path_buf);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit.is_some() {
                    return Err(Error::ConfigNotFound { path });
                }
                tracing::debug!("no {CONFIG_FILE}; using built-in configuration");
                return Self::built_in(root);
            },
            Err(e) => return Err(Error::Io(e)),
        };

        tracing::info!(config = %path.display(), "loaded config");
        let raw: MedpatchTomlConfig = toml::from_str(&content)?;
        return Self::from_raw(root, raw);
    }

    /// Resolve paths against `root`, compile patterns, and check the plan can
    /// be re-run safely.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` or `Error::InvalidConfig`.
    fn from_raw(root: &Path, raw: MedpatchTomlConfig) -> Result<Self, Error> {
        let anchors = raw
            .markup
            .anchors
            .iter()
            .map(|a| return AnchorPattern::new(&a.label, &a.pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let preferred_anchor = Regex::new(&raw.script.preferred_anchor).map_err(|e| {
            return Error::InvalidPattern {
                label: "script.preferred_anchor".to_string(),
                reason: e.to_string(),
            };
        })?;

        let config = Self {
            backup_dir: root.join(raw.backup_dir),
            data: DataTarget {
                collection_key: raw.data.collection_key,
                defaults: DefaultFieldSet(raw.data.defaults),
                path: root.join(raw.data.path),
            },
            markup: MarkupTarget {
                anchors,
                block: raw.markup.block,
                marker: raw.markup.marker,
                path: root.join(raw.markup.path),
            },
            script: ScriptTarget {
                block: raw.script.block,
                function: raw.script.function,
                marker: raw.script.marker,
                path: root.join(raw.script.path),
                preferred_anchor,
                scan_mode: if raw.script.skip_literals { ScanMode::SkipLiterals } else { ScanMode::Naive },
            },
        };
        config.validate()?;
        return Ok(config);
    }

    /// Reject configs whose blocks would not be recognised as applied on the
    /// next run, or that cannot locate anything.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first problem found.
    fn validate(&self) -> Result<(), Error> {
        let problem = if self.markup.anchors.is_empty() {
            Some("markup.anchors must list at least one pattern")
        } else if self.markup.marker.is_empty() {
            Some("markup.marker must not be empty")
        } else if !self.markup.block.contains(&self.markup.marker) {
            Some("markup.block must contain markup.marker")
        } else if self.script.marker.is_empty() {
            Some("script.marker must not be empty")
        } else if !self.script.block.contains(&self.script.marker) {
            Some("script.block must contain script.marker")
        } else if self.script.function.trim().is_empty() {
            Some("script.function must not be empty")
        } else if self.data.collection_key.is_empty() {
            Some("data.collection_key must not be empty")
        } else {
            None
        };

        return match problem {
            Some(reason) => Err(Error::InvalidConfig { reason: reason.to_string() }),
            None => Ok(()),
        };
    }
}
