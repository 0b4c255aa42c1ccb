//! Anchor locator: find a stable insertion offset in markup without parsing it.
//!
//! Patterns are tried strictly in priority order. A later pattern is only
//! consulted when every earlier one fails to match anywhere in the document,
//! so an earlier-positioned match of a lower-priority pattern never wins.

use regex::Regex;

use crate::error::Error;

/// One labelled candidate pattern.
#[derive(Debug, Clone)]
pub struct AnchorPattern {
    /// Name used in logs and in `InsertionPointNotFound`.
    pub label: String,
    /// Compiled pattern; should be scoped to a single tag or section.
    pub regex: Regex,
}

impl AnchorPattern {
    /// Compile a labelled pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if `pattern` is not a valid regex.
    pub fn new(label: &str, pattern: &str) -> Result<Self, Error> {
        let regex = Regex::new(pattern).map_err(|e| {
            return Error::InvalidPattern {
                label: label.to_string(),
                reason: e.to_string(),
            };
        })?;
        return Ok(Self {
            label: label.to_string(),
            regex,
        });
    }
}

/// The winning pattern and the end offset of its first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorMatch {
    /// Label of the pattern that matched.
    pub label: String,
    /// Byte offset just past the match.
    pub offset: usize,
}

/// Return the end of the first match of the first pattern that matches at all,
/// or `None` when no pattern matches.
pub fn locate(document: &str, patterns: &[AnchorPattern]) -> Option<AnchorMatch> {
    for pattern in patterns {
        if let Some(m) = pattern.regex.find(document) {
            tracing::debug!(anchor = %pattern.label, start = m.start(), end = m.end(), "anchor matched");
            return Some(AnchorMatch {
                label: pattern.label.clone(),
                offset: m.end(),
            });
        }
        tracing::debug!(anchor = %pattern.label, "anchor did not match");
    }
    return None;
}
