//! Function span extractor: delimit a named function by brace depth.
//!
//! No JavaScript grammar is involved. The declaration is found with a
//! signature pattern, then braces are counted from just past its `{` until
//! depth returns to zero. In `Naive` mode every brace byte counts, so braces
//! inside strings or comments must balance. `SkipLiterals` mode steps over
//! quoted strings and comments while counting. Regex literals are never
//! recognised.

use std::path::Path;

use regex::Regex;

use crate::error::Error;
use crate::types::FunctionSpan;

/// How the body scanner treats literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Count every brace byte.
    #[default]
    Naive,
    /// Ignore braces inside `'…'`, `"…"`, `` `…` ``, `// …` and `/* … */`.
    SkipLiterals,
}

/// Locate `function <name>(…) {` and return the span up to its matching `}`.
///
/// # Errors
///
/// Returns `Error::FunctionNotFound` if no declaration matches, or
/// `Error::UnbalancedStructure` if the document ends before depth reaches zero.
pub fn extract(
    file: &Path,
    document: &str,
    function: &str,
    mode: ScanMode,
) -> Result<FunctionSpan, Error> {
    let signature = signature_pattern(function)?;
    let Some(decl) = signature.find(document) else {
        return Err(Error::FunctionNotFound {
            file: file.to_path_buf(),
            function: function.to_string(),
        });
    };

    let body_start = decl.end();
    let Some(end) = scan_to_matching_close(document.as_bytes(), body_start, mode) else {
        return Err(Error::UnbalancedStructure {
            file: file.to_path_buf(),
            function: function.to_string(),
            opened_at: body_start.saturating_sub(1),
        });
    };

    tracing::debug!(function, start = decl.start(), end, "function span extracted");
    return Ok(FunctionSpan {
        body_start,
        byte_range: decl.start()..end,
    });
}

/// `function <name> ( <params> ) {`, with the name matched literally.
///
/// # Errors
///
/// Returns `Error::InvalidPattern` if the assembled signature fails to compile.
fn signature_pattern(function: &str) -> Result<Regex, Error> {
    let pattern = format!(r"function\s+{}\s*\([^)]*\)\s*\{{", regex::escape(function));
    return Regex::new(&pattern).map_err(|e| {
        return Error::InvalidPattern {
            label: format!("signature of {function}"),
            reason: e.to_string(),
        };
    });
}

/// Scan from `from` with depth 1; return the offset just past the `}` that
/// brings depth to zero. Braces are ASCII, so byte scanning never splits a
/// multi-byte char and every returned offset is a char boundary.
fn scan_to_matching_close(bytes: &[u8], from: usize, mode: ScanMode) -> Option<usize> {
    let mut depth = 1_usize;
    let mut i = from;

    while let Some(&b) = bytes.get(i) {
        if mode == ScanMode::SkipLiterals
            && let Some(next) = skip_literal(bytes, i)
        {
            i = next;
            continue;
        }
        match b {
            b'{' => depth = depth.saturating_add(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i.saturating_add(1));
                }
            },
            _ => {},
        }
        i = i.saturating_add(1);
    }
    return None;
}

/// If a string or comment starts at `i`, return the offset just past it.
/// An unterminated literal runs to end of input.
fn skip_literal(bytes: &[u8], i: usize) -> Option<usize> {
    let here = *bytes.get(i)?;
    let next = bytes.get(i.saturating_add(1)).copied();
    match (here, next) {
        (b'/', Some(b'/')) => {
            let rest = bytes.get(i..)?;
            let len = rest.iter().position(|&c| return c == b'\n').unwrap_or(rest.len());
            return Some(i.saturating_add(len));
        },
        (b'/', Some(b'*')) => {
            let body = i.saturating_add(2);
            let rest = bytes.get(body..)?;
            let close = rest.windows(2).position(|w| return w == b"*/");
            return Some(close.map_or(bytes.len(), |p| return body.saturating_add(p).saturating_add(2)));
        },
        (b'\'' | b'"' | b'`', _) => return Some(skip_quoted(bytes, i, here)),
        _ => return None,
    }
}

/// Skip a quoted string opened at `i`, honouring backslash escapes.
fn skip_quoted(bytes: &[u8], i: usize, quote: u8) -> usize {
    let mut j = i.saturating_add(1);
    while let Some(&c) = bytes.get(j) {
        if c == b'\\' {
            j = j.saturating_add(2);
            continue;
        }
        if c == quote {
            return j.saturating_add(1);
        }
        j = j.saturating_add(1);
    }
    return bytes.len();
}
