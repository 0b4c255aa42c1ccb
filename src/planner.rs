//! Insertion planner: choose the splice offset inside a function span, and
//! splice pre-composed blocks into a document.

use regex::Regex;

use crate::types::{FunctionSpan, Insertion, Placement};

/// Find `anchor` inside the span and plan to insert right before it; without
/// a match, insert right before the span's closing brace. Always succeeds.
pub fn plan(document: &str, span: &FunctionSpan, anchor: &Regex) -> Insertion {
    let found = document
        .get(span.byte_range.clone())
        .and_then(|text| return anchor.find(text));

    if let Some(m) = found {
        let offset = span.byte_range.start.saturating_add(m.start());
        tracing::debug!(offset, "planned insertion before preferred anchor");
        return Insertion {
            offset,
            placement: Placement::BeforeAnchor,
        };
    }

    tracing::debug!(offset = span.close(), "preferred anchor absent; planned insertion before closing brace");
    return Insertion {
        offset: span.close(),
        placement: Placement::BeforeClose,
    };
}

/// Text inserted for a script block. The anchor statement keeps a blank line
/// above it; at the function tail the closing brace sits on its own line.
pub fn script_fragment(block: &str, placement: Placement) -> String {
    return match placement {
        Placement::BeforeAnchor => format!("\n\n{block}\n\n"),
        Placement::BeforeClose => format!("\n\n{block}\n"),
    };
}

/// Text inserted for a markup block: one blank line after the anchor.
pub fn markup_fragment(block: &str) -> String {
    return format!("\n\n{block}");
}

/// Return `document` with `fragment` inserted at `offset`. Everything outside
/// the inserted fragment is byte-identical to the input. `None` when `offset`
/// is past the end or not on a char boundary.
pub fn splice(document: &str, offset: usize, fragment: &str) -> Option<String> {
    let head = document.get(..offset)?;
    let tail = document.get(offset..)?;
    let mut out = String::with_capacity(document.len().saturating_add(fragment.len()));
    out.push_str(head);
    out.push_str(fragment);
    out.push_str(tail);
    return Some(out);
}
