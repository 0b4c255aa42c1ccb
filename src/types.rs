/// Core domain types shared by the locator, extractor, planner and orchestrator.
use std::fmt;
use std::ops::Range;

/// Which of the three patch targets a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// JSON collection of records.
    Data,
    /// HTML document.
    Markup,
    /// JavaScript file containing the named function.
    Script,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Data => "data",
            Self::Markup => "markup",
            Self::Script => "script",
        };
        return f.pad(name);
    }
}

/// Byte range of a named function, from the start of its declaration to just
/// past its matching closing brace. Both ends lie on char boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    /// Offset immediately after the declaration's opening brace.
    pub body_start: usize,
    /// Half-open range `[declaration start, closing brace + 1)`.
    pub byte_range: Range<usize>,
}

impl FunctionSpan {
    /// Offset of the closing brace itself.
    pub const fn close(&self) -> usize {
        return self.byte_range.end.saturating_sub(1);
    }
}

/// Where the planner decided to splice inside a function span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Before the preferred anchor statement, which is kept after the block.
    BeforeAnchor,
    /// Before the function's closing brace (no anchor inside the span).
    BeforeClose,
}

/// An absolute splice offset plus how it was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Absolute byte offset into the script document.
    pub offset: usize,
    /// Which rule produced the offset.
    pub placement: Placement,
}
