//! Overlap-aware line splitting.
//!
//! [`split_lines`] divides a document's lines into two parts at a percentage
//! boundary and duplicates up to `overlap` lines across that boundary so each
//! summary sees some of the other side's context. Splitting is purely
//! line-count based.
//!
//! For every successful split, `part_a` followed by `part_b[overlap..]`
//! reproduces the input, and the last `overlap` lines of `part_a` are the
//! first `overlap` lines of `part_b`.

use thiserror::Error;

/// Error returned by [`split_lines`] when its preconditions fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

/// The two overlapping parts produced by [`split_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitResult {
    /// Lines from the start of the document through the overlap region.
    pub part_a: Vec<String>,
    /// Lines from the start of the overlap region to the end of the document.
    pub part_b: Vec<String>,
    /// Number of lines duplicated at the end of `part_a` and the start of
    /// `part_b` after clamping.
    pub overlap: usize,
}

impl SplitResult {
    /// `part_b` without the lines it shares with `part_a`.
    pub fn part_b_unique(&self) -> &[String] {
        self.part_b.get(self.overlap..).unwrap_or_default()
    }
}

/// Split `lines` into two overlapping parts.
///
/// `split_percentage` (1–100) selects the split index as
/// `floor(len * split_percentage / 100)`. `overlap` is clamped to the lines
/// available on both sides of that index. A split index of zero yields a
/// single-line first part with no overlap; an index at or past the end yields
/// the whole document as the first part and an empty second part.
pub fn split_lines(
    lines: &[String],
    split_percentage: u32,
    overlap: i64,
) -> Result<SplitResult, SplitError> {
    if lines.is_empty() {
        return Err(SplitError::InvalidInput("lines must be non-empty"));
    }
    if !(1..=100).contains(&split_percentage) {
        return Err(SplitError::InvalidInput("split percentage out of range"));
    }
    let requested = usize::try_from(overlap)
        .map_err(|_| SplitError::InvalidInput("overlap must be non-negative"))?;

    let total = lines.len();
    let split_index = total.saturating_mul(split_percentage as usize) / 100;

    if split_index == 0 {
        return Ok(SplitResult {
            part_a: lines[..1].to_vec(),
            part_b: lines[1..].to_vec(),
            overlap: 0,
        });
    }

    if split_index >= total {
        return Ok(SplitResult {
            part_a: lines.to_vec(),
            part_b: Vec::new(),
            overlap: 0,
        });
    }

    let effective = requested.min(split_index).min(total - split_index);
    let part_a_end = (split_index + effective).min(total);
    let part_b_start = part_a_end.saturating_sub(effective);

    Ok(SplitResult {
        part_a: lines[..part_a_end].to_vec(),
        part_b: lines[part_b_start..].to_vec(),
        overlap: effective,
    })
}
