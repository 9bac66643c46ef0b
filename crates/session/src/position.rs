//! Conversion between line/column positions and flat offsets.
//!
//! Offsets are char indices into a [`Rope`]. Columns are counted in the units of an
//! [`OffsetEncoding`]. Line terminators follow the rope's convention: LF, CRLF, CR and
//! the Unicode line separators all end a line.
//!
//! Anything out of range is rejected with a [`PositionError`]; nothing is clamped. For
//! every offset in `0..=len_chars`, converting to a position and back is the identity.

use lsp_types::{Position, PositionEncodingKind, Range};
use ropey::{Rope, RopeSlice};
use serde::Deserialize;

/// Unit in which [`Position::character`] is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum OffsetEncoding {
	/// UTF-8 byte offsets.
	#[serde(rename = "utf-8")]
	Utf8,
	/// UTF-16 code unit offsets (LSP default).
	#[default]
	#[serde(rename = "utf-16")]
	Utf16,
	/// UTF-32 / Unicode codepoint offsets.
	#[serde(rename = "utf-32")]
	Utf32,
}

impl OffsetEncoding {
	/// Parse from LSP position encoding kind.
	pub fn from_lsp(kind: &PositionEncodingKind) -> Option<Self> {
		match kind.as_str() {
			"utf-8" => Some(Self::Utf8),
			"utf-16" => Some(Self::Utf16),
			"utf-32" => Some(Self::Utf32),
			_ => None,
		}
	}
}

/// A position or offset that does not address the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
	/// The line does not exist.
	#[error("line {line} is out of range ({line_count} lines)")]
	LineOutOfRange {
		/// Requested line.
		line: u32,
		/// Number of lines in the buffer.
		line_count: usize,
	},
	/// The column runs past the line or splits a code point.
	#[error("column {character} is not valid on line {line}")]
	InvalidColumn {
		/// Requested line.
		line: u32,
		/// Requested column.
		character: u32,
	},
	/// The offset lies past the end of the buffer.
	#[error("offset {offset} is out of range (length {len})")]
	OffsetOutOfRange {
		/// Requested offset.
		offset: usize,
		/// Buffer length in chars.
		len: usize,
	},
	/// Range end precedes its start.
	#[error("range end precedes start")]
	InvertedRange,
}

/// Converts `pos` to a char offset in `text`.
pub fn position_to_offset(text: &Rope, pos: Position, encoding: OffsetEncoding) -> Result<usize, PositionError> {
	let line_idx = pos.line as usize;
	let line_count = text.len_lines();
	if line_idx >= line_count {
		return Err(PositionError::LineOutOfRange {
			line: pos.line,
			line_count,
		});
	}

	let invalid = PositionError::InvalidColumn {
		line: pos.line,
		character: pos.character,
	};
	let line = text.line(line_idx);
	let column = column_to_char(line, pos.character as usize, encoding).ok_or(invalid)?;

	// The terminator itself is addressable; the start of the next line is not.
	let last_column = if line_idx + 1 == line_count {
		line.len_chars()
	} else {
		line.len_chars().saturating_sub(1)
	};
	if column > last_column {
		return Err(invalid);
	}

	Ok(text.line_to_char(line_idx) + column)
}

/// Converts a char offset in `text` to a position.
pub fn offset_to_position(text: &Rope, offset: usize, encoding: OffsetEncoding) -> Result<Position, PositionError> {
	let len = text.len_chars();
	let out_of_range = PositionError::OffsetOutOfRange { offset, len };
	if offset > len {
		return Err(out_of_range);
	}

	let line_idx = text.char_to_line(offset);
	let line = text.line(line_idx);
	let column = offset - text.line_to_char(line_idx);
	let character = match encoding {
		OffsetEncoding::Utf8 => line.char_to_byte(column),
		OffsetEncoding::Utf16 => line.char_to_utf16_cu(column),
		OffsetEncoding::Utf32 => column,
	};

	Ok(Position {
		line: u32::try_from(line_idx).map_err(|_| out_of_range)?,
		character: u32::try_from(character).map_err(|_| out_of_range)?,
	})
}

/// Converts an LSP range to a char offset range.
pub fn range_to_offsets(text: &Rope, range: Range, encoding: OffsetEncoding) -> Result<std::ops::Range<usize>, PositionError> {
	let start = position_to_offset(text, range.start, encoding)?;
	let end = position_to_offset(text, range.end, encoding)?;
	if end < start {
		return Err(PositionError::InvertedRange);
	}
	Ok(start..end)
}

/// Converts a char offset range to an LSP range.
pub fn offsets_to_range(text: &Rope, range: std::ops::Range<usize>, encoding: OffsetEncoding) -> Result<Range, PositionError> {
	if range.end < range.start {
		return Err(PositionError::InvertedRange);
	}
	Ok(Range {
		start: offset_to_position(text, range.start, encoding)?,
		end: offset_to_position(text, range.end, encoding)?,
	})
}

fn column_to_char(line: RopeSlice<'_>, column: usize, encoding: OffsetEncoding) -> Option<usize> {
	match encoding {
		OffsetEncoding::Utf32 => (column <= line.len_chars()).then_some(column),
		OffsetEncoding::Utf8 => {
			if column > line.len_bytes() {
				return None;
			}
			let char_idx = line.byte_to_char(column);
			(line.char_to_byte(char_idx) == column).then_some(char_idx)
		}
		OffsetEncoding::Utf16 => {
			if column > line.len_utf16_cu() {
				return None;
			}
			let char_idx = line.utf16_cu_to_char(column);
			(line.char_to_utf16_cu(char_idx) == column).then_some(char_idx)
		}
	}
}
