use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

/// A location in template source. Lines and columns are 1-indexed, the
/// offset is a 0-indexed byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
	pub line: usize,
	pub column: usize,
	pub offset: usize,
}

impl Default for Position {
	fn default() -> Self {
		Self::new(1, 1, 0)
	}
}

impl Position {
	pub const fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}

	/// Move the position past `text`.
	pub fn advance_str(&mut self, text: &str) {
		for ch in text.chars() {
			if ch == '\n' {
				self.line += 1;
				self.column = 1;
			} else {
				self.column += 1;
			}
		}

		self.offset += text.len();
	}
}

impl Display for Position {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.line, self.column)
	}
}
