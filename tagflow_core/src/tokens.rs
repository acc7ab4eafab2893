use derive_more::Deref;
use derive_more::DerefMut;

use crate::Expression;
use crate::Position;
use crate::Value;

/// A lexical component of a tag: either a dialect keyword or a constructed
/// expression.
#[derive(Debug)]
pub enum Lexeme {
	Keyword(String),
	Expression(Expression),
}

impl Lexeme {
	/// The bare name this lexeme can bind to an identifier slot.
	pub fn as_identifier(&self) -> Option<&str> {
		match self {
			Self::Keyword(word) => Some(word),
			Self::Expression(expression) => expression.as_name(),
		}
	}

	/// The literal this lexeme can bind to a constant slot.
	pub fn as_constant(&self) -> Option<&Value> {
		match self {
			Self::Keyword(_) => None,
			Self::Expression(expression) => expression.constant(),
		}
	}

	pub fn is_expression(&self) -> bool {
		matches!(self, Self::Expression(_))
	}
}

/// The lexemes of one `{...}` tag in a template.
#[derive(Debug, Deref, DerefMut)]
pub struct TagLexeme {
	#[deref]
	#[deref_mut]
	pub lexemes: Vec<Lexeme>,
	/// The source text between the braces.
	pub text: String,
	/// Where the opening brace sits.
	pub position: Position,
}

/// Template source split into literal text and tags.
#[derive(Debug)]
pub enum Piece {
	Text(String),
	Tag(TagLexeme),
}
