use logos::Logos;
use snailquote::unescape;

use crate::Dialect;
use crate::Expression;
use crate::Position;
use crate::TagflowError;
use crate::TagflowResult;
use crate::Value;
use crate::tokens::Lexeme;
use crate::tokens::Piece;
use crate::tokens::TagLexeme;

/// Raw tokens produced by logos for the content of a single tag.
#[derive(Logos, Debug, PartialEq)]
enum RawToken {
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[regex(r"[ \t\r\n]+")]
	Whitespace,
	/// Same rule as [`is_name`](crate::is_name): a Unicode letter or `_`,
	/// then letters, numbers or `_`.
	#[regex(r"[\p{Alphabetic}_][\p{Alphabetic}\p{N}_]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
	/// A run of operator characters, split against the dialect's symbols.
	#[regex(r#"[^ \t\r\n\p{Alphabetic}\p{N}_"'{}]+"#)]
	Symbols,
}

/// Walks template source, collecting literal text and lexing each `{...}`
/// tag into keywords and expressions.
struct TemplateWalker<'a> {
	source: &'a str,
	dialect: &'a Dialect,
	/// Byte offset of the next unread character.
	offset: usize,
	position: Position,
	/// Literal text collected since the last tag.
	text: String,
	pieces: Vec<Piece>,
}

impl<'a> TemplateWalker<'a> {
	fn new(source: &'a str, dialect: &'a Dialect) -> Self {
		Self {
			source,
			dialect,
			offset: 0,
			position: Position::default(),
			text: String::new(),
			pieces: vec![],
		}
	}

	fn advance(&mut self, len: usize) {
		let slice = &self.source[self.offset..self.offset + len];
		self.position.advance_str(slice);
		self.offset += len;
	}

	fn push_text(&mut self, len: usize) {
		self.text.push_str(&self.source[self.offset..self.offset + len]);
		self.advance(len);
	}

	fn flush_text(&mut self) {
		if !self.text.is_empty() {
			self.pieces.push(Piece::Text(std::mem::take(&mut self.text)));
		}
	}

	fn process(&mut self) -> TagflowResult<()> {
		while self.offset < self.source.len() {
			let rest = &self.source[self.offset..];

			let Some(brace) = rest.find('{') else {
				self.push_text(rest.len());
				break;
			};

			self.push_text(brace);

			// `{{` is a literal brace.
			if self.source[self.offset..].starts_with("{{") {
				self.text.push('{');
				self.advance(2);
				continue;
			}

			self.process_tag()?;
		}

		self.flush_text();
		Ok(())
	}

	fn process_tag(&mut self) -> TagflowResult<()> {
		let position = self.position;
		self.advance(1);

		let content = &self.source[self.offset..];
		let mut walker = TagWalker::new(content, self.dialect, self.position);

		let Some(close) = walker.walk()? else {
			return Err(TagflowError::UnterminatedTag(position));
		};

		let text = content[..close.start].trim().to_string();

		if walker.lexemes.is_empty() {
			return Err(TagflowError::EmptyTag(text));
		}

		tracing::trace!(%position, tag = %text, lexemes = walker.lexemes.len(), "lexed tag");

		self.flush_text();
		self.pieces.push(Piece::Tag(TagLexeme {
			lexemes: walker.lexemes,
			text,
			position,
		}));
		self.advance(close.end);

		Ok(())
	}
}

/// Splits the content of one tag into lexemes. Words in the dialect's
/// keyword set become keywords; every other run of terms is fed to an
/// expression, and a new expression starts whenever the current one is
/// complete and cannot take the next term.
struct TagWalker<'a> {
	content: &'a str,
	dialect: &'a Dialect,
	/// Position of the first content character.
	start: Position,
	expression: Option<Expression>,
	lexemes: Vec<Lexeme>,
}

impl<'a> TagWalker<'a> {
	fn new(content: &'a str, dialect: &'a Dialect, start: Position) -> Self {
		Self {
			content,
			dialect,
			start,
			expression: None,
			lexemes: vec![],
		}
	}

	/// Walk up to the closing brace and return its span, or `None` when the
	/// content ends first.
	fn walk(&mut self) -> TagflowResult<Option<std::ops::Range<usize>>> {
		let mut lexer = RawToken::lexer(self.content);

		while let Some(result) = lexer.next() {
			let span = lexer.span();
			let slice = lexer.slice();

			let Ok(raw) = result else {
				return Err(self.unexpected(slice, span.start));
			};

			match raw {
				RawToken::BraceClose => {
					self.flush()?;
					return Ok(Some(span));
				}
				RawToken::BraceOpen => return Err(self.unexpected(slice, span.start)),
				RawToken::Whitespace => {}
				RawToken::Ident => self.feed_word(slice)?,
				RawToken::Number => self.feed_literal(parse_number(slice))?,
				RawToken::DoubleQuotedString | RawToken::SingleQuotedString => {
					let Some(value) = parse_string(slice) else {
						return Err(self.unexpected(slice, span.start));
					};
					self.feed_literal(value)?;
				}
				RawToken::Symbols => {
					let Some(symbols) = split_symbols(self.dialect, slice) else {
						return Err(self.unexpected(slice, span.start));
					};

					for symbol in symbols {
						self.feed_symbol(symbol)?;
					}
				}
			}
		}

		self.flush()?;
		Ok(None)
	}

	fn unexpected(&self, text: &str, offset: usize) -> TagflowError {
		let mut position = self.start;
		position.advance_str(&self.content[..offset]);

		TagflowError::UnexpectedInput {
			text: text.to_string(),
			position,
		}
	}

	fn invalid(&self, source: TagflowError) -> TagflowError {
		TagflowError::InvalidTagExpression {
			position: self.start,
			source: Box::new(source),
		}
	}

	fn feed_word(&mut self, word: &str) -> TagflowResult<()> {
		if self.dialect.is_keyword(word) {
			self.flush()?;
			self.lexemes.push(Lexeme::Keyword(word.to_string()));
			return Ok(());
		}

		match word {
			"true" => self.feed_literal(Value::Boolean(true)),
			"false" => self.feed_literal(Value::Boolean(false)),
			_ => self.feed_symbol(word),
		}
	}

	fn feed_symbol(&mut self, symbol: &str) -> TagflowResult<()> {
		let result = self
			.expression_accepting(|expression| expression.accepts_symbol(symbol))?
			.feed_symbol(symbol);
		result.map_err(|error| self.invalid(error))
	}

	fn feed_literal(&mut self, value: Value) -> TagflowResult<()> {
		let result = self
			.expression_accepting(Expression::expects_operand)?
			.feed_literal(value);
		result.map_err(|error| self.invalid(error))
	}

	/// The expression the next term belongs to, starting a new one when the
	/// current expression cannot take it.
	fn expression_accepting(&mut self, accepts: impl Fn(&Expression) -> bool) -> TagflowResult<&mut Expression> {
		if self.expression.as_ref().is_some_and(|expression| !accepts(expression)) {
			self.flush()?;
		}

		if self.expression.is_none() {
			self.expression = Some(self.dialect.expression()?);
		}

		self.expression.as_mut().ok_or(TagflowError::EmptyExpression)
	}

	/// Construct the pending expression and append it as a lexeme.
	fn flush(&mut self) -> TagflowResult<()> {
		let Some(mut expression) = self.expression.take() else {
			return Ok(());
		};

		expression.construct().map_err(|error| self.invalid(error))?;
		self.lexemes.push(Lexeme::Expression(expression));

		Ok(())
	}
}

/// Split template source into literal text and lexed tags.
pub fn tokenize(source: &str, dialect: &Dialect) -> TagflowResult<Vec<Piece>> {
	let mut walker = TemplateWalker::new(source, dialect);
	walker.process()?;
	Ok(walker.pieces)
}

/// Lex a standalone expression, written as it would be inside a tag.
pub fn lex_expression(source: &str, dialect: &Dialect) -> TagflowResult<Expression> {
	let mut walker = TagWalker::new(source, dialect, Position::default());

	if let Some(close) = walker.walk()? {
		return Err(walker.unexpected("}", close.start));
	}

	let mut lexemes = walker.lexemes.into_iter();

	match (lexemes.next(), lexemes.next()) {
		(Some(Lexeme::Expression(expression)), None) => Ok(expression),
		(None, _) => Err(TagflowError::EmptyExpression),
		(Some(Lexeme::Keyword(word)), _) => Err(TagflowError::UnexpectedTerm(word)),
		(Some(_), Some(_)) => {
			Err(TagflowError::UnexpectedInput {
				text: source.trim().to_string(),
				position: Position::default(),
			})
		}
	}
}

/// Split a run of symbol characters by longest match against the dialect's
/// operator symbols.
fn split_symbols<'s>(dialect: &Dialect, run: &'s str) -> Option<Vec<&'s str>> {
	let mut symbols = vec![];
	let mut rest = run;

	while !rest.is_empty() {
		let symbol = dialect
			.symbols()
			.iter()
			.find(|symbol| rest.starts_with(symbol.as_str()))?;
		let (head, tail) = rest.split_at(symbol.len());
		symbols.push(head);
		rest = tail;
	}

	Some(symbols)
}

fn parse_number(slice: &str) -> Value {
	let is_float = slice.contains('.') || slice.contains('e') || slice.contains('E');

	if !is_float {
		if let Ok(value) = slice.parse::<i64>() {
			return Value::Integer(value);
		}
	}

	slice.parse::<f64>().map_or(Value::Undefined, Value::Float)
}

/// Strip the quotes and unescape if needed.
fn parse_string(slice: &str) -> Option<Value> {
	let inner = &slice[1..slice.len() - 1];

	if inner.contains('\\') {
		unescape(inner).ok().map(Value::String)
	} else {
		Some(Value::String(inner.to_string()))
	}
}
