use miette::Diagnostic;
use thiserror::Error;

use crate::Position;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum TagflowError {
	#[error(transparent)]
	#[diagnostic(code(tagflow::io_error))]
	Io(#[from] std::io::Error),

	#[error("operator `{0}` is already registered")]
	#[diagnostic(
		code(tagflow::duplicate_operator),
		help("every operator symbol must be unambiguous at each parse position")
	)]
	DuplicateOperator(String),

	#[error("operators cannot be registered after the first term has been fed")]
	#[diagnostic(code(tagflow::registration_closed))]
	RegistrationClosed,

	#[error("unexpected term `{0}` in expression")]
	#[diagnostic(code(tagflow::unexpected_term))]
	UnexpectedTerm(String),

	#[error("operator `{operator}` expects an identifier, found `{found}`")]
	#[diagnostic(code(tagflow::expected_identifier))]
	ExpectedIdentifier { operator: String, found: String },

	#[error("unmatched group symbol `{0}`")]
	#[diagnostic(
		code(tagflow::unmatched_group),
		help("every opening bracket needs its own closing bracket")
	)]
	UnmatchedGroup(String),

	#[error("expression is incomplete")]
	#[diagnostic(code(tagflow::incomplete_expression))]
	IncompleteExpression,

	#[error("expression is empty")]
	#[diagnostic(code(tagflow::empty_expression))]
	EmptyExpression,

	#[error("expression has already been constructed")]
	#[diagnostic(code(tagflow::already_constructed))]
	AlreadyConstructed,

	#[error("expression has not been constructed")]
	#[diagnostic(
		code(tagflow::not_constructed),
		help("call `construct()` before evaluating the expression")
	)]
	NotConstructed,

	#[error("invalid tag markup `{markup}`: {reason}")]
	#[diagnostic(
		code(tagflow::invalid_tag_markup),
		help("use `$` for expressions, `?` for identifiers, `!` for constants and bare words for keywords")
	)]
	InvalidTagMarkup { markup: String, reason: String },

	#[error("tag `{0}` has no components")]
	#[diagnostic(code(tagflow::empty_tag))]
	EmptyTag(String),

	#[error("directive `{0}` has no tags")]
	#[diagnostic(code(tagflow::empty_directive))]
	EmptyDirective(String),

	#[error("tag `{tag}` declares component key `{key}` more than once")]
	#[diagnostic(
		code(tagflow::duplicate_component_key),
		help("name repeated slots explicitly, e.g. `$value IF $condition`")
	)]
	DuplicateComponentKey { tag: String, key: String },

	#[error("no directive matches tag `{tag}` at {position}")]
	#[diagnostic(code(tagflow::no_matching_directive))]
	NoMatchingDirective { tag: String, position: Position },

	#[error("tag `{tag}` at {position} matches several directives equally: {candidates}")]
	#[diagnostic(
		code(tagflow::ambiguous_directive),
		help("directives must differ in keywords or slot kinds to be told apart")
	)]
	AmbiguousDirective {
		tag: String,
		candidates: String,
		position: Position,
	},

	#[error("directive `{name}` opened at {position} is never closed")]
	#[diagnostic(code(tagflow::unclosed_directive))]
	UnclosedDirective { name: String, position: Position },

	#[error("unterminated tag starting at {0}")]
	#[diagnostic(code(tagflow::unterminated_tag), help("close the tag with `}}`"))]
	UnterminatedTag(Position),

	#[error("unexpected input `{text}` at {position}")]
	#[diagnostic(code(tagflow::unexpected_input))]
	UnexpectedInput { text: String, position: Position },

	#[error("invalid expression in tag at {position}: {source}")]
	#[diagnostic(code(tagflow::invalid_tag_expression))]
	InvalidTagExpression {
		position: Position,
		#[source]
		source: Box<TagflowError>,
	},

	#[error("cannot apply `{operator}` to {operands}")]
	#[diagnostic(code(tagflow::type_mismatch))]
	TypeMismatch { operator: String, operands: String },

	#[error("division by zero")]
	#[diagnostic(code(tagflow::division_by_zero))]
	DivisionByZero,

	#[error("range `{start}..{end}` is too large")]
	#[diagnostic(
		code(tagflow::range_too_large),
		help("a range may produce at most 1048576 items")
	)]
	RangeTooLarge { start: i64, end: i64 },

	#[error("unknown function `{0}`")]
	#[diagnostic(code(tagflow::unknown_function))]
	UnknownFunction(String),

	#[error("invalid arguments to `{function}`: {reason}")]
	#[diagnostic(code(tagflow::invalid_arguments))]
	InvalidArguments { function: String, reason: String },

	#[error("value of type {0} is not iterable")]
	#[diagnostic(code(tagflow::not_iterable))]
	NotIterable(String),

	#[error("value of type {kind} has no property `{name}`")]
	#[diagnostic(code(tagflow::unknown_property))]
	UnknownProperty { kind: String, name: String },

	#[error("loop variable `{0}` is already bound by an enclosing loop")]
	#[diagnostic(code(tagflow::reentrant_loop))]
	ReentrantLoop(String),

	#[error("directive component `{0}` is missing")]
	#[diagnostic(code(tagflow::missing_component))]
	MissingComponent(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(tagflow::config_parse),
		help("check that tagflow.toml is valid TOML with [dialect], [evaluation], [variables] and/or [data] sections")
	)]
	ConfigParse(String),

	#[error("failed to load data file `{path}`: {reason}")]
	#[diagnostic(code(tagflow::data_file))]
	DataFile { path: String, reason: String },
}

impl TagflowError {
	/// Whether this error is produced while evaluating an expression, and may
	/// therefore be absorbed by a permissive evaluation context.
	pub fn is_evaluation_error(&self) -> bool {
		matches!(
			self,
			Self::TypeMismatch { .. }
				| Self::DivisionByZero
				| Self::RangeTooLarge { .. }
				| Self::UnknownFunction(_)
				| Self::InvalidArguments { .. }
				| Self::NotIterable(_)
				| Self::UnknownProperty { .. }
		)
	}
}

pub type TagflowResult<T> = Result<T, TagflowError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
