use std::sync::Arc;

use crate::Associativity;
use crate::BinaryOperation;
use crate::BinaryOperator;
use crate::Directive;
use crate::Expression;
use crate::GroupOperator;
use crate::Operator;
use crate::TagflowResult;
use crate::UNARY_PRECEDENCE;
use crate::UnaryOperation;
use crate::UnaryOperator;
use crate::arbiter::keyword_eq;
use crate::directives::ConditionalInterpolation;
use crate::directives::Conditional;
use crate::directives::ForEach;
use crate::directives::Interpolation;
use crate::directives::Repeat;
use crate::lexer::lex_expression;
use crate::parser::Template;
use crate::parser::parse;

/// A language definition: operators, directives and the keyword case rule.
///
/// Dialects are immutable once built and can be shared between threads;
/// every parse creates fresh expressions from the registered operators.
#[derive(Debug, Clone, Default)]
pub struct Dialect {
	case_sensitive: bool,
	operators: Vec<Operator>,
	/// Operator symbols, longest first.
	symbols: Vec<String>,
	directives: Vec<Arc<Directive>>,
	keywords: Vec<String>,
}

impl Dialect {
	/// An empty dialect with no operators and no directives.
	pub fn new() -> Self {
		Self::default()
	}

	/// The standard dialect. See [`try_standard`](Dialect::try_standard).
	///
	/// # Panics
	///
	/// Panics if the built-in operator table or directive markup fails to
	/// register, which never happens for an unmodified build.
	pub fn standard() -> Self {
		Self::try_standard().unwrap_or_else(|error| panic!("the standard dialect is invalid: {error}"))
	}

	/// The standard dialect: the full operator table plus interpolation,
	/// conditional, repeat and for-each directives, with case-insensitive
	/// keywords.
	pub fn try_standard() -> TagflowResult<Self> {
		let mut dialect = Self::new();

		for operator in standard_operators() {
			dialect.add_operator(operator)?;
		}

		dialect.add_directive(Directive::from_markup("interpolation", &["$"], Interpolation)?);
		dialect.add_directive(Directive::from_markup(
			"conditional interpolation",
			&["$value IF $condition"],
			ConditionalInterpolation,
		)?);
		dialect.add_directive(Directive::from_markup("if", &["IF $ THEN", "END"], Conditional)?);
		dialect.add_directive(Directive::from_markup("if-else", &["IF $ THEN", "ELSE", "END"], Conditional)?);
		dialect.add_directive(Directive::from_markup("repeat", &["REPEAT $ TIMES", "END"], Repeat)?);
		dialect.add_directive(Directive::from_markup("for-each", &["FOR EACH ? IN $", "END"], ForEach)?);
		dialect.add_directive(Directive::from_markup(
			"separated for-each",
			&["FOR EACH ? IN $", "WITH", "END"],
			ForEach,
		)?);

		Ok(dialect)
	}

	#[must_use]
	pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
		self.case_sensitive = case_sensitive;
		self
	}

	pub fn case_sensitive(&self) -> bool {
		self.case_sensitive
	}

	/// Register an operator, rejecting symbols that collide with the
	/// operators already registered.
	pub fn add_operator(&mut self, operator: impl Into<Operator>) -> TagflowResult<()> {
		let operator = operator.into();
		self.expression()?.register(operator.clone())?;

		match &operator {
			Operator::Group(group) => {
				self.symbols.push(group.symbol().to_string());
				self.symbols.push(group.terminator().to_string());
			}
			_ => self.symbols.push(operator.symbol().to_string()),
		}

		self.symbols.sort_by(|left, right| right.len().cmp(&left.len()).then_with(|| left.cmp(right)));
		self.symbols.dedup();
		self.operators.push(operator);

		Ok(())
	}

	pub fn add_directive(&mut self, directive: Directive) {
		for keyword in directive.tags().iter().flat_map(|tag| tag.keywords()) {
			if !self.keywords.iter().any(|known| known == keyword) {
				self.keywords.push(keyword.to_string());
			}
		}

		self.directives.push(Arc::new(directive));
	}

	pub fn operators(&self) -> &[Operator] {
		&self.operators
	}

	/// Every operator symbol, longest first.
	pub fn symbols(&self) -> &[String] {
		&self.symbols
	}

	pub fn directives(&self) -> &[Arc<Directive>] {
		&self.directives
	}

	/// Whether `word` is a keyword of any directive under the case rule.
	pub fn is_keyword(&self, word: &str) -> bool {
		self.keywords
			.iter()
			.any(|keyword| keyword_eq(keyword, word, self.case_sensitive))
	}

	/// A fresh expression with every operator of the dialect registered.
	pub fn expression(&self) -> TagflowResult<Expression> {
		let mut expression = Expression::new();

		for operator in &self.operators {
			expression.register(operator.clone())?;
		}

		Ok(expression)
	}

	/// Lex and construct an expression written as it would be inside a tag.
	pub fn parse_expression(&self, source: &str) -> TagflowResult<Expression> {
		lex_expression(source, self)
	}

	pub fn parse(&self, source: &str) -> TagflowResult<Template> {
		parse(source, self)
	}
}

/// The standard operator table. Lower precedence numbers bind tighter.
pub fn standard_operators() -> Vec<Operator> {
	use Associativity::LeftToRight;
	use Associativity::RightToLeft;

	let binary = |symbol: &str, precedence, associativity, operation| {
		Operator::from(BinaryOperator::new(symbol, precedence, associativity, operation))
	};
	let unary = |symbol: &str, operation| Operator::from(UnaryOperator::new(symbol, UNARY_PRECEDENCE, operation));

	vec![
		unary("+", UnaryOperation::Identity),
		unary("-", UnaryOperation::Negate),
		unary("!", UnaryOperation::Not),
		unary("~", UnaryOperation::BitwiseNot),
		binary(".", 0, LeftToRight, BinaryOperation::MemberAccess),
		binary("*", 3, LeftToRight, BinaryOperation::Multiply),
		binary("/", 3, LeftToRight, BinaryOperation::Divide),
		binary("%", 3, LeftToRight, BinaryOperation::Modulo),
		binary("+", 4, LeftToRight, BinaryOperation::Add),
		binary("-", 4, LeftToRight, BinaryOperation::Subtract),
		binary("<<", 5, LeftToRight, BinaryOperation::ShiftLeft),
		binary(">>", 5, LeftToRight, BinaryOperation::ShiftRight),
		binary("..", 6, LeftToRight, BinaryOperation::Range),
		binary("<", 7, LeftToRight, BinaryOperation::Less),
		binary("<=", 7, LeftToRight, BinaryOperation::LessOrEqual),
		binary(">", 7, LeftToRight, BinaryOperation::Greater),
		binary(">=", 7, LeftToRight, BinaryOperation::GreaterOrEqual),
		binary("==", 8, LeftToRight, BinaryOperation::Equal),
		binary("!=", 8, LeftToRight, BinaryOperation::NotEqual),
		binary("&", 9, LeftToRight, BinaryOperation::BitwiseAnd),
		binary("^", 10, LeftToRight, BinaryOperation::BitwiseXor),
		binary("|", 11, LeftToRight, BinaryOperation::BitwiseOr),
		binary("&&", 12, LeftToRight, BinaryOperation::And),
		binary("||", 13, LeftToRight, BinaryOperation::Or),
		binary("??", 14, RightToLeft, BinaryOperation::Coalesce),
		binary("=", 15, RightToLeft, BinaryOperation::Assign),
		binary(",", 16, LeftToRight, BinaryOperation::Sequence),
		GroupOperator::new("(", ")").into(),
		GroupOperator::new("[", "]").into(),
	]
}
