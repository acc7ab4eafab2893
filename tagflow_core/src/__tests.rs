use std::cell::RefCell;
use std::collections::BTreeMap;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::*;
use crate::arbiter::score;
use crate::lexer::tokenize;
use crate::tokens::Piece;
use crate::tokens::TagLexeme;

fn expression(source: &str) -> TagflowResult<Expression> {
	Dialect::standard().parse_expression(source)
}

fn eval(source: &str) -> TagflowResult<Value> {
	expression(source)?.evaluate(&mut RenderContext::new())
}

fn render(source: &str, context: &mut RenderContext) -> TagflowResult<String> {
	Dialect::standard().parse(source)?.render(context)
}

fn first_tag(source: &str, dialect: &Dialect) -> TagflowResult<TagLexeme> {
	tokenize(source, dialect)?
		.into_iter()
		.find_map(|piece| {
			match piece {
				Piece::Tag(tag) => Some(tag),
				Piece::Text(_) => None,
			}
		})
		.ok_or(TagflowError::EmptyExpression)
}

fn object(entries: &[(&str, Value)]) -> Value {
	Value::Object(
		entries
			.iter()
			.map(|(key, value)| ((*key).to_string(), value.clone()))
			.collect::<BTreeMap<_, _>>(),
	)
}

/// Writes a fixed label on its first tag and ends on any later one.
struct Label(&'static str);

impl DirectiveHandler for Label {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		if visit.tag_index == 0 {
			Ok(FlowStep::evaluate().with_text(self.0))
		} else {
			Ok(FlowStep::terminate())
		}
	}
}

/// `PAD !width`: writes `width` hashes. Only integer constants are accepted.
struct Pad;

impl DirectiveHandler for Pad {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		let width = visit.bindings.constant("width")?.as_integer().unwrap_or_default();
		let width = usize::try_from(width).unwrap_or_default();
		Ok(FlowStep::terminate().with_text("#".repeat(width)))
	}

	fn accepts_constant(&self, _tag_index: usize, _key: &str, value: &Value) -> bool {
		matches!(value, Value::Integer(_))
	}
}

fn custom_dialect(directives: Vec<Directive>) -> TagflowResult<Dialect> {
	let mut dialect = Dialect::new();

	for operator in standard_operators() {
		dialect.add_operator(operator)?;
	}

	for directive in directives {
		dialect.add_directive(directive);
	}

	Ok(dialect)
}

/// Records every variable lookup so tests can observe what was evaluated.
#[derive(Default)]
struct RecordingContext {
	inner: RenderContext,
	lookups: RefCell<Vec<String>>,
}

impl EvaluationContext for RecordingContext {
	fn get_variable(&self, name: &str) -> Value {
		self.lookups.borrow_mut().push(name.to_string());
		self.inner.get_variable(name)
	}

	fn set_variable(&mut self, name: &str, value: Value) {
		self.inner.set_variable(name, value);
	}

	fn get_property(&self, object: &Value, name: &str) -> TagflowResult<Value> {
		self.inner.get_property(object, name)
	}

	fn add_state_object(&mut self, key: &str) -> bool {
		self.inner.add_state_object(key)
	}

	fn remove_state_object(&mut self, key: &str) -> bool {
		self.inner.remove_state_object(key)
	}

	fn contains_state_object(&self, key: &str) -> bool {
		self.inner.contains_state_object(key)
	}

	fn is_strict(&self) -> bool {
		self.inner.is_strict()
	}
}

#[rstest]
#[case::precedence("1 + 2 * 3", Value::Integer(7))]
#[case::group("(1 + 2) * 3", Value::Integer(9))]
#[case::bracket_group("[1 + 2] * 3", Value::Integer(9))]
#[case::left_to_right("10 - 3 - 2", Value::Integer(5))]
#[case::unary_binds_tighter("-2 * 3", Value::Integer(-6))]
#[case::double_negation("- -4", Value::Integer(4))]
#[case::not("!0 && 1", Value::Boolean(true))]
#[case::comparison_before_equality("1 < 2 == true", Value::Boolean(true))]
#[case::modulo("7 % 4", Value::Integer(3))]
#[case::inexact_division("7 / 2", Value::Float(3.5))]
#[case::exact_division("8 / 2", Value::Integer(4))]
#[case::shift("1 << 4", Value::Integer(16))]
#[case::bitwise_and("6 & 3", Value::Integer(2))]
#[case::bitwise_or("6 | 3", Value::Integer(7))]
#[case::bitwise_xor("6 ^ 3", Value::Integer(5))]
#[case::bitwise_not("~0", Value::Integer(-1))]
#[case::string_concatenation("\"a\" + 1", Value::from("a1"))]
#[case::single_quoted("'single'", Value::from("single"))]
#[case::escaped_string(r#""a\nb""#, Value::from("a\nb"))]
#[case::coalesce("missing ?? 5", Value::Integer(5))]
#[case::range("1..3", Value::from(vec![1, 2, 3]))]
#[case::descending_range("3..1", Value::from(vec![3, 2, 1]))]
#[case::sequence("1, 2, 3", Value::from(vec![1, 2, 3]))]
#[case::nested_sequence(
	"(1, 2), 3",
	Value::Sequence(vec![Value::from(vec![1, 2]), Value::Integer(3)])
)]
#[case::float("1.5 + 1", Value::Float(2.5))]
#[case::numeric_string("\"40\" * 2", Value::Integer(80))]
#[case::call("max(1, 2)", Value::Integer(2))]
#[case::call_spreads_sequence("min(3..1)", Value::Integer(1))]
#[case::nested_call("len(upper(\"abc\")) + 1", Value::Integer(4))]
#[case::method_call("(1..3).join(\"-\")", Value::from("1-2-3"))]
#[case::unicode_name("café ?? 1", Value::Integer(1))]
fn evaluates_expressions(#[case] source: &str, #[case] expected: Value) -> TagflowResult<()> {
	assert_eq!(eval(source)?, expected);

	Ok(())
}

#[rstest]
#[case::product_binds_tighter("a + b * c", "(a + (b * c))")]
#[case::group_overrides("(a + b) * c", "((a + b) * c)")]
#[case::left_to_right("a - b - c", "((a - b) - c)")]
#[case::right_to_left_assignment("a = b = c", "(a = (b = c))")]
#[case::right_to_left_coalesce("a ?? b ?? c", "(a ?? (b ?? c))")]
#[case::member_access("user.name + 1", "(user.name + 1)")]
#[case::unary_member("-user.age", "-user.age")]
#[case::folds_constant_prefix("2 * 3 + x", "(6 + x)")]
#[case::folds_constant_suffix("x + 2 * 3", "(x + 6)")]
#[case::folds_assignment_value("x = 1 + 2", "(x = 3)")]
#[case::folds_short_circuit("false && x", "false")]
#[case::call_binds_tighter("-max(a, b + 1) * 2", "(-max(a, (b + 1)) * 2)")]
#[case::method_call("items.join(\", \")", "items.join(\", \")")]
#[case::empty_call("now()", "now()")]
#[case::folds_call_arguments("f(2 * 3, x)", "f(6, x)")]
fn builds_expression_structure(#[case] source: &str, #[case] expected: &str) -> TagflowResult<()> {
	assert_eq!(expression(source)?.to_string(), expected);

	Ok(())
}

#[test]
fn structural_form_snapshot() -> TagflowResult<()> {
	let expression = expression("a * (b + c) - d / 2")?;
	insta::assert_snapshot!(expression.to_string(), @"((a * (b + c)) - (d / 2))");

	Ok(())
}

#[test]
fn feeds_terms_one_at_a_time() -> TagflowResult<()> {
	let mut expression = Dialect::standard().expression()?;

	assert!(expression.expects_operand());
	expression.feed_literal(1)?;
	assert!(!expression.expects_operand());
	expression.feed_symbol("+")?;
	expression.feed_literal(2)?;
	expression.feed_symbol("*")?;
	expression.feed_literal(3)?;
	expression.construct()?;

	assert!(expression.is_constructed());
	assert_eq!(expression.constant(), Some(&Value::Integer(7)));
	assert_eq!(expression.evaluate(&mut RenderContext::new())?, Value::Integer(7));

	Ok(())
}

#[test]
fn reduction_is_idempotent() -> TagflowResult<()> {
	let mut expression = expression("2 * 3 + x * (4 - 1)")?;
	let before = expression.to_string();

	let root = expression.root.ok_or(TagflowError::EmptyExpression)?;
	let first = expression.ast.reduce(root);
	let second = expression.ast.reduce(root);

	assert_eq!(first, None);
	assert_eq!(second, None);
	assert_eq!(expression.to_string(), before);
	assert_eq!(before, "(6 + (x * 3))");

	Ok(())
}

#[test]
fn side_effects_are_never_folded() -> TagflowResult<()> {
	let expression = expression("y = 3")?;
	assert_eq!(expression.constant(), None);

	let mut context = RenderContext::new();
	assert_eq!(expression.evaluate(&mut context)?, Value::Integer(3));
	assert_eq!(context.get_variable("y"), Value::Integer(3));

	Ok(())
}

#[test]
fn chained_assignment_sets_every_name() -> TagflowResult<()> {
	let mut context = RenderContext::new();
	expression("a = b = 2")?.evaluate(&mut context)?;

	assert_eq!(context.get_variable("a"), Value::Integer(2));
	assert_eq!(context.get_variable("b"), Value::Integer(2));

	Ok(())
}

#[rstest]
#[case::and_false("flag && probe", false, Value::Boolean(false))]
#[case::or_true("flag || probe", true, Value::Boolean(true))]
#[case::coalesce_defined("flag ?? probe", true, Value::Boolean(true))]
fn short_circuit_skips_right_operand(
	#[case] source: &str,
	#[case] flag: bool,
	#[case] expected: Value,
) -> TagflowResult<()> {
	let expression = expression(source)?;
	let mut context = RecordingContext {
		inner: RenderContext::new().with_variable("flag", flag),
		..RecordingContext::default()
	};

	assert_eq!(expression.evaluate(&mut context)?, expected);
	assert_eq!(context.lookups.into_inner(), vec!["flag".to_string()]);

	Ok(())
}

#[test]
fn evaluates_right_operand_when_needed() -> TagflowResult<()> {
	let expression = expression("flag && probe")?;
	let mut context = RecordingContext {
		inner: RenderContext::new().with_variable("flag", true).with_variable("probe", 1),
		..RecordingContext::default()
	};

	assert_eq!(expression.evaluate(&mut context)?, Value::Boolean(true));
	assert_eq!(context.lookups.into_inner(), vec!["flag".to_string(), "probe".to_string()]);

	Ok(())
}

#[test]
fn member_access_reads_properties() -> TagflowResult<()> {
	let mut context = RenderContext::new()
		.with_variable("user", object(&[("name", Value::from("Ada"))]))
		.with_variable("items", vec![1, 2, 3]);

	assert_eq!(expression("user.name")?.evaluate(&mut context)?, Value::from("Ada"));
	assert_eq!(expression("items.length")?.evaluate(&mut context)?, Value::Integer(3));
	assert_eq!(expression("items.last * 2")?.evaluate(&mut context)?, Value::Integer(6));
	assert_eq!(expression("user.missing")?.evaluate(&mut context)?, Value::Undefined);

	let error = expression("user.missing")?
		.evaluate(&mut context.clone().with_strict(true))
		.unwrap_err();
	assert!(matches!(error, TagflowError::UnknownProperty { .. }));

	Ok(())
}

#[rstest]
#[case::unclosed_group("(1 + 2")]
#[case::stray_close("1 + 2)")]
#[case::mismatched_brackets("(1 + 2]")]
fn unbalanced_brackets_fail(#[case] source: &str) {
	let error = expression(source).unwrap_err();
	let TagflowError::InvalidTagExpression { source, .. } = error else {
		panic!("expected an invalid tag expression");
	};

	assert!(matches!(*source, TagflowError::UnmatchedGroup(_)), "{source:?}");
}

#[rstest]
#[case::dangling_operator("1 +", "IncompleteExpression")]
#[case::assign_to_literal("3 = 4", "ExpectedIdentifier")]
#[case::member_literal("a.1", "ExpectedIdentifier")]
#[case::empty_group("()", "UnexpectedTerm")]
fn malformed_expressions_fail(#[case] source: &str, #[case] kind: &str) {
	let error = expression(source).unwrap_err();
	let TagflowError::InvalidTagExpression { source, .. } = error else {
		panic!("expected an invalid tag expression");
	};

	assert!(format!("{source:?}").starts_with(kind), "{source:?}");
}

#[test]
fn empty_expression_fails() {
	assert!(matches!(expression("   ").unwrap_err(), TagflowError::EmptyExpression));
	assert!(matches!(
		Expression::new().construct().unwrap_err(),
		TagflowError::EmptyExpression
	));
}

#[test]
fn stray_close_is_unmatched() -> TagflowResult<()> {
	let mut expression = Dialect::standard().expression()?;
	expression.feed_literal(1)?;

	let error = expression.feed_symbol(")").unwrap_err();
	assert!(matches!(error, TagflowError::UnmatchedGroup(symbol) if symbol == ")"));

	Ok(())
}

#[test]
fn operator_registration_rules() -> TagflowResult<()> {
	let plus = BinaryOperator::new("+", 4, Associativity::LeftToRight, BinaryOperation::Add);
	let mut expression = Expression::new();
	expression.register(plus.clone())?;

	let duplicate = expression.register(plus).unwrap_err();
	assert!(matches!(duplicate, TagflowError::DuplicateOperator(symbol) if symbol == "+"));

	// A symbol may be unary and binary at once.
	expression.register(UnaryOperator::new("+", UNARY_PRECEDENCE, UnaryOperation::Identity))?;

	expression.register(GroupOperator::new("(", ")"))?;
	let clash = expression
		.register(BinaryOperator::new(")", 4, Associativity::LeftToRight, BinaryOperation::Add))
		.unwrap_err();
	assert!(matches!(clash, TagflowError::DuplicateOperator(_)));

	expression.feed_literal(1)?;
	let closed = expression.register(GroupOperator::new("[", "]")).unwrap_err();
	assert!(matches!(closed, TagflowError::RegistrationClosed));

	Ok(())
}

#[test]
fn constructed_expressions_are_frozen() -> TagflowResult<()> {
	let mut expression = Dialect::standard().expression()?;
	let early = expression.evaluate(&mut RenderContext::new()).unwrap_err();
	assert!(matches!(early, TagflowError::NotConstructed));

	expression.feed_literal(1)?;
	expression.construct()?;

	assert!(matches!(expression.feed_symbol("+").unwrap_err(), TagflowError::AlreadyConstructed));
	assert!(matches!(expression.construct().unwrap_err(), TagflowError::AlreadyConstructed));

	Ok(())
}

#[test]
#[traced_test]
fn division_by_zero_is_left_for_run_time() -> TagflowResult<()> {
	let expression = expression("1 / 0")?;
	assert_eq!(expression.constant(), None);
	assert!(logs_contain("leaving operation for run time"));

	assert_eq!(expression.evaluate(&mut RenderContext::new())?, Value::Undefined);
	assert!(logs_contain("evaluation error absorbed as undefined"));

	let error = expression.evaluate(&mut RenderContext::strict()).unwrap_err();
	assert!(matches!(error, TagflowError::DivisionByZero));

	Ok(())
}

#[rstest]
#[case::full_width("0..9223372036854775807")]
#[case::billions("1..4000000000")]
fn oversized_ranges_are_left_for_run_time(#[case] range: &str) -> TagflowResult<()> {
	assert_eq!(expression(range)?.constant(), None);

	let source = format!("{{FOR EACH n IN {range}}}{{n}}{{END}}[{{{range}}}]");
	let template = Dialect::standard().parse(&source)?;
	assert_eq!(template.render(&mut RenderContext::new())?, "[]");

	let error = template.render(&mut RenderContext::strict()).unwrap_err();
	assert!(matches!(error, TagflowError::RangeTooLarge { .. }), "{error:?}");

	Ok(())
}

#[test]
fn opening_bracket_after_a_name_starts_a_call() -> TagflowResult<()> {
	let mut literal = Dialect::try_standard()?.expression()?;
	literal.feed_literal(1)?;
	assert!(!literal.accepts_symbol("("));
	assert!(matches!(literal.feed_symbol("(").unwrap_err(), TagflowError::UnexpectedTerm(_)));

	let mut call = Dialect::try_standard()?.expression()?;
	call.feed_symbol("max")?;
	assert!(call.accepts_symbol("("));
	call.feed_symbol("(")?;
	call.feed_literal(4)?;
	call.feed_symbol(",")?;
	call.feed_literal(9)?;
	call.feed_symbol(")")?;
	call.construct()?;

	assert_eq!(call.to_string(), "max(4, 9)");
	assert_eq!(call.constant(), None);
	assert_eq!(call.evaluate(&mut RenderContext::new())?, Value::Integer(9));

	Ok(())
}

#[test]
fn function_errors_follow_strictness() -> TagflowResult<()> {
	let unknown = expression("shout(name)")?;
	let mut permissive = RenderContext::new().with_variable("name", "Ada");
	assert_eq!(unknown.evaluate(&mut permissive)?, Value::Undefined);

	let error = unknown.evaluate(&mut RenderContext::strict()).unwrap_err();
	assert!(matches!(error, TagflowError::UnknownFunction(name) if name == "shout"));

	let invalid = expression("len(1)")?;
	assert_eq!(invalid.evaluate(&mut permissive)?, Value::Undefined);
	let error = invalid.evaluate(&mut RenderContext::strict()).unwrap_err();
	assert!(matches!(error, TagflowError::InvalidArguments { .. }), "{error:?}");

	// Contexts without built-ins know no functions.
	let mut bare = RecordingContext {
		inner: RenderContext::strict(),
		..RecordingContext::default()
	};
	let error = expression("max(1, 2)")?.evaluate(&mut bare).unwrap_err();
	assert!(matches!(error, TagflowError::UnknownFunction(_)));

	Ok(())
}

#[test]
fn strict_mode_raises_type_mismatch() -> TagflowResult<()> {
	let expression = expression("name - 1")?;
	let mut permissive = RenderContext::new().with_variable("name", "Ada");
	let mut strict = RenderContext::strict().with_variable("name", "Ada");

	assert_eq!(expression.evaluate(&mut permissive)?, Value::Undefined);
	assert!(matches!(
		expression.evaluate(&mut strict).unwrap_err(),
		TagflowError::TypeMismatch { .. }
	));

	Ok(())
}

#[rstest]
#[case::integer(Value::Integer(42), Some(Probe::Integer(42)))]
#[case::integer_string(Value::from("42"), Some(Probe::Integer(42)))]
#[case::float_string(Value::from("4.5"), Some(Probe::Float(4.5)))]
#[case::boolean_string(Value::from("true"), Some(Probe::Boolean(true)))]
#[case::plain_string(Value::from("word"), Some(Probe::String("word".into())))]
#[case::undefined(Value::Undefined, None)]
fn probes_values(#[case] value: Value, #[case] expected: Option<Probe<'static>>) {
	assert_eq!(value.probe(), expected);
}

#[rstest]
#[case::zero(Value::Integer(0), false)]
#[case::one(Value::Integer(1), true)]
#[case::empty_string(Value::from(""), false)]
#[case::string(Value::from("0"), true)]
#[case::undefined(Value::Undefined, false)]
#[case::empty_sequence(Value::Sequence(vec![]), false)]
fn truthiness(#[case] value: Value, #[case] expected: bool) {
	assert_eq!(value.is_truthy(), expected);
}

#[rstest]
#[case::anonymous_slots("IF $ THEN", 3)]
#[case::named_slots("$value IF $condition", 3)]
#[case::identifier("FOR EACH ? IN $", 5)]
#[case::constant("PAD !width", 2)]
fn parses_tag_markup(#[case] markup: &str, #[case] components: usize) -> TagflowResult<()> {
	let tag = Tag::parse(markup)?;
	assert_eq!(tag.len(), components);
	assert_eq!(tag.to_string(), markup);

	Ok(())
}

#[rstest]
#[case::empty("", "EmptyTag")]
#[case::repeated_anonymous("$ $", "DuplicateComponentKey")]
#[case::repeated_key("$x IF ?x", "DuplicateComponentKey")]
#[case::invalid_keyword("FOR-EACH $", "InvalidTagMarkup")]
#[case::invalid_key("$1", "InvalidTagMarkup")]
fn rejects_invalid_tag_markup(#[case] markup: &str, #[case] kind: &str) {
	let error = Tag::parse(markup).unwrap_err();
	assert!(format!("{error:?}").starts_with(kind), "{error:?}");
}

#[test]
fn directive_needs_tags() {
	let error = Directive::new("empty", vec![], Label("empty")).unwrap_err();
	assert!(matches!(error, TagflowError::EmptyDirective(name) if name == "empty"));
}

#[test]
fn scores_weight_later_positions() -> TagflowResult<()> {
	let dialect = Dialect::standard();
	let tag = first_tag("{IF x THEN}", &dialect)?;
	let directive = Directive::from_markup("if", &["IF $ THEN", "END"], Label("if"))?;

	// 3 * 1 + 1 * 2 + 3 * 3
	assert_eq!(score(&directive, 0, &tag, false), 14);
	assert_eq!(score(&directive, 1, &tag, false), 0);

	let for_each = first_tag("{FOR EACH item IN items}", &dialect)?;
	let directive = Directive::from_markup("for-each", &["FOR EACH ? IN $", "END"], Label("for"))?;

	// 3 * 1 + 3 * 2 + 2 * 3 + 3 * 4 + 1 * 5
	assert_eq!(score(&directive, 0, &for_each, false), 32);

	Ok(())
}

#[test]
fn identifier_slot_outscores_variable_slot() -> TagflowResult<()> {
	let dialect = custom_dialect(vec![
		Directive::from_markup("show name", &["SHOW ?"], Label("identifier"))?,
		Directive::from_markup("show value", &["SHOW $"], Label("expression"))?,
	])?;
	let mut context = RenderContext::new();

	assert_eq!(dialect.parse("{SHOW name}")?.render(&mut context)?, "identifier");
	assert_eq!(dialect.parse("{SHOW 1 + 2}")?.render(&mut context)?, "expression");

	Ok(())
}

#[test]
fn constant_slot_uses_accept_predicate() -> TagflowResult<()> {
	let dialect = custom_dialect(vec![Directive::from_markup("pad", &["PAD !width"], Pad)?])?;
	let mut context = RenderContext::new();

	assert_eq!(dialect.parse("{PAD 3}")?.render(&mut context)?, "###");
	assert_eq!(dialect.parse("{PAD 1 + 1}")?.render(&mut context)?, "##");

	for source in ["{PAD \"x\"}", "{PAD width}"] {
		let error = dialect.parse(source).unwrap_err();
		assert!(matches!(error, TagflowError::NoMatchingDirective { .. }), "{error:?}");
	}

	Ok(())
}

#[test]
fn equal_scores_with_different_shapes_are_ambiguous() -> TagflowResult<()> {
	let dialect = custom_dialect(vec![
		Directive::from_markup("print", &["PRINT $"], Label("print"))?,
		Directive::from_markup("print value", &["PRINT $value"], Label("value"))?,
	])?;

	let error = dialect.parse("{PRINT 1}").unwrap_err();
	let TagflowError::AmbiguousDirective { candidates, .. } = error else {
		panic!("expected an ambiguous directive");
	};
	assert_eq!(candidates, "`print`, `print value`");

	Ok(())
}

#[test]
fn composite_directives_closing_together_are_ambiguous() -> TagflowResult<()> {
	let dialect = custom_dialect(vec![
		Directive::from_markup("first", &["BLOCK $", "END"], Label("first"))?,
		Directive::from_markup("second", &["BLOCK $", "END"], Label("second"))?,
	])?;

	let error = dialect.parse("{BLOCK 1}body{END}").unwrap_err();
	assert!(matches!(error, TagflowError::AmbiguousDirective { .. }), "{error:?}");

	Ok(())
}

#[test]
fn shared_openings_are_narrowed_by_later_tags() -> TagflowResult<()> {
	let dialect = Dialect::standard();
	let template = dialect.parse("{IF flag THEN}a{ELSE}b{END}|{IF flag THEN}c{END}")?;

	let names: Vec<_> = template
		.nodes()
		.iter()
		.filter_map(|node| {
			match node {
				DocumentNode::Directive(directive) => Some(directive.directive.name().to_string()),
				DocumentNode::Text(_) => None,
			}
		})
		.collect();
	assert_eq!(names, vec!["if-else".to_string(), "if".to_string()]);

	let mut context = RenderContext::new().with_variable("flag", false);
	assert_eq!(template.render(&mut context)?, "b|");

	Ok(())
}

#[rstest]
#[case::interpolation("Hello, {name}!", "Hello, World!")]
#[case::escaped_brace("{{name}", "{name}")]
#[case::text_only("plain text", "plain text")]
#[case::expression_in_tag("{1 + 2 * 3}", "7")]
#[case::undefined_renders_empty("[{missing}]", "[]")]
#[case::conditional_interpolation_shown("{name IF 1}", "World")]
#[case::conditional_interpolation_hidden("{name IF 0}", "")]
#[case::if_integer_true("{IF 1 THEN}yes{END}", "yes")]
#[case::if_integer_false("{IF 0 THEN}yes{END}", "")]
#[case::if_empty_string("{IF \"\" THEN}yes{END}", "")]
#[case::if_else_true("{IF name THEN}a{ELSE}b{END}", "a")]
#[case::if_else_false("{IF missing THEN}a{ELSE}b{END}", "b")]
#[case::lowercase_keywords("{if 1 then}ok{end}", "ok")]
#[case::repeat_ten("{REPEAT 10 TIMES}x{END}", "xxxxxxxxxx")]
#[case::repeat_zero("{REPEAT 0 TIMES}x{END}", "")]
#[case::repeat_negative("{REPEAT -2 TIMES}x{END}", "")]
#[case::for_each_string("{FOR EACH c IN \"123456789\"}{c}{END}", "123456789")]
#[case::for_each_range("{FOR EACH n IN 1..3}{n * n};{END}", "1;4;9;")]
#[case::separated_for_each("{FOR EACH n IN 1..3}{n}{WITH}, {END}", "1, 2, 3")]
#[case::separated_single_item("{FOR EACH n IN 1..1}{n}{WITH}, {END}", "1")]
#[case::for_each_empty("{FOR EACH n IN missing}{n}{END}", "")]
#[case::nested_loops(
	"{FOR EACH i IN 1..2}{FOR EACH j IN 1..2}{i}{j} {END}{END}",
	"11 12 21 22 "
)]
#[case::assignment_then_read("{x = 5}{x}", "55")]
#[case::call_in_directive("{IF len(name) > 3 THEN}{upper(name)}{END}", "WORLD")]
#[case::unicode_names("{café = 1}{café + 1}", "12")]
fn renders_templates(#[case] source: &str, #[case] expected: &str) -> TagflowResult<()> {
	let mut context = RenderContext::new().with_variable("name", "World");
	assert_eq!(render(source, &mut context)?, expected);

	Ok(())
}

#[test]
fn loop_restores_previous_value() -> TagflowResult<()> {
	let mut context = RenderContext::new().with_variable("i", "outer");
	assert_eq!(render("{FOR EACH i IN 1..2}{i}{END}{i}", &mut context)?, "12outer");
	assert!(!context.contains_state_object("for-each:i"));

	Ok(())
}

#[test]
fn failed_loop_body_releases_loop_variable() -> TagflowResult<()> {
	let mut context = RenderContext::strict().with_variable("i", "outer");

	let error = render("{FOR EACH i IN 1..2}{1 / 0}{END}", &mut context).unwrap_err();
	assert!(matches!(error, TagflowError::DivisionByZero));
	assert!(!context.contains_state_object("for-each:i"));
	assert_eq!(context.get_variable("i"), Value::from("outer"));

	let error = render(
		"{FOR EACH j IN 1..2}{FOR EACH i IN 1..2}{1 / 0}{END}{END}",
		&mut context,
	)
	.unwrap_err();
	assert!(matches!(error, TagflowError::DivisionByZero));
	assert!(!context.contains_state_object("for-each:i"));
	assert!(!context.contains_state_object("for-each:j"));

	assert_eq!(render("{FOR EACH i IN 1..2}{i}{END}", &mut context)?, "12");

	Ok(())
}

#[test]
fn loop_variable_cannot_be_reentered() {
	let error = render(
		"{FOR EACH i IN 1..2}{FOR EACH i IN 1..2}{i}{END}{END}",
		&mut RenderContext::new(),
	)
	.unwrap_err();

	assert!(matches!(error, TagflowError::ReentrantLoop(name) if name == "i"));
}

#[test]
fn strict_mode_rejects_undefined_collections() {
	let error = render("{FOR EACH n IN missing}{n}{END}", &mut RenderContext::strict()).unwrap_err();
	assert!(matches!(error, TagflowError::NotIterable(kind) if kind == "undefined"));
}

#[test]
fn repeat_count_is_evaluated_once() -> TagflowResult<()> {
	let mut context = RenderContext::new().with_variable("count", 3);
	assert_eq!(render("{REPEAT count TIMES}{count = count - 1}{END}", &mut context)?, "210");

	Ok(())
}

#[test]
fn keywords_respect_case_sensitivity() -> TagflowResult<()> {
	let dialect = Dialect::try_standard()?.with_case_sensitive(true);
	let mut context = RenderContext::new();

	assert_eq!(dialect.parse("{IF 1 THEN}ok{END}")?.render(&mut context)?, "ok");

	let error = dialect.parse("{if 1 then}ok{end}").unwrap_err();
	assert!(matches!(error, TagflowError::NoMatchingDirective { .. }), "{error:?}");

	Ok(())
}

#[test]
fn templates_render_repeatedly_and_concurrently() -> TagflowResult<()> {
	let template = Dialect::standard().parse("{FOR EACH n IN 1..limit}{n}{END}")?;

	let first = template.render(&mut RenderContext::new().with_variable("limit", 3))?;
	let second = template.render(&mut RenderContext::new().with_variable("limit", 3))?;
	assert_eq!(first, "123");
	assert_eq!(first, second);

	let outputs = std::thread::scope(|scope| {
		let handles: Vec<_> = (1..=4)
			.map(|limit| {
				let template = &template;
				scope.spawn(move || template.render(&mut RenderContext::new().with_variable("limit", limit)))
			})
			.collect();

		handles
			.into_iter()
			.map(|handle| handle.join().unwrap_or(Err(TagflowError::EmptyExpression)))
			.collect::<TagflowResult<Vec<_>>>()
	})?;

	assert_eq!(outputs, vec!["1", "12", "123", "1234"]);

	Ok(())
}

#[rstest]
#[case::stray_end("ab\n{END}", "NoMatchingDirective")]
#[case::unclosed("x{IF 1 THEN}y", "UnclosedDirective")]
#[case::unterminated_tag("{name", "UnterminatedTag")]
#[case::unterminated_string("{\"abc}", "UnexpectedInput")]
#[case::nested_brace("{a {b}}", "UnexpectedInput")]
#[case::empty_tag("{ }", "EmptyTag")]
#[case::incomplete_expression("{1 +}", "InvalidTagExpression")]
fn rejects_malformed_templates(#[case] source: &str, #[case] kind: &str) {
	let error = Dialect::standard().parse(source).unwrap_err();
	assert!(format!("{error:?}").starts_with(kind), "{error:?}");
}

#[test]
fn errors_carry_positions() {
	let error = Dialect::standard().parse("ab\n{END}").unwrap_err();
	assert!(matches!(
		error,
		TagflowError::NoMatchingDirective { position, .. } if position == Position::new(2, 1, 3)
	));

	let error = Dialect::standard().parse("x{IF 1 THEN}y").unwrap_err();
	assert!(matches!(
		error,
		TagflowError::UnclosedDirective { position, .. } if position == Position::new(1, 2, 1)
	));
}

#[test]
fn lexes_keywords_and_expressions() -> TagflowResult<()> {
	let dialect = Dialect::standard();
	let pieces = tokenize("a{{b {FOR EACH x IN 1..3}c{END}", &dialect)?;

	assert_eq!(pieces.len(), 4);
	assert!(matches!(&pieces[0], Piece::Text(text) if text == "a{b "));

	let Piece::Tag(tag) = &pieces[1] else {
		panic!("expected a tag");
	};
	assert_eq!(tag.text, "FOR EACH x IN 1..3");
	assert_eq!(tag.position, Position::new(1, 6, 5));
	assert_eq!(tag.len(), 5);
	assert_eq!(tag[2].as_identifier(), Some("x"));
	assert!(tag[4].is_expression());

	Ok(())
}

#[test]
fn loads_config_from_candidates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	assert_eq!(TagflowConfig::load(tmp.path())?, None);

	std::fs::create_dir_all(tmp.path().join(".config"))?;
	std::fs::write(
		tmp.path().join(".config/tagflow.toml"),
		r#"
[dialect]
case_sensitive = true

[evaluation]
strict = true

[variables]
title = "Report"
limit = 2

[data]
package = "package.json"
"#,
	)?;
	std::fs::write(tmp.path().join("package.json"), r#"{ "name": "tagflow", "tags": ["a", "b"] }"#)?;

	let config = TagflowConfig::load(tmp.path())?.ok_or("config should be found")?;
	assert!(config.dialect.case_sensitive);
	assert!(config.evaluation.strict);

	let mut context = config.context(tmp.path())?;
	assert!(context.is_strict());

	let output = config
		.dialect()?
		.parse("{title}: {package.name} {FOR EACH t IN package.tags}{t}{END} {limit}")?
		.render(&mut context)?;
	assert_eq!(output, "Report: tagflow ab 2");

	Ok(())
}

#[test]
fn invalid_config_is_a_parse_error() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("tagflow.toml"), "[evaluation]\nstrict = \"yes\"\n")?;

	let error = TagflowConfig::load(tmp.path()).unwrap_err();
	assert!(matches!(error, TagflowError::ConfigParse(_)));

	Ok(())
}

#[test]
fn missing_data_file_is_reported() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let config = TagflowConfig::from_toml("[data]\nitems = \"missing.json\"\n")?;

	let error = config.context(tmp.path()).unwrap_err();
	assert!(matches!(error, TagflowError::DataFile { .. }));

	Ok(())
}
