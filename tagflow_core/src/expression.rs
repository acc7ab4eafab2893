use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;

use crate::BinaryOperation;
use crate::BinaryOperator;
use crate::EvaluationContext;
use crate::GroupOperator;
use crate::Operator;
use crate::TagflowError;
use crate::TagflowResult;
use crate::UnaryOperator;
use crate::Value;
use crate::ast::Ast;
use crate::ast::Evaluator;
use crate::ast::NodeId;
use crate::ast::NodeKind;

/// An expression built one term at a time.
///
/// Operators are registered first. Terms are then fed in source order with
/// [`feed_literal`](Expression::feed_literal) and
/// [`feed_symbol`](Expression::feed_symbol); each binary operator re-links
/// the live tree according to its precedence and associativity. Once
/// [`construct`](Expression::construct) succeeds the expression is folded,
/// compiled and frozen.
///
/// ```rust
/// use tagflow_core::Dialect;
/// use tagflow_core::RenderContext;
/// use tagflow_core::Value;
///
/// let dialect = Dialect::standard();
/// let mut expression = dialect.expression().unwrap();
/// expression.feed_literal(1).unwrap();
/// expression.feed_symbol("+").unwrap();
/// expression.feed_literal(2).unwrap();
/// expression.feed_symbol("*").unwrap();
/// expression.feed_literal(3).unwrap();
/// expression.construct().unwrap();
///
/// let value = expression.evaluate(&mut RenderContext::new()).unwrap();
/// assert_eq!(value, Value::Integer(7));
/// ```
#[derive(Default)]
pub struct Expression {
	unary: HashMap<String, UnaryOperator>,
	binary: HashMap<String, BinaryOperator>,
	groups: HashMap<String, GroupOperator>,
	terminators: HashSet<String>,
	pub(crate) ast: Ast,
	pub(crate) root: Option<NodeId>,
	/// The most recently attached node: either a complete value or an
	/// operator waiting for its operand.
	current: Option<NodeId>,
	open_groups: Vec<NodeId>,
	evaluator: Option<Evaluator>,
}

impl Expression {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register an operator. Fails once the first term has been fed, or when
	/// the symbol is already taken. A symbol may be both a unary and a binary
	/// operator because the parse position tells them apart; group symbols
	/// must be unique across every role.
	pub fn register(&mut self, operator: impl Into<Operator>) -> TagflowResult<()> {
		self.ensure_mutable()?;

		if !self.ast.is_empty() {
			return Err(TagflowError::RegistrationClosed);
		}

		let operator = operator.into();
		let taken_by_group = |symbol: &str| self.groups.contains_key(symbol) || self.terminators.contains(symbol);

		match operator {
			Operator::Unary(unary) => {
				if self.unary.contains_key(unary.symbol()) || taken_by_group(unary.symbol()) {
					return Err(TagflowError::DuplicateOperator(unary.symbol().to_string()));
				}
				self.unary.insert(unary.symbol().to_string(), unary);
			}
			Operator::Binary(binary) => {
				if self.binary.contains_key(binary.symbol()) || taken_by_group(binary.symbol()) {
					return Err(TagflowError::DuplicateOperator(binary.symbol().to_string()));
				}
				self.binary.insert(binary.symbol().to_string(), binary);
			}
			Operator::Group(group) => {
				let taken = |symbol: &str| {
					taken_by_group(symbol) || self.unary.contains_key(symbol) || self.binary.contains_key(symbol)
				};

				if group.symbol() == group.terminator() || taken(group.symbol()) || taken(group.terminator()) {
					return Err(TagflowError::DuplicateOperator(format!(
						"{}{}",
						group.symbol(),
						group.terminator()
					)));
				}
				self.terminators.insert(group.terminator().to_string());
				self.groups.insert(group.symbol().to_string(), group);
			}
		}

		Ok(())
	}

	/// Every registered operator symbol, group terminators included.
	pub fn symbols(&self) -> impl Iterator<Item = &str> {
		self.unary
			.keys()
			.chain(self.binary.keys())
			.chain(self.groups.keys())
			.chain(self.terminators.iter())
			.map(String::as_str)
	}

	pub fn is_constructed(&self) -> bool {
		self.evaluator.is_some()
	}

	/// Whether the next term must be an operand: a literal, a name, a unary
	/// operator or a group open.
	pub fn expects_operand(&self) -> bool {
		self.current.is_none_or(|current| !self.ast.is_complete(current))
	}

	/// Whether `symbol` can extend the expression in its current state
	/// without starting a new one. Closing brackets always extend it, so a
	/// stray one is reported as unmatched. An opening bracket extends it
	/// when it follows a callable name.
	pub fn accepts_symbol(&self, symbol: &str) -> bool {
		if self.expects_operand() {
			return true;
		}

		self.binary.contains_key(symbol)
			|| self.terminators.contains(symbol)
			|| (self.groups.contains_key(symbol) && self.is_callable())
	}

	pub fn has_open_groups(&self) -> bool {
		!self.open_groups.is_empty()
	}

	/// Feed a literal operand.
	pub fn feed_literal(&mut self, value: impl Into<Value>) -> TagflowResult<()> {
		self.ensure_mutable()?;
		let value = value.into();

		if !self.expects_operand() {
			return Err(TagflowError::UnexpectedTerm(literal_text(&value)));
		}

		if let Some(operator) = self.forcing_operator() {
			return Err(TagflowError::ExpectedIdentifier {
				operator,
				found: literal_text(&value),
			});
		}

		self.attach(NodeKind::Literal(value));
		Ok(())
	}

	/// Feed an operator, bracket or bare name.
	pub fn feed_symbol(&mut self, symbol: &str) -> TagflowResult<()> {
		self.ensure_mutable()?;

		if !self.expects_operand() {
			if self.terminators.contains(symbol) {
				return self.close_group(symbol);
			}

			if let Some(operator) = self.binary.get(symbol).cloned() {
				return self.push_binary(operator);
			}

			if let Some(group) = self.groups.get(symbol).cloned() {
				if self.is_callable() {
					self.open_call(group);
					return Ok(());
				}
			}

			return Err(TagflowError::UnexpectedTerm(symbol.to_string()));
		}

		// `f()` closes a call with no arguments.
		if self.terminators.contains(symbol) && self.is_open_call() {
			return self.close_group(symbol);
		}

		if let Some(operator) = self.forcing_operator() {
			if !is_name(symbol) || self.is_operator_symbol(symbol) {
				return Err(TagflowError::ExpectedIdentifier {
					operator,
					found: symbol.to_string(),
				});
			}

			self.attach_forced_identifier(symbol);
			return Ok(());
		}

		if let Some(group) = self.groups.get(symbol).cloned() {
			let id = self.attach(NodeKind::Group {
				operator: group,
				inner: None,
				closed: false,
			});
			self.open_groups.push(id);
			return Ok(());
		}

		if let Some(operator) = self.unary.get(symbol).cloned() {
			self.attach(NodeKind::Unary {
				operator,
				operand: None,
			});
			return Ok(());
		}

		if !is_name(symbol) || self.is_operator_symbol(symbol) {
			return Err(TagflowError::UnexpectedTerm(symbol.to_string()));
		}

		self.attach(NodeKind::Variable(symbol.to_string()));
		Ok(())
	}

	/// Finish building: check that the tree is whole, fold constants and
	/// compile the root.
	pub fn construct(&mut self) -> TagflowResult<()> {
		self.ensure_mutable()?;

		if let Some(group) = self.open_groups.last() {
			let symbol = match &self.ast[*group].kind {
				NodeKind::Group { operator, .. } | NodeKind::Call { operator, .. } => operator.symbol().to_string(),
				_ => String::new(),
			};
			return Err(TagflowError::UnmatchedGroup(symbol));
		}

		let Some(root) = self.root else {
			return Err(TagflowError::EmptyExpression);
		};

		if self.expects_operand() {
			return Err(TagflowError::IncompleteExpression);
		}

		self.ast.reduce(root);
		self.evaluator = Some(self.ast.compile(root));
		tracing::trace!(expression = %self, "constructed expression");

		Ok(())
	}

	/// Evaluate the constructed expression against `context`.
	pub fn evaluate(&self, context: &mut dyn EvaluationContext) -> TagflowResult<Value> {
		let Some(evaluator) = &self.evaluator else {
			return Err(TagflowError::NotConstructed);
		};

		evaluator(context)
	}

	/// The literal the whole expression folded to, if it is constant.
	pub fn constant(&self) -> Option<&Value> {
		self.root.and_then(|root| self.ast[root].reduced.as_ref())
	}

	/// The name, when the expression is a single bare name.
	pub fn as_name(&self) -> Option<&str> {
		match &self.ast[self.root?].kind {
			NodeKind::Variable(name) | NodeKind::Identifier(name) => Some(name),
			_ => None,
		}
	}

	fn ensure_mutable(&self) -> TagflowResult<()> {
		if self.is_constructed() {
			return Err(TagflowError::AlreadyConstructed);
		}

		Ok(())
	}

	fn is_operator_symbol(&self, symbol: &str) -> bool {
		self.unary.contains_key(symbol)
			|| self.binary.contains_key(symbol)
			|| self.groups.contains_key(symbol)
			|| self.terminators.contains(symbol)
	}

	/// Whether the current node is a name or member access that an opening
	/// bracket turns into a call.
	fn is_callable(&self) -> bool {
		self.current.is_some_and(|current| {
			matches!(
				self.ast[current].kind,
				NodeKind::Variable(_) | NodeKind::MemberAccess { .. }
			)
		})
	}

	/// Whether the current node is a call still waiting for its first
	/// argument.
	fn is_open_call(&self) -> bool {
		self.current.is_some_and(|current| {
			matches!(
				self.ast[current].kind,
				NodeKind::Call {
					arguments: None,
					closed: false,
					..
				}
			)
		})
	}

	/// The symbol of the operator waiting for a forced identifier operand.
	fn forcing_operator(&self) -> Option<String> {
		match &self.ast[self.current?].kind {
			NodeKind::Binary {
				operator,
				right: None,
				..
			} if operator.forces_right_identifier() => Some(operator.symbol().to_string()),
			_ => None,
		}
	}

	/// Attach `kind` as the operand of the current node, or as the root.
	fn attach(&mut self, kind: NodeKind) -> NodeId {
		let parent = self.current;
		let id = self.ast.push(kind, parent);

		match parent {
			Some(parent) => self.ast.set_operand(parent, id),
			None => self.root = Some(id),
		}

		self.current = Some(id);
		id
	}

	/// Member access folds its operator node and the forced name into a
	/// single member-access node; other forcing operators keep a plain
	/// identifier leaf.
	fn attach_forced_identifier(&mut self, name: &str) {
		let Some(current) = self.current else {
			return;
		};

		let member_access = match &self.ast[current].kind {
			NodeKind::Binary { operator, left, .. } if operator.operation() == BinaryOperation::MemberAccess => {
				Some(NodeKind::MemberAccess {
					operator: operator.clone(),
					object: *left,
					member: name.to_string(),
				})
			}
			_ => None,
		};

		if let Some(kind) = member_access {
			self.ast[current].kind = kind;
			return;
		}

		self.attach(NodeKind::Identifier(name.to_string()));
	}

	/// Splice a binary operator into the tree. Starting at the current
	/// complete node, climb while the ancestor binds at least as tightly
	/// (strictly tighter for right-to-left operators), then make the reached
	/// subtree the new operator's left operand.
	fn push_binary(&mut self, operator: BinaryOperator) -> TagflowResult<()> {
		let Some(mut node) = self.current else {
			return Err(TagflowError::UnexpectedTerm(operator.symbol().to_string()));
		};

		while let Some(parent) = self.ast[node].parent {
			let climbs = match &self.ast[parent].kind {
				NodeKind::Unary { operator: pending, .. } => operator.climbs_over(pending.precedence()),
				NodeKind::Binary { operator: pending, .. } | NodeKind::MemberAccess { operator: pending, .. } => {
					operator.climbs_over(pending.precedence())
				}
				_ => false,
			};

			if !climbs {
				break;
			}

			node = parent;
		}

		if operator.forces_left_identifier() {
			let name = match &self.ast[node].kind {
				NodeKind::Variable(name) | NodeKind::Identifier(name) => name.clone(),
				_ => {
					return Err(TagflowError::ExpectedIdentifier {
						operator: operator.symbol().to_string(),
						found: self.ast.display(node),
					});
				}
			};
			self.ast[node].kind = NodeKind::Identifier(name);
		}

		let parent = self.ast[node].parent;
		let id = self.ast.push(
			NodeKind::Binary {
				operator,
				left: node,
				right: None,
			},
			parent,
		);

		match parent {
			Some(parent) => self.ast.replace_child(parent, node, id),
			None => self.root = Some(id),
		}

		self.ast[node].parent = Some(id);
		self.current = Some(id);

		Ok(())
	}

	/// Wrap the current callee in a call node that takes its place in the
	/// tree. Calls bind tighter than any operator.
	fn open_call(&mut self, operator: GroupOperator) {
		let Some(callee) = self.current else {
			return;
		};

		let parent = self.ast[callee].parent;
		let id = self.ast.push(
			NodeKind::Call {
				callee,
				operator,
				arguments: None,
				closed: false,
			},
			parent,
		);

		match parent {
			Some(parent) => self.ast.replace_child(parent, callee, id),
			None => self.root = Some(id),
		}

		self.ast[callee].parent = Some(id);
		self.open_groups.push(id);
		self.current = Some(id);
	}

	fn close_group(&mut self, symbol: &str) -> TagflowResult<()> {
		let Some(group) = self.open_groups.pop() else {
			return Err(TagflowError::UnmatchedGroup(symbol.to_string()));
		};

		let (NodeKind::Group {
			operator, closed, ..
		}
		| NodeKind::Call {
			operator, closed, ..
		}) = &mut self.ast[group].kind
		else {
			return Err(TagflowError::UnmatchedGroup(symbol.to_string()));
		};

		if operator.terminator() != symbol {
			return Err(TagflowError::UnmatchedGroup(symbol.to_string()));
		}

		*closed = true;
		self.current = Some(group);

		Ok(())
	}
}

/// Whether `symbol` is a bare name: a letter or underscore followed by
/// letters, numbers or underscores. Letters and numbers are Unicode
/// `Alphabetic` and `N` characters.
pub fn is_name(symbol: &str) -> bool {
	let mut chars = symbol.chars();
	chars
		.next()
		.is_some_and(|first| first.is_alphabetic() || first == '_')
		&& chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}

fn literal_text(value: &Value) -> String {
	match value {
		Value::String(text) => format!("{text:?}"),
		_ => value.to_string(),
	}
}

impl Display for Expression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.root {
			Some(root) => self.ast.write(root, f),
			None => Ok(()),
		}
	}
}

impl std::fmt::Debug for Expression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Expression")
			.field("structure", &self.to_string())
			.field("constructed", &self.is_constructed())
			.finish_non_exhaustive()
	}
}
