use std::fmt::Write;
use std::ops::Index;
use std::ops::IndexMut;

use crate::BinaryOperation;
use crate::BinaryOperator;
use crate::EvaluationContext;
use crate::GroupOperator;
use crate::TagflowResult;
use crate::UnaryOperator;
use crate::Value;

/// A compiled expression node: a pure function of the evaluation context.
pub type Evaluator = Box<dyn Fn(&mut dyn EvaluationContext) -> TagflowResult<Value> + Send + Sync>;

/// Index of a node inside an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
	/// A constant value.
	Literal(Value),
	/// A name resolved through the evaluation context.
	Variable(String),
	/// A bare name required by an identifier-forcing operator.
	Identifier(String),
	Unary {
		operator: UnaryOperator,
		operand: Option<NodeId>,
	},
	Binary {
		operator: BinaryOperator,
		left: NodeId,
		right: Option<NodeId>,
	},
	/// A bracket pair wrapping exactly one child.
	Group {
		operator: GroupOperator,
		inner: Option<NodeId>,
		closed: bool,
	},
	MemberAccess {
		operator: BinaryOperator,
		object: NodeId,
		member: String,
	},
	/// A bracket pair directly after a name or member access: `max(a, b)`
	/// or `items.join(", ")`. The arguments are the operands of a sequence
	/// chain.
	Call {
		callee: NodeId,
		operator: GroupOperator,
		arguments: Option<NodeId>,
		closed: bool,
	},
}

#[derive(Debug, Clone)]
pub struct Node {
	pub kind: NodeKind,
	pub parent: Option<NodeId>,
	/// The literal this node folds to, once reduced.
	pub reduced: Option<Value>,
}

/// Arena of expression nodes. Parent and child links are indices, so
/// re-parenting while climbing precedence only rewrites indices.
#[derive(Debug, Clone, Default)]
pub struct Ast {
	nodes: Vec<Node>,
}

impl Index<NodeId> for Ast {
	type Output = Node;

	fn index(&self, id: NodeId) -> &Self::Output {
		&self.nodes[id.0]
	}
}

impl IndexMut<NodeId> for Ast {
	fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
		&mut self.nodes[id.0]
	}
}

impl Ast {
	pub fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node {
			kind,
			parent,
			reduced: None,
		});
		id
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Whether the node denotes a complete value that can be followed by a
	/// binary operator or a group close.
	pub fn is_complete(&self, id: NodeId) -> bool {
		match &self[id].kind {
			NodeKind::Literal(_)
			| NodeKind::Variable(_)
			| NodeKind::Identifier(_)
			| NodeKind::MemberAccess { .. } => true,
			NodeKind::Unary { operand, .. } => operand.is_some(),
			NodeKind::Binary { right, .. } => right.is_some(),
			NodeKind::Group { closed, .. } | NodeKind::Call { closed, .. } => *closed,
		}
	}

	/// Fill the missing operand slot of `parent` with `child`.
	pub fn set_operand(&mut self, parent: NodeId, child: NodeId) {
		match &mut self[parent].kind {
			NodeKind::Unary { operand, .. } => *operand = Some(child),
			NodeKind::Binary { right, .. } => *right = Some(child),
			NodeKind::Group { inner, .. } => *inner = Some(child),
			NodeKind::Call { arguments, .. } => *arguments = Some(child),
			NodeKind::Literal(_)
			| NodeKind::Variable(_)
			| NodeKind::Identifier(_)
			| NodeKind::MemberAccess { .. } => {}
		}

		self[child].parent = Some(parent);
	}

	/// Swap `old` for `new` in whichever child slot of `parent` holds it.
	pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
		let slots: Vec<&mut NodeId> = match &mut self[parent].kind {
			NodeKind::Unary { operand, .. } => operand.iter_mut().collect(),
			NodeKind::Binary { left, right, .. } => std::iter::once(left).chain(right.iter_mut()).collect(),
			NodeKind::Group { inner, .. } => inner.iter_mut().collect(),
			NodeKind::MemberAccess { object, .. } => vec![object],
			NodeKind::Call {
				callee, arguments, ..
			} => std::iter::once(callee).chain(arguments.iter_mut()).collect(),
			NodeKind::Literal(_) | NodeKind::Variable(_) | NodeKind::Identifier(_) => vec![],
		};

		for slot in slots {
			if *slot == old {
				*slot = new;
			}
		}

		self[new].parent = Some(parent);
	}

	/// The operands of a chain of sequence operators, left to right. Groups
	/// stop the flattening, so `(1, 2), 3` has two operands.
	pub fn sequence_operands(&self, id: NodeId) -> Vec<NodeId> {
		let mut operands = Vec::new();
		let mut cursor = id;

		loop {
			match &self[cursor].kind {
				NodeKind::Binary {
					operator,
					left,
					right: Some(right),
				} if operator.operation() == BinaryOperation::Sequence => {
					operands.push(*right);
					cursor = *left;
				}
				_ => {
					operands.push(cursor);
					break;
				}
			}
		}

		operands.reverse();
		operands
	}

	/// Fold the subtree at `id` into a literal where every operand it needs is
	/// itself constant. Results are memoized on the node, so reducing twice
	/// is a no-op.
	pub fn reduce(&mut self, id: NodeId) -> Option<Value> {
		if let Some(value) = &self[id].reduced {
			return Some(value.clone());
		}

		let reduced = match self[id].kind.clone() {
			NodeKind::Literal(value) => Some(value),
			NodeKind::Variable(_) | NodeKind::Identifier(_) => None,
			NodeKind::Unary { operator, operand } => {
				let value = self.reduce(operand?)?;
				fold(operator.symbol(), operator.operation().apply(operator.symbol(), &value))
			}
			NodeKind::Binary {
				operator,
				left,
				right,
			} => {
				let operation = operator.operation();

				if operation == BinaryOperation::Sequence {
					let values: Vec<_> = self
						.sequence_operands(id)
						.into_iter()
						.map(|operand| self.reduce(operand))
						.collect();
					values.into_iter().collect::<Option<Vec<_>>>().map(Value::Sequence)
				} else {
					let left_value = self.reduce(left);
					let right_value = right.and_then(|right| self.reduce(right));

					if operation.has_side_effects() {
						None
					} else {
						let left_value = left_value?;

						match operation.short_circuit(&left_value) {
							Some(value) => Some(value),
							None => {
								let right_value = right_value?;
								fold(
									operator.symbol(),
									operation.apply(operator.symbol(), &left_value, &right_value),
								)
							}
						}
					}
				}
			}
			NodeKind::Group { inner, .. } => self.reduce(inner?),
			NodeKind::MemberAccess { object, .. } => {
				self.reduce(object);
				None
			}
			NodeKind::Call { callee, arguments, .. } => {
				if let NodeKind::MemberAccess { object, .. } = self[callee].kind {
					self.reduce(object);
				}

				for argument in self.call_arguments(arguments) {
					self.reduce(argument);
				}

				None
			}
		};

		self[id].reduced.clone_from(&reduced);
		reduced
	}

	/// Compile the subtree at `id` into an evaluator.
	pub fn compile(&self, id: NodeId) -> Evaluator {
		if let Some(value) = self[id].reduced.clone() {
			return Box::new(move |_| Ok(value.clone()));
		}

		match &self[id].kind {
			NodeKind::Literal(value) => {
				let value = value.clone();
				Box::new(move |_| Ok(value.clone()))
			}
			NodeKind::Variable(name) | NodeKind::Identifier(name) => {
				let name = name.clone();
				Box::new(move |context| Ok(context.get_variable(&name)))
			}
			NodeKind::Unary { operator, operand } => {
				let Some(operand) = operand else {
					return Box::new(|_| Ok(Value::Undefined));
				};
				let operand = self.compile(*operand);
				let operator = operator.clone();

				Box::new(move |context| {
					let value = operand(context)?;
					operator
						.operation()
						.apply(operator.symbol(), &value)
						.or_else(|error| context.absorb(error))
				})
			}
			NodeKind::Binary {
				operator,
				left,
				right,
			} => self.compile_binary(id, operator, *left, *right),
			NodeKind::Group { inner, .. } => {
				match inner {
					Some(inner) => self.compile(*inner),
					None => Box::new(|_| Ok(Value::Undefined)),
				}
			}
			NodeKind::MemberAccess { object, member, .. } => {
				let object = self.compile(*object);
				let member = member.clone();

				Box::new(move |context| {
					let value = object(context)?;

					if value.is_undefined() {
						return Ok(Value::Undefined);
					}

					context
						.get_property(&value, &member)
						.or_else(|error| context.absorb(error))
				})
			}
			NodeKind::Call { callee, arguments, .. } => self.compile_call(*callee, *arguments),
		}
	}

	fn call_arguments(&self, arguments: Option<NodeId>) -> Vec<NodeId> {
		arguments.map(|arguments| self.sequence_operands(arguments)).unwrap_or_default()
	}

	/// Calls resolve through the context. A member-access callee passes its
	/// object as the first argument, so `items.join(", ")` invokes
	/// `join(items, ", ")`.
	fn compile_call(&self, callee: NodeId, arguments: Option<NodeId>) -> Evaluator {
		let (receiver, name) = match &self[callee].kind {
			NodeKind::MemberAccess { object, member, .. } => (Some(self.compile(*object)), member.clone()),
			NodeKind::Variable(name) | NodeKind::Identifier(name) => (None, name.clone()),
			_ => (None, String::new()),
		};
		let arguments: Vec<Evaluator> = self
			.call_arguments(arguments)
			.into_iter()
			.map(|argument| self.compile(argument))
			.collect();

		Box::new(move |context| {
			let mut values = Vec::with_capacity(arguments.len() + 1);

			if let Some(receiver) = &receiver {
				values.push(receiver(context)?);
			}

			for argument in &arguments {
				values.push(argument(context)?);
			}

			context.invoke(&name, &values).or_else(|error| context.absorb(error))
		})
	}

	fn compile_binary(
		&self,
		id: NodeId,
		operator: &BinaryOperator,
		left: NodeId,
		right: Option<NodeId>,
	) -> Evaluator {
		let Some(right) = right else {
			return Box::new(|_| Ok(Value::Undefined));
		};

		match operator.operation() {
			BinaryOperation::Sequence => {
				let operands: Vec<Evaluator> = self
					.sequence_operands(id)
					.into_iter()
					.map(|operand| self.compile(operand))
					.collect();

				Box::new(move |context| {
					operands
						.iter()
						.map(|operand| operand(context))
						.collect::<TagflowResult<Vec<_>>>()
						.map(Value::Sequence)
				})
			}
			BinaryOperation::Assign => {
				let name = match &self[left].kind {
					NodeKind::Identifier(name) | NodeKind::Variable(name) => name.clone(),
					_ => String::new(),
				};
				let value = self.compile(right);

				Box::new(move |context| {
					let value = value(context)?;
					context.set_variable(&name, value.clone());
					Ok(value)
				})
			}
			operation => {
				let symbol = operator.symbol().to_string();
				let left = self.compile(left);
				let right = self.compile(right);

				Box::new(move |context| {
					let left_value = left(context)?;

					if let Some(value) = operation.short_circuit(&left_value) {
						return Ok(value);
					}

					let right_value = right(context)?;
					operation
						.apply(&symbol, &left_value, &right_value)
						.or_else(|error| context.absorb(error))
				})
			}
		}
	}

	/// Write the structural form of the subtree at `id`. Folded nodes are
	/// written as their literal.
	pub fn write(&self, id: NodeId, out: &mut impl Write) -> std::fmt::Result {
		let node = &self[id];

		if let Some(value) = &node.reduced {
			return write_literal(value, out);
		}

		match &node.kind {
			NodeKind::Literal(value) => write_literal(value, out),
			NodeKind::Variable(name) | NodeKind::Identifier(name) => write!(out, "{name}"),
			NodeKind::Unary { operator, operand } => {
				write!(out, "{}", operator.symbol())?;
				match operand {
					Some(operand) => self.write(*operand, out),
					None => write!(out, "?"),
				}
			}
			NodeKind::Binary {
				operator,
				left,
				right,
			} => {
				write!(out, "(")?;
				self.write(*left, out)?;
				write!(out, " {} ", operator.symbol())?;
				match right {
					Some(right) => self.write(*right, out)?,
					None => write!(out, "?")?,
				}
				write!(out, ")")
			}
			NodeKind::Group { inner, .. } => {
				match inner {
					Some(inner) => self.write(*inner, out),
					None => write!(out, "?"),
				}
			}
			NodeKind::MemberAccess {
				operator,
				object,
				member,
			} => {
				self.write(*object, out)?;
				write!(out, "{}{member}", operator.symbol())
			}
			NodeKind::Call {
				callee,
				operator,
				arguments,
				..
			} => {
				self.write(*callee, out)?;
				write!(out, "{}", operator.symbol())?;
				for (index, argument) in self.call_arguments(*arguments).into_iter().enumerate() {
					if index > 0 {
						write!(out, ", ")?;
					}
					self.write(argument, out)?;
				}
				write!(out, "{}", operator.terminator())
			}
		}
	}

	pub fn display(&self, id: NodeId) -> String {
		let mut out = String::new();
		let _ = self.write(id, &mut out);
		out
	}
}

fn fold(symbol: &str, result: TagflowResult<Value>) -> Option<Value> {
	match result {
		Ok(value) => Some(value),
		Err(error) => {
			tracing::debug!(operator = symbol, %error, "leaving operation for run time");
			None
		}
	}
}

fn write_literal(value: &Value, out: &mut impl Write) -> std::fmt::Result {
	match value {
		Value::Undefined => write!(out, "undefined"),
		Value::String(text) => write!(out, "{text:?}"),
		Value::Sequence(items) => {
			write!(out, "[")?;
			for (index, item) in items.iter().enumerate() {
				if index > 0 {
					write!(out, ", ")?;
				}
				write_literal(item, out)?;
			}
			write!(out, "]")
		}
		_ => write!(out, "{value}"),
	}
}
