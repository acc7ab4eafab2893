use std::cmp::Ordering;
use std::fmt::Display;

use crate::Number;
use crate::TagflowError;
use crate::TagflowResult;
use crate::Value;

/// Precedence of an operator. Lower values bind tighter: `*` (3) binds
/// tighter than `+` (4), which binds tighter than `==` (8).
pub type Precedence = u8;

/// Precedence shared by every unary operator of the standard dialect.
pub const UNARY_PRECEDENCE: Precedence = 1;

/// The largest number of items a range operator may produce.
pub const MAX_RANGE_LENGTH: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
	/// `a - b - c` groups as `(a - b) - c`.
	LeftToRight,
	/// `a = b = c` groups as `a = (b = c)`.
	RightToLeft,
}

/// The computation performed by a unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnaryOperation {
	/// Numeric identity (`+x`).
	Identity,
	/// Numeric negation (`-x`).
	Negate,
	/// Logical negation of the operand's truthiness (`!x`).
	Not,
	/// Bitwise complement of an integer, or negation of a boolean (`~x`).
	BitwiseNot,
}

/// The computation performed by a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BinaryOperation {
	/// Property lookup on the left operand (`user.name`).
	MemberAccess,
	Multiply,
	Divide,
	Modulo,
	Add,
	Subtract,
	ShiftLeft,
	ShiftRight,
	/// Inclusive integer range (`1..5`).
	Range,
	Less,
	LessOrEqual,
	Greater,
	GreaterOrEqual,
	Equal,
	NotEqual,
	BitwiseAnd,
	BitwiseXor,
	BitwiseOr,
	And,
	Or,
	/// The left operand unless it is undefined (`a ?? b`).
	Coalesce,
	/// Stores the right operand in the variable named on the left (`x = 1`).
	Assign,
	/// Builds a sequence from its operands (`1, 2, 3`).
	Sequence,
}

impl BinaryOperation {
	pub fn forces_left_identifier(self) -> bool {
		matches!(self, Self::Assign)
	}

	pub fn forces_right_identifier(self) -> bool {
		matches!(self, Self::MemberAccess)
	}

	/// Operations whose result must never be computed ahead of time because
	/// they touch the evaluation context.
	pub fn has_side_effects(self) -> bool {
		matches!(self, Self::Assign | Self::MemberAccess)
	}

	/// The result decided by the left operand alone, if any. Used for
	/// run-time short-circuiting and for folding with a non-constant right
	/// operand.
	pub fn short_circuit(self, left: &Value) -> Option<Value> {
		match self {
			Self::And if !left.is_truthy() => Some(Value::Boolean(false)),
			Self::Or if left.is_truthy() => Some(Value::Boolean(true)),
			Self::Coalesce if !left.is_undefined() => Some(left.clone()),
			_ => None,
		}
	}

	/// Apply the operation to two already evaluated operands.
	pub fn apply(self, symbol: &str, left: &Value, right: &Value) -> TagflowResult<Value> {
		let mismatch = || {
			TagflowError::TypeMismatch {
				operator: symbol.to_string(),
				operands: format!("{} and {}", left.kind(), right.kind()),
			}
		};

		match self {
			Self::Add => {
				if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
					return Ok(Value::String(format!("{left}{right}")));
				}

				if let (Value::Sequence(l), Value::Sequence(r)) = (left, right) {
					return Ok(Value::Sequence(l.iter().chain(r).cloned().collect()));
				}

				arithmetic(left, right, i64::checked_add, |l, r| l + r).ok_or_else(mismatch)
			}
			Self::Subtract => {
				arithmetic(left, right, i64::checked_sub, |l, r| l - r).ok_or_else(mismatch)
			}
			Self::Multiply => {
				arithmetic(left, right, i64::checked_mul, |l, r| l * r).ok_or_else(mismatch)
			}
			Self::Divide => {
				let (l, r) = numbers(left, right).ok_or_else(mismatch)?;

				if r.as_f64() == 0.0 {
					return Err(TagflowError::DivisionByZero);
				}

				match (l, r) {
					(Number::Integer(l), Number::Integer(r)) if l.checked_rem(r) == Some(0) => {
						Ok(l.checked_div(r).map_or(Value::Float(l as f64 / r as f64), Value::Integer))
					}
					_ => Ok(Value::Float(l.as_f64() / r.as_f64())),
				}
			}
			Self::Modulo => {
				let (l, r) = numbers(left, right).ok_or_else(mismatch)?;

				if r.as_f64() == 0.0 {
					return Err(TagflowError::DivisionByZero);
				}

				match (l, r) {
					(Number::Integer(l), Number::Integer(r)) => {
						Ok(l.checked_rem(r).map_or(Value::Integer(0), Value::Integer))
					}
					_ => Ok(Value::Float(l.as_f64() % r.as_f64())),
				}
			}
			Self::ShiftLeft | Self::ShiftRight => {
				let (Some(Number::Integer(l)), Some(Number::Integer(r))) = (left.number(), right.number())
				else {
					return Err(mismatch());
				};
				let amount = u32::try_from(r).map_err(|_| mismatch())?;
				let shifted = if self == Self::ShiftLeft {
					l.checked_shl(amount)
				} else {
					l.checked_shr(amount)
				};

				shifted.map(Value::Integer).ok_or_else(mismatch)
			}
			Self::Range => {
				let (Some(start), Some(end)) = (left.as_integer(), right.as_integer()) else {
					return Err(mismatch());
				};

				let length = start.abs_diff(end).checked_add(1);

				if length.is_none_or(|length| length > MAX_RANGE_LENGTH) {
					return Err(TagflowError::RangeTooLarge { start, end });
				}

				let items = if start <= end {
					(start..=end).map(Value::Integer).collect()
				} else {
					(end..=start).rev().map(Value::Integer).collect()
				};

				Ok(Value::Sequence(items))
			}
			Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual => {
				let ordering = compare(left, right).ok_or_else(mismatch)?;
				let result = match self {
					Self::Less => ordering == Some(Ordering::Less),
					Self::LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
					Self::Greater => ordering == Some(Ordering::Greater),
					_ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
				};

				Ok(Value::Boolean(result))
			}
			Self::Equal => Ok(Value::Boolean(left.loose_eq(right))),
			Self::NotEqual => Ok(Value::Boolean(!left.loose_eq(right))),
			Self::BitwiseAnd | Self::BitwiseXor | Self::BitwiseOr => {
				if let (Value::Boolean(l), Value::Boolean(r)) = (left, right) {
					let result = match self {
						Self::BitwiseAnd => l & r,
						Self::BitwiseXor => l ^ r,
						_ => l | r,
					};
					return Ok(Value::Boolean(result));
				}

				let (Some(Number::Integer(l)), Some(Number::Integer(r))) = (left.number(), right.number())
				else {
					return Err(mismatch());
				};

				let result = match self {
					Self::BitwiseAnd => l & r,
					Self::BitwiseXor => l ^ r,
					_ => l | r,
				};

				Ok(Value::Integer(result))
			}
			Self::And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
			Self::Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
			Self::Coalesce => {
				if left.is_undefined() {
					Ok(right.clone())
				} else {
					Ok(left.clone())
				}
			}
			Self::Sequence => Ok(Value::Sequence(vec![left.clone(), right.clone()])),
			Self::MemberAccess | Self::Assign => Err(mismatch()),
		}
	}
}

impl UnaryOperation {
	pub fn apply(self, symbol: &str, operand: &Value) -> TagflowResult<Value> {
		let mismatch = || {
			TagflowError::TypeMismatch {
				operator: symbol.to_string(),
				operands: operand.kind().to_string(),
			}
		};

		match self {
			Self::Identity => operand.number().map(Value::from).ok_or_else(mismatch),
			Self::Negate => {
				match operand.number().ok_or_else(mismatch)? {
					Number::Integer(value) => {
						Ok(value
							.checked_neg()
							.map_or(Value::Float(-(value as f64)), Value::Integer))
					}
					Number::Float(value) => Ok(Value::Float(-value)),
				}
			}
			Self::Not => Ok(Value::Boolean(!operand.is_truthy())),
			Self::BitwiseNot => {
				match operand {
					Value::Boolean(value) => Ok(Value::Boolean(!value)),
					_ => {
						match operand.number() {
							Some(Number::Integer(value)) => Ok(Value::Integer(!value)),
							_ => Err(mismatch()),
						}
					}
				}
			}
		}
	}
}

fn numbers(left: &Value, right: &Value) -> Option<(Number, Number)> {
	Some((left.number()?, right.number()?))
}

fn arithmetic(
	left: &Value,
	right: &Value,
	integer: impl Fn(i64, i64) -> Option<i64>,
	float: impl Fn(f64, f64) -> f64,
) -> Option<Value> {
	let (l, r) = numbers(left, right)?;

	let value = match (l, r) {
		(Number::Integer(l), Number::Integer(r)) => {
			integer(l, r).map_or_else(|| Value::Float(float(l as f64, r as f64)), Value::Integer)
		}
		_ => Value::Float(float(l.as_f64(), r.as_f64())),
	};

	Some(value)
}

/// Order two values: numerically when both read as numbers, lexically when
/// both are strings. The inner `None` marks an unordered pair such as `NaN`.
fn compare(left: &Value, right: &Value) -> Option<Option<Ordering>> {
	if let Some((l, r)) = numbers(left, right) {
		return Some(match (l, r) {
			(Number::Integer(l), Number::Integer(r)) => Some(l.cmp(&r)),
			_ => l.as_f64().partial_cmp(&r.as_f64()),
		});
	}

	match (left, right) {
		(Value::String(l), Value::String(r)) => Some(Some(l.cmp(r))),
		_ => None,
	}
}

/// A prefix operator such as `-` or `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryOperator {
	symbol: String,
	precedence: Precedence,
	operation: UnaryOperation,
}

impl UnaryOperator {
	pub fn new(symbol: impl Into<String>, precedence: Precedence, operation: UnaryOperation) -> Self {
		Self {
			symbol: symbol.into(),
			precedence,
			operation,
		}
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	pub fn precedence(&self) -> Precedence {
		self.precedence
	}

	pub fn operation(&self) -> UnaryOperation {
		self.operation
	}
}

/// An infix operator. Member access and assignment force one of their
/// operands to be a bare identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOperator {
	symbol: String,
	precedence: Precedence,
	associativity: Associativity,
	operation: BinaryOperation,
}

impl BinaryOperator {
	pub fn new(
		symbol: impl Into<String>,
		precedence: Precedence,
		associativity: Associativity,
		operation: BinaryOperation,
	) -> Self {
		Self {
			symbol: symbol.into(),
			precedence,
			associativity,
			operation,
		}
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	pub fn precedence(&self) -> Precedence {
		self.precedence
	}

	pub fn associativity(&self) -> Associativity {
		self.associativity
	}

	pub fn operation(&self) -> BinaryOperation {
		self.operation
	}

	pub fn forces_left_identifier(&self) -> bool {
		self.operation.forces_left_identifier()
	}

	pub fn forces_right_identifier(&self) -> bool {
		self.operation.forces_right_identifier()
	}

	/// Whether a pending operator with precedence `existing` must become the
	/// left operand of this operator, i.e. the parser climbs past it.
	pub fn climbs_over(&self, existing: Precedence) -> bool {
		match self.associativity {
			Associativity::LeftToRight => existing <= self.precedence,
			Associativity::RightToLeft => existing < self.precedence,
		}
	}
}

/// A bracket pair used for grouping. The wrapped expression is passed
/// through unchanged at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOperator {
	symbol: String,
	terminator: String,
}

impl GroupOperator {
	pub fn new(symbol: impl Into<String>, terminator: impl Into<String>) -> Self {
		Self {
			symbol: symbol.into(),
			terminator: terminator.into(),
		}
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	pub fn terminator(&self) -> &str {
		&self.terminator
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
	Unary(UnaryOperator),
	Binary(BinaryOperator),
	Group(GroupOperator),
}

impl Operator {
	pub fn symbol(&self) -> &str {
		match self {
			Self::Unary(operator) => operator.symbol(),
			Self::Binary(operator) => operator.symbol(),
			Self::Group(operator) => operator.symbol(),
		}
	}
}

impl From<UnaryOperator> for Operator {
	fn from(operator: UnaryOperator) -> Self {
		Self::Unary(operator)
	}
}

impl From<BinaryOperator> for Operator {
	fn from(operator: BinaryOperator) -> Self {
		Self::Binary(operator)
	}
}

impl From<GroupOperator> for Operator {
	fn from(operator: GroupOperator) -> Self {
		Self::Group(operator)
	}
}

impl Display for Operator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Group(group) => write!(f, "{}{}", group.symbol(), group.terminator()),
			_ => write!(f, "{}", self.symbol()),
		}
	}
}
