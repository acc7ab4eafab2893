use std::collections::HashMap;
use std::collections::HashSet;

use crate::Number;
use crate::TagflowError;
use crate::TagflowResult;
use crate::Value;

/// The runtime services an expression or directive needs while rendering.
///
/// Each render pass owns its own context. Compiled expressions hold no
/// state of their own, so one template can be rendered concurrently against
/// independent contexts.
pub trait EvaluationContext {
	/// Look up a variable. Unknown names are [`Value::Undefined`].
	fn get_variable(&self, name: &str) -> Value;

	fn set_variable(&mut self, name: &str, value: Value);

	/// Look up a named property on a value.
	fn get_property(&self, object: &Value, name: &str) -> TagflowResult<Value>;

	/// Register a state object. Returns `false` when it was already present.
	fn add_state_object(&mut self, key: &str) -> bool;

	/// Unregister a state object. Returns `false` when it was not present.
	fn remove_state_object(&mut self, key: &str) -> bool;

	fn contains_state_object(&self, key: &str) -> bool;

	/// Call the function `name` with already evaluated arguments. The
	/// default knows no functions.
	fn invoke(&self, name: &str, _arguments: &[Value]) -> TagflowResult<Value> {
		Err(TagflowError::UnknownFunction(name.to_string()))
	}

	/// When `true` evaluation errors are raised, otherwise they become
	/// [`Value::Undefined`].
	fn is_strict(&self) -> bool;

	/// Surface or swallow an error raised while evaluating, according to
	/// [`is_strict`](EvaluationContext::is_strict).
	fn absorb(&self, error: TagflowError) -> TagflowResult<Value> {
		if self.is_strict() || !error.is_evaluation_error() {
			return Err(error);
		}

		tracing::debug!(%error, "evaluation error absorbed as undefined");
		Ok(Value::Undefined)
	}
}

/// A map-backed [`EvaluationContext`].
///
/// Property lookup supports object fields and `length` on strings,
/// sequences and objects. The built-in functions are `len`, `min`, `max`,
/// `upper`, `lower` and `join`.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
	variables: HashMap<String, Value>,
	state_objects: HashSet<String>,
	strict: bool,
}

impl RenderContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// A context that raises evaluation errors instead of absorbing them.
	pub fn strict() -> Self {
		Self {
			strict: true,
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_strict(mut self, strict: bool) -> Self {
		self.strict = strict;
		self
	}

	#[must_use]
	pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.variables.insert(name.into(), value.into());
		self
	}

	pub fn extend(&mut self, variables: impl IntoIterator<Item = (String, Value)>) {
		self.variables.extend(variables);
	}
}

impl EvaluationContext for RenderContext {
	fn get_variable(&self, name: &str) -> Value {
		self.variables.get(name).cloned().unwrap_or_default()
	}

	fn set_variable(&mut self, name: &str, value: Value) {
		if value.is_undefined() {
			self.variables.remove(name);
		} else {
			self.variables.insert(name.to_string(), value);
		}
	}

	fn get_property(&self, object: &Value, name: &str) -> TagflowResult<Value> {
		let unknown = || {
			TagflowError::UnknownProperty {
				kind: object.kind().to_string(),
				name: name.to_string(),
			}
		};

		match (object, name) {
			(Value::Object(map), _) => {
				match map.get(name) {
					Some(value) => Ok(value.clone()),
					None if name == "length" => Ok(Value::Integer(map.len() as i64)),
					None => Err(unknown()),
				}
			}
			(Value::String(text), "length") => Ok(Value::Integer(text.chars().count() as i64)),
			(Value::Sequence(items), "length") => Ok(Value::Integer(items.len() as i64)),
			(Value::Sequence(items), "first") => Ok(items.first().cloned().unwrap_or_default()),
			(Value::Sequence(items), "last") => Ok(items.last().cloned().unwrap_or_default()),
			_ => Err(unknown()),
		}
	}

	fn add_state_object(&mut self, key: &str) -> bool {
		self.state_objects.insert(key.to_string())
	}

	fn remove_state_object(&mut self, key: &str) -> bool {
		self.state_objects.remove(key)
	}

	fn contains_state_object(&self, key: &str) -> bool {
		self.state_objects.contains(key)
	}

	fn is_strict(&self) -> bool {
		self.strict
	}

	fn invoke(&self, name: &str, arguments: &[Value]) -> TagflowResult<Value> {
		let invalid = |reason: &str| {
			TagflowError::InvalidArguments {
				function: name.to_string(),
				reason: reason.to_string(),
			}
		};

		match (name, arguments) {
			("len", [Value::String(text)]) => Ok(Value::Integer(text.chars().count() as i64)),
			("len", [Value::Sequence(items)]) => Ok(Value::Integer(items.len() as i64)),
			("len", [Value::Object(map)]) => Ok(Value::Integer(map.len() as i64)),
			("len", _) => Err(invalid("expected one string, sequence or object")),
			("upper", [value]) => Ok(Value::String(value.to_string().to_uppercase())),
			("lower", [value]) => Ok(Value::String(value.to_string().to_lowercase())),
			("upper" | "lower", _) => Err(invalid("expected one value")),
			("min" | "max", _) => {
				// A single sequence argument is spread.
				let values = match arguments {
					[Value::Sequence(items)] => items.as_slice(),
					_ => arguments,
				};

				extreme(values, name == "max")
					.map(Value::from)
					.ok_or_else(|| invalid("expected one or more numbers"))
			}
			("join", [Value::Sequence(items)]) => Ok(Value::String(join(items, ""))),
			("join", [Value::Sequence(items), separator]) => {
				Ok(Value::String(join(items, &separator.to_string())))
			}
			("join", _) => Err(invalid("expected a sequence and an optional separator")),
			_ => Err(TagflowError::UnknownFunction(name.to_string())),
		}
	}
}

/// The largest (or smallest) number in `values`. `None` when `values` is
/// empty or holds a non-number.
fn extreme(values: &[Value], largest: bool) -> Option<Number> {
	let mut best: Option<Number> = None;

	for value in values {
		let number = value.number()?;
		let replaces = best.is_none_or(|current| {
			if largest {
				number.as_f64() > current.as_f64()
			} else {
				number.as_f64() < current.as_f64()
			}
		});

		if replaces {
			best = Some(number);
		}
	}

	best
}

fn join(items: &[Value], separator: &str) -> String {
	items.iter().map(ToString::to_string).collect::<Vec<_>>().join(separator)
}
