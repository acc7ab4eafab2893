use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Display;

use float_cmp::approx_eq;

/// A runtime value produced by expressions and consumed by directives.
#[derive(Debug, Clone, Default)]
pub enum Value {
	/// The absence of a value. Renders as an empty string.
	#[default]
	Undefined,
	Boolean(bool),
	Integer(i64),
	Float(f64),
	String(String),
	Sequence(Vec<Value>),
	Object(BTreeMap<String, Value>),
}

/// The result of probing a value for its most specific scalar reading.
///
/// Probing follows a fixed fallback order: integer-like, then floating, then
/// boolean, then plain string. A string such as `"42"` therefore probes as an
/// integer while `"4.2"` probes as a float.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<'a> {
	Integer(i64),
	Float(f64),
	Boolean(bool),
	String(Cow<'a, str>),
}

/// A numeric reading of a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
	Integer(i64),
	Float(f64),
}

impl Number {
	pub fn as_f64(self) -> f64 {
		match self {
			Self::Integer(value) => value as f64,
			Self::Float(value) => value,
		}
	}
}

impl From<Number> for Value {
	fn from(number: Number) -> Self {
		match number {
			Number::Integer(value) => Self::Integer(value),
			Number::Float(value) => Self::Float(value),
		}
	}
}

impl Value {
	/// A short name for the kind of value, used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Undefined => "undefined",
			Self::Boolean(_) => "boolean",
			Self::Integer(_) => "integer",
			Self::Float(_) => "float",
			Self::String(_) => "string",
			Self::Sequence(_) => "sequence",
			Self::Object(_) => "object",
		}
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Self::Undefined)
	}

	/// Probe the value in the order integer-like, floating, boolean, string.
	/// Undefined values and containers have no scalar reading.
	pub fn probe(&self) -> Option<Probe<'_>> {
		match self {
			Self::Undefined | Self::Sequence(_) | Self::Object(_) => None,
			Self::Integer(value) => Some(Probe::Integer(*value)),
			Self::Float(value) => Some(Probe::Float(*value)),
			Self::Boolean(value) => Some(Probe::Boolean(*value)),
			Self::String(text) => Some(probe_str(text)),
		}
	}

	/// Numeric reading of the value. Booleans read as `0` and `1`; strings
	/// read as numbers only when they probe as one.
	pub fn number(&self) -> Option<Number> {
		match self.probe()? {
			Probe::Integer(value) => Some(Number::Integer(value)),
			Probe::Float(value) => Some(Number::Float(value)),
			Probe::Boolean(value) => Some(Number::Integer(i64::from(value))),
			Probe::String(_) => None,
		}
	}

	/// Integer reading of the value. Floats without a fractional part count
	/// as integers.
	pub fn as_integer(&self) -> Option<i64> {
		match self.number()? {
			Number::Integer(value) => Some(value),
			Number::Float(value)
				if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 =>
			{
				Some(value as i64)
			}
			Number::Float(_) => None,
		}
	}

	pub fn is_truthy(&self) -> bool {
		match self {
			Self::Undefined => false,
			Self::Boolean(value) => *value,
			Self::Integer(value) => *value != 0,
			Self::Float(value) => *value != 0.0 && !value.is_nan(),
			Self::String(text) => !text.is_empty(),
			Self::Sequence(items) => !items.is_empty(),
			Self::Object(_) => true,
		}
	}

	/// The items produced when iterating the value. Strings iterate their
	/// characters and objects their keys. Returns `None` when the value is
	/// not iterable.
	pub fn iterate(&self) -> Option<Vec<Value>> {
		match self {
			Self::Sequence(items) => Some(items.clone()),
			Self::String(text) => Some(text.chars().map(|ch| Self::String(ch.to_string())).collect()),
			Self::Object(map) => Some(map.keys().cloned().map(Self::String).collect()),
			_ => None,
		}
	}

	/// Loose equality. Values that both read as numbers compare numerically,
	/// containers compare element-wise and everything else compares by kind.
	pub fn loose_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Self::Undefined, Self::Undefined) => true,
			(Self::Undefined, _) | (_, Self::Undefined) => false,
			(Self::Sequence(left), Self::Sequence(right)) => {
				left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.loose_eq(r))
			}
			(Self::Object(left), Self::Object(right)) => {
				left.len() == right.len()
					&& left
						.iter()
						.zip(right)
						.all(|((lk, lv), (rk, rv))| lk == rk && lv.loose_eq(rv))
			}
			_ => {
				match (self.number(), other.number()) {
					(Some(Number::Integer(l)), Some(Number::Integer(r))) => l == r,
					(Some(l), Some(r)) => approx_eq!(f64, l.as_f64(), r.as_f64(), ulps = 2),
					_ => {
						match (self, other) {
							(Self::String(l), Self::String(r)) => l == r,
							(Self::Boolean(l), Self::Boolean(r)) => l == r,
							_ => false,
						}
					}
				}
			}
		}
	}
}

fn probe_str(text: &str) -> Probe<'_> {
	let trimmed = text.trim();

	if let Ok(value) = trimmed.parse::<i64>() {
		return Probe::Integer(value);
	}

	let float_like = !trimmed.is_empty()
		&& trimmed.bytes().any(|byte| byte.is_ascii_digit())
		&& trimmed
			.bytes()
			.all(|byte| byte.is_ascii_digit() || matches!(byte, b'.' | b'e' | b'E' | b'+' | b'-'));

	if float_like {
		if let Ok(value) = trimmed.parse::<f64>() {
			return Probe::Float(value);
		}
	}

	match trimmed {
		"true" => Probe::Boolean(true),
		"false" => Probe::Boolean(false),
		_ => Probe::String(Cow::Borrowed(text)),
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Undefined, Self::Undefined) => true,
			(Self::Boolean(l), Self::Boolean(r)) => l == r,
			(Self::Integer(l), Self::Integer(r)) => l == r,
			(Self::Float(l), Self::Float(r)) => approx_eq!(f64, *l, *r, ulps = 2),
			(Self::String(l), Self::String(r)) => l == r,
			(Self::Sequence(l), Self::Sequence(r)) => l == r,
			(Self::Object(l), Self::Object(r)) => l == r,
			_ => false,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Undefined => Ok(()),
			Self::Boolean(value) => write!(f, "{value}"),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::String(text) => write!(f, "{text}"),
			Self::Sequence(items) => {
				for (index, item) in items.iter().enumerate() {
					if index > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{item}")?;
				}
				Ok(())
			}
			Self::Object(map) => {
				write!(f, "{{")?;
				for (index, (key, value)) in map.iter().enumerate() {
					if index > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{key}: {value}")?;
				}
				write!(f, "}}")
			}
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Boolean(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Integer(i64::from(value))
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(items: Vec<T>) -> Self {
		Self::Sequence(items.into_iter().map(Into::into).collect())
	}
}

impl From<serde_json::Value> for Value {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Self::Undefined,
			serde_json::Value::Bool(value) => Self::Boolean(value),
			serde_json::Value::Number(number) => {
				number
					.as_i64()
					.map(Self::Integer)
					.or_else(|| number.as_f64().map(Self::Float))
					.unwrap_or_default()
			}
			serde_json::Value::String(text) => Self::String(text),
			serde_json::Value::Array(items) => Self::Sequence(items.into_iter().map(Into::into).collect()),
			serde_json::Value::Object(map) => {
				Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
			}
		}
	}
}

impl From<toml::Value> for Value {
	fn from(value: toml::Value) -> Self {
		match value {
			toml::Value::String(text) => Self::String(text),
			toml::Value::Integer(value) => Self::Integer(value),
			toml::Value::Float(value) => Self::Float(value),
			toml::Value::Boolean(value) => Self::Boolean(value),
			toml::Value::Datetime(datetime) => Self::String(datetime.to_string()),
			toml::Value::Array(items) => Self::Sequence(items.into_iter().map(Into::into).collect()),
			toml::Value::Table(table) => {
				Self::Object(table.into_iter().map(|(k, v)| (k, v.into())).collect())
			}
		}
	}
}
