//! Flow handlers for the standard directives.

use crate::Bindings;
use crate::DirectiveHandler;
use crate::EvaluationContext;
use crate::FlowStep;
use crate::TagVisit;
use crate::TagflowError;
use crate::TagflowResult;
use crate::Value;

/// `{$}`: writes the value of an expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpolation;

impl DirectiveHandler for Interpolation {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		let value = visit.evaluate("$")?;
		Ok(FlowStep::terminate().with_text(value.to_string()))
	}
}

/// `{$value IF $condition}`: writes the value only when the condition is
/// truthy. The value is not evaluated otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalInterpolation;

impl DirectiveHandler for ConditionalInterpolation {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		if !visit.evaluate("condition")?.is_truthy() {
			return Ok(FlowStep::terminate());
		}

		let value = visit.evaluate("value")?;
		Ok(FlowStep::terminate().with_text(value.to_string()))
	}
}

/// `{IF $ THEN} .. {END}` and `{IF $ THEN} .. {ELSE} .. {END}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conditional;

impl DirectiveHandler for Conditional {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		if visit.tag_index == 0 {
			let taken = visit.evaluate("$")?.is_truthy();
			*visit.state = Some(Box::new(taken));

			return Ok(if taken { FlowStep::evaluate() } else { FlowStep::skip() });
		}

		if visit.is_last {
			return Ok(FlowStep::terminate());
		}

		// `ELSE` renders its body only when the first branch was not taken.
		let taken = visit.state::<bool>().copied().unwrap_or_default();
		Ok(if taken { FlowStep::terminate() } else { FlowStep::evaluate() })
	}
}

/// `{REPEAT $ TIMES} .. {END}`: renders the body a fixed number of times.
/// The count is evaluated once, on the first visit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Repeat;

impl DirectiveHandler for Repeat {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		if visit.tag_index > 0 {
			return Ok(FlowStep::restart());
		}

		let remaining = visit.state_or_insert_with(|bindings, context| {
			let count = bindings.evaluate("$", context)?;

			match count.as_integer() {
				Some(count) => Ok(count),
				None => {
					let absorbed = context.absorb(TagflowError::TypeMismatch {
						operator: "REPEAT".to_string(),
						operands: count.kind().to_string(),
					})?;
					Ok(absorbed.as_integer().unwrap_or_default())
				}
			}
		})?;

		if *remaining <= 0 {
			return Ok(FlowStep::terminate());
		}

		*remaining -= 1;
		Ok(FlowStep::evaluate())
	}
}

/// Iteration state for one for-each occurrence.
struct Loop {
	variable: String,
	items: std::vec::IntoIter<Value>,
	previous: Value,
}

/// `{FOR EACH ? IN $} .. {END}` and
/// `{FOR EACH ? IN $} .. {WITH} .. {END}`.
///
/// Binds each item to the loop variable in turn. The `WITH` body renders
/// between items. The variable's previous value is restored when the loop
/// ends or fails, and a loop cannot re-enter a variable an enclosing loop
/// holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForEach;

impl ForEach {
	fn state_key(variable: &str) -> String {
		format!("for-each:{variable}")
	}

	/// Evaluate the collection and claim the loop variable. `None` when the
	/// collection was not iterable and the error was absorbed.
	fn start(bindings: &Bindings, context: &mut dyn EvaluationContext) -> TagflowResult<Option<Loop>> {
		let variable = bindings.identifier("?")?.to_string();
		let collection = bindings.evaluate("$", context)?;

		let items = match collection.iterate() {
			Some(items) => items,
			None => {
				context.absorb(TagflowError::NotIterable(collection.kind().to_string()))?;
				return Ok(None);
			}
		};

		if !context.add_state_object(&Self::state_key(&variable)) {
			return Err(TagflowError::ReentrantLoop(variable));
		}

		let previous = context.get_variable(&variable);

		Ok(Some(Loop {
			variable,
			items: items.into_iter(),
			previous,
		}))
	}

	/// Restore the loop variable and release its state object.
	fn finish(visit: &mut TagVisit<'_>) {
		if let Some(state) = visit.state::<Option<Loop>>().and_then(Option::take) {
			visit.context.set_variable(&state.variable, state.previous);
			visit.context.remove_state_object(&Self::state_key(&state.variable));
		}

		visit.clear_state();
	}

	fn advance(visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		let Some(state) = visit.state_or_insert_with(Self::start)?.as_mut() else {
			return Ok(FlowStep::terminate());
		};

		if let Some(item) = state.items.next() {
			let variable = state.variable.clone();
			visit.context.set_variable(&variable, item);
			return Ok(FlowStep::evaluate());
		}

		Self::finish(visit);
		Ok(FlowStep::terminate())
	}
}

impl DirectiveHandler for ForEach {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep> {
		if visit.tag_index == 0 {
			return Self::advance(visit);
		}

		if visit.is_last {
			return Ok(FlowStep::restart());
		}

		// `WITH` separates items, so it only renders when another follows.
		let more = visit
			.state::<Option<Loop>>()
			.and_then(|state| state.as_ref())
			.is_some_and(|state| state.items.len() > 0);
		Ok(if more { FlowStep::evaluate() } else { FlowStep::skip() })
	}

	fn abort(&self, visit: &mut TagVisit<'_>) {
		Self::finish(visit);
	}
}
