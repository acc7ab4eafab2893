use crate::Dialect;
use crate::EvaluationContext;
use crate::FlowDecision;
use crate::FlowState;
use crate::TagVisit;
use crate::TagflowResult;
use crate::parser::DirectiveNode;
use crate::parser::DocumentNode;
use crate::parser::Template;

impl Template {
	/// Render the template against `context`.
	///
	/// Every directive occurrence starts with empty flow state, so a template
	/// can be rendered any number of times, including concurrently against
	/// separate contexts.
	pub fn render(&self, context: &mut dyn EvaluationContext) -> TagflowResult<String> {
		let mut output = String::new();
		render_nodes(self.nodes(), context, &mut output)?;
		Ok(output)
	}
}

/// Parse and render `source` in one step.
pub fn render_str(source: &str, dialect: &Dialect, context: &mut dyn EvaluationContext) -> TagflowResult<String> {
	dialect.parse(source)?.render(context)
}

fn render_nodes(nodes: &[DocumentNode], context: &mut dyn EvaluationContext, output: &mut String) -> TagflowResult<()> {
	for node in nodes {
		match node {
			DocumentNode::Text(text) => output.push_str(text),
			DocumentNode::Directive(directive) => render_directive(directive, context, output)?,
		}
	}

	Ok(())
}

/// Drive one directive occurrence: visit tags in order and act on each
/// decision until the handler terminates or the last tag has been passed.
/// On failure the handler is given the chance to abort at the failing tag.
fn render_directive(node: &DirectiveNode, context: &mut dyn EvaluationContext, output: &mut String) -> TagflowResult<()> {
	let mut state: FlowState = None;
	let mut tag_index = 0;

	let result = drive_directive(node, context, output, &mut state, &mut tag_index);

	if result.is_err() {
		if let Some(bindings) = node.tags.get(tag_index) {
			node.directive.handler().abort(&mut TagVisit {
				tag_index,
				is_last: tag_index + 1 == node.tags.len(),
				bindings,
				state: &mut state,
				context,
			});
		}
	}

	result
}

fn drive_directive(
	node: &DirectiveNode,
	context: &mut dyn EvaluationContext,
	output: &mut String,
	state: &mut FlowState,
	tag_index: &mut usize,
) -> TagflowResult<()> {
	let handler = node.directive.handler();
	let tag_count = node.tags.len();

	while *tag_index < tag_count {
		let step = handler.visit(&mut TagVisit {
			tag_index: *tag_index,
			is_last: *tag_index + 1 == tag_count,
			bindings: &node.tags[*tag_index],
			state: &mut *state,
			context: &mut *context,
		})?;

		if let Some(text) = &step.text {
			output.push_str(text);
		}

		match step.decision {
			FlowDecision::Terminate => break,
			FlowDecision::Restart => *tag_index = 0,
			FlowDecision::Evaluate => {
				if let Some(body) = node.bodies.get(*tag_index) {
					render_nodes(body, context, output)?;
				}
				*tag_index += 1;
			}
			FlowDecision::Skip => *tag_index += 1,
		}
	}

	Ok(())
}
