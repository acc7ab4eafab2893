use std::sync::Arc;

use derive_more::Deref;

use crate::Binding;
use crate::Bindings;
use crate::ComponentKind;
use crate::Dialect;
use crate::Directive;
use crate::Position;
use crate::TagflowError;
use crate::TagflowResult;
use crate::arbiter::Candidate;
use crate::arbiter::Facing;
use crate::arbiter::join_names;
use crate::arbiter::select;
use crate::lexer::tokenize;
use crate::tokens::Lexeme;
use crate::tokens::Piece;
use crate::tokens::TagLexeme;

/// A parsed template: literal text interleaved with directive occurrences.
#[derive(Debug, Default, Deref)]
pub struct Template {
	nodes: Vec<DocumentNode>,
}

impl Template {
	pub fn nodes(&self) -> &[DocumentNode] {
		&self.nodes
	}
}

#[derive(Debug)]
pub enum DocumentNode {
	Text(String),
	Directive(DirectiveNode),
}

/// One occurrence of a directive in a template.
///
/// `tags[i]` holds the bindings of the directive's tag `i`, and `bodies[i]`
/// the content between tag `i` and tag `i + 1`.
#[derive(Debug)]
pub struct DirectiveNode {
	pub directive: Arc<Directive>,
	pub tags: Vec<Bindings>,
	pub bodies: Vec<Vec<DocumentNode>>,
	pub position: Position,
}

/// A composite directive whose closing tag has not been reached yet.
/// Several directives may still be candidates while their tags so far
/// share one shape.
struct DirectiveCreator {
	candidates: Vec<Arc<Directive>>,
	next_tag: usize,
	tags: Vec<Bindings>,
	bodies: Vec<Vec<DocumentNode>>,
	body: Vec<DocumentNode>,
	position: Position,
}

impl DirectiveCreator {
	fn names(&self) -> String {
		join_names(self.candidates.iter().map(|directive| directive.name()))
	}
}

/// Parse template source with the given dialect.
pub fn parse(source: &str, dialect: &Dialect) -> TagflowResult<Template> {
	let pieces = tokenize(source, dialect)?;
	build_template(pieces, dialect)
}

/// Build the document tree from lexed pieces.
pub fn build_template(pieces: Vec<Piece>, dialect: &Dialect) -> TagflowResult<Template> {
	let mut pending: Vec<DirectiveCreator> = vec![];
	let mut nodes: Vec<DocumentNode> = vec![];

	for piece in pieces {
		let tag = match piece {
			Piece::Text(text) => {
				current_body(&mut pending, &mut nodes).push(DocumentNode::Text(text));
				continue;
			}
			Piece::Tag(tag) => tag,
		};

		let openings = dialect.directives().iter().map(|directive| {
			Candidate {
				directive: Arc::clone(directive),
				tag_index: 0,
				facing: Facing::Opening,
			}
		});
		let continuations = pending.last().into_iter().flat_map(|creator| {
			creator.candidates.iter().map(|directive| {
				Candidate {
					directive: Arc::clone(directive),
					tag_index: creator.next_tag,
					facing: Facing::Continuation,
				}
			})
		});

		let matched = select(openings.chain(continuations), &tag, dialect.case_sensitive())?;
		let position = tag.position;
		let tag_text = tag.text.clone();

		let ambiguous = |candidates: String| {
			TagflowError::AmbiguousDirective {
				tag: tag_text.clone(),
				candidates,
				position,
			}
		};

		let Some(first) = matched.directives.first().cloned() else {
			continue;
		};
		let bindings = bind(&first, matched.tag_index, tag)?;

		match matched.facing {
			Facing::Opening => {
				let has_simple = matched.directives.iter().any(|directive| !directive.is_composite());

				if has_simple {
					if matched.directives.len() > 1 {
						return Err(ambiguous(matched.names()));
					}

					tracing::trace!(directive = first.name(), %position, "matched simple directive");
					current_body(&mut pending, &mut nodes).push(DocumentNode::Directive(DirectiveNode {
						directive: first,
						tags: vec![bindings],
						bodies: vec![],
						position,
					}));
				} else {
					tracing::trace!(directives = %matched.names(), %position, "opened directive");
					pending.push(DirectiveCreator {
						candidates: matched.directives,
						next_tag: 1,
						tags: vec![bindings],
						bodies: vec![],
						body: vec![],
						position,
					});
				}
			}
			Facing::Continuation => {
				let Some(mut creator) = pending.pop() else {
					continue;
				};

				creator
					.candidates
					.retain(|directive| matched.directives.iter().any(|other| Arc::ptr_eq(directive, other)));
				creator.bodies.push(std::mem::take(&mut creator.body));
				creator.tags.push(bindings);
				creator.next_tag += 1;

				let closes = creator
					.candidates
					.iter()
					.any(|directive| directive.tags().len() == creator.next_tag);

				if !closes {
					pending.push(creator);
					continue;
				}

				if creator.candidates.len() > 1 {
					return Err(ambiguous(creator.names()));
				}

				let Some(directive) = creator.candidates.pop() else {
					continue;
				};

				tracing::trace!(directive = directive.name(), %position, "closed directive");
				current_body(&mut pending, &mut nodes).push(DocumentNode::Directive(DirectiveNode {
					directive,
					tags: creator.tags,
					bodies: creator.bodies,
					position: creator.position,
				}));
			}
		}
	}

	if let Some(creator) = pending.pop() {
		return Err(TagflowError::UnclosedDirective {
			name: creator.names(),
			position: creator.position,
		});
	}

	Ok(Template { nodes })
}

fn current_body<'a>(pending: &'a mut [DirectiveCreator], nodes: &'a mut Vec<DocumentNode>) -> &'a mut Vec<DocumentNode> {
	match pending.last_mut() {
		Some(creator) => &mut creator.body,
		None => nodes,
	}
}

/// Bind each lexeme of `tag` to the matching component of the directive's
/// tag.
fn bind(directive: &Directive, tag_index: usize, tag: TagLexeme) -> TagflowResult<Bindings> {
	let mut bindings = Bindings::new();
	let Some(pattern) = directive.tag(tag_index) else {
		return Ok(bindings);
	};

	for (component, lexeme) in pattern.components().iter().zip(tag.lexemes) {
		let binding = match (component.kind(), lexeme) {
			(ComponentKind::Keyword, Lexeme::Keyword(word)) => Binding::Keyword(word),
			(ComponentKind::Variable, Lexeme::Expression(expression)) => Binding::Expression(expression),
			(ComponentKind::Identifier, lexeme) => {
				match lexeme.as_identifier() {
					Some(name) => Binding::Identifier(name.to_string()),
					None => return Err(TagflowError::MissingComponent(component.to_string())),
				}
			}
			(ComponentKind::Constant, lexeme) => {
				match lexeme.as_constant() {
					Some(value) => Binding::Constant(value.clone()),
					None => return Err(TagflowError::MissingComponent(component.to_string())),
				}
			}
			(ComponentKind::Keyword | ComponentKind::Variable, _) => {
				return Err(TagflowError::MissingComponent(component.to_string()));
			}
		};

		bindings.push(component.text(), binding);
	}

	Ok(bindings)
}
