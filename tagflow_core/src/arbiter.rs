use std::sync::Arc;

use crate::Component;
use crate::ComponentKind;
use crate::Directive;
use crate::TagflowError;
use crate::TagflowResult;
use crate::tokens::Lexeme;
use crate::tokens::TagLexeme;

/// Raw score for a keyword matched verbatim.
pub const KEYWORD_SCORE: u32 = 3;
/// Raw score for a lexeme accepted by an identifier or constant slot.
pub const NAMED_SLOT_SCORE: u32 = 2;
/// Raw score for an expression bound to a variable slot.
pub const VARIABLE_SCORE: u32 = 1;

/// Whether a candidate tag opens a new directive or continues the
/// innermost open one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
	Opening,
	Continuation,
}

/// One tag a template tag could be an occurrence of.
#[derive(Debug, Clone)]
pub struct Candidate {
	pub directive: Arc<Directive>,
	pub tag_index: usize,
	pub facing: Facing,
}

/// The winners of a selection. Every entry shares the same facing and the
/// same tag shape, so the caller can bind once and narrow later.
#[derive(Debug)]
pub struct MatchedDirective {
	pub facing: Facing,
	pub tag_index: usize,
	pub directives: Vec<Arc<Directive>>,
	pub score: u32,
}

impl MatchedDirective {
	pub fn names(&self) -> String {
		join_names(self.directives.iter().map(|directive| directive.name()))
	}
}

/// Score one component against one lexeme; zero means no match.
fn score_component(directive: &Directive, tag_index: usize, component: &Component, lexeme: &Lexeme, case_sensitive: bool) -> u32 {
	let handler = directive.handler();

	match component.kind() {
		ComponentKind::Keyword => {
			match lexeme {
				Lexeme::Keyword(word) if keyword_eq(component.text(), word, case_sensitive) => KEYWORD_SCORE,
				_ => 0,
			}
		}
		ComponentKind::Identifier => {
			match lexeme.as_identifier() {
				Some(name) if handler.accepts_identifier(tag_index, component.text(), name) => NAMED_SLOT_SCORE,
				_ => 0,
			}
		}
		ComponentKind::Constant => {
			match lexeme.as_constant() {
				Some(value) if handler.accepts_constant(tag_index, component.text(), value) => NAMED_SLOT_SCORE,
				_ => 0,
			}
		}
		ComponentKind::Variable if lexeme.is_expression() => VARIABLE_SCORE,
		ComponentKind::Variable => 0,
	}
}

/// The weighted score of `tag` against a directive's tag, or zero when any
/// position fails to match. Position `i` is weighted by `i + 1`.
pub fn score(directive: &Directive, tag_index: usize, tag: &[Lexeme], case_sensitive: bool) -> u32 {
	let Some(pattern) = directive.tag(tag_index) else {
		return 0;
	};

	if pattern.len() != tag.len() {
		return 0;
	}

	let mut total = 0;

	for (index, (component, lexeme)) in pattern.components().iter().zip(tag).enumerate() {
		let raw = score_component(directive, tag_index, component, lexeme, case_sensitive);

		if raw == 0 {
			return 0;
		}

		total += raw * (index as u32 + 1);
	}

	total
}

/// Pick the directive tag that `tag` is an occurrence of.
///
/// The highest weighted score wins. Winners tied at that score must share
/// one facing and one tag shape, otherwise the tag is ambiguous.
pub fn select(
	candidates: impl IntoIterator<Item = Candidate>,
	tag: &TagLexeme,
	case_sensitive: bool,
) -> TagflowResult<MatchedDirective> {
	let mut best: Vec<Candidate> = vec![];
	let mut best_score = 0;

	for candidate in candidates {
		let score = score(&candidate.directive, candidate.tag_index, tag, case_sensitive);

		tracing::trace!(
			directive = candidate.directive.name(),
			tag_index = candidate.tag_index,
			score,
			"scored candidate"
		);

		if score == 0 || score < best_score {
			continue;
		}

		if score > best_score {
			best.clear();
			best_score = score;
		}

		best.push(candidate);
	}

	let Some(first) = best.first() else {
		return Err(TagflowError::NoMatchingDirective {
			tag: tag.text.clone(),
			position: tag.position,
		});
	};

	let facing = first.facing;
	let tag_index = first.tag_index;
	let shape = first.directive.tag(tag_index);

	let consistent = best.iter().all(|candidate| {
		candidate.facing == facing
			&& candidate.tag_index == tag_index
			&& match (shape, candidate.directive.tag(candidate.tag_index)) {
				(Some(shape), Some(other)) => shape.same_shape(other, case_sensitive),
				_ => false,
			}
	});

	if !consistent {
		return Err(TagflowError::AmbiguousDirective {
			tag: tag.text.clone(),
			candidates: join_names(best.iter().map(|candidate| candidate.directive.name())),
			position: tag.position,
		});
	}

	Ok(MatchedDirective {
		facing,
		tag_index,
		directives: best.into_iter().map(|candidate| candidate.directive).collect(),
		score: best_score,
	})
}

pub fn keyword_eq(expected: &str, found: &str, case_sensitive: bool) -> bool {
	if case_sensitive {
		expected == found
	} else {
		expected.eq_ignore_ascii_case(found)
	}
}

pub(crate) fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
	names.map(|name| format!("`{name}`")).collect::<Vec<_>>().join(", ")
}
