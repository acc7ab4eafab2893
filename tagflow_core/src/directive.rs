use std::any::Any;
use std::fmt::Display;
use std::str::FromStr;

use crate::EvaluationContext;
use crate::Expression;
use crate::TagflowError;
use crate::TagflowResult;
use crate::Value;
use crate::is_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
	/// A fixed word that must appear verbatim.
	Keyword,
	/// Any expression.
	Variable,
	/// A single bare name.
	Identifier,
	/// An expression that folds to a literal at parse time.
	Constant,
}

impl ComponentKind {
	pub fn sigil(self) -> Option<char> {
		match self {
			Self::Keyword => None,
			Self::Variable => Some('$'),
			Self::Identifier => Some('?'),
			Self::Constant => Some('!'),
		}
	}

	fn from_sigil(sigil: char) -> Option<Self> {
		match sigil {
			'$' => Some(Self::Variable),
			'?' => Some(Self::Identifier),
			'!' => Some(Self::Constant),
			_ => None,
		}
	}
}

/// One position of a [`Tag`].
///
/// Keywords carry their text. Slots carry a key that handlers use to fetch
/// the bound value; an anonymous slot is keyed by its sigil.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Component {
	kind: ComponentKind,
	text: String,
}

impl Component {
	pub fn keyword(text: impl Into<String>) -> Self {
		Self {
			kind: ComponentKind::Keyword,
			text: text.into(),
		}
	}

	pub fn variable(key: impl Into<String>) -> Self {
		Self {
			kind: ComponentKind::Variable,
			text: key.into(),
		}
	}

	pub fn identifier(key: impl Into<String>) -> Self {
		Self {
			kind: ComponentKind::Identifier,
			text: key.into(),
		}
	}

	pub fn constant(key: impl Into<String>) -> Self {
		Self {
			kind: ComponentKind::Constant,
			text: key.into(),
		}
	}

	pub fn kind(&self) -> ComponentKind {
		self.kind
	}

	/// The keyword text, or the slot key.
	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn is_keyword(&self) -> bool {
		self.kind == ComponentKind::Keyword
	}

	/// Whether both components take the same place in a tag shape. Keywords
	/// compare by text under the dialect's case rule.
	pub fn same_shape(&self, other: &Self, case_sensitive: bool) -> bool {
		self.kind == other.kind
			&& match self.kind {
				ComponentKind::Keyword if !case_sensitive => self.text.eq_ignore_ascii_case(&other.text),
				_ => self.text == other.text,
			}
	}
}

impl Display for Component {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.kind.sigil() {
			Some(sigil) if self.text.len() == 1 && self.text.starts_with(sigil) => write!(f, "{sigil}"),
			Some(sigil) => write!(f, "{sigil}{}", self.text),
			None => write!(f, "{}", self.text),
		}
	}
}

/// An ordered, non-empty list of components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
	components: Vec<Component>,
}

impl Tag {
	pub fn new(components: Vec<Component>) -> TagflowResult<Self> {
		let tag = Self { components };

		if tag.components.is_empty() {
			return Err(TagflowError::EmptyTag(tag.to_string()));
		}

		let mut keys: Vec<&str> = Vec::new();
		for component in tag.components.iter().filter(|component| !component.is_keyword()) {
			if keys.contains(&component.text()) {
				return Err(TagflowError::DuplicateComponentKey {
					tag: tag.to_string(),
					key: component.text().to_string(),
				});
			}
			keys.push(component.text());
		}

		Ok(tag)
	}

	/// Parse tag markup such as `FOR EACH ? IN $items`.
	pub fn parse(markup: &str) -> TagflowResult<Self> {
		let invalid = |reason: &str| {
			TagflowError::InvalidTagMarkup {
				markup: markup.to_string(),
				reason: reason.to_string(),
			}
		};

		let mut components = Vec::new();

		for word in markup.split_whitespace() {
			let mut chars = word.chars();
			let first = chars.next().unwrap_or_default();

			let component = match ComponentKind::from_sigil(first) {
				Some(kind) => {
					let key = chars.as_str();
					if !key.is_empty() && !is_name(key) {
						return Err(invalid("slot keys must be names"));
					}
					Component {
						kind,
						text: if key.is_empty() { first.to_string() } else { key.to_string() },
					}
				}
				None if is_name(word) => Component::keyword(word),
				None => return Err(invalid("keywords must be names")),
			};

			components.push(component);
		}

		if components.is_empty() {
			return Err(TagflowError::EmptyTag(markup.to_string()));
		}

		Self::new(components)
	}

	pub fn components(&self) -> &[Component] {
		&self.components
	}

	pub fn len(&self) -> usize {
		self.components.len()
	}

	pub fn is_empty(&self) -> bool {
		self.components.is_empty()
	}

	pub fn keywords(&self) -> impl Iterator<Item = &str> {
		self.components
			.iter()
			.filter(|component| component.is_keyword())
			.map(Component::text)
	}

	pub fn same_shape(&self, other: &Self, case_sensitive: bool) -> bool {
		self.components.len() == other.components.len()
			&& self
				.components
				.iter()
				.zip(&other.components)
				.all(|(left, right)| left.same_shape(right, case_sensitive))
	}
}

impl FromStr for Tag {
	type Err = TagflowError;

	fn from_str(markup: &str) -> Result<Self, Self::Err> {
		Self::parse(markup)
	}
}

impl Display for Tag {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for (index, component) in self.components.iter().enumerate() {
			if index > 0 {
				write!(f, " ")?;
			}
			write!(f, "{component}")?;
		}

		Ok(())
	}
}

/// What the renderer does after a tag has been visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDecision {
	/// Render the body that follows this tag, then visit the next tag.
	Evaluate,
	/// Move to the next tag without rendering the body.
	Skip,
	/// Go back to the first tag.
	Restart,
	/// Stop processing the directive.
	Terminate,
}

/// A handler's answer for one tag visit: a decision plus optional output
/// written before the decision is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
	pub decision: FlowDecision,
	pub text: Option<String>,
}

impl FlowStep {
	pub fn evaluate() -> Self {
		FlowDecision::Evaluate.into()
	}

	pub fn skip() -> Self {
		FlowDecision::Skip.into()
	}

	pub fn restart() -> Self {
		FlowDecision::Restart.into()
	}

	pub fn terminate() -> Self {
		FlowDecision::Terminate.into()
	}

	#[must_use]
	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.text = Some(text.into());
		self
	}
}

impl From<FlowDecision> for FlowStep {
	fn from(decision: FlowDecision) -> Self {
		Self { decision, text: None }
	}
}

/// Per-occurrence state a handler keeps between visits of one directive
/// instance. It starts empty for every occurrence in every render pass.
pub type FlowState = Option<Box<dyn Any + Send>>;

/// The value bound to one tag slot in the parsed document.
#[derive(Debug)]
pub enum Binding {
	Keyword(String),
	Expression(Expression),
	Identifier(String),
	Constant(Value),
}

/// The bound components of one tag occurrence, keyed as in the tag.
#[derive(Debug, Default)]
pub struct Bindings {
	entries: Vec<(String, Binding)>,
}

impl Bindings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, key: impl Into<String>, binding: Binding) {
		self.entries.push((key.into(), binding));
	}

	pub fn get(&self, key: &str) -> Option<&Binding> {
		self.entries
			.iter()
			.find(|(entry, _)| entry == key)
			.map(|(_, binding)| binding)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
		self.entries.iter().map(|(key, binding)| (key.as_str(), binding))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn expression(&self, key: &str) -> TagflowResult<&Expression> {
		match self.get(key) {
			Some(Binding::Expression(expression)) => Ok(expression),
			_ => Err(TagflowError::MissingComponent(key.to_string())),
		}
	}

	pub fn identifier(&self, key: &str) -> TagflowResult<&str> {
		match self.get(key) {
			Some(Binding::Identifier(name)) => Ok(name),
			_ => Err(TagflowError::MissingComponent(key.to_string())),
		}
	}

	pub fn constant(&self, key: &str) -> TagflowResult<&Value> {
		match self.get(key) {
			Some(Binding::Constant(value)) => Ok(value),
			_ => Err(TagflowError::MissingComponent(key.to_string())),
		}
	}

	/// Evaluate the expression bound to `key`.
	pub fn evaluate(&self, key: &str, context: &mut dyn EvaluationContext) -> TagflowResult<Value> {
		self.expression(key)?.evaluate(context)
	}
}

/// Everything a handler sees while one tag is visited.
pub struct TagVisit<'a> {
	/// Index of the tag being visited within its directive.
	pub tag_index: usize,
	/// Whether the visited tag is the directive's last.
	pub is_last: bool,
	pub bindings: &'a Bindings,
	pub state: &'a mut FlowState,
	pub context: &'a mut dyn EvaluationContext,
}

impl TagVisit<'_> {
	/// Fetch the handler state, seeding it with `init` on the first visit.
	pub fn state_or_insert_with<T: Any + Send>(
		&mut self,
		init: impl FnOnce(&Bindings, &mut dyn EvaluationContext) -> TagflowResult<T>,
	) -> TagflowResult<&mut T> {
		if self.state.as_ref().is_none_or(|state| !state.is::<T>()) {
			let state = init(self.bindings, &mut *self.context)?;
			*self.state = Some(Box::new(state));
		}

		self.state
			.as_mut()
			.and_then(|state| state.downcast_mut::<T>())
			.ok_or_else(|| TagflowError::MissingComponent("state".to_string()))
	}

	pub fn state<T: Any + Send>(&mut self) -> Option<&mut T> {
		self.state.as_mut().and_then(|state| state.downcast_mut::<T>())
	}

	pub fn clear_state(&mut self) {
		*self.state = None;
	}

	pub fn evaluate(&mut self, key: &str) -> TagflowResult<Value> {
		self.bindings.evaluate(key, self.context)
	}
}

/// Drives the flow of one directive.
///
/// `visit` is called for each tag the renderer reaches and returns what to
/// do next. The accept predicates let a directive refuse identifier or
/// constant matches during directive selection.
pub trait DirectiveHandler: Send + Sync {
	fn visit(&self, visit: &mut TagVisit<'_>) -> TagflowResult<FlowStep>;

	/// Called instead of further visits when rendering a body or visiting a
	/// tag of this occurrence fails. Undo anything registered on the context.
	fn abort(&self, _visit: &mut TagVisit<'_>) {}

	fn accepts_identifier(&self, _tag_index: usize, _key: &str, _name: &str) -> bool {
		true
	}

	fn accepts_constant(&self, _tag_index: usize, _key: &str, _value: &Value) -> bool {
		true
	}
}

/// A named, ordered list of tags with the handler that drives them.
pub struct Directive {
	name: String,
	tags: Vec<Tag>,
	handler: Box<dyn DirectiveHandler>,
}

impl Directive {
	pub fn new(
		name: impl Into<String>,
		tags: Vec<Tag>,
		handler: impl DirectiveHandler + 'static,
	) -> TagflowResult<Self> {
		let name = name.into();

		if tags.is_empty() {
			return Err(TagflowError::EmptyDirective(name));
		}

		Ok(Self {
			name,
			tags,
			handler: Box::new(handler),
		})
	}

	/// Build a directive from tag markup, one entry per tag.
	pub fn from_markup(
		name: impl Into<String>,
		markup: &[&str],
		handler: impl DirectiveHandler + 'static,
	) -> TagflowResult<Self> {
		let tags = markup.iter().map(|tag| Tag::parse(tag)).collect::<TagflowResult<Vec<_>>>()?;
		Self::new(name, tags, handler)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn tags(&self) -> &[Tag] {
		&self.tags
	}

	pub fn tag(&self, index: usize) -> Option<&Tag> {
		self.tags.get(index)
	}

	/// Composite directives have more than one tag and wrap bodies.
	pub fn is_composite(&self) -> bool {
		self.tags.len() > 1
	}

	pub fn handler(&self) -> &dyn DirectiveHandler {
		self.handler.as_ref()
	}
}

impl std::fmt::Debug for Directive {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Directive")
			.field("name", &self.name)
			.field("tags", &self.tags.iter().map(ToString::to_string).collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}
