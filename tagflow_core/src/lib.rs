//! `tagflow_core` is the engine behind the [tagflow](https://docs.rs/tagflow) template language. It builds expressions one term at a time with precedence climbing, folds their constant parts ahead of time, and drives multi-tag directives such as `IF .. ELSE .. END` through a resumable flow state machine.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template source
//!   → Lexer (splits text from `{...}` tags, turns tag content into keywords and expressions)
//!   → Arbiter (scores every candidate directive tag against each template tag)
//!   → Parser (tracks open directives and narrows shared openings into one directive tree)
//!   → Engine (visits tags, asks each directive handler what to do next, renders bodies)
//! ```
//!
//! ## Key Types
//!
//! - [`Expression`]: An expression built one term at a time, then constructed and evaluated.
//! - [`Dialect`]: Operators, directives and the keyword case rule that make up a template language.
//! - [`Directive`]: A named list of [`Tag`]s driven by a [`DirectiveHandler`].
//! - [`Template`]: A parsed document ready to render against an [`EvaluationContext`].
//! - [`TagflowConfig`]: Configuration loaded from `tagflow.toml`.
//!
//! ## Quick Start
//!
//! ```rust
//! use tagflow_core::Dialect;
//! use tagflow_core::RenderContext;
//!
//! let dialect = Dialect::standard();
//! let template = dialect
//! 	.parse("{FOR EACH n IN 1..3}{n * n}{WITH}, {END}")
//! 	.unwrap();
//!
//! let output = template.render(&mut RenderContext::new()).unwrap();
//! assert_eq!(output, "1, 4, 9");
//! ```

pub use ast::Evaluator;
pub use config::*;
pub use context::*;
pub use dialect::*;
pub use directive::*;
pub use engine::*;
pub use error::*;
pub use expression::*;
pub use operator::*;
pub use parser::DirectiveNode;
pub use parser::DocumentNode;
pub use parser::Template;
pub use position::*;
pub use value::*;

pub mod arbiter;
pub(crate) mod ast;
pub mod config;
mod context;
mod dialect;
mod directive;
pub mod directives;
mod engine;
#[allow(unused_assignments)]
mod error;
mod expression;
pub(crate) mod lexer;
mod operator;
mod parser;
mod position;
pub mod tokens;
mod value;

#[cfg(test)]
mod __tests;
