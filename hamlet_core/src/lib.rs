//! `hamlet_core` compiles indentation-based markup templates (a Haml dialect)
//! into reusable [`CompiledTemplate`]s and renders them to HTML or XHTML.
//!
//! ## Processing Pipeline
//!
//! ```text
//! template source
//!   → Lexer (splits lines, measures indentation, classifies sigils)
//!   → Parser (builds the node tree, parses tag lines and attribute lists)
//!   → Compiler (merges static attributes, emits an instruction stream)
//!   → Render driver (evaluates code through an ExpressionEvaluator, writes output)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: [`CompilerOptions`] and `hamlet.toml` loading, including data files bound as template variables.
//! - [`filters`]: The [`Filter`] trait and the built-in `:plain`, `:escaped`, `:preserve`, `:javascript`, `:css`, `:cdata` and `:markdown` filters.
//!
//! ## Key Types
//!
//! - [`CompiledTemplate`]: An immutable compiled template with [`render`](CompiledTemplate::render), [`render_proc`](CompiledTemplate::render_proc) and [`define_method`](CompiledTemplate::define_method) entry points.
//! - [`RenderContext`]: Variable bindings, partials and methods for a render.
//! - [`ExpressionEvaluator`]: Runs embedded code. [`MiniJinjaEvaluator`] is the default.
//! - [`HamletError`]: Parse and evaluation failures, located as `(<template-id>):<line>`.
//!
//! ## Quick Start
//!
//! ```rust
//! use hamlet_core::CompilerOptions;
//! use hamlet_core::RenderContext;
//! use hamlet_core::compile;
//!
//! let template = compile(".author= name", &CompilerOptions::default()).unwrap();
//! let context = RenderContext::new().with("name", "Ifiok");
//!
//! assert_eq!(
//! 	template.render(&context).unwrap(),
//! 	"<div class='author'>Ifiok</div>\n"
//! );
//! ```

pub use attributes::AttributeSet;
pub use attributes::AttributeValue;
pub use config::*;
pub use context::*;
pub use engine::*;
pub use error::*;
pub use evaluator::*;
pub use filters::Filter;
pub use filters::FilterError;
pub use filters::FilterRegistry;
pub use filters::FnFilter;

mod attributes;
mod buffer;
mod compiler;
pub mod config;
mod context;
mod engine;
#[allow(unused_assignments)]
mod error;
mod evaluator;
pub mod filters;
mod interpolation;
pub(crate) mod lexer;
mod parser;
pub(crate) mod tokens;

#[cfg(test)]
mod __fixtures;
