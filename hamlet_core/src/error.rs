use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// The place inside a template where an evaluation failure was raised.
///
/// Renders as `(<template-id>):<line>`, e.g. `(haml):5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
	/// The virtual source name of the template.
	pub template_id: String,
	/// 1-indexed line number of the failing template line.
	pub line: usize,
}

impl SourceLocation {
	pub fn new(template_id: impl Into<String>, line: usize) -> Self {
		Self {
			template_id: template_id.into(),
			line,
		}
	}
}

impl fmt::Display for SourceLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({}):{}", self.template_id, self.line)
	}
}

/// Broad classification of a [`HamletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Structural or syntactic problem found while compiling.
	Parse,
	/// Failure raised while rendering a compiled template.
	Evaluation,
	/// Problem loading configuration or data files.
	Config,
}

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum HamletError {
	#[error(transparent)]
	#[diagnostic(code(hamlet::io_error))]
	Io(#[from] std::io::Error),

	#[error("line {line}: inconsistent indentation: {message}")]
	#[diagnostic(
		code(hamlet::inconsistent_indentation),
		help("nested lines must be indented exactly one level deeper than their parent")
	)]
	InconsistentIndentation { line: usize, message: String },

	#[error("line {line}: indentation can't use both tabs and spaces")]
	#[diagnostic(code(hamlet::mixed_indentation))]
	MixedIndentation { line: usize },

	#[error("line {line}: illegal indentation: {message}")]
	#[diagnostic(
		code(hamlet::illegal_indentation),
		help("use the same indentation unit throughout the template")
	)]
	IllegalIndentation { line: usize, message: String },

	#[error("line {line}: illegal nesting: {message}")]
	#[diagnostic(code(hamlet::illegal_nesting))]
	IllegalNesting { line: usize, message: String },

	#[error("line {line}: invalid tag: `{tag}`")]
	#[diagnostic(code(hamlet::invalid_tag))]
	InvalidTag { line: usize, tag: String },

	#[error("line {line}: illegal element: `{sigil}` must be followed by a class or id name")]
	#[diagnostic(code(hamlet::unknown_shorthand))]
	UnknownShorthand { line: usize, sigil: char },

	#[error("line {line}: invalid filter name `{name}`")]
	#[diagnostic(
		code(hamlet::invalid_filter_name),
		help("filter names are written `:name` with letters, digits, `_` or `-`")
	)]
	InvalidFilterName { line: usize, name: String },

	#[error("line {line}: filter `{name}` is not defined")]
	#[diagnostic(
		code(hamlet::unknown_filter),
		help("register the filter with `CompilerOptions::with_filter`")
	)]
	UnknownFilter { line: usize, name: String },

	#[error("line {line}: invalid attribute list: {message}")]
	#[diagnostic(code(hamlet::attribute_syntax))]
	AttributeSyntax { line: usize, message: String },

	#[error("line {line}: unterminated interpolation `#{{`")]
	#[diagnostic(code(hamlet::unterminated_interpolation), help("close the interpolation with `}}`"))]
	UnterminatedInterpolation { line: usize },

	#[error("{message}{}", located(.location.as_ref()))]
	#[diagnostic(code(hamlet::evaluation))]
	Evaluation {
		location: Option<SourceLocation>,
		message: String,
		#[source]
		source: Option<Box<dyn std::error::Error + Send + Sync>>,
	},

	#[error("can't run `{filter}` filter; required `{required}` not found{}", located(.location.as_ref()))]
	#[diagnostic(
		code(hamlet::filter_unavailable),
		help("install the dependency or register a replacement filter under the same name")
	)]
	FilterUnavailable {
		filter: String,
		required: String,
		location: Option<SourceLocation>,
	},

	#[error("partial `{name}` is not registered{}", located(.location.as_ref()))]
	#[diagnostic(
		code(hamlet::missing_partial),
		help("register the partial with `RenderContext::add_partial`")
	)]
	MissingPartial {
		name: String,
		location: Option<SourceLocation>,
	},

	#[error("no compiled method named `{0}`")]
	#[diagnostic(
		code(hamlet::undefined_method),
		help("attach the template first with `CompiledTemplate::define_method`")
	)]
	UndefinedMethod(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(hamlet::config_parse),
		help("check that hamlet.toml is valid TOML with [compiler] and/or [data] sections")
	)]
	ConfigParse(String),

	#[error("failed to load data file `{path}`: {reason}")]
	#[diagnostic(code(hamlet::data_file))]
	DataFile { path: String, reason: String },

	#[error("unsupported data file format: `{0}`")]
	#[diagnostic(
		code(hamlet::unsupported_format),
		help("supported formats: text, json, toml, yaml, yml, kdl, ini")
	)]
	UnsupportedDataFormat(String),
}

fn located(location: Option<&SourceLocation>) -> String {
	location.map_or_else(String::new, |location| format!(" at {location}"))
}

impl HamletError {
	/// An evaluation failure without a location. The render driver attaches
	/// the location of the failing line.
	pub fn evaluation(message: impl Into<String>) -> Self {
		Self::Evaluation {
			location: None,
			message: message.into(),
			source: None,
		}
	}

	/// An evaluation failure wrapping the underlying expression error.
	pub fn evaluation_with_source(
		message: impl Into<String>,
		source: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		Self::Evaluation {
			location: None,
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}

	/// Attach `location` unless the error already carries one. Nested blocks
	/// and partials locate their own failures first, so the innermost line
	/// is kept.
	#[must_use]
	pub fn located(mut self, location: SourceLocation) -> Self {
		match &mut self {
			Self::Evaluation { location: slot, .. }
			| Self::FilterUnavailable { location: slot, .. }
			| Self::MissingPartial { location: slot, .. } => {
				if slot.is_none() {
					*slot = Some(location);
				}
			}
			_ => {}
		}

		self
	}

	/// The template location attached to an evaluation failure.
	pub fn location(&self) -> Option<&SourceLocation> {
		match self {
			Self::Evaluation { location, .. }
			| Self::FilterUnavailable { location, .. }
			| Self::MissingPartial { location, .. } => location.as_ref(),
			_ => None,
		}
	}

	/// The 1-indexed template line this error refers to, if any.
	pub fn line(&self) -> Option<usize> {
		match self {
			Self::InconsistentIndentation { line, .. }
			| Self::MixedIndentation { line }
			| Self::IllegalIndentation { line, .. }
			| Self::IllegalNesting { line, .. }
			| Self::InvalidTag { line, .. }
			| Self::UnknownShorthand { line, .. }
			| Self::InvalidFilterName { line, .. }
			| Self::UnknownFilter { line, .. }
			| Self::AttributeSyntax { line, .. }
			| Self::UnterminatedInterpolation { line } => Some(*line),
			_ => self.location().map(|location| location.line),
		}
	}

	/// The message of an evaluation failure without the location suffix.
	pub fn message(&self) -> String {
		match self {
			Self::Evaluation { message, .. } => message.clone(),
			Self::FilterUnavailable {
				filter, required, ..
			} => format!("can't run `{filter}` filter; required `{required}` not found"),
			Self::MissingPartial { name, .. } => format!("partial `{name}` is not registered"),
			other => other.to_string(),
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::InconsistentIndentation { .. }
			| Self::MixedIndentation { .. }
			| Self::IllegalIndentation { .. }
			| Self::IllegalNesting { .. }
			| Self::InvalidTag { .. }
			| Self::UnknownShorthand { .. }
			| Self::InvalidFilterName { .. }
			| Self::UnknownFilter { .. }
			| Self::AttributeSyntax { .. }
			| Self::UnterminatedInterpolation { .. } => ErrorKind::Parse,
			Self::Evaluation { .. }
			| Self::FilterUnavailable { .. }
			| Self::MissingPartial { .. }
			| Self::UndefinedMethod(_) => ErrorKind::Evaluation,
			Self::Io(_)
			| Self::ConfigParse(_)
			| Self::DataFile { .. }
			| Self::UnsupportedDataFormat(_) => ErrorKind::Config,
		}
	}

	pub fn is_parse(&self) -> bool {
		self.kind() == ErrorKind::Parse
	}

	pub fn is_evaluation(&self) -> bool {
		self.kind() == ErrorKind::Evaluation
	}
}

pub type HamletResult<T> = Result<T, HamletError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
