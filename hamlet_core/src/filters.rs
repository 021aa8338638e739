use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Why a filter could not produce output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilterError {
	/// The filter depends on something that isn't available.
	#[error("required `{0}` not found")]
	MissingDependency(String),
	#[error("{0}")]
	Failed(String),
}

/// A named text transform applied to the raw body of a `:filter` block.
/// The output is appended to the document without escaping.
pub trait Filter: fmt::Debug + Send + Sync {
	fn render(&self, text: &str) -> Result<String, FilterError>;
}

/// Adapts a closure into a [`Filter`].
pub struct FnFilter<F>(pub F);

impl<F> fmt::Debug for FnFilter<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("FnFilter")
	}
}

impl<F> Filter for FnFilter<F>
where
	F: Fn(&str) -> Result<String, FilterError> + Send + Sync,
{
	fn render(&self, text: &str) -> Result<String, FilterError> {
		(self.0)(text)
	}
}

/// Filters available to a compile, keyed by name.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
	filters: BTreeMap<String, Arc<dyn Filter>>,
}

impl Default for FilterRegistry {
	fn default() -> Self {
		Self::builtin()
	}
}

impl FilterRegistry {
	/// A registry without any filters.
	pub fn empty() -> Self {
		Self {
			filters: BTreeMap::new(),
		}
	}

	/// The standard filters: `plain`, `escaped`, `preserve`, `javascript`,
	/// `css`, `cdata` and `markdown`. `textile` is registered but
	/// unavailable.
	pub fn builtin() -> Self {
		let mut registry = Self::empty();
		registry.register("plain", Plain);
		registry.register("escaped", Escaped);
		registry.register("preserve", Preserve);
		registry.register("javascript", JavaScript);
		registry.register("css", Css);
		registry.register("cdata", Cdata);
		registry.register("markdown", Markdown);
		registry.register("textile", Unavailable { required: "redcloth" });
		registry
	}

	/// Add or replace a filter.
	pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
		self.filters.insert(name.into(), Arc::new(filter));
	}

	pub fn get(&self, name: &str) -> Option<&Arc<dyn Filter>> {
		self.filters.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.filters.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.filters.keys().map(String::as_str)
	}
}

/// Prefix every non-empty line with `indent`.
fn indent_lines(text: &str, indent: &str) -> String {
	text.trim_end()
		.lines()
		.map(|line| {
			if line.is_empty() {
				String::new()
			} else {
				format!("{indent}{line}")
			}
		})
		.collect::<Vec<_>>()
		.join("\n")
}

#[derive(Debug)]
struct Plain;

impl Filter for Plain {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(text.to_string())
	}
}

#[derive(Debug)]
struct Escaped;

impl Filter for Escaped {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(html_escape::encode_quoted_attribute(text).into_owned())
	}
}

/// Keeps whitespace-sensitive text on one output line by encoding newlines.
#[derive(Debug)]
struct Preserve;

impl Filter for Preserve {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(format!("{}\n", text.trim_end().replace('\n', "&#x000A;")))
	}
}

#[derive(Debug)]
struct JavaScript;

impl Filter for JavaScript {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(format!(
			"<script type='text/javascript'>\n  //<![CDATA[\n{}\n  //]]>\n</script>\n",
			indent_lines(text, "    ")
		))
	}
}

#[derive(Debug)]
struct Css;

impl Filter for Css {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(format!(
			"<style type='text/css'>\n  /*<![CDATA[*/\n{}\n  /*]]>*/\n</style>\n",
			indent_lines(text, "    ")
		))
	}
}

#[derive(Debug)]
struct Cdata;

impl Filter for Cdata {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(format!("<![CDATA[\n{}\n]]>\n", indent_lines(text, "    ")))
	}
}

#[derive(Debug)]
struct Markdown;

impl Filter for Markdown {
	fn render(&self, text: &str) -> Result<String, FilterError> {
		Ok(markdown::to_html(text))
	}
}

/// A filter whose implementation needs a dependency this build doesn't
/// ship.
#[derive(Debug)]
struct Unavailable {
	required: &'static str,
}

impl Filter for Unavailable {
	fn render(&self, _text: &str) -> Result<String, FilterError> {
		Err(FilterError::MissingDependency(self.required.to_string()))
	}
}
