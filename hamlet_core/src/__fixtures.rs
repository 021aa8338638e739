use crate::CompiledTemplate;
use crate::CompilerOptions;
use crate::FilterError;
use crate::FnFilter;
use crate::HamletResult;
use crate::RenderContext;
use crate::compile;

pub(crate) fn options() -> CompilerOptions {
	CompilerOptions::default()
}

pub(crate) fn context() -> RenderContext {
	RenderContext::new()
		.with("author", "Ifiok")
		.with("title", "Hamlet")
		.with("count", 3)
		.with("items", vec!["one", "two", "three"])
}

pub(crate) fn template(source: &str) -> HamletResult<CompiledTemplate> {
	compile(source, &options())
}

/// Render `source` with the default options and [`context`].
pub(crate) fn render(source: &str) -> HamletResult<String> {
	render_with(source, &options())
}

pub(crate) fn render_with(source: &str, options: &CompilerOptions) -> HamletResult<String> {
	compile(source, options)?.render(&context())
}

/// A filter that ignores its body.
pub(crate) fn testing_filter() -> FnFilter<fn(&str) -> Result<String, FilterError>> {
	FnFilter(|_| Ok("TESTING HAHAHAHA!".to_string()))
}

pub(crate) fn failing_filter() -> FnFilter<fn(&str) -> Result<String, FilterError>> {
	FnFilter(|text| Err(FilterError::Failed(format!("can't handle `{}`", text.trim()))))
}

/// A template exercising most line kinds, with a failing expression on
/// line 5.
pub(crate) const FAILING_ON_LINE_FIVE: &str = "\
%html
  %body
    %h1= title
    %p welcome
    %p= raise('boom')
    %ul
      - for item in items
        %li= item
    %footer done
";
