use std::sync::Arc;

use minijinja::Value;
use minijinja::value::ValueKind;

use crate::AttributeSet;
use crate::CompilerOptions;
use crate::ExpressionEvaluator;
use crate::HamletError;
use crate::HamletResult;
use crate::OutputSink;
use crate::RenderContext;
use crate::SourceLocation;
use crate::attributes;
use crate::attributes::AttributeEntry;
use crate::attributes::DynamicValue;
use crate::buffer::Buffer;
use crate::compiler;
use crate::compiler::CompiledTag;
use crate::compiler::ElementContent;
use crate::compiler::Instruction;
use crate::evaluator::Branch;
use crate::evaluator::evaluation_error;
use crate::filters::FilterError;
use crate::interpolation::Segment;
use crate::parser;

/// The parts of the compile options a render still needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderSettings {
	escape_attrs: bool,
	attr_wrapper: char,
	html: bool,
}

/// A template compiled once and rendered any number of times. Immutable,
/// so it can be shared between threads.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
	id: String,
	pub(crate) instructions: Vec<Instruction>,
	settings: RenderSettings,
}

/// Compile template source.
#[tracing::instrument(level = "debug", skip_all, fields(template_id = %options.template_id))]
pub fn compile(source: &str, options: &CompilerOptions) -> HamletResult<CompiledTemplate> {
	let nodes = parser::parse(source, options.indent_unit)?;
	let instructions = compiler::compile_nodes(&nodes, options)?;

	tracing::debug!(
		nodes = nodes.len(),
		instructions = instructions.len(),
		"compiled template"
	);

	Ok(CompiledTemplate {
		id: options.template_id.clone(),
		instructions,
		settings: RenderSettings {
			escape_attrs: options.escape_attrs,
			attr_wrapper: options.attr_wrapper,
			html: options.format.is_html(),
		},
	})
}

impl CompiledTemplate {
	/// The template id used in error locations.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Render into `sink` using `context`. Silent scripts may change the
	/// context's bindings.
	pub fn execute(&self, context: &mut RenderContext, sink: &mut dyn OutputSink) -> HamletResult<()> {
		let mut buffer = Buffer::default();
		Runner {
			template: self,
			evaluator: context.evaluator(),
		}
		.run(&self.instructions, context, &mut buffer)?;

		let output = buffer.finish();
		tracing::debug!(template_id = %self.id, bytes = output.len(), "rendered template");
		sink.write_output(&output);

		Ok(())
	}

	/// Render once with a copy of `context`.
	pub fn render(&self, context: &RenderContext) -> HamletResult<String> {
		let mut context = context.clone();
		let mut output = String::new();
		self.execute(&mut context, &mut output)?;

		Ok(output)
	}

	/// A closure that renders against `context` each time it is called.
	/// Every call starts from the same bindings, so the output is identical.
	pub fn render_proc(&self, context: RenderContext) -> impl Fn() -> HamletResult<String> + use<> {
		let template = Arc::new(self.clone());
		move || template.render(&context)
	}

	/// Attach this template to `context` as a method named `name`, rendered
	/// with [`RenderContext::call_method`].
	pub fn define_method(&self, context: &mut RenderContext, name: impl Into<String>) {
		context.add_method(name, Arc::new(self.clone()));
	}

	fn location(&self, line: usize) -> SourceLocation {
		SourceLocation::new(self.id.clone(), line)
	}
}

struct Runner<'t> {
	template: &'t CompiledTemplate,
	evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Runner<'_> {
	fn run(
		&self,
		instructions: &[Instruction],
		context: &mut RenderContext,
		buffer: &mut Buffer,
	) -> HamletResult<()> {
		let mut branch = Branch::Idle;

		for instruction in instructions {
			let result = self.step(instruction, context, buffer, branch);
			branch = match (result, instruction.line()) {
				(Ok(branch), _) => branch,
				(Err(error), Some(line)) => return Err(error.located(self.template.location(line))),
				(Err(error), None) => return Err(error),
			};
		}

		Ok(())
	}

	fn step(
		&self,
		instruction: &Instruction,
		context: &mut RenderContext,
		buffer: &mut Buffer,
		branch: Branch,
	) -> HamletResult<Branch> {
		match instruction {
			Instruction::Script { code, body, .. } => {
				let mut block = |context: &mut RenderContext| self.run(body, context, buffer);
				let block: Option<&mut dyn FnMut(&mut RenderContext) -> HamletResult<()>> =
					if body.is_empty() { None } else { Some(&mut block) };

				return self.evaluator.execute(code, context, branch, block);
			}
			Instruction::Text { depth, text } => buffer.line(*depth, text),
			Instruction::Interpolated {
				depth,
				segments,
				escape,
				..
			} => {
				let text = self.interpolate(segments, *escape, context)?;
				buffer.lines(*depth, &text);
			}
			Instruction::Output {
				depth,
				code,
				escape,
				..
			} => {
				let text = self.output(code, *escape, context)?;
				buffer.lines(*depth, &text);
			}
			Instruction::Element {
				depth,
				tag,
				content,
				..
			} => self.element(*depth, tag, content, context, buffer)?,
			Instruction::Open { depth, tag, .. } => {
				if tag.nuke_outer {
					buffer.glue();
				}
				let open = self.open_tag(tag, context)?;
				buffer.line(*depth, &format!("{open}>"));
				if tag.nuke_inner {
					buffer.glue();
				}
			}
			Instruction::Close {
				depth,
				name,
				nuke_inner,
				nuke_outer,
			} => {
				if *nuke_inner {
					buffer.glue();
				}
				buffer.line(*depth, &format!("</{name}>"));
				if *nuke_outer {
					buffer.glue();
				}
			}
			Instruction::Filter {
				depth,
				name,
				filter,
				text,
				..
			} => {
				let rendered = filter.render(text).map_err(|error| {
					match error {
						FilterError::MissingDependency(required) => {
							HamletError::FilterUnavailable {
								filter: name.clone(),
								required,
								location: None,
							}
						}
						other => HamletError::evaluation_with_source(
							format!("filter `{name}` failed: {other}"),
							other,
						),
					}
				})?;
				buffer.lines(*depth, &rendered);
			}
		}

		Ok(Branch::Idle)
	}

	fn element(
		&self,
		depth: usize,
		tag: &CompiledTag,
		content: &ElementContent,
		context: &RenderContext,
		buffer: &mut Buffer,
	) -> HamletResult<()> {
		if tag.nuke_outer {
			buffer.glue();
		}

		let open = self.open_tag(tag, context)?;
		let name = &tag.name;

		let inner = match content {
			ElementContent::SelfClosing => {
				let end = if self.template.settings.html { ">" } else { " />" };
				buffer.line(depth, &format!("{open}{end}"));
				None
			}
			ElementContent::Empty => Some(String::new()),
			ElementContent::Text(text) => Some(text.clone()),
			ElementContent::Interpolated { segments, escape } => {
				Some(self.interpolate(segments, *escape, context)?)
			}
			ElementContent::Output { code, escape } => Some(self.output(code, *escape, context)?),
		};

		if let Some(inner) = inner {
			if inner.contains('\n') && !tag.nuke_inner {
				buffer.line(depth, &format!("{open}>"));
				buffer.lines(depth + 1, &inner);
				buffer.line(depth, &format!("</{name}>"));
			} else {
				buffer.line(depth, &format!("{open}>{inner}</{name}>"));
			}
		}

		if tag.nuke_outer {
			buffer.glue();
		}

		Ok(())
	}

	/// `<name` followed by the merged attributes, without the closing `>`.
	fn open_tag(&self, tag: &CompiledTag, context: &RenderContext) -> HamletResult<String> {
		let mut merged = tag.attributes.clone();

		for entry in &tag.dynamic {
			match entry {
				AttributeEntry::Dynamic {
					name,
					value: DynamicValue::Expression(code),
				} => {
					let value = self.evaluator.evaluate(code, context)?;
					merge_value(&mut merged, name, &value);
				}
				AttributeEntry::Dynamic {
					name,
					value: DynamicValue::Interpolated(segments),
				} => {
					let text = self.interpolate(segments, false, context)?;
					merged.merge(name, text.into());
				}
				AttributeEntry::Splat(code) => {
					let value = self.evaluator.evaluate(code, context)?;
					if value.kind() != ValueKind::Map {
						return Err(HamletError::evaluation(format!(
							"attributes `{code}` must evaluate to a map"
						)));
					}

					let keys = value.try_iter().map_err(evaluation_error)?;
					for key in keys {
						let item = value
							.get_item(&key)
							.map_err(evaluation_error)?;
						let name = key.as_str().map_or_else(|| key.to_string(), ToString::to_string);
						merge_value(&mut merged, &name, &item);
					}
				}
				AttributeEntry::Shorthand { name, value } => merged.merge(name, value.as_str().into()),
				AttributeEntry::Static { name, value } => merged.merge(name, value.clone()),
			}
		}

		let mut open = format!("<{}", tag.name);
		merged.write_html(
			&mut open,
			self.template.settings.attr_wrapper,
			self.template.settings.escape_attrs,
		);

		Ok(open)
	}

	fn output(&self, code: &str, escape: bool, context: &RenderContext) -> HamletResult<String> {
		let value = self.evaluator.evaluate(code, context)?;
		let mut text = display(&value);
		if text.ends_with('\n') {
			text.pop();
		}

		Ok(escaped(text, escape && !value.is_safe()))
	}

	fn interpolate(
		&self,
		segments: &[Segment],
		escape: bool,
		context: &RenderContext,
	) -> HamletResult<String> {
		let mut text = String::new();

		for segment in segments {
			match segment {
				Segment::Literal(literal) => text.push_str(literal),
				Segment::Expression(code) => {
					let value = self.evaluator.evaluate(code, context)?;
					text.push_str(&escaped(display(&value), escape && !value.is_safe()));
				}
			}
		}

		Ok(text)
	}
}

/// Merge an evaluated attribute. `none` drops a previously set value, except
/// for `class` and `id` which only accumulate.
fn merge_value(merged: &mut AttributeSet, name: &str, value: &Value) {
	match attributes::from_value(name, value) {
		Some(value) => merged.merge(name, value),
		None if name != "class" && name != "id" => merged.remove(name),
		None => {}
	}
}

fn display(value: &Value) -> String {
	if value.is_none() || value.is_undefined() {
		String::new()
	} else {
		value.to_string()
	}
}

fn escaped(text: String, escape: bool) -> String {
	if escape {
		html_escape::encode_quoted_attribute(&text).into_owned()
	} else {
		text
	}
}
