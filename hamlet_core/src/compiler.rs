use std::sync::Arc;

use crate::AttributeSet;
use crate::AttributeValue;
use crate::CompilerOptions;
use crate::Filter;
use crate::Format;
use crate::HamletError;
use crate::HamletResult;
use crate::attributes::AttributeEntry;
use crate::attributes::DynamicValue;
use crate::interpolation;
use crate::interpolation::Segment;
use crate::parser::Comment;
use crate::parser::EscapeMode;
use crate::parser::InlineContent;
use crate::parser::Node;
use crate::parser::NodeKind;
use crate::parser::Tag;

/// A tag with its attributes resolved as far as possible at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledTag {
	pub name: String,
	/// Shorthand and literal attributes, already merged.
	pub attributes: AttributeSet,
	/// Attributes evaluated at render time, merged over `attributes` in
	/// order.
	pub dynamic: Vec<AttributeEntry>,
	pub nuke_outer: bool,
	pub nuke_inner: bool,
}

/// What goes between the tags of an element rendered on a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ElementContent {
	Empty,
	SelfClosing,
	Text(String),
	Interpolated { segments: Vec<Segment>, escape: bool },
	Output { code: String, escape: bool },
}

/// One step of a compiled template. `depth` is the output nesting level and
/// `line` the 1-indexed template line errors are attributed to.
#[derive(Debug, Clone)]
pub(crate) enum Instruction {
	Text {
		depth: usize,
		text: String,
	},
	Interpolated {
		depth: usize,
		segments: Vec<Segment>,
		escape: bool,
		line: usize,
	},
	Output {
		depth: usize,
		code: String,
		escape: bool,
		line: usize,
	},
	/// An element without nested lines.
	Element {
		depth: usize,
		tag: CompiledTag,
		content: ElementContent,
		line: usize,
	},
	Open {
		depth: usize,
		tag: CompiledTag,
		line: usize,
	},
	Close {
		depth: usize,
		name: String,
		nuke_inner: bool,
		nuke_outer: bool,
	},
	/// A silent script and the instructions nested under it.
	Script {
		code: String,
		line: usize,
		body: Vec<Instruction>,
	},
	Filter {
		depth: usize,
		name: String,
		filter: Arc<dyn Filter>,
		text: String,
		line: usize,
	},
}

impl Instruction {
	pub(crate) fn line(&self) -> Option<usize> {
		match self {
			Self::Interpolated { line, .. }
			| Self::Output { line, .. }
			| Self::Element { line, .. }
			| Self::Open { line, .. }
			| Self::Script { line, .. }
			| Self::Filter { line, .. } => Some(*line),
			Self::Text { .. } | Self::Close { .. } => None,
		}
	}
}

/// Literal text, or text with `#{}` expressions left to evaluate.
enum TextParts {
	Static(String),
	Dynamic(Vec<Segment>),
}

pub(crate) fn compile_nodes(
	nodes: &[Node],
	options: &CompilerOptions,
) -> HamletResult<Vec<Instruction>> {
	let compiler = Compiler { options };
	let mut instructions = Vec::new();
	compiler.nodes(nodes, 0, &mut instructions)?;

	Ok(instructions)
}

struct Compiler<'o> {
	options: &'o CompilerOptions,
}

impl Compiler<'_> {
	fn nodes(&self, nodes: &[Node], depth: usize, out: &mut Vec<Instruction>) -> HamletResult<()> {
		for node in nodes {
			self.node(node, depth, out)?;
		}

		Ok(())
	}

	fn node(&self, node: &Node, depth: usize, out: &mut Vec<Instruction>) -> HamletResult<()> {
		let line = node.line;

		match &node.kind {
			NodeKind::Tag(tag) => self.tag(tag, node, depth, out)?,
			NodeKind::Text(text) => out.push(self.text_line(text, depth, line)?),
			NodeKind::Output { .. } if self.options.suppress_eval => {}
			NodeKind::Output { code, escape } => {
				out.push(Instruction::Output {
					depth,
					code: code.clone(),
					escape: self.escapes(*escape),
					line,
				});
			}
			NodeKind::SilentScript(_) if self.options.suppress_eval => {
				self.nodes(&node.children, depth, out)?;
			}
			NodeKind::SilentScript(code) => {
				let mut body = Vec::new();
				self.nodes(&node.children, depth, &mut body)?;
				out.push(Instruction::Script {
					code: code.clone(),
					line,
					body,
				});
			}
			NodeKind::Comment(comment) => self.comment(comment, node, depth, out)?,
			NodeKind::SilentComment => {}
			NodeKind::Filter { name, body } => {
				let filter = self
					.options
					.filters
					.get(name)
					.cloned()
					.ok_or_else(|| HamletError::UnknownFilter {
						line,
						name: name.clone(),
					})?;

				out.push(Instruction::Filter {
					depth,
					name: name.clone(),
					filter,
					text: body.clone(),
					line,
				});
			}
			NodeKind::Doctype(argument) => {
				if let Some(text) = doctype(argument, self.options) {
					out.push(Instruction::Text { depth, text });
				}
			}
		}

		Ok(())
	}

	fn escapes(&self, mode: EscapeMode) -> bool {
		match mode {
			EscapeMode::Default => self.options.escape_html,
			EscapeMode::Always => true,
			EscapeMode::Never => false,
		}
	}

	fn text_parts(&self, text: &str, line: usize) -> HamletResult<TextParts> {
		if !text.contains("#{") {
			return Ok(TextParts::Static(text.to_string()));
		}

		let segments = interpolation::split(text, line)?;
		let evaluates = !self.options.suppress_eval
			&& segments
				.iter()
				.any(|segment| matches!(segment, Segment::Expression(_)));

		if evaluates {
			return Ok(TextParts::Dynamic(segments));
		}

		let literal = segments
			.into_iter()
			.filter_map(|segment| {
				match segment {
					Segment::Literal(text) => Some(text),
					Segment::Expression(_) => None,
				}
			})
			.collect();

		Ok(TextParts::Static(literal))
	}

	fn text_line(&self, text: &str, depth: usize, line: usize) -> HamletResult<Instruction> {
		Ok(match self.text_parts(text, line)? {
			TextParts::Static(text) => Instruction::Text { depth, text },
			TextParts::Dynamic(segments) => {
				Instruction::Interpolated {
					depth,
					segments,
					escape: self.options.escape_html,
					line,
				}
			}
		})
	}

	fn compile_tag(&self, tag: &Tag, line: usize) -> HamletResult<CompiledTag> {
		let mut attributes = AttributeSet::new();
		let mut dynamic = Vec::new();

		for entry in &tag.attributes {
			match entry {
				AttributeEntry::Shorthand { name, value } => {
					attributes.merge(name, AttributeValue::Text(value.clone()));
				}
				AttributeEntry::Static { name, value } => attributes.merge(name, value.clone()),
				entry if entry.is_dynamic() && !self.options.suppress_eval => {
					self.check_attribute(entry, line)?;
					dynamic.push(entry.clone());
				}
				_ => {}
			}
		}

		Ok(CompiledTag {
			name: tag.name.clone(),
			attributes,
			dynamic,
			nuke_outer: tag.nuke_outer,
			nuke_inner: tag.nuke_inner,
		})
	}

	/// Reject attribute expressions the evaluator can't parse.
	fn check_attribute(&self, entry: &AttributeEntry, line: usize) -> HamletResult<()> {
		let Some(checker) = &self.options.syntax_check else {
			return Ok(());
		};

		let expressions: Vec<&str> = match entry {
			AttributeEntry::Dynamic {
				value: DynamicValue::Expression(code),
				..
			}
			| AttributeEntry::Splat(code) => vec![code.as_str()],
			AttributeEntry::Dynamic {
				value: DynamicValue::Interpolated(segments),
				..
			} => {
				segments
					.iter()
					.filter_map(|segment| {
						match segment {
							Segment::Expression(code) => Some(code.as_str()),
							Segment::Literal(_) => None,
						}
					})
					.collect()
			}
			AttributeEntry::Shorthand { .. } | AttributeEntry::Static { .. } => Vec::new(),
		};

		for code in expressions {
			checker
				.check(code)
				.map_err(|reason| HamletError::AttributeSyntax {
					line,
					message: format!("invalid expression `{code}`: {reason}"),
				})?;
		}

		Ok(())
	}

	fn tag(&self, tag: &Tag, node: &Node, depth: usize, out: &mut Vec<Instruction>) -> HamletResult<()> {
		let line = node.line;
		let compiled = self.compile_tag(tag, line)?;

		if node.children.is_empty() {
			let content = match &tag.content {
				None if tag.self_closing || self.options.is_autoclose(&tag.name) => {
					ElementContent::SelfClosing
				}
				None => ElementContent::Empty,
				Some(InlineContent::Text(text)) => {
					match self.text_parts(text, line)? {
						TextParts::Static(text) => ElementContent::Text(text),
						TextParts::Dynamic(segments) => {
							ElementContent::Interpolated {
								segments,
								escape: self.options.escape_html,
							}
						}
					}
				}
				Some(InlineContent::Output { .. }) if self.options.suppress_eval => {
					ElementContent::Empty
				}
				Some(InlineContent::Output { code, escape }) => {
					ElementContent::Output {
						code: code.clone(),
						escape: self.escapes(*escape),
					}
				}
			};

			out.push(Instruction::Element {
				depth,
				tag: compiled,
				content,
				line,
			});

			return Ok(());
		}

		let close = Instruction::Close {
			depth,
			name: compiled.name.clone(),
			nuke_inner: compiled.nuke_inner,
			nuke_outer: compiled.nuke_outer,
		};
		let child_depth = if tag.nuke_inner { depth } else { depth + 1 };

		out.push(Instruction::Open {
			depth,
			tag: compiled,
			line,
		});
		self.nodes(&node.children, child_depth, out)?;
		out.push(close);

		Ok(())
	}

	fn comment(
		&self,
		comment: &Comment,
		node: &Node,
		depth: usize,
		out: &mut Vec<Instruction>,
	) -> HamletResult<()> {
		let (open, close) = match &comment.condition {
			Some(condition) => (format!("<!--[{condition}]>"), "<![endif]-->"),
			None => ("<!--".to_string(), "-->"),
		};

		if let Some(text) = &comment.text {
			out.push(Instruction::Text {
				depth,
				text: format!("{open} {text} {close}"),
			});
			return Ok(());
		}

		out.push(Instruction::Text { depth, text: open });
		self.nodes(&node.children, depth + 1, out)?;
		out.push(Instruction::Text {
			depth,
			text: close.to_string(),
		});

		Ok(())
	}
}

/// The header line written for `!!! <argument>`, if the format has one.
fn doctype(argument: &str, options: &CompilerOptions) -> Option<String> {
	let mut words = argument.split_whitespace();
	let kind = words.next().unwrap_or("").to_ascii_lowercase();

	if kind == "xml" {
		if options.format.is_html() {
			return None;
		}

		let encoding = words.next().unwrap_or("utf-8");
		let q = options.attr_wrapper;
		return Some(format!("<?xml version={q}1.0{q} encoding={q}{encoding}{q} ?>"));
	}

	let public = |identifier: &str, url: &str| format!(r#"<!DOCTYPE html PUBLIC "{identifier}" "{url}">"#);

	let text = match options.format {
		Format::Html5 => "<!DOCTYPE html>".to_string(),
		Format::Html4 => {
			match kind.as_str() {
				"strict" => {
					public(
						"-//W3C//DTD HTML 4.01//EN",
						"http://www.w3.org/TR/html4/strict.dtd",
					)
				}
				"frameset" => {
					public(
						"-//W3C//DTD HTML 4.01 Frameset//EN",
						"http://www.w3.org/TR/html4/frameset.dtd",
					)
				}
				_ => {
					public(
						"-//W3C//DTD HTML 4.01 Transitional//EN",
						"http://www.w3.org/TR/html4/loose.dtd",
					)
				}
			}
		}
		Format::Xhtml => {
			match kind.as_str() {
				"5" => "<!DOCTYPE html>".to_string(),
				"strict" => {
					public(
						"-//W3C//DTD XHTML 1.0 Strict//EN",
						"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd",
					)
				}
				"frameset" => {
					public(
						"-//W3C//DTD XHTML 1.0 Frameset//EN",
						"http://www.w3.org/TR/xhtml1/DTD/xhtml1-frameset.dtd",
					)
				}
				"1.1" => {
					public(
						"-//W3C//DTD XHTML 1.1//EN",
						"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd",
					)
				}
				"basic" => {
					public(
						"-//W3C//DTD XHTML Basic 1.1//EN",
						"http://www.w3.org/TR/xhtml-basic/xhtml-basic11.dtd",
					)
				}
				"mobile" => {
					public(
						"-//WAPFORUM//DTD XHTML Mobile 1.2//EN",
						"http://www.openmobilealliance.org/tech/DTD/xhtml-mobile12.dtd",
					)
				}
				_ => {
					public(
						"-//W3C//DTD XHTML 1.0 Transitional//EN",
						"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd",
					)
				}
			}
		}
	};

	Some(text)
}
