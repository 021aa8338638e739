use crate::HamletError;
use crate::HamletResult;
use crate::IndentUnit;
use crate::attributes;
use crate::attributes::AttributeEntry;
use crate::lexer::Lexer;
use crate::lexer::Sigil;
use crate::lexer::SourceLine;
use crate::tokens;

/// How the value of an output script is escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EscapeMode {
	/// `=`: follows `CompilerOptions::escape_html`.
	Default,
	/// `&=`
	Always,
	/// `!=`
	Never,
}

/// Content written on the same line as its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InlineContent {
	Text(String),
	Output { code: String, escape: EscapeMode },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
	pub name: String,
	pub attributes: Vec<AttributeEntry>,
	/// Trailing `/`.
	pub self_closing: bool,
	/// `>`: remove whitespace around the tag.
	pub nuke_outer: bool,
	/// `<`: remove whitespace inside the tag.
	pub nuke_inner: bool,
	pub content: Option<InlineContent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Comment {
	/// `[if IE]` of a conditional comment, without the brackets.
	pub condition: Option<String>,
	pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
	Tag(Tag),
	Text(String),
	SilentScript(String),
	Output { code: String, escape: EscapeMode },
	Comment(Comment),
	SilentComment,
	Filter { name: String, body: String },
	Doctype(String),
}

impl NodeKind {
	/// Why nothing may be nested under this node, if that's the case.
	fn nesting_error(&self) -> Option<&'static str> {
		match self {
			Self::Text(_) => Some("nesting within plain text is illegal"),
			Self::Output { .. } => Some("nesting within an output line is illegal"),
			Self::Doctype(_) => Some("nesting within a header command is illegal"),
			Self::Tag(Tag { content: Some(_), .. }) => {
				Some("content can't be both given on the same line as the tag and nested within it")
			}
			Self::Tag(Tag {
				self_closing: true, ..
			}) => Some("nesting within a self-closing tag is illegal"),
			Self::Comment(Comment { text: Some(_), .. }) => {
				Some("content can't be both given on the same line as the comment and nested within it")
			}
			Self::Filter { .. } | Self::SilentComment => Some("nesting within a raw block is illegal"),
			_ => None,
		}
	}
}

/// A template line and the lines nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
	pub kind: NodeKind,
	/// 1-indexed line number.
	pub line: usize,
	pub children: Vec<Node>,
}

impl Node {
	fn new(kind: NodeKind, line: usize) -> Self {
		Self {
			kind,
			line,
			children: Vec::new(),
		}
	}
}

/// Parse template source into a forest of nodes, one root per unindented
/// line.
pub(crate) fn parse(source: &str, unit: IndentUnit) -> HamletResult<Vec<Node>> {
	let mut lexer = Lexer::new(source, unit);
	let mut builder = TreeBuilder::default();

	while let Some(line) = lexer.next_line() {
		let line = line?;
		tracing::trace!(line = line.number(), depth = line.depth, sigil = ?line.sigil, "scanned line");

		builder.descend_to(line.depth, line.number())?;
		let node = parse_line(&line, &mut lexer)?;
		builder.push(node);
	}

	Ok(builder.finish())
}

/// Keeps the chain of open nodes from the root to the latest line.
#[derive(Debug, Default)]
struct TreeBuilder {
	roots: Vec<Node>,
	open: Vec<Node>,
}

impl TreeBuilder {
	/// Close open nodes until a line at `depth` can be attached.
	fn descend_to(&mut self, depth: usize, line: usize) -> HamletResult<()> {
		if depth > self.open.len() {
			let message = if self.open.is_empty() {
				"indenting at the beginning of the document is illegal".to_string()
			} else {
				format!(
					"the line was indented {} levels deeper than the previous line",
					depth + 1 - self.open.len()
				)
			};

			return Err(HamletError::InconsistentIndentation { line, message });
		}

		while self.open.len() > depth {
			self.close();
		}

		if let Some(parent) = self.open.last() {
			if let Some(message) = parent.kind.nesting_error() {
				return Err(HamletError::IllegalNesting {
					line,
					message: message.to_string(),
				});
			}
		}

		Ok(())
	}

	fn push(&mut self, node: Node) {
		self.open.push(node);
	}

	fn close(&mut self) {
		let Some(node) = self.open.pop() else {
			return;
		};

		match self.open.last_mut() {
			Some(parent) => parent.children.push(node),
			None => self.roots.push(node),
		}
	}

	fn finish(mut self) -> Vec<Node> {
		while !self.open.is_empty() {
			self.close();
		}

		self.roots
	}
}

fn parse_line(line: &SourceLine<'_>, lexer: &mut Lexer<'_>) -> HamletResult<Node> {
	let number = line.number();
	let text = line.text;

	let kind = match line.sigil {
		Sigil::Tag | Sigil::Class | Sigil::Id => NodeKind::Tag(parse_tag(text, number, lexer)?),
		Sigil::Output => output(&text[1..], EscapeMode::Default),
		Sigil::EscapedOutput => output(&text[2..], EscapeMode::Always),
		Sigil::UnescapedOutput => output(&text[2..], EscapeMode::Never),
		Sigil::SilentScript => NodeKind::SilentScript(text[1..].trim().to_string()),
		Sigil::SilentComment => {
			lexer.skip_block(line.depth);
			NodeKind::SilentComment
		}
		Sigil::Doctype => NodeKind::Doctype(text[3..].trim().to_string()),
		Sigil::Comment => NodeKind::Comment(parse_comment(text[1..].trim())),
		Sigil::Filter => {
			let name = &text[1..];
			if name.is_empty() || !name.chars().all(is_filter_char) {
				return Err(HamletError::InvalidFilterName {
					line: number,
					name: name.to_string(),
				});
			}

			let body = lexer.take_block(line.depth)?.join("\n");
			NodeKind::Filter {
				name: name.to_string(),
				body,
			}
		}
		Sigil::Escape => NodeKind::Text(text[1..].to_string()),
		Sigil::Plain => NodeKind::Text(text.to_string()),
	};

	Ok(Node::new(kind, number))
}

fn output(code: &str, escape: EscapeMode) -> NodeKind {
	NodeKind::Output {
		code: code.trim().to_string(),
		escape,
	}
}

fn parse_comment(rest: &str) -> Comment {
	if let Some(condition) = rest.strip_prefix('[') {
		if let Some(end) = condition.find(']') {
			let text = condition[end + 1..].trim();
			return Comment {
				condition: Some(condition[..end].to_string()),
				text: (!text.is_empty()).then(|| text.to_string()),
			};
		}
	}

	Comment {
		condition: None,
		text: (!rest.is_empty()).then(|| rest.to_string()),
	}
}

fn is_filter_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-')
}

fn is_tag_name_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | ':')
}

fn is_shorthand_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-')
}

/// Reads a tag line left to right. Owns its text so that a multi-line
/// attribute hash can pull in continuation lines.
struct TagCursor<'l, 'a> {
	text: String,
	pos: usize,
	line: usize,
	lexer: &'l mut Lexer<'a>,
}

impl TagCursor<'_, '_> {
	fn rest(&self) -> &str {
		&self.text[self.pos..]
	}

	fn peek(&self) -> Option<char> {
		self.rest().chars().next()
	}

	fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
		let length = self
			.rest()
			.find(|ch: char| !predicate(ch))
			.unwrap_or(self.rest().len());
		let taken = self.rest()[..length].to_string();
		self.pos += length;
		taken
	}

	/// Take the bracketed source starting at the cursor, returning its
	/// contents without the brackets. An attribute hash may continue onto
	/// following lines.
	fn take_bracketed(&mut self, continues: bool) -> HamletResult<String> {
		loop {
			if let Some(close) = tokens::find_closing(self.rest()) {
				let inner = self.rest()[1..close].to_string();
				self.pos += close + 1;
				return Ok(inner);
			}

			let next = if continues {
				self.lexer.next_raw()
			} else {
				None
			};

			let Some((_, continuation)) = next else {
				return Err(HamletError::AttributeSyntax {
					line: self.line,
					message: "unbalanced brackets".to_string(),
				});
			};

			self.text.push(' ');
			self.text.push_str(continuation);
		}
	}
}

fn parse_tag(text: &str, line: usize, lexer: &mut Lexer<'_>) -> HamletResult<Tag> {
	let mut cursor = TagCursor {
		text: text.to_string(),
		pos: 0,
		line,
		lexer,
	};

	let name = if cursor.peek() == Some('%') {
		cursor.pos += 1;
		let name = cursor.take_while(is_tag_name_char);
		if name.is_empty() {
			return Err(HamletError::InvalidTag {
				line,
				tag: text.to_string(),
			});
		}
		name
	} else {
		"div".to_string()
	};

	let mut attributes = Vec::new();

	while let Some(sigil @ ('.' | '#')) = cursor.peek() {
		cursor.pos += 1;
		let value = cursor.take_while(is_shorthand_char);
		if value.is_empty() {
			return Err(HamletError::UnknownShorthand { line, sigil });
		}

		attributes.push(AttributeEntry::Shorthand {
			name: if sigil == '.' { "class" } else { "id" },
			value,
		});
	}

	loop {
		match cursor.peek() {
			Some('{') => {
				let inner = cursor.take_bracketed(true)?;
				attributes.extend(attributes::parse_hash(&inner, line)?);
			}
			Some('(') => {
				let inner = cursor.take_bracketed(false)?;
				attributes.extend(attributes::parse_html(&inner, line)?);
			}
			_ => break,
		}
	}

	let mut tag = Tag {
		name,
		attributes,
		self_closing: false,
		nuke_outer: false,
		nuke_inner: false,
		content: None,
	};

	while let Some(modifier @ ('<' | '>' | '/')) = cursor.peek() {
		cursor.pos += 1;
		match modifier {
			'<' => tag.nuke_inner = true,
			'>' => tag.nuke_outer = true,
			_ => tag.self_closing = true,
		}
	}

	let rest = cursor.rest();
	tag.content = if let Some(code) = rest.strip_prefix("!=") {
		Some(inline_output(code, EscapeMode::Never))
	} else if let Some(code) = rest.strip_prefix("&=") {
		Some(inline_output(code, EscapeMode::Always))
	} else if let Some(code) = rest.strip_prefix('=') {
		Some(inline_output(code, EscapeMode::Default))
	} else if rest.is_empty() {
		None
	} else if rest.starts_with([' ', '\t']) {
		let content = rest.trim();
		(!content.is_empty()).then(|| InlineContent::Text(content.to_string()))
	} else {
		return Err(HamletError::InvalidTag {
			line,
			tag: cursor.text.clone(),
		});
	};

	if tag.self_closing && tag.content.is_some() {
		return Err(HamletError::IllegalNesting {
			line,
			message: "self-closing tags can't have content".to_string(),
		});
	}

	Ok(tag)
}

fn inline_output(code: &str, escape: EscapeMode) -> InlineContent {
	InlineContent::Output {
		code: code.trim().to_string(),
		escape,
	}
}
