use std::borrow::Cow;

use indexmap::IndexMap;
use minijinja::Value;
use minijinja::value::ValueKind;

use crate::HamletError;
use crate::HamletResult;
use crate::interpolation;
use crate::interpolation::Segment;
use crate::tokens;
use crate::tokens::Literal;
use crate::tokens::RawToken;
use crate::tokens::Spanned;

/// A computed attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
	Text(String),
	/// Rendered as the bare attribute name when `true`, omitted when `false`.
	Bool(bool),
}

impl From<&str> for AttributeValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<String> for AttributeValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}

impl From<bool> for AttributeValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// The ordered attributes of one tag.
///
/// `class` values accumulate space separated with duplicates removed, `id`
/// values accumulate joined with `-`, and every other name keeps the value
/// merged last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
	entries: IndexMap<String, AttributeValue>,
}

impl AttributeSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Merge one attribute into the set.
	pub fn merge(&mut self, name: &str, value: AttributeValue) {
		match (name, value) {
			("class", AttributeValue::Text(value)) => self.merge_class(&value),
			("id", AttributeValue::Text(value)) => self.merge_id(&value),
			// Boolean classes and ids carry no name to add.
			("class" | "id", AttributeValue::Bool(_)) => {}
			(name, value) => {
				self.entries.insert(name.to_string(), value);
			}
		}
	}

	/// Drop an attribute, as a dynamic `nil` does for last-writer-wins keys.
	pub fn remove(&mut self, name: &str) {
		self.entries.shift_remove(name);
	}

	pub fn get(&self, name: &str) -> Option<&AttributeValue> {
		self.entries.get(name)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
		self.entries
			.iter()
			.map(|(name, value)| (name.as_str(), value))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn merge_class(&mut self, value: &str) {
		let mut tokens: Vec<&str> = match self.entries.get("class") {
			Some(AttributeValue::Text(existing)) => existing.split_whitespace().collect(),
			_ => Vec::new(),
		};

		for token in value.split_whitespace() {
			if !tokens.contains(&token) {
				tokens.push(token);
			}
		}

		if tokens.is_empty() {
			return;
		}

		let joined = tokens.join(" ");
		self.entries
			.insert("class".to_string(), AttributeValue::Text(joined));
	}

	fn merge_id(&mut self, value: &str) {
		if value.is_empty() {
			return;
		}

		let joined = match self.entries.get("id") {
			Some(AttributeValue::Text(existing)) if !existing.is_empty() => {
				format!("{existing}-{value}")
			}
			_ => value.to_string(),
		};

		self.entries
			.insert("id".to_string(), AttributeValue::Text(joined));
	}

	/// Write the attributes as ` name='value'` pairs.
	pub(crate) fn write_html(&self, out: &mut String, wrapper: char, escape: bool) {
		for (name, value) in &self.entries {
			match value {
				AttributeValue::Bool(false) => {}
				AttributeValue::Bool(true) => {
					out.push(' ');
					out.push_str(name);
				}
				AttributeValue::Text(text) => {
					let text: Cow<'_, str> = if escape {
						html_escape::encode_quoted_attribute(text)
					} else {
						Cow::Borrowed(text)
					};
					let quote = if text.contains(wrapper) {
						if wrapper == '"' { '\'' } else { '"' }
					} else {
						wrapper
					};

					out.push(' ');
					out.push_str(name);
					out.push('=');
					out.push(quote);
					out.push_str(&text);
					out.push(quote);
				}
			}
		}
	}
}

/// A value that is only known at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DynamicValue {
	Expression(String),
	Interpolated(Vec<Segment>),
}

/// One attribute as written in the template, before merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttributeEntry {
	/// `.class` / `#id` shorthand.
	Shorthand { name: &'static str, value: String },
	Static { name: String, value: AttributeValue },
	Dynamic { name: String, value: DynamicValue },
	/// An expression that evaluates to a whole map of attributes.
	Splat(String),
}

impl AttributeEntry {
	pub(crate) fn is_dynamic(&self) -> bool {
		matches!(self, Self::Dynamic { .. } | Self::Splat(_))
	}
}

/// Parse the inside of a `{…}` attribute hash. Accepts `:key => value`,
/// `'key' => value`, `key: value` and `"key": value` entries; an entry with no
/// key is an expression expected to produce a map.
pub(crate) fn parse_hash(source: &str, line: usize) -> HamletResult<Vec<AttributeEntry>> {
	let tokens = tokens::tokenize(source);
	let mut entries = Vec::new();

	for part in tokens::split_top_level(&tokens) {
		let part = tokens::trim(part);
		if part.is_empty() {
			continue;
		}

		let entry = match hash_key(source, part, line)? {
			Some((name, rest)) => {
				let rest = tokens::trim(&rest);
				if rest.is_empty() {
					return Err(HamletError::AttributeSyntax {
						line,
						message: format!("missing value for `{name}`"),
					});
				}
				value_entry(name, source, rest, line)?
			}
			None => Some(AttributeEntry::Splat(tokens::slice(source, part).to_string())),
		};

		entries.extend(entry);
	}

	Ok(entries)
}

/// Split a hash entry into its key and the tokens of its value.
fn hash_key(
	source: &str,
	part: &[Spanned],
	line: usize,
) -> HamletResult<Option<(String, Vec<Spanned>)>> {
	let first = &part[0];
	let text = &source[first.span.clone()];
	let second = part.get(1);

	// `key: value`, `"key": value` and `key:value`, where the value lexes as a
	// symbol
	if second.is_some_and(|token| token.is(RawToken::Colon) || token.is(RawToken::Symbol)) {
		let key = match first.kind {
			Some(RawToken::Ident) => Some(text.to_string()),
			Some(RawToken::SingleQuotedString | RawToken::DoubleQuotedString) => {
				Some(unquote_key(text, line)?)
			}
			_ => None,
		};

		if let (Some(key), Some(second)) = (key, second) {
			if second.is(RawToken::Colon) {
				return Ok(Some((key, part[2..].to_vec())));
			}

			let mut value = vec![Spanned {
				kind: Some(RawToken::Ident),
				span: second.span.start + 1..second.span.end,
			}];
			value.extend_from_slice(&part[2..]);
			return Ok(Some((key, value)));
		}
	}

	// `:key => value` and `'key' => value`
	let after = tokens::trim(&part[1..]);
	if after.first().is_some_and(|token| token.is(RawToken::HashRocket)) {
		let key = match first.kind {
			Some(RawToken::Symbol) => text[1..].to_string(),
			Some(RawToken::SingleQuotedString | RawToken::DoubleQuotedString) => {
				unquote_key(text, line)?
			}
			_ => {
				return Err(HamletError::AttributeSyntax {
					line,
					message: format!("attribute names must be symbols or strings, found `{text}`"),
				});
			}
		};

		return Ok(Some((key, after[1..].to_vec())));
	}

	Ok(None)
}

fn unquote_key(text: &str, line: usize) -> HamletResult<String> {
	tokens::unquote(text).map_err(|message| HamletError::AttributeSyntax { line, message })
}

/// Classify the value tokens of a named attribute. Returns `None` for a
/// literal `nil`, which leaves the attribute out.
fn value_entry(
	name: String,
	source: &str,
	value: &[Spanned],
	line: usize,
) -> HamletResult<Option<AttributeEntry>> {
	if let [token] = value {
		if token.is(RawToken::DoubleQuotedString) {
			let text = &source[token.span.clone()];
			let inner = &text[1..text.len() - 1];

			if interpolation::has_interpolation(inner) {
				let segments = interpolated_segments(inner, line)?;
				return Ok(Some(AttributeEntry::Dynamic {
					name,
					value: DynamicValue::Interpolated(segments),
				}));
			}
		}

		if let Some(literal) = Literal::from_token(source, token) {
			let literal =
				literal.map_err(|message| HamletError::AttributeSyntax { line, message })?;
			let value = match literal {
				Literal::String(text) => AttributeValue::Text(text),
				Literal::Int(number) => AttributeValue::Text(number.to_string()),
				Literal::Float(number) => AttributeValue::Text(number.to_string()),
				Literal::Bool(flag) => AttributeValue::Bool(flag),
				Literal::Nil => return Ok(None),
			};

			return Ok(Some(AttributeEntry::Static { name, value }));
		}
	}

	Ok(Some(AttributeEntry::Dynamic {
		name,
		value: DynamicValue::Expression(tokens::slice(source, value).to_string()),
	}))
}

fn interpolated_segments(inner: &str, line: usize) -> HamletResult<Vec<Segment>> {
	interpolation::split(inner, line)?
		.into_iter()
		.map(|segment| {
			match segment {
				Segment::Literal(text) => {
					tokens::unescape_inner(&text)
						.map(Segment::Literal)
						.map_err(|message| HamletError::AttributeSyntax { line, message })
				}
				expression @ Segment::Expression(_) => Ok(expression),
			}
		})
		.collect()
}

/// Parse the inside of an HTML-style `(…)` attribute list:
/// `name="value"`, `name=expression` and bare `name` (a boolean).
pub(crate) fn parse_html(source: &str, line: usize) -> HamletResult<Vec<AttributeEntry>> {
	let tokens = tokens::tokenize(source);
	let mut entries = Vec::new();
	let mut index = 0;

	while index < tokens.len() {
		let token = &tokens[index];

		if token.is_whitespace() {
			index += 1;
			continue;
		}

		if !token.is(RawToken::Ident) {
			return Err(HamletError::AttributeSyntax {
				line,
				message: format!(
					"expected an attribute name, found `{}`",
					&source[token.span.clone()]
				),
			});
		}

		let name = source[token.span.clone()].to_string();
		index = skip_whitespace(&tokens, index + 1);

		if !tokens.get(index).is_some_and(|token| token.is(RawToken::Equals)) {
			entries.push(AttributeEntry::Static {
				name,
				value: AttributeValue::Bool(true),
			});
			continue;
		}

		index = skip_whitespace(&tokens, index + 1);
		let start = index;
		let mut depth = 0usize;

		while let Some(token) = tokens.get(index) {
			match token.kind {
				Some(RawToken::Whitespace) if depth == 0 => break,
				Some(RawToken::BraceOpen | RawToken::ParenOpen | RawToken::BracketOpen) => {
					depth += 1;
				}
				Some(RawToken::BraceClose | RawToken::ParenClose | RawToken::BracketClose) => {
					depth = depth.saturating_sub(1);
				}
				_ => {}
			}
			index += 1;
		}

		if start == index {
			return Err(HamletError::AttributeSyntax {
				line,
				message: format!("missing value for `{name}`"),
			});
		}

		entries.extend(value_entry(name, source, &tokens[start..index], line)?);
	}

	Ok(entries)
}

fn skip_whitespace(tokens: &[Spanned], mut index: usize) -> usize {
	while tokens.get(index).is_some_and(Spanned::is_whitespace) {
		index += 1;
	}
	index
}

/// Convert an evaluated value into an attribute value. `None` means the
/// attribute is left out.
pub(crate) fn from_value(name: &str, value: &Value) -> Option<AttributeValue> {
	if value.is_undefined() || value.is_none() {
		return None;
	}

	match value.kind() {
		ValueKind::Bool => Some(AttributeValue::Bool(value.is_true())),
		ValueKind::Seq | ValueKind::Iterable => {
			let separator = if name == "id" { "-" } else { " " };
			let items: Vec<String> = value
				.try_iter()
				.ok()?
				.filter(|item| !item.is_none() && !item.is_undefined())
				.map(|item| item.to_string())
				.collect();
			Some(AttributeValue::Text(items.join(separator)))
		}
		_ => Some(AttributeValue::Text(value.to_string())),
	}
}
