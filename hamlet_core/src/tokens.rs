use std::ops::Range;

use float_cmp::approx_eq;
use logos::Logos;
use snailquote::unescape;

/// Raw tokens produced by logos for the contents of an attribute list.
/// Characters without a token of their own lex as errors and are kept as
/// part of the surrounding expression.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawToken {
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[token("(")]
	ParenOpen,
	#[token(")")]
	ParenClose,
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token("=>")]
	HashRocket,
	#[token(",")]
	Comma,
	#[token(":")]
	Colon,
	#[token("=")]
	Equals,
	#[regex(r":[a-zA-Z_][a-zA-Z0-9_\-]*")]
	Symbol,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_\-]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
	#[regex(r"[ \t\r\n]+")]
	Whitespace,
}

impl RawToken {
	fn opens(self) -> bool {
		matches!(self, Self::BraceOpen | Self::ParenOpen | Self::BracketOpen)
	}

	fn closes(self) -> bool {
		matches!(self, Self::BraceClose | Self::ParenClose | Self::BracketClose)
	}
}

/// A token with its byte span. `kind` is `None` for characters logos has no
/// token for (operators, `@`, `.` and friends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
	pub kind: Option<RawToken>,
	pub span: Range<usize>,
}

impl Spanned {
	pub(crate) fn is(&self, kind: RawToken) -> bool {
		self.kind == Some(kind)
	}

	pub(crate) fn is_whitespace(&self) -> bool {
		self.is(RawToken::Whitespace)
	}
}

pub(crate) fn tokenize(source: &str) -> Vec<Spanned> {
	RawToken::lexer(source)
		.spanned()
		.map(|(kind, span)| {
			Spanned {
				kind: kind.ok(),
				span,
			}
		})
		.collect()
}

/// Find the byte offset of the bracket closing the one that opens `source`
/// (its first character). Quoted strings are skipped.
pub(crate) fn find_closing(source: &str) -> Option<usize> {
	let mut depth = 0usize;

	for token in tokenize(source) {
		let Some(kind) = token.kind else {
			continue;
		};

		if kind.opens() {
			depth += 1;
		} else if kind.closes() {
			depth = depth.checked_sub(1)?;
			if depth == 0 {
				return Some(token.span.start);
			}
		}
	}

	None
}

/// Split a token list on commas that are not nested inside brackets.
pub(crate) fn split_top_level(tokens: &[Spanned]) -> Vec<&[Spanned]> {
	let mut parts = Vec::new();
	let mut depth = 0usize;
	let mut start = 0;

	for (index, token) in tokens.iter().enumerate() {
		match token.kind {
			Some(kind) if kind.opens() => depth += 1,
			Some(kind) if kind.closes() => depth = depth.saturating_sub(1),
			Some(RawToken::Comma) if depth == 0 => {
				parts.push(&tokens[start..index]);
				start = index + 1;
			}
			_ => {}
		}
	}

	parts.push(&tokens[start..]);
	parts
}

/// Drop leading and trailing whitespace tokens.
pub(crate) fn trim(tokens: &[Spanned]) -> &[Spanned] {
	let start = tokens
		.iter()
		.position(|token| !token.is_whitespace())
		.unwrap_or(tokens.len());
	let end = tokens
		.iter()
		.rposition(|token| !token.is_whitespace())
		.map_or(start, |index| index + 1);

	&tokens[start..end]
}

/// The source text covered by a token run.
pub(crate) fn slice<'s>(source: &'s str, tokens: &[Spanned]) -> &'s str {
	match (tokens.first(), tokens.last()) {
		(Some(first), Some(last)) => &source[first.span.start..last.span.end],
		_ => "",
	}
}

/// A literal value appearing in an attribute list.
#[derive(Debug, Clone)]
pub(crate) enum Literal {
	String(String),
	Int(i64),
	Float(f64),
	Bool(bool),
	Nil,
}

impl Eq for Literal {}
impl PartialEq for Literal {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::String(value), Self::String(other_value)) => value == other_value,
			(Self::Int(value), Self::Int(other_value)) => value == other_value,
			(Self::Float(value), Self::Float(other_value)) => {
				approx_eq!(f64, *value, *other_value, ulps = 2)
			}
			(Self::Bool(value), Self::Bool(other_value)) => value == other_value,
			(Self::Nil, Self::Nil) => true,
			_ => false,
		}
	}
}

impl Literal {
	/// Read a single token as a literal, when it is one. Double quoted
	/// strings with interpolation are left to the caller.
	pub(crate) fn from_token(source: &str, token: &Spanned) -> Option<Result<Self, String>> {
		let text = &source[token.span.clone()];

		match token.kind? {
			RawToken::SingleQuotedString | RawToken::DoubleQuotedString => {
				Some(unquote(text).map(Self::String))
			}
			RawToken::Symbol => Some(Ok(Self::String(text[1..].to_string()))),
			RawToken::Number => {
				let is_float = text.contains(['.', 'e', 'E']);
				let parsed = if is_float {
					text.parse::<f64>().map(Self::Float).map_err(|e| e.to_string())
				} else {
					text.parse::<i64>().map(Self::Int).map_err(|e| e.to_string())
				};
				Some(parsed)
			}
			RawToken::Ident => {
				match text {
					"true" => Some(Ok(Self::Bool(true))),
					"false" => Some(Ok(Self::Bool(false))),
					"nil" | "none" | "None" => Some(Ok(Self::Nil)),
					_ => None,
				}
			}
			_ => None,
		}
	}
}

/// Strip the quotes from a string token and unescape its contents.
pub(crate) fn unquote(text: &str) -> Result<String, String> {
	let inner = &text[1..text.len() - 1];
	unescape_inner(inner)
}

pub(crate) fn unescape_inner(inner: &str) -> Result<String, String> {
	if inner.contains('\\') {
		unescape(inner).map_err(|e| e.to_string())
	} else {
		Ok(inner.to_string())
	}
}
