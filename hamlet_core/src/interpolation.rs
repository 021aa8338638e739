use crate::HamletError;
use crate::HamletResult;

/// A piece of interpolated text: either literal markup or an expression to
/// evaluate and insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
	Literal(String),
	Expression(String),
}

/// Returns true when `text` contains an unescaped `#{` marker.
pub(crate) fn has_interpolation(text: &str) -> bool {
	text.match_indices("#{")
		.any(|(offset, _)| !text[..offset].ends_with('\\'))
}

/// Split `text` into alternating literal and expression segments. `\#{`
/// produces a literal `#{`.
pub(crate) fn split(text: &str, line: usize) -> HamletResult<Vec<Segment>> {
	let mut segments = Vec::new();
	let mut literal = String::new();
	let mut rest = text;

	while let Some(offset) = rest.find("#{") {
		if rest[..offset].ends_with('\\') {
			literal.push_str(&rest[..offset - 1]);
			literal.push_str("#{");
			rest = &rest[offset + 2..];
			continue;
		}

		literal.push_str(&rest[..offset]);
		let body = &rest[offset + 2..];
		let end = closing_brace(body).ok_or(HamletError::UnterminatedInterpolation { line })?;

		if !literal.is_empty() {
			segments.push(Segment::Literal(std::mem::take(&mut literal)));
		}

		segments.push(Segment::Expression(body[..end].trim().to_string()));
		rest = &body[end + 1..];
	}

	literal.push_str(rest);

	if !literal.is_empty() {
		segments.push(Segment::Literal(literal));
	}

	Ok(segments)
}

/// Byte offset of the `}` closing an interpolation body, skipping nested
/// braces and quoted strings.
fn closing_brace(body: &str) -> Option<usize> {
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	let mut escaped = false;

	for (offset, ch) in body.char_indices() {
		if let Some(open) = quote {
			if escaped {
				escaped = false;
			} else if ch == '\\' {
				escaped = true;
			} else if ch == open {
				quote = None;
			}
			continue;
		}

		match ch {
			'\'' | '"' => quote = Some(ch),
			'{' => depth += 1,
			'}' if depth == 0 => return Some(offset),
			'}' => depth -= 1,
			_ => {}
		}
	}

	None
}
