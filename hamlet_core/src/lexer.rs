use crate::HamletError;
use crate::HamletResult;
use crate::IndentUnit;

/// The leading character(s) of a template line, selecting its node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sigil {
	/// `%name`
	Tag,
	/// `.class`
	Class,
	/// `#id`
	Id,
	/// `= expr`
	Output,
	/// `&= expr`
	EscapedOutput,
	/// `!= expr`
	UnescapedOutput,
	/// `- code`
	SilentScript,
	/// `-# comment`
	SilentComment,
	/// `!!!`
	Doctype,
	/// `/ comment`
	Comment,
	/// `:filter`
	Filter,
	/// `\` followed by text that would otherwise be read as a sigil.
	Escape,
	Plain,
}

impl Sigil {
	pub(crate) fn classify(text: &str) -> Self {
		let bytes = text.as_bytes();
		let second = bytes.get(1).copied();

		match bytes.first() {
			Some(b'!') if text.starts_with("!!!") => Self::Doctype,
			Some(b'!') if second == Some(b'=') => Self::UnescapedOutput,
			Some(b'&') if second == Some(b'=') => Self::EscapedOutput,
			Some(b'-') if second == Some(b'#') => Self::SilentComment,
			Some(b'-') => Self::SilentScript,
			Some(b'=') => Self::Output,
			Some(b'%') => Self::Tag,
			Some(b'.') => Self::Class,
			// `#{…}` at the start of a line is interpolated text, not an id.
			Some(b'#') if second == Some(b'{') => Self::Plain,
			Some(b'#') => Self::Id,
			Some(b'/') => Self::Comment,
			Some(b':') => Self::Filter,
			Some(b'\\') => Self::Escape,
			_ => Self::Plain,
		}
	}
}

/// One classified, non-blank template line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceLine<'a> {
	/// 0-indexed physical line.
	pub index: usize,
	/// Nesting depth in indentation units.
	pub depth: usize,
	/// The line content after its indentation.
	pub text: &'a str,
	pub sigil: Sigil,
}

impl SourceLine<'_> {
	/// 1-indexed line number used in diagnostics.
	pub(crate) fn number(&self) -> usize {
		self.index + 1
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
	Tab,
	Spaces(usize),
}

impl Unit {
	fn describe(self) -> String {
		match self {
			Self::Tab => "tabs".to_string(),
			Self::Spaces(1) => "1 space".to_string(),
			Self::Spaces(n) => format!("{n} spaces"),
		}
	}
}

/// Tracks the document's indentation unit. The first indented line fixes it
/// unless the options preset one.
#[derive(Debug)]
struct Indentation {
	unit: Option<Unit>,
}

impl Indentation {
	fn new(preset: IndentUnit) -> Self {
		let unit = match preset {
			IndentUnit::Auto | IndentUnit::Spaces(0) => None,
			IndentUnit::Tab => Some(Unit::Tab),
			IndentUnit::Spaces(n) => Some(Unit::Spaces(n)),
		};

		Self { unit }
	}

	/// Convert leading whitespace into a depth.
	fn measure(&mut self, whitespace: &str, line: usize) -> HamletResult<usize> {
		if whitespace.is_empty() {
			return Ok(0);
		}

		let tabs = whitespace.bytes().filter(|byte| *byte == b'\t').count();
		let spaces = whitespace.len() - tabs;

		if tabs > 0 && spaces > 0 {
			return Err(HamletError::MixedIndentation { line });
		}

		let found = if tabs > 0 {
			Unit::Tab
		} else {
			Unit::Spaces(spaces)
		};

		match (self.unit, found) {
			(None, Unit::Tab) => {
				self.unit = Some(Unit::Tab);
				Ok(tabs)
			}
			(None, found) => {
				self.unit = Some(found);
				Ok(1)
			}
			(Some(Unit::Tab), Unit::Tab) => Ok(tabs),
			(Some(Unit::Spaces(unit)), Unit::Spaces(count)) => {
				if count % unit == 0 {
					Ok(count / unit)
				} else {
					Err(HamletError::IllegalIndentation {
						line,
						message: format!(
							"indentation of {count} spaces is not a multiple of the document's \
							 {unit}-space unit"
						),
					})
				}
			}
			(Some(expected), found) => {
				Err(HamletError::IllegalIndentation {
					line,
					message: format!(
						"the line was indented with {}, but the rest of the document was \
						 indented using {}",
						found.describe(),
						expected.describe()
					),
				})
			}
		}
	}
}

/// Splits template source into lines and hands them to the tree builder one
/// at a time, so raw blocks (filter bodies, silent comments) can be taken
/// without being classified.
#[derive(Debug)]
pub(crate) struct Lexer<'a> {
	lines: Vec<&'a str>,
	cursor: usize,
	indentation: Indentation,
}

impl<'a> Lexer<'a> {
	pub(crate) fn new(source: &'a str, unit: IndentUnit) -> Self {
		let lines = source
			.split('\n')
			.map(|line| line.strip_suffix('\r').unwrap_or(line))
			.collect();

		Self {
			lines,
			cursor: 0,
			indentation: Indentation::new(unit),
		}
	}

	/// The next non-blank line, classified and with its depth measured.
	pub(crate) fn next_line(&mut self) -> Option<HamletResult<SourceLine<'a>>> {
		while let Some(raw) = self.lines.get(self.cursor).copied() {
			let index = self.cursor;
			self.cursor += 1;

			if raw.trim().is_empty() {
				continue;
			}

			let text = raw.trim_start_matches([' ', '\t']);
			let whitespace = &raw[..raw.len() - text.len()];

			return Some(self.indentation.measure(whitespace, index + 1).map(|depth| {
				SourceLine {
					index,
					depth,
					text: text.trim_end(),
					sigil: Sigil::classify(text),
				}
			}));
		}

		None
	}

	/// The next physical line verbatim, used to continue a multi-line
	/// attribute hash. Returns the 0-indexed line and its trimmed text.
	pub(crate) fn next_raw(&mut self) -> Option<(usize, &'a str)> {
		let raw = self.lines.get(self.cursor).copied()?;
		let index = self.cursor;
		self.cursor += 1;

		Some((index, raw.trim()))
	}

	/// Take every following line nested deeper than `depth`, stripped of the
	/// block's indentation. Relative indentation and blank lines inside the
	/// block are preserved; trailing blank lines are dropped.
	pub(crate) fn take_block(&mut self, depth: usize) -> HamletResult<Vec<&'a str>> {
		let Some(first) = self.lines[self.cursor..]
			.iter()
			.position(|line| !line.trim().is_empty())
			.map(|offset| self.cursor + offset)
		else {
			return Ok(Vec::new());
		};

		let raw = self.lines[first];
		let text = raw.trim_start_matches([' ', '\t']);
		let prefix = &raw[..raw.len() - text.len()];

		if prefix.is_empty() {
			return Ok(Vec::new());
		}

		// Measuring the first body line establishes the unit when the block
		// is the first indented content in the document.
		let mut candidate = Indentation { unit: self.indentation.unit };
		let measured = candidate.measure(prefix, first + 1)?;

		if measured <= depth {
			return Ok(Vec::new());
		}

		if measured > depth + 1 {
			return Err(HamletError::InconsistentIndentation {
				line: first + 1,
				message: format!(
					"the line was indented {} levels deeper than the previous line",
					measured - depth
				),
			});
		}

		self.indentation.unit = candidate.unit;

		let mut block = Vec::new();

		while let Some(raw) = self.lines.get(self.cursor).copied() {
			if raw.trim().is_empty() {
				block.push("");
			} else if let Some(rest) = raw.strip_prefix(prefix) {
				block.push(rest);
			} else {
				break;
			}

			self.cursor += 1;
		}

		while block.last().is_some_and(|line| line.is_empty()) {
			block.pop();
		}

		Ok(block)
	}

	/// Skip every following line nested deeper than `depth`, however far it
	/// is indented.
	pub(crate) fn skip_block(&mut self, depth: usize) {
		let width = match self.indentation.unit {
			Some(Unit::Tab) => depth,
			Some(Unit::Spaces(unit)) => depth * unit,
			None => 0,
		};

		while let Some(raw) = self.lines.get(self.cursor).copied() {
			let text = raw.trim_start_matches([' ', '\t']);
			let indent = raw.len() - text.len();

			if !text.is_empty() && indent <= width {
				break;
			}

			self.cursor += 1;
		}
	}
}
