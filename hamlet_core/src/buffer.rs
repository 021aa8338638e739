/// Accumulates rendered lines, two spaces of indentation per depth.
///
/// Whitespace removal works by gluing: the trailing newline is dropped and
/// the next line is appended without indentation.
#[derive(Debug, Default)]
pub(crate) struct Buffer {
	out: String,
	glued: bool,
}

impl Buffer {
	pub(crate) fn line(&mut self, depth: usize, text: &str) {
		if self.glued {
			self.glued = false;
		} else if !text.is_empty() {
			for _ in 0..depth {
				self.out.push_str("  ");
			}
		}

		self.out.push_str(text);
		self.out.push('\n');
	}

	/// Write each line of `text` at `depth`. One trailing newline is ignored.
	pub(crate) fn lines(&mut self, depth: usize, text: &str) {
		let text = text.strip_suffix('\n').unwrap_or(text);
		if text.is_empty() {
			return;
		}

		for line in text.split('\n') {
			self.line(depth, line);
		}
	}

	/// Remove whitespace written so far at the end of the output and attach
	/// the next line directly to it.
	pub(crate) fn glue(&mut self) {
		let length = self.out.trim_end().len();
		self.out.truncate(length);
		self.glued = true;
	}

	pub(crate) fn finish(self) -> String {
		self.out
	}
}
