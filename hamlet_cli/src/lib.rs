use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use hamlet_core::Format;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render indentation-based markup templates to HTML.",
	long_about = "hamlet compiles Haml-style templates into HTML or XHTML.\n\nTemplate \
	              variables come from `--var` and `--data` flags and from the `[data]` table \
	              of a `hamlet.toml` config file.\n\nQuick start:\n  hamlet render page.haml   \
	              Print the rendered page\n  hamlet check *.haml       Report templates that \
	              fail to compile\n  hamlet verify page.haml page.html  Compare rendered \
	              output to a file"
)]
pub struct HamletCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Directory containing `hamlet.toml`. Defaults to the current directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

/// Variables and compile options shared by commands that render.
#[derive(Debug, Clone, clap::Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct RenderArgs {
	/// Bind the contents of a data file (json, toml, yaml, kdl, ini or text)
	/// to a variable. May be repeated.
	#[arg(long = "data", value_name = "NAME=PATH", value_parser = parse_binding)]
	pub data: Vec<(String, String)>,

	/// Bind a string variable. May be repeated.
	#[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_binding)]
	pub vars: Vec<(String, String)>,

	/// Escape the output of `=` lines.
	#[arg(long, default_value_t = false)]
	pub escape_html: bool,

	/// Don't evaluate embedded code. Output lines render empty.
	#[arg(long, default_value_t = false)]
	pub suppress_eval: bool,

	/// Output markup format.
	#[arg(long, value_enum)]
	pub format: Option<FormatArg>,

	/// Name used for the template in error locations.
	#[arg(long)]
	pub template_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Render a template and print the result.
	Render {
		/// The template file.
		file: PathBuf,

		#[command(flatten)]
		render: RenderArgs,

		/// Write the result to a file instead of stdout.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// Compile templates without rendering them.
	///
	/// Reports every template that fails to compile and exits with a
	/// non-zero status code if any did.
	Check {
		/// Template files to check.
		#[arg(required = true)]
		files: Vec<PathBuf>,
	},
	/// Render a template and compare the result with an expected file line
	/// by line.
	///
	/// Exits with a non-zero status code on the first mismatch. Use `--diff`
	/// to see every difference.
	Verify {
		/// The template file.
		template: PathBuf,

		/// The file holding the expected output.
		expected: PathBuf,

		#[command(flatten)]
		render: RenderArgs,

		/// Show a unified diff of expected and rendered output.
		#[arg(long, default_value_t = false)]
		diff: bool,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
	Xhtml,
	Html4,
	Html5,
}

impl From<FormatArg> for Format {
	fn from(value: FormatArg) -> Self {
		match value {
			FormatArg::Xhtml => Self::Xhtml,
			FormatArg::Html4 => Self::Html4,
			FormatArg::Html5 => Self::Html5,
		}
	}
}

/// Parse a `NAME=VALUE` pair.
pub fn parse_binding(value: &str) -> Result<(String, String), String> {
	let (name, rest) = value
		.split_once('=')
		.ok_or_else(|| format!("expected NAME=VALUE, found `{value}`"))?;

	if name.is_empty() {
		return Err(format!("missing variable name in `{value}`"));
	}

	Ok((name.to_string(), rest.to_string()))
}
