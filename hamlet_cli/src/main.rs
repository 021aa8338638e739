use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use hamlet_cli::Commands;
use hamlet_cli::HamletCli;
use hamlet_cli::RenderArgs;
use hamlet_core::CompiledTemplate;
use hamlet_core::CompilerOptions;
use hamlet_core::HamletConfig;
use hamlet_core::HamletError;
use hamlet_core::RenderContext;
use hamlet_core::compile;
use hamlet_core::load_data_file;
use owo_colors::OwoColorize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
	let args = HamletCli::parse();

	// Respect NO_COLOR env var, --no-color flag and terminal support.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on_cached(supports_color::Stream::Stderr).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_logging(args.verbose, use_color);

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Render {
			file,
			render,
			output,
		}) => run_render(&args, file, render, output.as_deref()),
		Some(Commands::Check { files }) => run_check(&args, files),
		Some(Commands::Verify {
			template,
			expected,
			render,
			diff,
		}) => run_verify(&args, template, expected, render, *diff),
		None => {
			eprintln!("No subcommand specified. Run `hamlet --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		report(e);
		process::exit(2);
	}
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, use_color: bool) {
	let fallback = if verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.try_init()
		.ok();
}

/// Print an error, through miette when it's one of ours.
fn report(error: Box<dyn std::error::Error>) {
	match error.downcast::<HamletError>() {
		Ok(error) => {
			let report: miette::Report = (*error).into();
			eprintln!("{report:?}");
		}
		Err(error) => {
			eprintln!("{} {error}", colored!("error:", red));
		}
	}
}

fn resolve_root(args: &HamletCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Compile options and bindings from the config file overridden by flags.
fn prepare(args: &HamletCli, render: &RenderArgs) -> CliResult<(CompilerOptions, RenderContext)> {
	let root = resolve_root(args);
	let config = HamletConfig::load(&root)?.unwrap_or_default();

	let mut options = config.compiler.clone();
	if render.escape_html {
		options.escape_html = true;
	}
	if render.suppress_eval {
		options.suppress_eval = true;
	}
	if let Some(format) = render.format {
		options.format = format.into();
	}
	if let Some(template_id) = &render.template_id {
		options.template_id.clone_from(template_id);
	}

	let mut context = RenderContext::new();

	for (name, value) in config.load_data(&root)? {
		context.bind_serialize(name, &value);
	}

	for (name, path) in &render.data {
		let value = load_data_file(Path::new(path))?;
		context.bind_serialize(name.clone(), &value);
	}

	for (name, value) in &render.vars {
		context.bind(name.clone(), value.clone());
	}

	tracing::debug!(?options, "resolved compile options");

	Ok((options, context))
}

fn compile_file(path: &Path, options: &CompilerOptions) -> CliResult<CompiledTemplate> {
	let source = std::fs::read_to_string(path)
		.map_err(|e| format!("failed to read `{}`: {e}", path.display()))?;

	Ok(compile(&source, options)?)
}

fn run_render(
	args: &HamletCli,
	file: &Path,
	render: &RenderArgs,
	output: Option<&Path>,
) -> CliResult<()> {
	let (options, context) = prepare(args, render)?;
	let template = compile_file(file, &options)?;
	let rendered = template.render(&context)?;

	match output {
		Some(path) => {
			std::fs::write(path, &rendered)?;
			if args.verbose {
				eprintln!("Wrote {}", path.display());
			}
		}
		None => print!("{rendered}"),
	}

	Ok(())
}

fn run_check(args: &HamletCli, files: &[PathBuf]) -> CliResult<()> {
	let root = resolve_root(args);
	let options = HamletConfig::load(&root)?
		.map(|config| config.compiler)
		.unwrap_or_default();

	let mut failures = 0usize;

	for file in files {
		match compile_file(file, &options) {
			Ok(_) => {
				if args.verbose {
					println!("{} {}", colored!("ok", green), file.display());
				}
			}
			Err(error) => {
				failures += 1;
				eprintln!("{} {}", colored!("failed:", red), file.display());
				report(error);
			}
		}
	}

	if failures > 0 {
		eprintln!();
		eprintln!(
			"{}",
			colored!(format!("{failures} of {} template(s) failed to compile.", files.len()), bold)
		);
		process::exit(1);
	}

	println!("Check passed: {} template(s) compiled.", files.len());
	Ok(())
}

fn run_verify(
	args: &HamletCli,
	template: &Path,
	expected: &Path,
	render: &RenderArgs,
	show_diff: bool,
) -> CliResult<()> {
	let (options, context) = prepare(args, render)?;
	let compiled = compile_file(template, &options)?;
	let actual = compiled.render(&context)?;
	let wanted = std::fs::read_to_string(expected)
		.map_err(|e| format!("failed to read `{}`: {e}", expected.display()))?;

	let Some(mismatch) = first_mismatch(&wanted, &actual) else {
		println!(
			"Verified {} against {}.",
			template.display(),
			expected.display()
		);
		return Ok(());
	};

	eprintln!("{}", colored!("Rendered output does not match.", red));
	eprintln!("template: {}", template.display());
	eprintln!("line: {}", mismatch.line);
	eprintln!("  expected: {}", mismatch.expected.unwrap_or("<end of file>"));
	eprintln!("  rendered: {}", mismatch.actual.unwrap_or("<end of file>"));

	if show_diff {
		eprintln!();
		print_diff(&wanted, &actual);
	}

	process::exit(1);
}

struct Mismatch<'a> {
	line: usize,
	expected: Option<&'a str>,
	actual: Option<&'a str>,
}

/// The first line where the two texts differ, ignoring a final newline.
fn first_mismatch<'a>(expected: &'a str, actual: &'a str) -> Option<Mismatch<'a>> {
	let mut expected_lines = expected.lines();
	let mut actual_lines = actual.lines();
	let mut line = 0;

	loop {
		line += 1;
		match (expected_lines.next(), actual_lines.next()) {
			(None, None) => return None,
			(left, right) if left == right => {}
			(expected, actual) => {
				return Some(Mismatch {
					line,
					expected,
					actual,
				});
			}
		}
	}
}

fn print_diff(expected: &str, actual: &str) {
	let diff = TextDiff::from_lines(expected, actual);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
}
