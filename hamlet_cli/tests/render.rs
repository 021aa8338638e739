mod common;

use clap::Parser;
use hamlet_cli::Commands;
use hamlet_cli::HamletCli;
use hamlet_cli::parse_binding;
use hamlet_core::AnyEmptyResult;
use rstest::rstest;
use similar_asserts::assert_eq;

#[test]
fn render_prints_output() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("page.haml");
	std::fs::write(&file, "%div\n  %p= title\n  .author= author\n")?;

	common::hamlet_cmd()
		.arg("render")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.arg("--var")
		.arg("title=Hello")
		.arg("--var")
		.arg("author=Ifiok")
		.assert()
		.success()
		.stdout("<div>\n  <p>Hello</p>\n  <div class='author'>Ifiok</div>\n</div>\n");

	Ok(())
}

#[test]
fn render_binds_data_files() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("list.haml");
	let data = tmp.path().join("site.json");
	std::fs::write(&file, "%ul\n  - for item in site.items\n    %li= item\n")?;
	std::fs::write(&data, r#"{ "items": ["one", "two"] }"#)?;

	common::hamlet_cmd()
		.arg("render")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.arg("--data")
		.arg(format!("site={}", data.display()))
		.assert()
		.success()
		.stdout("<ul>\n  <li>one</li>\n  <li>two</li>\n</ul>\n");

	Ok(())
}

#[test]
fn render_uses_config_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("page.haml");
	std::fs::write(&file, "!!!\n%p= site.name\n")?;
	std::fs::write(tmp.path().join("site.yaml"), "name: <hamlet>\n")?;
	std::fs::write(
		tmp.path().join("hamlet.toml"),
		"[compiler]\nformat = \"html5\"\nescape_html = true\n\n[data]\nsite = \"site.yaml\"\n",
	)?;

	common::hamlet_cmd()
		.arg("render")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.assert()
		.success()
		.stdout("<!DOCTYPE html>\n<p>&lt;hamlet&gt;</p>\n");

	Ok(())
}

#[test]
fn render_writes_output_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("page.haml");
	let output = tmp.path().join("page.html");
	std::fs::write(&file, "%br\n")?;

	common::hamlet_cmd()
		.arg("render")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.arg("--output")
		.arg(&output)
		.assert()
		.success()
		.stdout("");

	assert_eq!(std::fs::read_to_string(output)?, "<br />\n");

	Ok(())
}

#[test]
fn render_reports_error_location() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("broken.haml");
	std::fs::write(&file, "%p ok\n= raise('oops!')\n")?;

	common::hamlet_cmd()
		.arg("render")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.arg("--template-id")
		.arg("broken")
		.assert()
		.code(2)
		.stderr(predicates::str::contains("oops! at (broken):2"));

	Ok(())
}

#[test]
fn render_suppress_eval_skips_code() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("inert.haml");
	std::fs::write(&file, "%p before\n= raise('never')\n%p after\n")?;

	common::hamlet_cmd()
		.arg("render")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.arg("--suppress-eval")
		.assert()
		.success()
		.stdout("<p>before</p>\n<p>after</p>\n");

	Ok(())
}

#[test]
fn render_without_subcommand_fails() {
	common::hamlet_cmd().assert().code(1);
}

#[rstest]
#[case("name=value", ("name", "value"))]
#[case("url=a=b", ("url", "a=b"))]
#[case("empty=", ("empty", ""))]
fn binding_pairs_split_on_first_equals(#[case] input: &str, #[case] expected: (&str, &str)) {
	let (name, value) = parse_binding(input).unwrap_or_default();
	assert_eq!((name.as_str(), value.as_str()), expected);
}

#[rstest]
#[case("novalue")]
#[case("=value")]
fn binding_pairs_reject_malformed_input(#[case] input: &str) {
	assert!(parse_binding(input).is_err());
}

#[test]
fn render_flags_parse() -> AnyEmptyResult {
	let cli = HamletCli::try_parse_from([
		"hamlet",
		"render",
		"page.haml",
		"--var",
		"a=1",
		"--format",
		"html4",
		"--escape-html",
	])?;
	let Some(Commands::Render { render, .. }) = cli.command else {
		panic!("expected the render command");
	};

	assert_eq!(render.vars, vec![("a".to_string(), "1".to_string())]);
	assert!(render.escape_html);
	assert!(matches!(
		render.format.map(hamlet_core::Format::from),
		Some(hamlet_core::Format::Html4)
	));

	Ok(())
}
