mod common;

use clap::Parser;
use hamlet_cli::Commands;
use hamlet_cli::HamletCli;
use hamlet_core::AnyEmptyResult;
use predicates::prelude::PredicateBooleanExt;
use similar_asserts::assert_eq;

#[test]
fn check_passes_for_valid_templates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let first = tmp.path().join("first.haml");
	let second = tmp.path().join("second.haml");
	std::fs::write(&first, "%ul\n  %li one\n  %li two\n")?;
	std::fs::write(&second, "!!! 5\n%p= greeting\n")?;

	common::hamlet_cmd()
		.arg("check")
		.arg("--path")
		.arg(tmp.path())
		.arg(&first)
		.arg(&second)
		.assert()
		.success()
		.stdout(predicates::str::contains(
			"Check passed: 2 template(s) compiled.",
		));

	Ok(())
}

#[test]
fn check_fails_on_inconsistent_indentation() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let good = tmp.path().join("good.haml");
	let bad = tmp.path().join("bad.haml");
	std::fs::write(&good, "%p hello\n")?;
	std::fs::write(&bad, "%div\n  %p\n      %b too deep\n")?;

	common::hamlet_cmd()
		.arg("check")
		.arg("--path")
		.arg(tmp.path())
		.arg(&good)
		.arg(&bad)
		.assert()
		.code(1)
		.stderr(
			predicates::str::contains("bad.haml")
				.and(predicates::str::contains("1 of 2 template(s) failed to compile.")),
		);

	Ok(())
}

#[test]
fn check_reports_unknown_filters() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("filters.haml");
	std::fs::write(&file, "%div\n  :sass\n    p { color: red }\n")?;

	common::hamlet_cmd()
		.arg("check")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.assert()
		.code(1)
		.stderr(predicates::str::contains("filter `sass` is not defined"));

	Ok(())
}

#[test]
fn check_reports_invalid_attribute_expressions() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let file = tmp.path().join("attributes.haml");
	std::fs::write(&file, "%p ok\n%a{:title => 1 +} link\n")?;

	common::hamlet_cmd()
		.arg("check")
		.arg("--path")
		.arg(tmp.path())
		.arg(&file)
		.assert()
		.code(1)
		.stderr(
			predicates::str::contains("attributes.haml")
				.and(predicates::str::contains("invalid attribute list")),
		);

	Ok(())
}

#[test]
fn check_requires_files() {
	let result = HamletCli::try_parse_from(["hamlet", "check"]);
	assert!(result.is_err());
}

#[test]
fn check_parses_multiple_files() -> AnyEmptyResult {
	let cli = HamletCli::try_parse_from(["hamlet", "check", "a.haml", "b.haml"])?;
	let Some(Commands::Check { files }) = cli.command else {
		panic!("expected the check command");
	};
	assert_eq!(files.len(), 2);

	Ok(())
}
