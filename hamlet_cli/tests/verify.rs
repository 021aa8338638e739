mod common;

use hamlet_core::AnyEmptyResult;
use predicates::prelude::PredicateBooleanExt;

#[test]
fn verify_passes_on_matching_output() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.haml");
	let expected = tmp.path().join("page.html");
	std::fs::write(&template, "%ul\n  %li= 1 + 1\n")?;
	std::fs::write(&expected, "<ul>\n  <li>2</li>\n</ul>\n")?;

	common::hamlet_cmd()
		.arg("verify")
		.arg("--path")
		.arg(tmp.path())
		.arg(&template)
		.arg(&expected)
		.assert()
		.success()
		.stdout(predicates::str::contains("Verified"));

	Ok(())
}

#[test]
fn verify_reports_first_mismatched_line() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.haml");
	let expected = tmp.path().join("page.html");
	std::fs::write(&template, "%ul\n  %li= 1 + 1\n  %li three\n")?;
	std::fs::write(&expected, "<ul>\n  <li>2</li>\n  <li>3</li>\n</ul>\n")?;

	common::hamlet_cmd()
		.arg("verify")
		.arg("--path")
		.arg(tmp.path())
		.arg(&template)
		.arg(&expected)
		.assert()
		.code(1)
		.stderr(
			predicates::str::contains("template:")
				.and(predicates::str::contains("page.haml"))
				.and(predicates::str::contains("line: 3"))
				.and(predicates::str::contains("expected:   <li>3</li>"))
				.and(predicates::str::contains("rendered:   <li>three</li>")),
		);

	Ok(())
}

#[test]
fn verify_shows_diff() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.haml");
	let expected = tmp.path().join("page.html");
	std::fs::write(&template, "%p= name\n")?;
	std::fs::write(&expected, "<p>world</p>\n")?;

	common::hamlet_cmd()
		.arg("verify")
		.arg("--path")
		.arg(tmp.path())
		.arg(&template)
		.arg(&expected)
		.arg("--var")
		.arg("name=hamlet")
		.arg("--diff")
		.assert()
		.code(1)
		.stderr(
			predicates::str::contains("-<p>world</p>")
				.and(predicates::str::contains("+<p>hamlet</p>")),
		);

	Ok(())
}

#[test]
fn verify_detects_missing_lines() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.haml");
	let expected = tmp.path().join("page.html");
	std::fs::write(&template, "%p one\n")?;
	std::fs::write(&expected, "<p>one</p>\n<p>two</p>\n")?;

	common::hamlet_cmd()
		.arg("verify")
		.arg("--path")
		.arg(tmp.path())
		.arg(&template)
		.arg(&expected)
		.assert()
		.code(1)
		.stderr(
			predicates::str::contains("line: 2")
				.and(predicates::str::contains("rendered: <end of file>")),
		);

	Ok(())
}
