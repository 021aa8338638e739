use std::path::Path;
use std::process::Command;

use hamlet_core::AnyEmptyResult;
use insta_cmd::assert_cmd_snapshot;
use insta_cmd::get_cargo_bin;

fn copy_fixture(name: &str, dest: &Path) {
	let fixture = Path::new(env!("CARGO_MANIFEST_DIR"))
		.join("tests/fixtures")
		.join(name);
	copy_dir_recursive(&fixture, dest);
}

fn copy_dir_recursive(src: &Path, dst: &Path) {
	std::fs::create_dir_all(dst)
		.unwrap_or_else(|e| panic!("create_dir_all {}: {e}", dst.display()));
	for entry in
		std::fs::read_dir(src).unwrap_or_else(|e| panic!("read_dir {}: {e}", src.display()))
	{
		let entry = entry.unwrap_or_else(|e| panic!("entry: {e}"));
		let src_path = entry.path();
		let dst_path = dst.join(entry.file_name());

		if src_path.is_dir() {
			copy_dir_recursive(&src_path, &dst_path);
		} else {
			std::fs::copy(&src_path, &dst_path).unwrap_or_else(|e| {
				panic!("copy {} -> {}: {e}", src_path.display(), dst_path.display())
			});
		}
	}
}

fn hamlet_cmd(path: &Path) -> Command {
	let mut cmd = Command::new(get_cargo_bin("hamlet"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd.current_dir(path);
	cmd.arg("--path");
	cmd.arg(path);
	cmd
}

#[test]
fn site_render() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	copy_fixture("site", tmp.path());

	assert_cmd_snapshot!(hamlet_cmd(tmp.path()).arg("render").arg("templates/page.haml"), @r"
	success: true
	exit_code: 0
	----- stdout -----
	<!DOCTYPE html>
	<html>
	  <head>
	    <title>Hamlet &amp; Co</title>
	  </head>
	  <body>
	    <ul id='nav'>
	      <li class='item'>
	        <a href='/'>Home</a>
	      </li>
	      <li class='item'>
	        <a href='/about'>About</a>
	      </li>
	    </ul>
	    <p class='footer'>
	      Built by Hamlet &amp; Co
	    </p>
	  </body>
	</html>

	----- stderr -----
	");

	Ok(())
}

#[test]
fn site_verify() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	copy_fixture("site", tmp.path());

	assert_cmd_snapshot!(
		hamlet_cmd(tmp.path())
			.arg("verify")
			.arg("templates/page.haml")
			.arg("templates/page.html"),
		@r"
	success: true
	exit_code: 0
	----- stdout -----
	Verified templates/page.haml against templates/page.html.

	----- stderr -----
	"
	);

	Ok(())
}

#[test]
fn site_check() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	copy_fixture("site", tmp.path());

	assert_cmd_snapshot!(
		hamlet_cmd(tmp.path())
			.arg("check")
			.arg("templates/page.haml")
			.arg("templates/broken.haml"),
		@r"
	success: true
	exit_code: 0
	----- stdout -----
	Check passed: 2 template(s) compiled.

	----- stderr -----
	"
	);

	Ok(())
}

#[test]
fn site_render_reports_failing_line() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	copy_fixture("site", tmp.path());

	let output = hamlet_cmd(tmp.path())
		.arg("render")
		.arg("templates/broken.haml")
		.arg("--template-id")
		.arg("broken")
		.output()?;

	assert_eq!(output.status.code(), Some(2));
	assert!(output.stdout.is_empty());

	let stderr = String::from_utf8_lossy(&output.stderr);
	assert!(stderr.contains("broken on purpose at (broken):3"), "{stderr}");

	Ok(())
}
