mod common;

use tagflow_core::AnyEmptyResult;

#[test]
fn check_counts_nested_directives() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.tf");
	std::fs::write(
		&template,
		"{IF show THEN}{FOR EACH x IN items}{x}{END}{END}\n{name}\n",
	)?;

	common::tagflow_cmd()
		.arg("check")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("parsed: 4 directives"));

	Ok(())
}

#[test]
fn check_does_not_evaluate() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("tagflow.toml"), "[evaluation]\nstrict = true\n")?;
	let template = tmp.path().join("page.tf");
	std::fs::write(&template, "{1 / 0}")?;

	common::tagflow_cmd()
		.arg("check")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("parsed: 1 directive"));

	Ok(())
}

#[test]
fn check_fails_for_unmatched_closing_tag() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.tf");
	std::fs::write(&template, "text\n{END}\n")?;

	common::tagflow_cmd()
		.arg("check")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.failure()
		.code(2)
		.stderr(predicates::str::contains("tagflow::no_matching_directive"));

	Ok(())
}

#[test]
fn check_respects_case_sensitive_config() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("page.tf");
	std::fs::write(&template, "{if 1 then}yes{end}")?;

	common::tagflow_cmd()
		.arg("check")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	std::fs::write(tmp.path().join("tagflow.toml"), "[dialect]\ncase_sensitive = true\n")?;

	common::tagflow_cmd()
		.arg("check")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.failure()
		.code(2);

	Ok(())
}

#[test]
fn check_reports_invalid_config() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("tagflow.toml"), "[dialect]\ncase_sensitive = \"yes\"\n")?;
	let template = tmp.path().join("page.tf");
	std::fs::write(&template, "plain")?;

	common::tagflow_cmd()
		.arg("check")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.failure()
		.code(2)
		.stderr(predicates::str::contains("tagflow::config_parse"));

	Ok(())
}
