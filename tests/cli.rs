use predicates::prelude::*;

#[test]
fn help_lists_download_flags() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("safaribooks");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-cookies"))
        .stdout(predicate::str::contains("--kindle"))
        .stdout(predicate::str::contains("--preserve-log"));
}

#[test]
fn missing_book_id_is_a_usage_error() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("safaribooks");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("<BOOK ID>"));
}

#[test]
fn missing_cookie_file_fails_before_any_request() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("safaribooks");
    cmd.current_dir(temp.path())
        .env_remove("SAFARIBOOKS_COOKIES")
        .env("RUST_LOG", "debug")
        .args(["--base-url", "http://127.0.0.1:9", "9781491958698"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsed cli"))
        .stderr(predicate::str::contains("Login: unable to find `cookies.json`"));
    assert!(!temp.path().join("Books").exists());
    Ok(())
}

#[test]
fn book_id_must_be_alphanumeric() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("safaribooks");
    cmd.args(["../../etc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("book id must be alphanumeric"));
}
