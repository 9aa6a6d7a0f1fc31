use assert_cmd::cargo::cargo_bin_cmd;

fn hash(c: char) -> String {
    c.to_string().repeat(40)
}

#[test]
fn help_lists_deploy_flags() {
    let mut cmd = cargo_bin_cmd!("pushard");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("--deploy-hash"));
    assert!(stdout.contains("--skip-hashes"));
    assert!(stdout.contains("--dst-branch"));
    assert!(stdout.contains("--dry-run"));
}

#[test]
fn unknown_flag_exits_nonzero() {
    let mut cmd = cargo_bin_cmd!("pushard");
    cmd.arg("--parallelism").arg("4");
    cmd.assert().failure();
}

#[test]
fn short_deploy_hash_is_rejected_before_cloning() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("pushard");
    cmd.env_clear()
        .current_dir(temp.path())
        .env("DEPLOY_HASH", "abc123")
        .env("DST_BRANCH", "test");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("invalid input"));
    assert!(std::fs::read_dir(temp.path()).expect("read dir").next().is_none());
}

#[test]
fn skip_list_with_empty_segment_fails() {
    let mut cmd = cargo_bin_cmd!("pushard");
    cmd.env_clear()
        .arg("--deploy-hash")
        .arg(hash('a'))
        .arg("--skip-hashes")
        .arg(format!("{},,{}", hash('b'), hash('c')))
        .arg("--dst-branch")
        .arg("test");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("invalid input"));
}

#[test]
fn branch_outside_allowed_set_fails() {
    let mut cmd = cargo_bin_cmd!("pushard");
    cmd.env_clear()
        .env("DEPLOY_HASH", hash('a'))
        .env("DST_BRANCH", "prod");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("prod"));
}

#[test]
fn missing_config_file_exits_nonzero() {
    let mut cmd = cargo_bin_cmd!("pushard");
    cmd.env_clear()
        .arg("--config")
        .arg(format!("{}/tests/fixtures/missing.toml", env!("CARGO_MANIFEST_DIR")));
    cmd.assert().failure();
}
