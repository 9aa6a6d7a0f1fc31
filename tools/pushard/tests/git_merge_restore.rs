use pushard::git::{GitClient, VersionControl};
use pushard::marker::{checkpoint_message, parse_marker};
use pushard::runtime::{ProcessRequest, ProcessRunner, ProductionProcessRunner};
use pushard::types::CommitRef;
use std::fs;
use std::path::Path;

const ENV_FILE: &str = "amplify/team-provider-info.json";

fn git(runner: &ProductionProcessRunner, dir: &Path, args: &[&str]) -> String {
    let out = runner
        .run(ProcessRequest::new("git", args).in_dir(dir))
        .expect("spawn git");
    assert!(out.success(), "git {args:?} failed: {}", out.stderr);
    out.stdout
}

fn write(dir: &Path, path: &str, contents: &str) {
    let full = dir.join(path);
    fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
    fs::write(full, contents).expect("write");
}

/// `test` and `dev` diverge from a shared base; dev rewrites the env file.
/// Returns the dev commit to replay.
fn diverged_repo(runner: &ProductionProcessRunner, dir: &Path) -> CommitRef {
    git(runner, dir, &["init", "-q"]);
    git(runner, dir, &["config", "user.name", "PUSHARD"]);
    git(runner, dir, &["config", "user.email", "pushard@github.com"]);
    git(runner, dir, &["config", "commit.gpgsign", "false"]);
    write(dir, ENV_FILE, "TEST-ENV\n");
    write(dir, "app.txt", "v1\n");
    git(runner, dir, &["add", "."]);
    git(runner, dir, &["commit", "-q", "-m", "base"]);
    git(runner, dir, &["branch", "-M", "test"]);

    git(runner, dir, &["checkout", "-q", "-b", "dev"]);
    write(dir, ENV_FILE, "DEV-ENV\n");
    write(dir, "app.txt", "v2\n");
    git(runner, dir, &["commit", "-q", "-am", "dev change"]);
    let dev_head = git(runner, dir, &["rev-parse", "HEAD"]);

    git(runner, dir, &["checkout", "-q", "test"]);
    write(dir, "notes.txt", "test only\n");
    git(runner, dir, &["add", "."]);
    git(runner, dir, &["commit", "-q", "-m", "test only"]);

    CommitRef::parse(dev_head.trim()).expect("commit hash")
}

#[test]
fn replayed_merge_keeps_the_target_branch_env_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();
    let runner = ProductionProcessRunner::new();
    let commit = diverged_repo(&runner, dir);
    let client = GitClient::new(&runner, dir);

    client.merge_with_theirs(&commit).expect("merged");
    client.restore_pre_merge_file(ENV_FILE).expect("restored");
    client
        .commit_all(&checkpoint_message(&commit))
        .expect("checkpoint");

    assert_eq!(fs::read_to_string(dir.join(ENV_FILE)).expect("env"), "TEST-ENV\n");
    assert_eq!(fs::read_to_string(dir.join("app.txt")).expect("app"), "v2\n");
    let committed = git(&runner, dir, &["show", &format!("HEAD:{ENV_FILE}")]);
    assert_eq!(committed, "TEST-ENV\n");

    let tip_message = git(&runner, dir, &["log", "-1", "--pretty=%B"]);
    assert_eq!(parse_marker(&tip_message).expect("marker"), commit);
}
