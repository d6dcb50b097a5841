use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn peck() -> Command {
    Command::cargo_bin("peck").expect("peck binary")
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("git runs");
    assert!(status.success(), "git {args:?} failed");
}

/// A git repository with one staged text file and a cache dir for the store.
fn setup(config: &str) -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    let repo = temp.child("repo");
    repo.create_dir_all().expect("mkdir");

    git(repo.path(), &["init", "--quiet", "--initial-branch=main"]);
    repo.child(".pre-commit-config.yaml")
        .write_str(config)
        .expect("config");
    repo.child("staged.txt").write_str("hello\n").expect("file");
    git(repo.path(), &["add", "."]);

    temp.child("cache").create_dir_all().expect("cache dir");
    temp
}

fn run_in(temp: &TempDir, args: &[&str]) -> assert_cmd::assert::Assert {
    peck()
        .current_dir(temp.child("repo").path())
        .env("PRE_COMMIT_HOME", temp.child("cache").path())
        .args(args)
        .assert()
}

#[test]
fn passing_hooks_exit_zero() {
    let temp = setup(indoc::indoc! {r"
        repos:
          - repo: local
            hooks:
              - id: ok
                name: say ok
                entry: sh -c 'exit 0'
                language: system
                always_run: true
                pass_filenames: false
    "});

    run_in(&temp, &["run"])
        .success()
        .stdout(predicate::str::contains("say ok"))
        .stdout(predicate::str::contains("Passed"));
}

#[test]
fn failing_hook_exits_nonzero_and_shows_output() {
    let temp = setup(indoc::indoc! {r"
        repos:
          - repo: local
            hooks:
              - id: boom
                name: boom
                entry: sh -c 'echo something broke; exit 1'
                language: system
                always_run: true
                pass_filenames: false
    "});

    run_in(&temp, &["run"])
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Failed"))
        .stdout(predicate::str::contains("something broke"));
}

#[test]
fn hook_without_matching_files_is_skipped() {
    let temp = setup(indoc::indoc! {r"
        repos:
          - repo: local
            hooks:
              - id: python-only
                name: python only
                entry: sh -c 'exit 1'
                language: system
                types: [python]
    "});

    // The staged file is .txt, so the failing hook never runs.
    run_in(&temp, &["run"])
        .success()
        .stdout(predicate::str::contains("Skipped"));
}

#[test]
fn validate_accepts_good_and_rejects_bad_configs() {
    let temp = setup("repos: []\n");
    run_in(&temp, &["validate"])
        .success()
        .stdout(predicate::str::contains("is valid"));

    let temp = setup(indoc::indoc! {r"
        repos:
          - repo: https://example.com/repo
            hooks:
              - id: x
    "});
    run_in(&temp, &["validate"])
        .failure()
        .stderr(predicate::str::contains("missing `rev`"));
}

#[test]
fn empty_config_is_an_error() {
    let temp = setup("\n");
    run_in(&temp, &["run"])
        .failure()
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn clean_removes_cached_trees() {
    let temp = setup("repos: []\n");
    let fake_tree = temp.child("cache/repoabc123");
    fake_tree.create_dir_all().expect("fake tree");

    run_in(&temp, &["clean"])
        .success()
        .stdout(predicate::str::contains("Cleaned"));
    assert!(!fake_tree.path().exists());
}

#[test]
fn skip_env_var_is_honored() {
    let temp = setup(indoc::indoc! {r"
        repos:
          - repo: local
            hooks:
              - id: boom
                name: boom
                entry: sh -c 'exit 1'
                language: system
                always_run: true
                pass_filenames: false
    "});

    peck()
        .current_dir(temp.child("repo").path())
        .env("PRE_COMMIT_HOME", temp.child("cache").path())
        .env("SKIP", "boom")
        .args(["run"])
        .assert()
        .success();
}
