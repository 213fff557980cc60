//! Tests for the CLI git adapter against real repositories.

use std::path::Path;

use super::*;

fn git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initialize a repository with one commit on `main`.
fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.email", "test@example.invalid"]);
    git(dir, &["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "seed\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-m", "seed"]);
}

#[test]
fn test_current_and_default_branch() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path());
    let adapter = CliGit::new();

    assert_eq!(
        adapter.current_branch(tmp.path()).unwrap().as_deref(),
        Some("main")
    );
    assert_eq!(adapter.default_branch(tmp.path()).unwrap(), "main");
}

#[test]
fn test_branch_exists_and_create() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path());
    let adapter = CliGit::new();

    assert!(adapter.branch_exists(tmp.path(), "main").unwrap());
    assert!(!adapter.branch_exists(tmp.path(), "feature").unwrap());

    adapter.create_and_checkout(tmp.path(), "feature").unwrap();
    assert_eq!(
        adapter.current_branch(tmp.path()).unwrap().as_deref(),
        Some("feature")
    );

    adapter.checkout(tmp.path(), "main").unwrap();
    assert!(adapter.branch_exists(tmp.path(), "feature").unwrap());
}

#[test]
fn test_has_uncommitted_and_commit() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path());
    let adapter = CliGit::new();

    assert!(!adapter.has_uncommitted(tmp.path()).unwrap());

    std::fs::write(tmp.path().join("new.txt"), "content\n").unwrap();
    assert!(adapter.has_uncommitted(tmp.path()).unwrap());

    adapter
        .add(tmp.path(), &[Path::new("new.txt")])
        .unwrap();
    let sha = adapter.commit(tmp.path(), "Add task #1: new file").unwrap();
    assert_eq!(sha.len(), 40, "expected a full sha, got {sha}");
    assert!(!adapter.has_uncommitted(tmp.path()).unwrap());
}

#[test]
fn test_commit_with_nothing_staged_reports_error() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path());
    let adapter = CliGit::new();

    let err = adapter.commit(tmp.path(), "empty").unwrap_err();
    assert_eq!(err.kind, GitErrorKind::Other);
    assert!(!err.message.is_empty());
}

#[test]
fn test_pull_without_remote() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path());
    let adapter = CliGit::new();

    let outcome = adapter.pull(tmp.path(), "main").unwrap();
    assert_eq!(outcome, PullOutcome::NoRemote);
}

#[test]
fn test_pull_from_local_remote() {
    let upstream = tempfile::tempdir().unwrap();
    init_repo(upstream.path());

    let tmp = tempfile::tempdir().unwrap();
    let clone_path = tmp.path().join("clone");
    git(
        tmp.path(),
        &[
            "clone",
            upstream.path().to_str().unwrap(),
            clone_path.to_str().unwrap(),
        ],
    );
    let adapter = CliGit::new();

    assert_eq!(
        adapter.pull(&clone_path, "main").unwrap(),
        PullOutcome::UpToDate
    );
}

#[test]
fn test_worktree_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    init_repo(&repo);
    let adapter = CliGit::new();

    let wt_path = tmp.path().join("repo-10-add-auth");
    adapter
        .worktree_add(&repo, &wt_path, "10-add-auth", "main")
        .unwrap();

    let worktrees = adapter.worktree_list(&repo).unwrap();
    assert_eq!(worktrees.len(), 2);
    assert!(
        worktrees
            .iter()
            .any(|wt| wt.branch.as_deref() == Some("10-add-auth"))
    );

    assert!(!adapter.in_worktree(&repo).unwrap());
    assert!(adapter.in_worktree(&wt_path).unwrap());

    let main_dir = adapter.main_repo_dir(&wt_path).unwrap();
    assert_eq!(main_dir, dunce::canonicalize(&repo).unwrap());

    adapter.worktree_remove(&repo, &wt_path).unwrap();
    assert_eq!(adapter.worktree_list(&repo).unwrap().len(), 1);
}

#[test]
fn test_worktree_add_reuses_existing_branch() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    init_repo(&repo);
    let adapter = CliGit::new();

    adapter.create_and_checkout(&repo, "7-fix-codec").unwrap();
    adapter.checkout(&repo, "main").unwrap();

    let wt_path = tmp.path().join("repo-7-fix-codec");
    adapter
        .worktree_add(&repo, &wt_path, "7-fix-codec", "main")
        .unwrap();
    let worktrees = adapter.worktree_list(&repo).unwrap();
    assert!(
        worktrees
            .iter()
            .any(|wt| wt.branch.as_deref() == Some("7-fix-codec"))
    );
}
