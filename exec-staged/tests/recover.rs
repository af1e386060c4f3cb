//! Recovery from runs that stopped between `prepare` and `merge`.

use exec_staged::constants::{BACKUP_STASH_MESSAGE, PATCH_FILE_NAME, STAGED_CHANGES_COMMIT_MESSAGE};
use exec_staged::io::git::Git;
use exec_staged::recover::{RecoveryOutcome, recover, recover_to};
use exec_staged::stage::{Lifecycle, Stage, StageOptions};
use exec_staged::test_support::TestRepo;

fn repo_with_mixed_changes() -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("test-D.txt", "").expect("write");
    repo.write_file("test-M.txt", "old contents").expect("write");
    repo.write_file("partial.txt", "committed").expect("write");
    repo.commit_all("add files").expect("commit");
    repo.rm("test-D.txt").expect("rm");
    repo.write_file("test-M.txt", "new contents").expect("write");
    repo.write_file("partial.txt", "staged").expect("write");
    repo.git(&["add", "partial.txt"]).expect("add");
    repo.write_file("partial.txt", "unstaged").expect("write");
    repo.write_file("untracked.txt", "").expect("write");
    repo
}

fn prepare(repo: &TestRepo) {
    let mut stage = Stage::new(repo.path(), StageOptions { quiet: true });
    stage.check().expect("check");
    stage.prepare().expect("prepare");
}

#[test]
fn nothing_to_recover_in_clean_repository() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("untracked.txt", "").expect("write");
    let before = repo.status_verbose().expect("status");
    let outcome = recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(outcome, RecoveryOutcome::NothingToRecover);
    assert_eq!(repo.status_verbose().expect("status"), before);
}

#[test]
fn recovers_after_prepare() {
    let repo = repo_with_mixed_changes();
    let before = repo.status_verbose().expect("status");
    prepare(&repo);
    assert_ne!(repo.status_verbose().expect("status"), before);

    let outcome = recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert_eq!(repo.status_verbose().expect("status"), before);
    assert_eq!(repo.stash_list().expect("stash list"), "");
    assert!(!repo.git_dir().join(PATCH_FILE_NAME).exists());
}

#[test]
fn recovers_after_task_edits() {
    let repo = repo_with_mixed_changes();
    let before = repo.status_verbose().expect("status");
    prepare(&repo);
    repo.write_file("partial.txt", "task output").expect("write");
    repo.write_file("junk.txt", "").expect("write");

    recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(repo.status_verbose().expect("status"), before);
    assert_eq!(repo.read_file("partial.txt").expect("read"), "unstaged");
    assert!(!repo.join("junk.txt").exists());
}

#[test]
fn recovers_after_marker_commit() {
    let repo = repo_with_mixed_changes();
    let before = repo.status_verbose().expect("status");
    prepare(&repo);
    repo.git(&["add", "-A"]).expect("add");
    repo.git(&["commit", "--quiet", "-m", STAGED_CHANGES_COMMIT_MESSAGE])
        .expect("commit");

    recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(repo.status_verbose().expect("status"), before);
    assert!(!repo.log().expect("log").contains(STAGED_CHANGES_COMMIT_MESSAGE));
    assert!(!repo.stash_list().expect("stash list").contains(BACKUP_STASH_MESSAGE));
}

#[test]
fn lone_marker_commit_is_soft_reset() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("test.txt", "staged").expect("write");
    repo.git(&["add", "test.txt"]).expect("add");
    repo.git(&["commit", "--quiet", "-m", STAGED_CHANGES_COMMIT_MESSAGE])
        .expect("commit");

    let outcome = recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert_eq!(repo.porcelain().expect("status"), "A  test.txt");
    assert_eq!(repo.log().expect("log").trim(), "initial commit");
}

#[test]
fn moves_merge_status_backups_back() {
    let repo = TestRepo::new().expect("repo");
    std::fs::write(repo.git_dir().join("MERGE_MSG.bak"), "Merge branch 'other'\n")
        .expect("write");

    let outcome = recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert_eq!(
        std::fs::read_to_string(repo.git_dir().join("MERGE_MSG")).expect("read"),
        "Merge branch 'other'\n"
    );
    assert!(!repo.git_dir().join("MERGE_MSG.bak").exists());
}

#[test]
fn removes_stray_patch_file() {
    let repo = TestRepo::new().expect("repo");
    let patch = repo.git_dir().join(PATCH_FILE_NAME);
    std::fs::write(&patch, "").expect("write");

    let outcome = recover(&Git::new(repo.path())).expect("recover");
    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert!(!patch.exists());
}

#[test]
fn recovery_lets_the_next_run_pass_check() {
    let repo = repo_with_mixed_changes();
    prepare(&repo);
    let mut stage = Stage::new(repo.path(), StageOptions { quiet: true });
    assert!(stage.check().is_err());

    recover(&Git::new(repo.path())).expect("recover");
    let mut stage = Stage::new(repo.path(), StageOptions { quiet: true });
    stage.check().expect("check");
}

#[test]
fn known_head_discards_task_output_without_stash() {
    let repo = TestRepo::new().expect("repo");
    let git = Git::new(repo.path());
    let head = git.head().expect("head").expect("commit");
    repo.write_file("out.txt", "x").expect("write");
    repo.git(&["commit", "--allow-empty", "--quiet", "-m", "task commit"])
        .expect("commit");

    let outcome = recover_to(&git, Some(&head)).expect("recover");
    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert_eq!(repo.porcelain().expect("status"), "");
    assert!(!repo.log().expect("log").contains("task commit"));
}

#[test]
fn known_head_restores_stash_on_top_of_it() {
    let repo = repo_with_mixed_changes();
    let git = Git::new(repo.path());
    let head = git.head().expect("head").expect("commit");
    let before = repo.status_verbose().expect("status");
    prepare(&repo);
    repo.write_file("junk.txt", "").expect("write");
    repo.git(&["commit", "--allow-empty", "--quiet", "-m", "task commit"])
        .expect("commit");

    recover_to(&git, Some(&head)).expect("recover");
    assert_eq!(repo.status_verbose().expect("status"), before);
    assert!(!repo.log().expect("log").contains("task commit"));
    assert_eq!(repo.stash_list().expect("stash list"), "");
}
