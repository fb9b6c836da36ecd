//! CLI tests for the non-interactive `backbrief` commands.
//!
//! Spawns the binary and verifies exit codes and printed output.

use std::path::Path;
use std::process::{Command, Output};

use backbrief::core::types::{Phase, Session};
use backbrief::exit_codes;
use backbrief::io::init::{InitOptions, ProjectPaths, init_project};
use backbrief::io::memory_store::{load_memories, load_patterns};
use backbrief::io::session_store::{SessionPaths, create_session_dir, write_session};
use chrono::Utc;

fn backbrief(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_backbrief"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("spawn backbrief")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn run_before_init_lists_problems_and_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = backbrief(temp.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("backbrief init"));
}

#[test]
fn init_scaffolds_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = backbrief(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let paths = ProjectPaths::new(temp.path());
    assert!(paths.config_path.is_file());
    assert!(paths.patterns_path.is_file());
    assert!(paths.default_framework_dir.join("AGENT_RULES.md").is_file());

    let memories = load_memories(&paths.memories_path);
    let project = &memories.loaded().expect("memories").project;
    let dir_name = temp.path().file_name().expect("tempdir name");
    assert_eq!(project.as_str(), dir_name.to_string_lossy());

    let again = backbrief(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&again).contains("--force"));

    let forced = backbrief(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn status_reports_no_session_then_phase() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

    let output = backbrief(temp.path(), &["status"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "no session\n");

    let session = SessionPaths::new(&paths.session_dir);
    create_session_dir(&session).expect("create");
    let mut state = Session::new(Utc::now());
    state.phase = Phase::Review;
    write_session(&session.state_path, &state).expect("write");

    let output = backbrief(temp.path(), &["--root", &temp.path().display().to_string(), "status"]);
    assert!(stdout(&output).contains("phase: review"));
}

#[test]
fn memory_commands_list_and_update_patterns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

    let list = backbrief(temp.path(), &["memory", "list"]);
    assert_eq!(list.status.code(), Some(exit_codes::OK));
    let listed = stdout(&list);
    assert!(listed.contains("## Memories"));
    assert!(listed.contains("pat-001"));

    let reinforce = backbrief(
        temp.path(),
        &["memory", "reinforce", "pat-001", "--pattern", "--reason", "caught again"],
    );
    assert_eq!(reinforce.status.code(), Some(exit_codes::OK));
    let patterns = load_patterns(&paths.patterns_path);
    let pattern = patterns
        .loaded()
        .expect("patterns")
        .patterns
        .iter()
        .find(|p| p.id == "pat-001")
        .cloned()
        .expect("pat-001");
    assert_eq!(pattern.reinforcement_count, 1);
    assert!((pattern.confidence.score - 0.55).abs() < 1e-12);

    let unknown = backbrief(temp.path(), &["memory", "deprecate", "mem-999"]);
    assert_eq!(unknown.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&unknown).contains("mem-999"));
}

#[test]
fn delete_removes_the_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    let session = SessionPaths::new(&paths.session_dir);
    create_session_dir(&session).expect("create");
    write_session(&session.state_path, &Session::new(Utc::now())).expect("write");

    let output = backbrief(temp.path(), &["delete"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(!paths.session_dir.exists());
}
