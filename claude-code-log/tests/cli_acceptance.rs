//! CLI acceptance tests
//!
//! Each test runs the built binary against a throwaway projects
//! hierarchy, with HOME and the cache path pointed inside the temp dir
//! so nothing leaks between tests or into the developer's machine.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    projects_dir: PathBuf,
    cache_db: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let projects_dir = base.join("projects");
        let cache_db = base.join("cache.db");
        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&projects_dir).expect("failed to create projects dir");
        Self {
            _temp_dir: temp_dir,
            home,
            projects_dir,
            cache_db,
        }
    }

    fn project_dir(&self, name: &str) -> PathBuf {
        let dir = self.projects_dir.join(name);
        fs::create_dir_all(&dir).expect("failed to create project dir");
        dir
    }
}

fn seed_session_file(dir: &Path, name: &str, session: &str) {
    let lines = format!(
        concat!(
            r#"{{"type":"user","sessionId":"{sid}","uuid":"{sid}-u1","timestamp":"2023-06-01T10:00:00Z","cwd":"/work/app","message":{{"role":"user","content":[{{"type":"text","text":"Please fix the bug"}}]}}}}"#,
            "\n",
            r#"{{"type":"assistant","sessionId":"{sid}","uuid":"{sid}-a1","timestamp":"2023-06-01T10:01:00Z","requestId":"{sid}-r1","message":{{"role":"assistant","content":[{{"type":"text","text":"On it"}}],"usage":{{"input_tokens":12,"output_tokens":34}}}}}}"#,
            "\n",
        ),
        sid = session
    );
    fs::write(dir.join(name), lines).expect("failed to write fixture");
}

fn run_cli(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin = PathBuf::from(assert_cmd::cargo::cargo_bin!("claude-code-log"));
    Command::new(bin)
        .args(args)
        .env("HOME", &env.home)
        .env("CLAUDE_CODE_LOG_CACHE_PATH", &env.cache_db)
        .output()
        .expect("failed to execute claude-code-log")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_convert_project_directory() {
    let env = CliTestEnv::new();
    let project = env.project_dir("-work-app");
    seed_session_file(&project, "session-a.jsonl", "aaaa1111");

    let output = run_cli(&env, &[project.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(project.join("combined_transcripts.html").exists());
    assert!(project.join("session-aaaa1111.html").exists());
    let combined = fs::read_to_string(project.join("combined_transcripts.html")).unwrap();
    assert!(combined.contains("Generated by claude-code-log v"));
    assert!(combined.contains("Please fix the bug"));
}

#[test]
fn test_all_projects_creates_index() {
    let env = CliTestEnv::new();
    seed_session_file(&env.project_dir("-work-app"), "s.jsonl", "aaaa1111");
    seed_session_file(&env.project_dir("-work-lib"), "s.jsonl", "bbbb2222");

    let output = run_cli(
        &env,
        &[
            "--all-projects",
            env.projects_dir.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout_of(&output).contains("2 projects"));
    assert!(env.projects_dir.join("index.html").exists());
}

#[test]
fn test_missing_input_exits_nonzero() {
    let env = CliTestEnv::new();
    let output = run_cli(&env, &["/definitely/not/a/real/path"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}

#[test]
fn test_single_file_conversion() {
    let env = CliTestEnv::new();
    let project = env.project_dir("-work-app");
    seed_session_file(&project, "one.jsonl", "cccc3333");

    let input = project.join("one.jsonl");
    let output_file = project.join("one.html");
    let output = run_cli(
        &env,
        &[
            input.to_str().unwrap(),
            "--output",
            output_file.to_str().unwrap(),
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output_file.exists());
}

#[test]
fn test_no_cache_flag_regenerates() {
    let env = CliTestEnv::new();
    let project = env.project_dir("-work-app");
    seed_session_file(&project, "s.jsonl", "dddd4444");

    let output = run_cli(&env, &[project.to_str().unwrap(), "--no-cache"]);
    assert!(output.status.success());
    assert!(project.join("combined_transcripts.html").exists());
    // No cache database was created for the uncached path.
    assert!(!env.cache_db.exists());
}

#[test]
fn test_markdown_format() {
    let env = CliTestEnv::new();
    let project = env.project_dir("-work-app");
    seed_session_file(&project, "s.jsonl", "eeee5555");

    let output = run_cli(&env, &[project.to_str().unwrap(), "--format", "md"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let combined = project.join("combined_transcripts.md");
    assert!(combined.exists());
    let content = fs::read_to_string(combined).unwrap();
    assert!(content.starts_with("<!-- Generated by claude-code-log v"));
}

#[test]
fn test_second_run_is_a_noop() {
    let env = CliTestEnv::new();
    let project = env.project_dir("-work-app");
    seed_session_file(&project, "s.jsonl", "ffff6666");

    assert!(run_cli(&env, &[project.to_str().unwrap()]).status.success());
    let combined = project.join("combined_transcripts.html");
    let first_mtime = fs::metadata(&combined).unwrap().modified().unwrap();

    assert!(run_cli(&env, &[project.to_str().unwrap()]).status.success());
    let second_mtime = fs::metadata(&combined).unwrap().modified().unwrap();
    assert_eq!(first_mtime, second_mtime, "unchanged input must not rewrite output");
}
