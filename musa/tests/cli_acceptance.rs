use musa_core::store::{keys, LocalStore};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Unroutable backend; requests fail fast with connection refused.
const DEAD_BACKEND: &str = "http://127.0.0.1:9";

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn store_path(&self) -> PathBuf {
        self.xdg_data.join("musa/musa.db")
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("musa");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }

    fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.home.join(name);
        fs::write(&path, contents).expect("failed to write test file");
        path
    }
}

fn run_musa(env: &CliTestEnv, args: &[&str]) -> Output {
    run_musa_with_backend(env, args, DEAD_BACKEND)
}

fn run_musa_with_backend(env: &CliTestEnv, args: &[&str], backend_url: &str) -> Output {
    Command::new(assert_cmd::cargo::cargo_bin!("musa"))
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env("MUSA_BACKEND_URL", backend_url)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute musa: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "musa {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn device_id_is_created_once_and_reused() {
    let env = CliTestEnv::new();

    let first = run_musa(&env, &["device"]);
    assert_success(&["device"], &first);
    let second = run_musa(&env, &["device"]);
    assert_success(&["device"], &second);

    let first_id = stdout_of(&first).trim().to_string();
    assert_eq!(first_id, stdout_of(&second).trim());

    let store = LocalStore::open(&env.store_path()).expect("failed to open store");
    let stored = store
        .get(keys::DEVICE_ID)
        .expect("failed to read store")
        .expect("device id should be stored");
    assert_eq!(stored, first_id);
    assert_eq!(first_id.len(), 36);
    assert_eq!(&first_id[14..15], "4");
}

#[test]
fn login_whoami_logout_round_trip() {
    let env = CliTestEnv::new();

    let output = run_musa(&env, &["whoami"]);
    assert_success(&["whoami"], &output);
    assert!(stdout_of(&output).contains("Not signed in"));

    let login_args = ["login", "--token", "tok-1", "--user-id", "42", "--role", "ADMIN"];
    let output = run_musa(&env, &login_args);
    assert_success(&login_args, &output);
    assert!(stdout_of(&output).contains("Signed in as 42 (ADMIN)"));

    let output = run_musa(&env, &["whoami"]);
    assert_success(&["whoami"], &output);
    let stdout = stdout_of(&output);
    assert!(stdout.contains("User:   42"), "got:\n{stdout}");
    assert!(stdout.contains("Role:   ADMIN"), "got:\n{stdout}");

    let output = run_musa(&env, &["logout"]);
    assert_success(&["logout"], &output);

    let output = run_musa(&env, &["whoami"]);
    assert!(stdout_of(&output).contains("Not signed in"));

    // The token never reaches the log file.
    let log_dir = env.xdg_state.join("musa");
    for entry in fs::read_dir(&log_dir).expect("log dir should exist") {
        let contents = fs::read_to_string(entry.expect("dir entry").path()).unwrap_or_default();
        assert!(!contents.contains("tok-1"));
    }
}

#[test]
fn task_commands_require_sign_in() {
    let env = CliTestEnv::new();

    for args in [
        &["tasks", "complete", "1", "2"][..],
        &["tasks", "list", "1"][..],
        &["plantings", "list"][..],
    ] {
        let output = run_musa(&env, args);
        assert!(!output.status.success(), "{args:?} should fail");
        assert!(
            stderr_of(&output).contains("Please sign in to continue."),
            "got:\n{}",
            stderr_of(&output)
        );
    }
}

#[test]
fn usage_fails_open_when_backend_is_down() {
    let env = CliTestEnv::new();

    let output = run_musa(&env, &["usage", "--category", "variety"]);
    assert_success(&["usage"], &output);
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Attempts:  0/3"), "got:\n{stdout}");
    assert!(stdout.contains("Remaining: 3"), "got:\n{stdout}");
}

#[test]
fn analyze_rejects_non_image_before_upload() {
    let env = CliTestEnv::new();
    let notes = env.write_file("notes.txt", b"not an image");
    let notes = notes.to_string_lossy().into_owned();

    let output = run_musa(&env, &["analyze", &notes]);
    assert!(!output.status.success());
    assert!(
        stderr_of(&output).contains("Please select an image file"),
        "got:\n{}",
        stderr_of(&output)
    );
}

#[test]
fn analyze_reports_generic_error_when_backend_is_down() {
    let env = CliTestEnv::new();
    let leaf = env.write_file("leaf.jpg", &[0xff, 0xd8, 0xff, 0xe0]);
    let leaf = leaf.to_string_lossy().into_owned();

    let output = run_musa(&env, &["analyze", &leaf, "--category", "disease"]);
    assert!(!output.status.success());
    assert!(
        stderr_of(&output).contains("Something went wrong. Please try again."),
        "got:\n{}",
        stderr_of(&output)
    );
}

#[test]
fn signed_in_analyze_goes_through_the_proxy() {
    let env = CliTestEnv::new();
    env.write_config(&format!("[proxy]\nurl = \"{DEAD_BACKEND}\"\n"));
    let leaf = env.write_file("leaf.jpg", &[0xff, 0xd8, 0xff, 0xe0]);
    let leaf = leaf.to_string_lossy().into_owned();

    let login_args = ["login", "--token", "tok-1", "--user-id", "42"];
    assert_success(&login_args, &run_musa(&env, &login_args));

    // A backend URL the client refuses; only the proxy is contacted.
    let output = run_musa_with_backend(&env, &["analyze", &leaf], "not-a-url");
    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(
        stderr.contains("Something went wrong. Please try again."),
        "got:\n{stderr}"
    );
    assert!(!stderr.contains("base URL"), "got:\n{stderr}");
}
