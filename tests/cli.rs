#![cfg(unix)]

use std::{
    fs,
    path::PathBuf,
    process::{Command, Output, Stdio},
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_nanochat_parity");

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(remote_script: &str, prompts: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("remote.sh"), remote_script).unwrap();
        fs::write(
            dir.path().join("prompts.json"),
            serde_json::to_string(prompts).unwrap(),
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(BIN);
        command
            .env("NANOCHAT_CACHE_DIR", self.path("cache"))
            .env("REMOTE_PROGRAM", "sh")
            .env("REMOTE_SCRIPT", self.path("remote.sh"))
            .env("PROMPTS_PATH", self.path("prompts.json"))
            .env("RUST_LOG", "warn")
            .env_remove("REMOTE_TIMEOUT_SECS")
            .env_remove("REPORT_PATH")
            .env_remove("TOP_P");
        command
    }

    fn run(&self, configure: impl FnOnce(&mut Command)) -> Output {
        let mut command = self.command();
        configure(&mut command);
        command.output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn remote_timeout_does_not_abort_the_run() {
    let ws = Workspace::new("sleep 5\n", &["Once upon a time", "Hello, how are you?"]);

    let started = Instant::now();
    let output = ws.run(|c| {
        c.env("REMOTE_TIMEOUT_SECS", "0.5");
    });
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(0), "stdout:\n{text}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(text.contains("Test 1/2: \"Once upon a time\""));
    assert!(text.contains("Test 2/2: \"Hello, how are you?\""));
    assert!(text.contains("(failed: timed out)"));
    assert!(text.contains("Summary: 2 attempted, 0 compared, 0 agreeing"));
}

#[test]
fn missing_checkpoint_only_skips_the_local_side() {
    let ws = Workspace::new(
        "cat > /dev/null\necho 'Once upon a time there was'\n",
        &["Once upon a time"],
    );

    let report_path = ws.path("report.json");
    let output = ws.run(|c| {
        c.env("REPORT_PATH", &report_path);
    });
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(0), "stdout:\n{text}");
    assert!(text.contains("(failed: checkpoint missing)"));
    assert!(text.contains("  Once upon a time there was"));
    assert!(text.contains("rust length: 0 chars"));
    assert!(text.contains("ruby length: 26 chars"));
    assert!(text.contains("Analysis skipped"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["summary"]["attempted"], 1);
    assert_eq!(report["samples"][0]["a"]["kind"], "checkpoint_missing");
    assert_eq!(report["samples"][0]["b"]["text"], "Once upon a time there was");
}

#[test]
fn remote_failure_is_reported_and_contained() {
    let ws = Workspace::new(
        "echo 'LoadError: cannot load such file -- nanochat' >&2\nexit 1\n",
        &["The meaning of life is"],
    );

    let output = ws.run(|_| {});
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(0));
    assert!(text.contains("(failed: process failed)"));
    assert!(text.contains("cannot load such file"));
}

#[test]
fn invalid_sampling_parameters_are_fatal() {
    let ws = Workspace::new("exit 0\n", &["Hello"]);

    let output = ws.run(|c| {
        c.env("TOP_P", "1.5");
    });

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid sampling parameters"), "stderr:\n{stderr}");
}

#[test]
fn oversized_timeout_falls_back_instead_of_crashing() {
    let ws = Workspace::new(
        "cat > /dev/null\necho 'Hello there'\n",
        &["Hello"],
    );

    let output = ws.run(|c| {
        c.env("REMOTE_TIMEOUT_SECS", "1e30");
    });
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(0), "stderr:\n{}", String::from_utf8_lossy(&output.stderr));
    assert!(text.contains("ruby length: 11 chars"));
}

#[test]
fn unreadable_prompts_file_is_fatal() {
    let ws = Workspace::new("exit 0\n", &["Hello"]);
    fs::write(ws.path("prompts.json"), "{}").unwrap();

    let output = ws.run(|_| {});
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn interrupt_stops_the_run_with_failure_status() {
    let ws = Workspace::new("sleep 30\n", &["Once upon a time", "Hello"]);
    let mut child = ws
        .command()
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    thread::sleep(Duration::from_millis(1000));
    send_interrupt(child.id());

    let started = Instant::now();
    let status = child.wait().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(status.code(), Some(1));
}

fn send_interrupt(pid: u32) {
    let status = Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}
