//! The Command Safety Gate (spec §4.6): whitelist-driven command
//! validation bracketing every subprocess execution. Never uses a shell
//! interpreter — this is the one place in the crate that deliberately
//! diverges from the teacher binary's own `Command::new("sh").arg("-c")`
//! pattern (`hooks/executor.rs`), which is exactly what this gate exists
//! to forbid.

pub mod blocklist;
pub mod sandbox;
pub mod whitelist;

use crate::cancellation::CancellationToken;
use crate::errors::GateError;
use blocklist::{Blocklist, BlocklistRule};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use whitelist::Whitelist;

/// A command that passed the full validation pipeline (spec §4.6 steps
/// 1–7) and is ready for confirmation + execution.
#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub needs_confirmation: bool,
}

pub struct CommandSafetyGate {
    project_root: PathBuf,
    cwd: Mutex<PathBuf>,
    blocklist: Blocklist,
    whitelist: Whitelist,
}

impl CommandSafetyGate {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            cwd: Mutex::new(project_root.clone()),
            project_root,
            blocklist: Blocklist::default(),
            whitelist: Whitelist::default(),
        }
    }

    pub fn with_blocklist(mut self, blocklist: Blocklist) -> Self {
        self.blocklist = blocklist;
        self
    }

    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn add_blocklist_rule(&mut self, rule: BlocklistRule) {
        self.blocklist.add(rule);
    }

    pub fn current_dir(&self) -> PathBuf {
        self.cwd.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Validate `command` through steps 1–7 of spec §4.6's pipeline.
    /// `cd` is handled internally here (step-6-adjacent special case) by
    /// updating the gate's tracked working directory rather than producing
    /// a `ValidatedCommand`; callers should check `is_cd` before treating
    /// the `Err` path as a rejection.
    pub fn validate(&self, command: &str) -> Result<ValidatedCommand, GateError> {
        let normalized = normalize(command);
        if normalized.trim().is_empty() {
            return Err(GateError::Empty);
        }

        if let Some(rewritten) = self.blocklist.check(&normalized)? {
            return self.validate(&rewritten);
        }

        if let Some(c) = sandbox::first_unquoted_metacharacter(&normalized) {
            return Err(GateError::ShellMetacharacter(c));
        }

        let tokens = shell_words::split(&normalized).map_err(|_| GateError::Empty)?;
        let (exe, args) = tokens
            .split_first()
            .ok_or(GateError::Empty)
            .map(|(e, a)| (e.clone(), a.to_vec()))?;

        if exe == "cd" {
            let target = args.first().cloned().unwrap_or_default();
            self.change_dir(&target)?;
            return Err(GateError::NotWhitelisted(
                "cd is handled internally, not executed".to_string(),
            ));
        }

        let key = whitelist::command_key(&exe);
        let spec = self
            .whitelist
            .get(&key)
            .ok_or_else(|| GateError::NotWhitelisted(key.clone()))?;

        (spec.validator)(&args)?;

        for arg in &args {
            if sandbox::looks_like_path(arg) {
                sandbox::resolve_within_root(&self.current_dir(), &self.project_root, arg)?;
            }
        }

        let executable = self.resolve_venv(&exe);

        Ok(ValidatedCommand {
            executable,
            args,
            needs_confirmation: spec.needs_confirmation,
        })
    }

    /// `cd` is sandboxed to the initial project root: it can never escape
    /// upward out of it (spec §4.6 "Directory change").
    fn change_dir(&self, target: &str) -> Result<(), GateError> {
        let resolved = sandbox::resolve_within_root(&self.current_dir(), &self.project_root, target)?;
        let mut cwd = self.cwd.lock().unwrap_or_else(|e| e.into_inner());
        *cwd = resolved;
        Ok(())
    }

    fn resolve_venv(&self, exe: &str) -> PathBuf {
        for venv_name in [".venv", "venv"] {
            let candidate = self.project_root.join(venv_name).join("bin").join(exe);
            if candidate.exists() {
                return candidate;
            }
        }
        PathBuf::from(exe)
    }

    /// Execute a validated command (spec §4.6 step 9): `shell=false`
    /// always, CWD pinned to the gate's tracked working directory,
    /// stdout/stderr streamed on their own reader tasks, cooperative
    /// cancellation sends SIGTERM then SIGKILL after a grace period.
    pub async fn execute(
        &self,
        validated: &ValidatedCommand,
        cancel: &CancellationToken,
    ) -> std::io::Result<ExecutionOutcome> {
        let mut child = Command::new(&validated.executable)
            .args(&validated.args)
            .current_dir(self.current_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut acc = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                acc.push_str(&line);
                acc.push('\n');
            }
            acc
        });
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut acc = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                acc.push_str(&line);
                acc.push('\n');
            }
            acc
        });

        const GRACE: Duration = Duration::from_secs(5);
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    if cancel.is_cancelled() {
                        send_terminate(&mut child);
                        match tokio::time::timeout(GRACE, child.wait()).await {
                            Ok(status) => break status?,
                            Err(_) => {
                                let _ = child.start_kill();
                                break child.wait().await?;
                            }
                        }
                    }
                }
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ExecutionOutcome {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

/// Ask the child to exit before resorting to a hard kill (spec §4.6
/// "receive terminate, then kill after a grace period"). `nix::sys::signal`
/// has no portable equivalent on non-Unix targets, so there this falls
/// back to `start_kill` directly.
#[cfg(unix)]
fn send_terminate(child: &mut tokio::process::Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

fn normalize(command: &str) -> String {
    let trimmed = command.trim();
    if cfg!(windows) {
        trimmed.replace('/', "\\")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_path_escaping_project_root() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let err = gate.validate("python ../evil.py").unwrap_err();
        assert!(matches!(err, GateError::PathEscapesRoot(_)));
    }

    #[test]
    fn rejects_shell_metacharacters() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let err = gate.validate("run_tests > out.txt").unwrap_err();
        assert!(matches!(err, GateError::ShellMetacharacter('>')));
    }

    #[test]
    fn rejects_absolute_path_argument() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let err = gate.validate("mkdir /tmp/x").unwrap_err();
        assert!(matches!(err, GateError::AbsolutePath(_)));
    }

    #[test]
    fn three_rejections_have_distinct_reasons() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let a = gate.validate("python ../evil.py").unwrap_err();
        let b = gate.validate("run_tests > out.txt").unwrap_err();
        let c = gate.validate("mkdir /tmp/x").unwrap_err();
        assert_ne!(format!("{a:?}"), format!("{b:?}"));
        assert_ne!(format!("{b:?}"), format!("{c:?}"));
        assert_ne!(format!("{a:?}"), format!("{c:?}"));
    }

    #[test]
    fn accepts_known_safe_command_with_relative_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("manage.py"), "").unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let validated = gate.validate("pytest tests/").unwrap();
        assert_eq!(validated.args, vec!["tests/".to_string()]);
        assert!(!validated.needs_confirmation);
    }

    #[test]
    fn unknown_command_is_rejected() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let err = gate.validate("curl http://example.com").unwrap_err();
        assert!(matches!(err, GateError::NotWhitelisted(_)));
    }

    #[test]
    fn cd_updates_tracked_working_directory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let _ = gate.validate("cd sub");
        assert_eq!(gate.current_dir(), dir.path().join("sub"));
    }

    #[test]
    fn cd_cannot_escape_project_root_upward() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let err = gate.validate("cd ..").unwrap_err();
        assert!(matches!(err, GateError::PathEscapesRoot(_)));
        assert_eq!(gate.current_dir(), dir.path());
    }

    #[tokio::test]
    async fn execute_streams_stdout_and_reports_exit_code() {
        let dir = tempdir().unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let validated = ValidatedCommand {
            executable: PathBuf::from("echo"),
            args: vec!["hello".to_string()],
            needs_confirmation: false,
        };
        let outcome = gate.execute(&validated, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[test]
    fn venv_executable_is_rewritten_when_present() {
        let dir = tempdir().unwrap();
        let venv_bin = dir.path().join(".venv").join("bin");
        std::fs::create_dir_all(&venv_bin).unwrap();
        std::fs::write(venv_bin.join("python"), "").unwrap();
        let gate = CommandSafetyGate::new(dir.path());
        let validated = gate.validate("python manage.py check").unwrap();
        assert_eq!(validated.executable, venv_bin.join("python"));
    }
}
