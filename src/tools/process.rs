use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Keep only the tail of stderr in error messages.
const MAX_DIAGNOSTIC_LINES: usize = 20;

#[derive(Debug)]
pub enum RunFailure {
    NotFound,
    TimedOut(Duration),
    Spawn(std::io::Error),
    Exited { code: Option<i32>, stderr: String },
}

/// Runs `program` to completion as an async child.
///
/// The child gets its own process group so a timeout can take down anything
/// it spawned (yt-dlp forks ffmpeg for merges).
pub async fn run(program: &str, args: &[String], limit: Duration) -> Result<Output, RunFailure> {
    debug!("Ejecutando {program} {:?}", args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            RunFailure::NotFound
        } else {
            RunFailure::Spawn(error)
        }
    })?;
    let mut group = GroupGuard { pid: child.id() };

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => {
            group.disarm();
            result.map_err(RunFailure::Spawn)?
        }
        Err(_) => {
            warn!(
                "{program} excedio el tiempo limite de {}s, terminando el proceso",
                limit.as_secs()
            );
            return Err(RunFailure::TimedOut(limit));
        }
    };

    if !output.status.success() {
        return Err(RunFailure::Exited {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output)
}

/// Kills the child's process group when dropped while still armed, which
/// covers both a timeout and the caller's future being dropped mid-run.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.pid.is_some() {
            kill_process_group(self.pid.take());
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|value| i32::try_from(value).ok()) else {
        return;
    };
    if let Err(error) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!("No se pudo terminar el grupo de procesos {pid}: {error}");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Last non-empty lines of a tool's stderr.
pub fn diagnostic_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(MAX_DIAGNOSTIC_LINES);
    lines[start..].join("\n")
}

/// Probes a binary at startup; returns false when it cannot be started.
pub async fn is_available(program: &str, version_flag: &str) -> bool {
    let args = [version_flag.to_string()];
    match run(program, &args, Duration::from_secs(15)).await {
        Ok(_) => true,
        Err(RunFailure::NotFound) => false,
        Err(failure) => {
            debug!("{program} {version_flag} fallo: {failure:?}");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_non_empty_lines() {
        let stderr = (1..=30)
            .map(|n| format!("line {n}\n\n"))
            .collect::<String>();
        let tail = diagnostic_tail(&stderr);
        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), MAX_DIAGNOSTIC_LINES);
        assert_eq!(lines.first(), Some(&"line 11"));
        assert_eq!(lines.last(), Some(&"line 30"));
    }

    #[tokio::test]
    async fn missing_binary_is_reported_as_not_found() {
        let result = run(
            "link2video-definitely-missing-binary",
            &[],
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(RunFailure::NotFound)));
        assert!(!is_available("link2video-definitely-missing-binary", "--version").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_child_is_killed_on_timeout() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let started = std::time::Instant::now();
        let result = run("sh", &args, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(RunFailure::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(target_os = "linux")]
    fn is_gone(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_the_run_kills_grandchildren() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let args = vec!["-c".to_string(), script];

        let dropped = tokio::time::timeout(
            Duration::from_millis(500),
            run("sh", &args, Duration::from_secs(60)),
        )
        .await;
        assert!(dropped.is_err());

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid");
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while !is_gone(pid) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(is_gone(pid), "grandchild {pid} survived");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_captures_stderr() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        match run("sh", &args, Duration::from_secs(5)).await {
            Err(RunFailure::Exited { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
