use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::executor::AdapterFailure;

/// Runs an external read-only inspection command and captures stdout.
/// The child is polled and killed at the timeout so a wedged external tool
/// can never hold an investigation open.
pub fn run_read_only_command(
    binary: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, AdapterFailure> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(AdapterFailure::Unavailable(format!(
                "`{binary}` is not installed"
            )))
        }
        Err(err) => return Err(AdapterFailure::Crashed(err.to_string())),
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AdapterFailure::Crashed("missing stdout pipe".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AdapterFailure::Crashed("missing stderr pipe".to_string()))?;
    let stdout_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = std::io::BufReader::new(stdout);
        let _ = reader.read_to_string(&mut buf);
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = std::io::BufReader::new(stderr);
        let _ = reader.read_to_string(&mut buf);
        buf
    });

    let start = Instant::now();
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(AdapterFailure::Timeout);
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => return Err(AdapterFailure::Crashed(err.to_string())),
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    match exit_status.code() {
        Some(0) => Ok(stdout),
        // clamscan exits 1 when it finds an infection; the finding itself is
        // the successful result.
        Some(1) if binary.contains("clamscan") => Ok(stdout),
        Some(code) => Err(AdapterFailure::Crashed(format!(
            "`{binary}` exited with code {code}: {}",
            stderr.trim()
        ))),
        None => Err(AdapterFailure::Crashed(format!(
            "`{binary}` terminated by signal"
        ))),
    }
}
