//! The process launcher: runs an external helper with stdout and stderr
//! merged into one captured, right-trimmed buffer, optionally raising
//! privileges for that one child only, via a pre-exec hook that runs after
//! the fork and before the exec — never across the fork in the parent.

use std::io::Read;
use std::os::unix::io::FromRawFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use nix::unistd::Uid;

/// Output buffers larger than this are truncated; a runaway child should
/// not be able to make the parent grow without bound.
const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

pub struct CaptureOutput {
    pub text: String,
    pub status: i32,
}

/// Runs `cmd` with `args`, `LC_ALL=C` set, stdout and stderr merged into a
/// single captured stream. When `raise_to_root` is set, the child (and
/// only the child) raises its effective uid back to root immediately
/// before the exec that replaces its process image.
pub fn capture_output(cmd: &str, args: &[&str], raise_to_root: bool) -> Result<CaptureOutput> {
    let (read_fd, write_fd) = nix::unistd::pipe().context("failed to create pipe")?;

    let stdout_fd = nix::unistd::dup(write_fd).context("failed to dup pipe fd")?;
    let stdout = unsafe { std::fs::File::from_raw_fd(stdout_fd) };
    let stderr = unsafe { std::fs::File::from_raw_fd(write_fd) };

    let mut command = Command::new(cmd);
    command
        .args(args)
        .env("LC_ALL", "C")
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .stdin(Stdio::null());

    if raise_to_root {
        unsafe {
            command.pre_exec(|| {
                nix::unistd::seteuid(Uid::from_raw(0))
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }
    }

    let mut child = command.spawn().with_context(|| format!("failed to start '{cmd}'"))?;

    // The parent must not hold the write end open, or `read` below will
    // never see EOF.
    drop(command);

    let mut read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };

    let mut buf = Vec::new();
    read_file
        .by_ref()
        .take(MAX_CAPTURE_BYTES as u64)
        .read_to_end(&mut buf)
        .context("failed to read child output")?;

    let status = child.wait().context("failed to wait for child")?;

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    rtrim_in_place(&mut text);

    Ok(CaptureOutput {
        text,
        status: status.code().unwrap_or(-1),
    })
}

/// Strips trailing carriage returns, newlines, spaces, and DEL bytes.
fn rtrim_in_place(s: &mut String) {
    while matches!(s.as_bytes().last(), Some(b'\r' | b'\n' | b' ' | 127)) {
        s.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_combined_stdout_and_stderr() {
        let out = capture_output("sh", &["-c", "echo out; echo err 1>&2"], false).unwrap();
        assert!(out.text.contains("out"));
        assert!(out.text.contains("err"));
        assert_eq!(out.status, 0);
    }

    #[test]
    fn trims_trailing_whitespace() {
        let out = capture_output("printf", &["hello\\n\\n  "], false).unwrap();
        assert_eq!(out.text, "hello");
    }

    #[test]
    fn propagates_nonzero_exit_status() {
        let out = capture_output("sh", &["-c", "exit 7"], false).unwrap();
        assert_eq!(out.status, 7);
    }

    #[test]
    fn rtrim_strips_expected_byte_set() {
        let mut s = String::from("abc \r\n\u{7f}");
        rtrim_in_place(&mut s);
        assert_eq!(s, "abc");
    }
}
