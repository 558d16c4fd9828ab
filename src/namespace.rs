//! Optional PID + mount namespace isolation for `run --isolate`: the child
//! becomes PID 1 of a fresh PID namespace with its own `/proc`, and the
//! parent forwards termination signals to it and reaps it.

use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::{Context, Result};
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid, Uid};

use crate::privilege::drop_privileges;
use crate::syscall::Syscall;

static CHILD_PID: AtomicI32 = AtomicI32::new(0);

extern "C" fn forward_sigkill(_sig: libc::c_int) {
    let pid = CHILD_PID.load(Ordering::SeqCst);
    if pid != 0 {
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
    }
}

/// Installs SIGTERM/SIGINT/SIGHUP handlers that forward SIGKILL to `pid`.
fn install_signal_forwarding(pid: Pid) -> Result<()> {
    CHILD_PID.store(pid.as_raw(), Ordering::SeqCst);
    let handler = SigHandler::Handler(forward_sigkill);
    unsafe {
        signal::signal(Signal::SIGTERM, handler).context("failed to install SIGTERM handler")?;
        signal::signal(Signal::SIGINT, handler).context("failed to install SIGINT handler")?;
        signal::signal(Signal::SIGHUP, handler).context("failed to install SIGHUP handler")?;
    }
    Ok(())
}

/// Waits for `pid`, retrying on `EINTR`, and maps its termination into the
/// process exit status convention used throughout this crate: the child's
/// own exit code if it exited normally, or a runtime-error sentinel if it
/// was killed by a signal.
fn wait_for_child(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, _, _)) => return Ok(crate::error::RUNTIME_EXIT_CODE),
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(anyhow::anyhow!("failed to wait for child: {e}")),
        }
    }
}

/// Mounts a fresh `/proc` (if requested) and then permanently drops
/// privileges for the calling process. Shared by both forked paths: the
/// confined child needs it before `child_fn` execs anything, and the
/// parent needs it before it settles in to wait, since once `unshare`+
/// `fork` are done neither process needs root any longer.
fn finish_privileged_setup(syscall: &dyn Syscall, real_uid: Uid, mount_fresh_proc: bool) -> Result<()> {
    if mount_fresh_proc {
        syscall
            .mount(None, Path::new("/proc"), Some("proc"), MsFlags::empty(), None)
            .map_err(|e| anyhow::anyhow!("failed to mount /proc inside namespace: {e}"))?;
    }
    drop_privileges(syscall, real_uid)
}

/// Runs `child_fn` isolated in a new PID + mount namespace. `child_fn` is
/// expected to `exec` before returning; if it returns at all, isolation is
/// torn down with that as the exit status.
///
/// `syscall` must already be in a raised-privilege window when this is
/// called: `unshare` itself requires it, and the `fork` that follows must
/// happen while still raised so both the parent and the child inherit root
/// long enough to finish their own privileged setup (fresh `/proc` for the
/// child) before each permanently drops to `real_uid`.
pub fn run_isolated<F>(syscall: &dyn Syscall, real_uid: Uid, mount_fresh_proc: bool, child_fn: F) -> Result<i32>
where
    F: FnOnce() -> !,
{
    syscall
        .unshare(CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS)
        .context("failed to isolate process")?;

    match unsafe { fork() }.context("fork failed")? {
        ForkResult::Child => {
            if let Err(e) = finish_privileged_setup(syscall, real_uid, mount_fresh_proc) {
                log::error!("failed to drop privileges in confined child: {e}");
                std::process::exit(crate::error::RUNTIME_EXIT_CODE);
            }
            child_fn();
        }
        ForkResult::Parent { child } => {
            if let Err(e) = drop_privileges(syscall, real_uid) {
                log::error!("failed to drop privileges after fork: {e}");
            }
            install_signal_forwarding(child)?;
            wait_for_child(child)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestHelperSyscall;

    #[test]
    fn finish_privileged_setup_drops_privileges() {
        let sys = TestHelperSyscall::default();
        finish_privileged_setup(&sys, Uid::from_raw(1000), false).unwrap();
        assert_eq!(sys.get_setuid_args(), vec![Uid::from_raw(1000)]);
    }

    #[test]
    fn finish_privileged_setup_mounts_proc_before_dropping() {
        let sys = TestHelperSyscall::default();
        finish_privileged_setup(&sys, Uid::from_raw(1000), true).unwrap();
        assert_eq!(sys.get_mount_args().len(), 1);
        assert_eq!(sys.get_setuid_args(), vec![Uid::from_raw(1000)]);
    }
}
