//! The chroot session: the ordered, irreversible sequence used by both
//! `login` and `run`. Chroot before drop (chroot requires privilege), drop
//! before exec (never exec user code while effective uid is zero),
//! home-chdir after drop (inside the chroot).

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use nix::unistd::Uid;

use crate::context::{find_shell, SessionContext};
use crate::namespace::run_isolated;
use crate::paths::isdir_and_owned_by;
use crate::privilege::{drop_privileges, PrivilegeGuard};
use crate::syscall::Syscall;

/// What to run once inside the chroot, with privileges already dropped.
pub enum Invocation {
    /// `login`: an interactive login shell.
    Login,
    /// `run`: the shell invokes `sh -l -c -- <joined argv>`.
    Run(Vec<String>),
}

/// Best-effort repair of the package-cache symlink at the chroot root.
/// Non-fatal: a missing or unrepairable cache is a warning, not an error,
/// because a freshly-populated target need not have one yet.
fn fix_pkg_cache_symlink() {
    let link = Path::new("/.pkg-cache");
    if link.exists() {
        return;
    }
    if let Err(e) = std::os::unix::fs::symlink("/var/cache/build-box", link) {
        log::warn!("could not repair package cache symlink: {e}");
    }
}

/// Runs steps 1-5 of the chroot session: chdir into `sys_root`, re-verify
/// ownership, raise, `chroot`, drop permanently. After this returns, the
/// process is chrooted and privileges can never be raised again.
fn enter_chroot(syscall: &dyn Syscall, sys_root: &Path, real_uid: Uid) -> Result<()> {
    std::env::set_current_dir(sys_root)
        .with_context(|| format!("could not chdir to '{}'", sys_root.display()))?;

    isdir_and_owned_by(Path::new("."), real_uid).context("chroot target is not owned by user")?;

    let guard = PrivilegeGuard::raise(syscall, real_uid)?;
    syscall
        .chroot(Path::new("."))
        .context("chroot to system root failed")?;
    drop(guard);

    drop_privileges(syscall, real_uid).context("failed to drop privileges in chroot")
}

/// Steps 6-9, run after privileges have been irreversibly dropped: fix the
/// package cache symlink, best-effort chdir to home, find a shell, and
/// `exec` it. Never returns on success.
fn finish_in_chroot(home_dir: Option<&Path>, invocation: &Invocation) -> Result<()> {
    fix_pkg_cache_symlink();

    if let Some(home) = home_dir {
        if let Err(e) = std::env::set_current_dir(home) {
            log::warn!("could not chdir to home '{}': {e}", home.display());
        }
    }

    let sh = find_shell(Path::new("/"))?;

    let mut command = Command::new(&sh);
    match invocation {
        Invocation::Login => {
            command.arg("-l");
        }
        Invocation::Run(args) => {
            if args.is_empty() {
                bail!("missing arguments, nothing to run");
            }
            let joined = args.join(" ");
            command.args(["-l", "-c", "--", &joined]);
        }
    }

    let err = command.exec();
    Err(anyhow::anyhow!("failed to invoke shell '{}': {err}", sh.display()))
}

/// Runs a full chroot session without namespace isolation: the calling
/// process chroots, drops privileges, and `exec`s in place. Only returns
/// on error; success replaces the process image.
pub fn run_session(
    syscall: &dyn Syscall,
    ctx: &SessionContext,
    sys_root: &Path,
    invocation: Invocation,
) -> Result<()> {
    enter_chroot(syscall, sys_root, ctx.real_uid)?;
    finish_in_chroot(Some(ctx.home_dir.as_path()), &invocation)
}

/// Runs a chroot session under PID + mount namespace isolation: the
/// session happens in a forked child that becomes PID 1 of a fresh PID
/// namespace, while the parent forwards termination signals and reaps it.
pub fn run_session_isolated(
    syscall: &dyn Syscall,
    ctx: &SessionContext,
    sys_root: &Path,
    invocation: Invocation,
    mount_proc: bool,
) -> Result<i32> {
    enter_chroot_for_isolation(syscall, sys_root, ctx.real_uid)?;

    let home_dir = ctx.home_dir.clone();
    run_isolated(syscall, ctx.real_uid, mount_proc, move || {
        if let Err(e) = finish_in_chroot(Some(home_dir.as_path()), &invocation) {
            log::error!("{e}");
        }
        std::process::exit(crate::error::RUNTIME_EXIT_CODE);
    })
}

/// Like `enter_chroot`, but stays raised on return: the isolated path
/// needs `unshare`+`fork` to happen while still privileged, and drops
/// privileges itself inside the forked child.
fn enter_chroot_for_isolation(syscall: &dyn Syscall, sys_root: &Path, real_uid: Uid) -> Result<()> {
    std::env::set_current_dir(sys_root)
        .with_context(|| format!("could not chdir to '{}'", sys_root.display()))?;
    isdir_and_owned_by(Path::new("."), real_uid).context("chroot target is not owned by user")?;

    let guard = PrivilegeGuard::raise(syscall, real_uid)?;
    syscall
        .chroot(Path::new("."))
        .context("chroot to system root failed")?;
    // Deliberately leak the guard: `run_isolated` needs a second raised
    // window (for `unshare`+`fork`) immediately afterwards. Both the
    // parent and the forked child drop privileges for themselves once
    // that window closes.
    std::mem::forget(guard);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_invocation_rejects_empty_args() {
        let result = finish_in_chroot(None, &Invocation::Run(vec![]));
        assert!(result.is_err());
    }
}
