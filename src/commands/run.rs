//! `run`: mounts a target's configured subtrees, propagates host identity
//! into it, sanitizes the environment, and runs a command inside it, either
//! in place or (with `--isolate`) under a fresh PID and mount namespace.

use anyhow::{Context, Result};

use crate::chroot::{self, Invocation};
use crate::context::{MountMask, SessionContext};
use crate::env::sanitize_environment;
use crate::error::{invocation_err, RUNTIME_EXIT_CODE};
use crate::identity::propagate_identity;
use crate::mount::MountEngine;
use crate::syscall::Syscall;

pub fn run(
    syscall: &dyn Syscall,
    ctx: &SessionContext,
    target: &str,
    command: Vec<String>,
    copy_identity_files: bool,
) -> Result<i32> {
    if command.is_empty() {
        return Err(invocation_err("missing arguments, nothing to run"));
    }

    let sys_root = ctx.target_path(target)?;

    if std::fs::symlink_metadata(&sys_root).is_err() {
        return Err(invocation_err(format!("target '{target}' not found")));
    }

    MountEngine::new(syscall).mount_any(ctx.mount_mask, &sys_root, &ctx.home_dir, ctx.real_uid)?;

    if copy_identity_files {
        propagate_identity(&sys_root).with_context(|| format!("failed to update '{}'", sys_root.display()))?;
    }

    sanitize_environment();

    if ctx.flags.isolate_namespaces {
        let mount_proc = ctx.mount_mask.contains(MountMask::PROC);
        chroot::run_session_isolated(syscall, ctx, &sys_root, Invocation::Run(command), mount_proc)
    } else {
        chroot::run_session(syscall, ctx, &sys_root, Invocation::Run(command))?;
        // `run_session` only returns on failure; a successful exec replaces
        // the process image and never reaches here.
        Ok(RUNTIME_EXIT_CODE)
    }
}
