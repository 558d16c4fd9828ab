//! `login`: mounts a target's configured subtrees, propagates host identity
//! into it, sanitizes the environment, and execs an interactive login shell.

use anyhow::{Context, Result};

use crate::chroot::{self, Invocation};
use crate::context::SessionContext;
use crate::env::sanitize_environment;
use crate::error::invocation_err;
use crate::identity::propagate_identity;
use crate::mount::MountEngine;
use crate::syscall::Syscall;

pub fn run(syscall: &dyn Syscall, ctx: &SessionContext, target: &str, copy_identity_files: bool) -> Result<()> {
    let sys_root = ctx.target_path(target)?;

    if std::fs::symlink_metadata(&sys_root).is_err() {
        return Err(invocation_err(format!("target '{target}' not found")));
    }

    MountEngine::new(syscall).mount_any(ctx.mount_mask, &sys_root, &ctx.home_dir, ctx.real_uid)?;

    if copy_identity_files {
        propagate_identity(&sys_root).with_context(|| format!("failed to update '{}'", sys_root.display()))?;
    }

    sanitize_environment();

    chroot::run_session(syscall, ctx, &sys_root, Invocation::Login)
}
