//! `init`: creates the per-user target directory if it does not already exist.

use anyhow::{Context, Result};
use nix::unistd::{chown, Gid, Uid};

use crate::privilege::PrivilegeGuard;
use crate::syscall::Syscall;

pub fn run(syscall: &dyn Syscall, real_uid: Uid, real_gid: Gid, target_dir: &std::path::Path) -> Result<()> {
    if target_dir.exists() {
        return Ok(());
    }

    let guard = PrivilegeGuard::raise(syscall, real_uid)?;
    let result = (|| -> Result<()> {
        std::fs::create_dir_all(target_dir)
            .with_context(|| format!("failed to create '{}'", target_dir.display()))?;
        chown(target_dir, Some(real_uid), Some(real_gid))
            .with_context(|| format!("failed to chown '{}'", target_dir.display()))?;
        Ok(())
    })();
    drop(guard);
    result
}
