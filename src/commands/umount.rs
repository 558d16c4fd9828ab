//! `umount`: unmounts a target's selected subtrees, mirroring `mount`'s
//! selection convention (no `-m` flags and no `--no-mount` means "all").

use anyhow::Result;

use crate::context::SessionContext;
use crate::mount::MountEngine;
use crate::syscall::Syscall;

pub fn run(syscall: &dyn Syscall, ctx: &SessionContext, target: &str) -> Result<()> {
    let sys_root = ctx.target_path(target)?;
    let engine = MountEngine::new(syscall);
    engine.umount_any(ctx.mount_mask, &sys_root, &ctx.home_dir, ctx.real_uid)
}
