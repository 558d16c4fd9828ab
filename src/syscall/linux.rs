//! Implements the `Syscall` trait against the real kernel, via `nix`.
use std::any::Any;
use std::path::Path;

use anyhow::Result;
use nix::mount::{mount, umount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{self, Uid};

use super::Syscall;

/// Empty structure to implement `Syscall` for.
#[derive(Clone)]
pub struct LinuxSyscall;

impl Syscall for LinuxSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), nix::errno::Errno> {
        mount(source, target, fstype, flags, data)
    }

    fn umount(&self, target: &Path) -> Result<(), nix::errno::Errno> {
        umount(target)
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        unistd::chroot(path)?;
        Ok(())
    }

    fn seteuid(&self, uid: Uid) -> Result<()> {
        unistd::seteuid(uid)?;
        Ok(())
    }

    fn setuid(&self, uid: Uid) -> Result<()> {
        unistd::setuid(uid)?;
        Ok(())
    }

    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        unshare(flags)?;
        Ok(())
    }
}
