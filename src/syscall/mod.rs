//! An interface trait so the rest of the crate can call the handful of
//! privileged syscalls it needs without worrying about their implementation,
//! and so unit tests can assert on the exact privileged-call sequence
//! without requiring root or a real mount namespace.
pub mod linux;
pub mod test;

use std::any::Any;
use std::path::Path;

use anyhow::Result;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::Uid;

pub trait Syscall {
    fn as_any(&self) -> &dyn Any;

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), nix::errno::Errno>;

    fn umount(&self, target: &Path) -> Result<(), nix::errno::Errno>;

    fn chroot(&self, path: &Path) -> Result<()>;

    fn seteuid(&self, uid: Uid) -> Result<()>;

    /// Permanently sets both real and effective uid. Irreversible.
    fn setuid(&self, uid: Uid) -> Result<()>;

    fn unshare(&self, flags: CloneFlags) -> Result<()>;
}

pub fn create_syscall() -> Box<dyn Syscall> {
    if cfg!(test) {
        Box::new(test::TestHelperSyscall::default())
    } else {
        Box::new(linux::LinuxSyscall)
    }
}
