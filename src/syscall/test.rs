use std::{
    any::Any,
    cell::RefCell,
    path::{Path, PathBuf},
};

use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::Uid;

use super::Syscall;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MountArgs {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub flags: MsFlags,
    pub data: Option<String>,
}

#[derive(Clone, Default)]
pub struct TestHelperSyscall {
    mount_args: RefCell<Vec<MountArgs>>,
    umount_args: RefCell<Vec<PathBuf>>,
    chroot_args: RefCell<Vec<PathBuf>>,
    seteuid_args: RefCell<Vec<Uid>>,
    setuid_args: RefCell<Vec<Uid>>,
    unshare_args: RefCell<Vec<CloneFlags>>,
}

impl Syscall for TestHelperSyscall {
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
    ) -> anyhow::Result<(), nix::errno::Errno> {
        self.mount_args.borrow_mut().push(MountArgs {
            source: source.map(|x| x.to_owned()),
            target: target.to_owned(),
            fstype: fstype.map(|x| x.to_owned()),
            flags,
            data: data.map(|x| x.to_owned()),
        });
        Ok(())
    }

    fn umount(&self, target: &Path) -> anyhow::Result<(), nix::errno::Errno> {
        self.umount_args.borrow_mut().push(target.to_owned());
        Ok(())
    }

    fn chroot(&self, path: &Path) -> anyhow::Result<()> {
        self.chroot_args.borrow_mut().push(path.to_owned());
        Ok(())
    }

    fn seteuid(&self, uid: Uid) -> anyhow::Result<()> {
        self.seteuid_args.borrow_mut().push(uid);
        Ok(())
    }

    fn setuid(&self, uid: Uid) -> anyhow::Result<()> {
        self.setuid_args.borrow_mut().push(uid);
        Ok(())
    }

    fn unshare(&self, flags: CloneFlags) -> anyhow::Result<()> {
        self.unshare_args.borrow_mut().push(flags);
        Ok(())
    }
}

impl TestHelperSyscall {
    pub fn get_mount_args(&self) -> Vec<MountArgs> {
        self.mount_args.borrow().clone()
    }

    pub fn get_umount_args(&self) -> Vec<PathBuf> {
        self.umount_args.borrow().clone()
    }

    pub fn get_chroot_args(&self) -> Vec<PathBuf> {
        self.chroot_args.borrow().clone()
    }

    pub fn get_seteuid_args(&self) -> Vec<Uid> {
        self.seteuid_args.borrow().clone()
    }

    pub fn get_setuid_args(&self) -> Vec<Uid> {
        self.setuid_args.borrow().clone()
    }

    pub fn get_unshare_args(&self) -> Vec<CloneFlags> {
        self.unshare_args.borrow().clone()
    }
}
