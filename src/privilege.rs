//! The privilege boundary: raise/lower/drop around the small number of
//! syscalls that actually need effective uid 0, plus the caller-gate checks
//! performed once at process entry.
//!
//! A raised window is represented by [`PrivilegeGuard`], whose `Drop` impl
//! lowers privileges unconditionally. This makes "every raise is paired
//! with a lower on every exit path" structural rather than a convention a
//! caller has to remember: a raised window cannot outlive the scope that
//! created it, whether that scope returns normally, via `?`, or by
//! panicking.

use std::cell::Cell;
use std::ffi::CString;

use anyhow::{bail, Result};
use nix::unistd::{getgid, getgroups, getuid, Gid, Uid};

use crate::error::fatal;
use crate::syscall::Syscall;

thread_local! {
    /// Tracks whether a raised window is currently open on this thread.
    /// A second `raise()` while one is already open is a programming bug,
    /// not a recoverable runtime condition: it means some earlier guard
    /// was forgotten or a code path re-entered privileged logic.
    static RAISED: Cell<bool> = Cell::new(false);
}

/// An open privilege-raise window. Lowers back to the real uid when
/// dropped, regardless of how the scope holding it is exited.
pub struct PrivilegeGuard<'a> {
    syscall: &'a dyn Syscall,
    real_uid: Uid,
}

impl<'a> PrivilegeGuard<'a> {
    /// Raises effective uid to root. Panics-via-abort on nested re-raise;
    /// see the module docs.
    pub fn raise(syscall: &'a dyn Syscall, real_uid: Uid) -> Result<Self> {
        let already_raised = RAISED.with(|r| r.replace(true));
        if already_raised {
            fatal("nested privilege raise");
        }
        if let Err(e) = syscall.seteuid(Uid::from_raw(0)) {
            RAISED.with(|r| r.set(false));
            bail!("failed to raise privileges: {e}");
        }
        Ok(PrivilegeGuard { syscall, real_uid })
    }
}

impl Drop for PrivilegeGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.syscall.seteuid(self.real_uid) {
            // There is no safe way to continue running with an effective
            // uid we failed to lower away from root.
            fatal(&format!("failed to lower privileges: {e}"));
        }
        RAISED.with(|r| r.set(false));
    }
}

/// Permanently drops both real and effective uid to `real_uid`. One-way:
/// no further `raise` can succeed afterwards. Used once, after `chroot`
/// and before `exec`.
pub fn drop_privileges(syscall: &dyn Syscall, real_uid: Uid) -> Result<()> {
    syscall
        .setuid(real_uid)
        .map_err(|e| anyhow::anyhow!("could not drop privileges: {e}"))
}

/// Lowers effective uid back to `real_uid` outside of a guard scope. Used
/// once, right after the setuid-root binary starts, before any
/// user-controlled code path is taken.
pub fn lower_privileges(syscall: &dyn Syscall, real_uid: Uid) -> Result<()> {
    syscall
        .seteuid(real_uid)
        .map_err(|e| anyhow::anyhow!("failed to lower privileges: {e}"))
}

/// Name of the environment variable an outer wrapper must set before this
/// binary will do anything at all.
pub const WRAPPER_SIGNATURE_VAR: &str = "ROOTCELL_WRAPPER";

/// Refuses to proceed unless invoked through the trusted outer wrapper.
pub fn require_wrapper_signature() -> Result<()> {
    if std::env::var_os(WRAPPER_SIGNATURE_VAR).is_none() {
        bail!("refusing to run outside of the authorized wrapper");
    }
    Ok(())
}

/// Refuses root itself from using this tool: it grants no privilege root
/// doesn't already have, and allowing it would make the group-membership
/// check below meaningless.
pub fn require_non_root(real_uid: Uid) -> Result<()> {
    if real_uid.is_root() {
        bail!("this tool must not be invoked as root");
    }
    Ok(())
}

/// Checks that `real_uid`'s primary or supplementary groups include
/// `group_name`, resolved through the system group database.
pub fn require_group_member(group_name: &str) -> Result<()> {
    let name = CString::new(group_name).map_err(|_| anyhow::anyhow!("invalid group name"))?;
    let group = unsafe { libc::getgrnam(name.as_ptr()) };
    if group.is_null() {
        bail!("group '{group_name}' not found");
    }
    let gid = Gid::from_raw(unsafe { (*group).gr_gid });

    if getgid() == gid {
        return Ok(());
    }

    let supplementary = getgroups().unwrap_or_default();
    if supplementary.iter().any(|g| *g == gid) {
        return Ok(());
    }

    bail!("caller is not a member of required group '{group_name}'")
}

/// Runs the full entry gate: wrapper signature present, caller isn't root,
/// caller is in the required group. Returns the caller's real uid on
/// success, having touched no privileged syscall yet.
pub fn entry_gate(group_name: &str) -> Result<Uid> {
    require_wrapper_signature()?;
    let real_uid = getuid();
    require_non_root(real_uid)?;
    require_group_member(group_name)?;
    Ok(real_uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestHelperSyscall;
    use serial_test::serial;

    #[test]
    #[serial]
    fn wrapper_signature_required() {
        std::env::remove_var(WRAPPER_SIGNATURE_VAR);
        assert!(require_wrapper_signature().is_err());
        std::env::set_var(WRAPPER_SIGNATURE_VAR, "1");
        assert!(require_wrapper_signature().is_ok());
        std::env::remove_var(WRAPPER_SIGNATURE_VAR);
    }

    #[test]
    fn root_is_rejected() {
        assert!(require_non_root(Uid::from_raw(0)).is_err());
        assert!(require_non_root(Uid::from_raw(1000)).is_ok());
    }

    #[test]
    fn guard_lowers_on_drop() {
        let sys = TestHelperSyscall::default();
        {
            let _g = PrivilegeGuard::raise(&sys, Uid::from_raw(1000)).unwrap();
            assert_eq!(sys.get_seteuid_args(), vec![Uid::from_raw(0)]);
        }
        assert_eq!(
            sys.get_seteuid_args(),
            vec![Uid::from_raw(0), Uid::from_raw(1000)]
        );
    }

    #[test]
    fn guard_lowers_on_early_return_via_question_mark() {
        let sys = TestHelperSyscall::default();

        fn fallible(sys: &dyn Syscall) -> Result<()> {
            let _g = PrivilegeGuard::raise(sys, Uid::from_raw(1000))?;
            bail!("boom")
        }

        assert!(fallible(&sys).is_err());
        assert_eq!(
            sys.get_seteuid_args(),
            vec![Uid::from_raw(0), Uid::from_raw(1000)]
        );
    }
}
