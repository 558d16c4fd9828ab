//! Propagates the host's identity and network configuration into a target,
//! so that a process running inside the chroot sees the same user/group
//! names and DNS configuration as outside of it.
//!
//! `/etc/passwd` and `/etc/group` are regenerated from the live,
//! nsswitch-resolved database rather than copied verbatim, which is what
//! lets an LDAP- or SSSD-backed identity show up correctly inside a chroot
//! that has no LDAP/SSSD client of its own. `/etc/resolv.conf` and
//! `/etc/hosts` are copied byte-for-byte. Every write goes through the
//! same atomic temp-file-plus-rename so a concurrent reader never observes
//! a partially written file.

use std::ffi::CStr;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Files copied into the target verbatim, skipped silently if absent on
/// the host (mirrors the original's per-file `lstat` existence check).
const COPIED_FILES: &[&str] = &["/etc/resolv.conf", "/etc/hosts"];

/// Writes `contents` to `dest` atomically: a uniquely-named temp file in
/// the same directory (so the final rename is same-filesystem), given
/// `dest`'s existing mode if it has one, renamed over `dest` on success,
/// and unlinked on any error prior to the rename.
fn atomic_write(dest: &Path, contents: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .with_context(|| format!("'{}' has no parent directory", dest.display()))?;
    let mode = fs::metadata(dest).map(|m| m.mode()).unwrap_or(0o644);

    let tmp_name = format!(
        ".{}.{:x}",
        dest.file_name().and_then(|n| n.to_str()).unwrap_or("tmp"),
        fastrand::u64(..)
    );
    let tmp_path = dir.join(tmp_name);

    let write_result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp_path)
            .with_context(|| format!("failed to create '{}'", tmp_path.display()))?;
        file.write_all(contents)
            .with_context(|| format!("failed to write '{}'", tmp_path.display()))?;
        file.sync_all().ok();
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename '{}' to '{}'", tmp_path.display(), dest.display()))?;
    Ok(())
}

/// Renders every entry of the live password database as
/// `name:passwd:uid:gid:gecos:dir:shell` lines, the classic `passwd(5)`
/// format.
fn render_passwd() -> String {
    let mut out = String::new();
    unsafe {
        libc::setpwent();
        loop {
            let entry = libc::getpwent();
            if entry.is_null() {
                break;
            }
            let e = &*entry;
            out.push_str(&format!(
                "{}:x:{}:{}:{}:{}:{}\n",
                cstr_to_string(e.pw_name),
                e.pw_uid,
                e.pw_gid,
                cstr_to_string(e.pw_gecos),
                cstr_to_string(e.pw_dir),
                cstr_to_string(e.pw_shell),
            ));
        }
        libc::endpwent();
    }
    out
}

/// Renders every entry of the live group database as
/// `name:passwd:gid:member1,member2,...` lines, the classic `group(5)`
/// format.
fn render_group() -> String {
    let mut out = String::new();
    unsafe {
        libc::setgrent();
        loop {
            let entry = libc::getgrent();
            if entry.is_null() {
                break;
            }
            let e = &*entry;
            let mut members = Vec::new();
            let mut i = 0isize;
            loop {
                let member_ptr = *e.gr_mem.offset(i);
                if member_ptr.is_null() {
                    break;
                }
                members.push(cstr_to_string(member_ptr));
                i += 1;
            }
            out.push_str(&format!(
                "{}:x:{}:{}\n",
                cstr_to_string(e.gr_name),
                e.gr_gid,
                members.join(","),
            ));
        }
        libc::endgrent();
    }
    out
}

unsafe fn cstr_to_string(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Copies `src` to `dst` byte-for-byte through the same atomic
/// temp-plus-rename path, preserving `src`'s mode.
fn copy_file_atomic(src: &Path, dst: &Path) -> Result<()> {
    let contents = fs::read(src).with_context(|| format!("failed to read '{}'", src.display()))?;
    atomic_write(dst, &contents)
}

/// Regenerates `<sys_root>/etc/{passwd,group}` from the live database and
/// copies `/etc/resolv.conf`/`/etc/hosts` into the target, all atomically.
/// Files absent on the host are skipped, matching the per-file existence
/// check the rest of this propagation logic inherits conceptually.
pub fn propagate_identity(sys_root: &Path) -> Result<()> {
    let etc = sys_root.join("etc");
    fs::create_dir_all(&etc).with_context(|| format!("failed to create '{}'", etc.display()))?;

    atomic_write(&etc.join("passwd"), render_passwd().as_bytes())
        .context("failed to regenerate passwd database")?;
    atomic_write(&etc.join("group"), render_group().as_bytes())
        .context("failed to regenerate group database")?;

    for name in COPIED_FILES {
        let src = PathBuf::from(name);
        if !src.exists() {
            continue;
        }
        let dst = etc.join(src.file_name().unwrap());
        copy_file_atomic(&src, &dst)
            .with_context(|| format!("failed to propagate '{}'", src.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_destination_with_source_mode() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("passwd");
        fs::write(&dest, b"old").unwrap();
        atomic_write(&dest, b"new-contents").unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new-contents");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("hosts");
        atomic_write(&dest, b"127.0.0.1 localhost\n").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "hosts")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn propagate_identity_renders_passwd_and_group() {
        let dir = tempdir().unwrap();
        propagate_identity(dir.path()).unwrap();
        let passwd = fs::read_to_string(dir.path().join("etc/passwd")).unwrap();
        let group = fs::read_to_string(dir.path().join("etc/group")).unwrap();
        assert!(passwd.lines().count() > 0);
        assert!(group.lines().count() > 0);
        for line in passwd.lines() {
            assert_eq!(line.matches(':').count(), 6);
        }
    }
}
