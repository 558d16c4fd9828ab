//! Session configuration: the per-invocation context built once at dispatch
//! and consumed read-only by every component downstream of it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use nix::unistd::Uid;

use crate::error::invocation_err;
use crate::paths;

pub const GROUP_NAME: &str = "build-box";

/// Bitset over the four mountable subtrees. Mirrors the numeric layout of
/// the original configuration header (`1`, `2`, `4`, `8`) so that the CLI's
/// `--mount` values and the mount engine agree on what each bit means.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MountMask(u32);

impl MountMask {
    pub const DEV: MountMask = MountMask(1);
    pub const PROC: MountMask = MountMask(2);
    pub const SYS: MountMask = MountMask(4);
    pub const HOME: MountMask = MountMask(8);
    pub const ALL: MountMask = MountMask(0x0F);
    pub const NONE: MountMask = MountMask(0);

    pub fn contains(self, bit: MountMask) -> bool {
        self.0 & bit.0 == bit.0
    }

    pub fn insert(&mut self, bit: MountMask) {
        self.0 |= bit.0;
    }

    pub fn remove(&mut self, bit: MountMask) {
        self.0 &= !bit.0;
    }

    pub fn from_name(name: &str) -> Result<MountMask> {
        match name {
            "dev" => Ok(MountMask::DEV),
            "proc" => Ok(MountMask::PROC),
            "sys" => Ok(MountMask::SYS),
            "home" => Ok(MountMask::HOME),
            other => Err(invocation_err(format!("unknown mount kind '{other}'"))),
        }
    }

    pub fn iter(self) -> impl Iterator<Item = MountMask> {
        [MountMask::DEV, MountMask::PROC, MountMask::SYS, MountMask::HOME]
            .into_iter()
            .filter(move |bit| self.contains(*bit))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Flags {
    pub copy_identity_files: bool,
    pub isolate_namespaces: bool,
}

/// The immutable, per-invocation session configuration described in the
/// data model: the invoking user's real identity, where their targets
/// live, and which subtrees to mount.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub real_uid: Uid,
    pub home_dir: PathBuf,
    pub target_dir: PathBuf,
    pub mount_mask: MountMask,
    pub flags: Flags,
}

impl SessionContext {
    /// Builds the context for `real_uid`. `home_dir` is always taken from
    /// the password database, never from `$HOME`, and is verified to be a
    /// real, owned directory before being accepted.
    pub fn build(
        real_uid: Uid,
        target_dir_override: Option<PathBuf>,
        mount_mask: MountMask,
        flags: Flags,
    ) -> Result<Self> {
        let pw_home = lookup_home_dir(real_uid)?;
        let home_dir = paths::isdir_and_owned_by(&pw_home, real_uid)
            .with_context(|| format!("invalid home directory for uid {}", real_uid))?;

        let target_dir = match target_dir_override {
            Some(dir) => dir,
            None => home_dir.join(".bolt").join("targets"),
        };

        Ok(SessionContext {
            real_uid,
            home_dir,
            target_dir,
            mount_mask,
            flags,
        })
    }

    /// Resolves and validates a target name into its absolute directory,
    /// rejecting anything that could escape `target_dir`.
    pub fn target_path(&self, name: &str) -> Result<PathBuf> {
        validate_target_name(name)?;
        Ok(self.target_dir.join(name))
    }
}

/// A target name must be a single path component: no separators, no `..`,
/// no leading `-` (which a careless caller could confuse for a flag), no
/// NUL byte (which Rust's `&str` already excludes by construction).
pub fn validate_target_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invocation_err("target name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(invocation_err(format!("invalid target name '{name}'")));
    }
    if name.contains('/') {
        return Err(invocation_err("target name must not contain '/'"));
    }
    if name.starts_with('-') {
        return Err(invocation_err("target name must not start with '-'"));
    }
    Ok(())
}

fn lookup_home_dir(uid: Uid) -> Result<PathBuf> {
    let user = nix::unistd::User::from_uid(uid)
        .context("failed to query password database")?
        .ok_or_else(|| anyhow::anyhow!("no password database entry for uid {uid}"))?;
    Ok(user.dir)
}

/// Probed in order; the first entry that exists inside the chroot wins.
/// Deliberately not configurable: a user-writable fallback path would be a
/// way to smuggle an attacker-controlled interpreter into the chroot
/// session.
pub const SHELL_CANDIDATES: &[&str] = &["/tools/bin/sh", "/usr/bin/sh"];

/// Finds the first candidate shell that exists under `sys_root`.
pub fn find_shell(sys_root: &Path) -> Result<PathBuf> {
    for candidate in SHELL_CANDIDATES {
        let full = paths::path_join(sys_root, Path::new(candidate));
        if full.exists() {
            return Ok(PathBuf::from(*candidate));
        }
    }
    bail!("no shell found in target (looked for {:?})", SHELL_CANDIDATES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_mask_from_name() {
        assert_eq!(MountMask::from_name("dev").unwrap(), MountMask::DEV);
        assert!(MountMask::from_name("bogus").is_err());
    }

    #[test]
    fn target_name_validation() {
        assert!(validate_target_name("bullseye").is_ok());
        assert!(validate_target_name("../etc").is_err());
        assert!(validate_target_name("a/b").is_err());
        assert!(validate_target_name("").is_err());
        assert!(validate_target_name("-x").is_err());
    }
}
