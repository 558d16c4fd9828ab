//! Path joining and containment checks. These gate every privileged
//! operation, so they lean on the canonical real-path resolver rather than
//! on lexical string comparison wherever a syscall is about to consult the
//! result.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::unistd::Uid;
use path_clean::PathClean;

/// Joins `base` and `sub` into a single, lexically cleaned path, regardless
/// of leading/trailing separators on either side. Does not touch the
/// filesystem.
pub fn path_join(base: &Path, sub: &Path) -> PathBuf {
    let sub = sub.strip_prefix("/").unwrap_or(sub);
    base.join(sub).clean()
}

/// Resolves `path` to its canonical, symlink-free form.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("could not resolve '{}'", path.display()))
}

fn metadata_owned_by(meta: &Metadata, uid: Uid) -> bool {
    meta.uid() == uid.as_raw()
}

/// Verifies that, after canonicalization, `path` is a directory (not a
/// symlink, not any other file type) owned by `uid`. Re-checked immediately
/// before every privileged operation that touches a user-controlled path;
/// never relied on from an earlier check, since the filesystem can change
/// between checks.
pub fn isdir_and_owned_by(path: &Path, uid: Uid) -> Result<PathBuf> {
    let real = canonicalize(path)?;
    let meta = std::fs::symlink_metadata(&real)
        .with_context(|| format!("could not stat '{}'", real.display()))?;

    if !meta.is_dir() {
        bail!("'{}' is not a directory", real.display());
    }
    if !metadata_owned_by(&meta, uid) {
        bail!("'{}' is not owned by the invoking user", real.display());
    }
    Ok(real)
}

/// Verifies that `candidate`, once canonicalized, lies within `base`, once
/// canonicalized. Used before `umount` so a caller cannot trick the tool
/// into unmounting something outside the target tree.
pub fn is_subdir_of(base: &Path, candidate: &Path) -> Result<bool> {
    let base = canonicalize(base)?;
    let candidate = canonicalize(candidate)?;
    Ok(candidate.starts_with(&base) && candidate != base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn path_join_normalizes_separators() {
        assert_eq!(path_join(Path::new("/a/b/"), Path::new("/c/d")), PathBuf::from("/a/b/c/d"));
        assert_eq!(path_join(Path::new("/a/b"), Path::new("c/d")), PathBuf::from("/a/b/c/d"));
        assert_eq!(path_join(Path::new("/a/b//"), Path::new("//c/d")), PathBuf::from("/a/b/c/d"));
    }

    #[test]
    fn isdir_and_owned_by_rejects_non_directory() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("f");
        std::fs::write(&file_path, b"x").unwrap();
        assert!(isdir_and_owned_by(&file_path, Uid::current()).is_err());
    }

    #[test]
    fn isdir_and_owned_by_accepts_owned_directory() {
        let dir = tempdir().unwrap();
        let resolved = isdir_and_owned_by(dir.path(), Uid::current()).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn is_subdir_of_rejects_outside_paths() {
        let base = tempdir().unwrap();
        let sub = base.path().join("child");
        std::fs::create_dir(&sub).unwrap();
        let outside = tempdir().unwrap();

        assert!(is_subdir_of(base.path(), &sub).unwrap());
        assert!(!is_subdir_of(base.path(), outside.path()).unwrap());
        assert!(!is_subdir_of(base.path(), base.path()).unwrap());
    }
}
