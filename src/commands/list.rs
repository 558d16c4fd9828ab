//! `list`: prints the names of targets that have a usable shell inside them.

use std::path::Path;

use anyhow::{Context, Result};

use crate::context::find_shell;

/// Returns the names of subdirectories of `target_dir` that contain one of
/// the configured shell candidates, i.e. targets that `login`/`run` could
/// actually enter.
pub fn list_targets(target_dir: &Path) -> Result<Vec<String>> {
    if !target_dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = std::fs::read_dir(target_dir)
        .with_context(|| format!("failed to read '{}'", target_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.is_dir() {
            continue;
        }
        if find_shell(&path).is_err() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}

pub fn print_targets(target_dir: &Path) -> Result<()> {
    for name in list_targets(target_dir)? {
        println!("* {name}");
    }
    Ok(())
}
