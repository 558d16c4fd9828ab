use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::context::MountMask;

#[derive(Parser, Debug)]
#[command(name = "rootcell", version, about = "Enter and manage self-owned chroot targets")]
pub struct Opts {
    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Creates the per-user target directory if it does not already exist.
    Init(CommonArgs),
    /// Opens an interactive login shell inside a target.
    Login(EnterArgs),
    /// Runs a command inside a target.
    Run(RunArgs),
    /// Bind-mounts a target's configured subtrees.
    Mount(EnterArgs),
    /// Unmounts a target's configured subtrees.
    Umount(EnterArgs),
    /// Lists targets available to the caller.
    List(CommonArgs),
}

#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// Override the directory targets are searched for in.
    #[arg(short = 't', long = "targets")]
    pub targets_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct EnterArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Restrict the mount set to the given kind(s): dev, proc, sys, home.
    /// Repeatable. Defaults to all four.
    #[arg(short = 'm', long = "mount")]
    pub mount: Vec<String>,

    /// Mount nothing at all.
    #[arg(long = "no-mount", conflicts_with = "mount")]
    pub no_mount: bool,

    /// Skip copying passwd/group/resolv.conf/hosts into the target.
    #[arg(long = "no-file-copy")]
    pub no_file_copy: bool,

    pub target: String,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(short = 'm', long = "mount")]
    pub mount: Vec<String>,

    #[arg(long = "no-mount", conflicts_with = "mount")]
    pub no_mount: bool,

    #[arg(long = "no-file-copy")]
    pub no_file_copy: bool,

    /// Run in a separate PID and mount namespace.
    #[arg(long = "isolate")]
    pub isolate: bool,

    pub target: String,

    /// Command and arguments to run, after `--`.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Resolves an `EnterArgs`/`RunArgs`-style mount selection into a
/// `MountMask`: an empty selection (and no `--no-mount`) means "all".
pub fn resolve_mount_mask(selected: &[String], no_mount: bool) -> anyhow::Result<MountMask> {
    if no_mount {
        return Ok(MountMask::NONE);
    }
    if selected.is_empty() {
        return Ok(MountMask::ALL);
    }
    let mut mask = MountMask::NONE;
    for name in selected {
        mask.insert(MountMask::from_name(name)?);
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_means_all() {
        let mask = resolve_mount_mask(&[], false).unwrap();
        assert_eq!(mask, MountMask::ALL);
    }

    #[test]
    fn no_mount_wins_regardless_of_selection() {
        let mask = resolve_mount_mask(&["dev".to_string()], true).unwrap();
        assert_eq!(mask, MountMask::NONE);
    }

    #[test]
    fn explicit_selection_is_honored() {
        let mask = resolve_mount_mask(&["dev".to_string(), "sys".to_string()], false).unwrap();
        assert!(mask.contains(MountMask::DEV));
        assert!(mask.contains(MountMask::SYS));
        assert!(!mask.contains(MountMask::PROC));
    }
}
