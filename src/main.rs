use clap::Parser;
use nix::unistd::getgid;

use rootcell::cli::{resolve_mount_mask, Commands, Opts};
use rootcell::commands;
use rootcell::context::{Flags, SessionContext, GROUP_NAME};
use rootcell::error::{fatal, CoreError, INVOCATION_EXIT_CODE, RUNTIME_EXIT_CODE};
use rootcell::privilege::{entry_gate, lower_privileges};
use rootcell::syscall::create_syscall;

fn main() {
    let opts = Opts::parse();

    if let Err(e) = rootcell::logger::init(opts.log_file.clone()) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(RUNTIME_EXIT_CODE);
    }

    let syscall = create_syscall();

    let real_uid = match entry_gate(GROUP_NAME) {
        Ok(uid) => uid,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(INVOCATION_EXIT_CODE);
        }
    };

    if let Err(e) = lower_privileges(syscall.as_ref(), real_uid) {
        fatal(&format!("{e}"));
    }

    let code = dispatch(syscall.as_ref(), real_uid, opts.command);
    std::process::exit(code);
}

fn dispatch(syscall: &dyn rootcell::syscall::Syscall, real_uid: nix::unistd::Uid, command: Commands) -> i32 {
    let result = run_command(syscall, real_uid, command);
    match result {
        Ok(code) => code,
        Err(e) => {
            let core = classify(e);
            log::error!("{core}");
            core.exit_code()
        }
    }
}

fn classify(e: anyhow::Error) -> CoreError {
    match e.downcast::<CoreError>() {
        Ok(core) => core,
        Err(e) => CoreError::runtime(e.to_string()),
    }
}

fn run_command(
    syscall: &dyn rootcell::syscall::Syscall,
    real_uid: nix::unistd::Uid,
    command: Commands,
) -> anyhow::Result<i32> {
    match command {
        Commands::Init(args) => {
            let ctx = SessionContext::build(real_uid, args.targets_dir, Default::default(), Flags::default())?;
            commands::init::run(syscall, real_uid, getgid(), &ctx.target_dir)?;
            Ok(0)
        }
        Commands::List(args) => {
            let ctx = SessionContext::build(real_uid, args.targets_dir, Default::default(), Flags::default())?;
            commands::list::print_targets(&ctx.target_dir)?;
            Ok(0)
        }
        Commands::Login(args) => {
            let mask = resolve_mount_mask(&args.mount, args.no_mount)?;
            let flags = Flags {
                copy_identity_files: !args.no_file_copy,
                isolate_namespaces: false,
            };
            let ctx = SessionContext::build(real_uid, args.common.targets_dir, mask, flags)?;
            commands::login::run(syscall, &ctx, &args.target, ctx.flags.copy_identity_files)?;
            // `login::run` only returns on failure.
            Ok(RUNTIME_EXIT_CODE)
        }
        Commands::Run(args) => {
            let mask = resolve_mount_mask(&args.mount, args.no_mount)?;
            let flags = Flags {
                copy_identity_files: !args.no_file_copy,
                isolate_namespaces: args.isolate,
            };
            let ctx = SessionContext::build(real_uid, args.common.targets_dir, mask, flags)?;
            commands::run::run(syscall, &ctx, &args.target, args.command, ctx.flags.copy_identity_files)
        }
        Commands::Mount(args) => {
            let mask = resolve_mount_mask(&args.mount, args.no_mount)?;
            let flags = Flags::default();
            let ctx = SessionContext::build(real_uid, args.common.targets_dir, mask, flags)?;
            commands::mount::run(syscall, &ctx, &args.target)?;
            Ok(0)
        }
        Commands::Umount(args) => {
            let mask = resolve_mount_mask(&args.mount, args.no_mount)?;
            let flags = Flags::default();
            let ctx = SessionContext::build(real_uid, args.common.targets_dir, mask, flags)?;
            commands::umount::run(syscall, &ctx, &args.target)?;
            Ok(0)
        }
    }
}
