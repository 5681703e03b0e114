//! Mount a TorBox account as a read-only media library.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

mod app_config;
mod daemon;
mod provider;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "A read-only filesystem over your TorBox downloads.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a media-fs config TOML."
    )]
    config_path: Option<PathBuf>,

    #[arg(short, long, value_parser, help = "Override the configured mount point.")]
    mount_point: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Mount the filesystem and serve it until interrupted.
    Run {
        /// Run the daemon in the background.
        #[arg(short, long, help = "Run the daemon in the background.")]
        daemonize: bool,
    },
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let mut config = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    if let Some(mount_point) = args.mount_point {
        config.mount_point = mount_point;
    }
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    let Command::Run { daemonize } = args.command.unwrap_or(Command::Run { daemonize: false });

    if let Err(e) = Trc::default().daemonized(daemonize).init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }

    if !daemonize {
        if let Err(e) = daemon::spawn(config) {
            error!("Daemon failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    debug!(config = ?config, "Initializing daemon with configuration...");
    if let Some(pid_file_parent) = config.daemon.pid_file.parent()
        && let Err(e) = std::fs::create_dir_all(pid_file_parent)
    {
        error!("Failed to create PID file directory: {e}");
        std::process::exit(1);
    }

    let mut daemonize = daemonize::Daemonize::new()
        .pid_file(&config.daemon.pid_file)
        .chown_pid_file(true)
        .user(config.uid)
        .group(config.gid);

    if let Some(path) = &config.daemon.log_file {
        let opened = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|file| Ok((file.try_clone()?, file)));
        match opened {
            Ok((stdout, stderr)) => {
                daemonize = daemonize.stdout(stdout).stderr(stderr);
            }
            Err(e) => {
                error!(path = %path.display(), "Failed to open log file: {e}");
                std::process::exit(1);
            }
        }
    }

    match daemonize.start() {
        Ok(()) => {
            if let Err(e) = daemon::spawn(config) {
                error!("Daemon failed: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Failed to spawn the daemon: {e}");
            std::process::exit(1);
        }
    }
}
