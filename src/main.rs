//! Walk, resolve and benchmark directory trees through a cached path graph.
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

use scurry::{PathScurry, WalkOptions};

mod app_config;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Cached filesystem path resolution and traversal.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        env = "SCURRY_CONFIG",
        help = "Optional path to a scurry config TOML."
    )]
    config_path: Option<PathBuf>,

    #[arg(long, help = "Working directory to resolve against. Defaults to the current one.")]
    cwd: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every path under a directory, breadth first.
    Walk {
        /// Directory to walk.
        #[arg(default_value = ".")]
        dir: String,

        /// Follow symlinked directories.
        #[arg(short = 'L', long)]
        follow: bool,

        /// Print paths relative to the working directory.
        #[arg(short, long)]
        relative: bool,
    },

    /// Resolve each path and print its absolute form and type.
    Resolve {
        /// Paths to resolve.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Stat each path before printing.
        #[arg(short, long)]
        stat: bool,
    },

    /// Walk a directory repeatedly and report how long each pass takes.
    Bench {
        /// Directory to walk.
        #[arg(default_value = ".")]
        dir: String,

        /// Number of passes over the same tree.
        #[arg(short, long, default_value_t = 5)]
        iterations: usize,
    },

    /// Print the effective configuration.
    Config,
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    if let Err(e) = Trc::default().init() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let config = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        error!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    debug!(config = ?config, "Loaded configuration.");

    let scurry = PathScurry::new(args.cwd.as_deref().unwrap_or(""), config.scurry.clone())
        .unwrap_or_else(|e| {
            error!("Failed to set up the path tree: {e}");
            std::process::exit(1);
        });

    match args.command {
        Command::Walk {
            dir,
            follow,
            relative,
        } => {
            let opts = WalkOptions::default().follow(follow || config.follow);
            for entry in scurry.walk_sync(&dir, &opts) {
                if relative {
                    println!("{}", scurry.relative(&entry));
                } else {
                    println!("{}", entry.fullpath());
                }
            }
        }
        Command::Resolve { paths, stat } => {
            for path in &paths {
                let entry = scurry.entry(path);
                if stat {
                    // Failures are recorded on the entry and show up in its flags.
                    let _ = entry.lstat_sync();
                }
                println!("{}\t{}\t{:?}", entry.fullpath(), entry.type_name(), entry.flags());
            }
        }
        Command::Bench { dir, iterations } => {
            let opts = WalkOptions::default().follow(config.follow);
            for pass in 1..=iterations {
                let started = Instant::now();
                let found = scurry.walk_sync(&dir, &opts).len();
                let stats = scurry.cache_stats();
                info!(
                    pass,
                    entries = found,
                    elapsed = ?started.elapsed(),
                    child_lists = stats.child_lists,
                    children_weight = stats.children_weight,
                    "walk finished"
                );
            }
        }
        Command::Config => match config.to_toml() {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                error!("Failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
    }
}
