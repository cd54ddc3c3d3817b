//! CLI definitions for the dotfiles manager.
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations live in `main.rs`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dotman")]
#[command(author, version, about = "Symlink-based dotfiles manager with conflict resolution and rollback", long_about = None)]
pub struct Cli {
    /// Directory containing dotfile packages
    #[arg(short = 'd', long, global = true, default_value = "~/.dotfiles")]
    pub package_dir: String,

    /// Directory symlinks are installed into
    #[arg(short, long, global = true, default_value = "~")]
    pub target_dir: String,

    /// Map package names onto translated target directories (dot-gnupg -> ~/.gnupg/...)
    #[arg(long, global = true)]
    pub package_name_mapping: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install one or more packages by creating their symlinks
    Manage {
        /// Package names to install
        packages: Vec<String>,

        /// How to resolve a pre-existing file at a link's target: fail, skip, backup, overwrite
        #[arg(long, default_value = "fail")]
        on_conflict: String,
    },

    /// Show the plan for installing packages without executing it
    PlanManage {
        /// Package names to plan
        packages: Vec<String>,
    },

    /// Remove one or more packages' symlinks
    Unmanage {
        /// Package names to remove
        packages: Vec<String>,

        /// Also delete the package directory itself
        #[arg(long)]
        purge: bool,

        /// For adopted packages, move the file back to its original location
        #[arg(long)]
        restore: bool,

        /// Only remove the manifest record, leave links and files untouched
        #[arg(long)]
        cleanup: bool,
    },

    /// Remove every managed package's symlinks
    UnmanageAll {
        #[arg(long)]
        purge: bool,
        #[arg(long)]
        restore: bool,
    },

    /// Re-scan already-managed packages, linking anything new
    Remanage {
        /// Package names to re-scan
        packages: Vec<String>,
    },

    /// Move existing files into a package and replace them with symlinks
    Adopt {
        /// Package to adopt files into
        package: String,

        /// Absolute paths to adopt
        files: Vec<String>,
    },

    /// Show whether each package's links are present and correct
    Status {
        /// Package names to check (all managed packages if omitted)
        packages: Vec<String>,
    },

    /// List every managed or adopted package
    List,

    /// Run health checks over managed packages and the target directory
    Doctor {
        /// Run checks in parallel
        #[arg(long)]
        parallel: bool,
    },
}
