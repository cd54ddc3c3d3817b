// src/main.rs

mod cli;

use anyhow::{anyhow, Result};
use clap::Parser;
use cli::{Cli, Commands};
use dotman::fs::OsFilesystem;
use dotman::planner::conflict::{ConflictKind, Policy, ResolutionPolicies};
use dotman::{Client, ClientConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
            PathBuf::from(home).join(rest.trim_start_matches('/'))
        }
        None => PathBuf::from(path),
    }
}

fn parse_policy(name: &str) -> Result<Policy> {
    match name {
        "fail" => Ok(Policy::Fail),
        "skip" => Ok(Policy::Skip),
        "backup" => Ok(Policy::Backup),
        "overwrite" => Ok(Policy::Overwrite),
        other => Err(anyhow!("unknown conflict policy: {other}")),
    }
}

fn build_client(cli: &Cli, on_conflict: Option<&str>) -> Result<Client> {
    let package_dir = expand_tilde(&cli.package_dir);
    let target_dir = expand_tilde(&cli.target_dir);
    let fs = Arc::new(OsFilesystem::new());
    let mut config = ClientConfig::new(package_dir, target_dir, fs);
    config.package_name_mapping = cli.package_name_mapping;
    if let Some(on_conflict) = on_conflict {
        let policy = parse_policy(on_conflict)?;
        let mut policies = ResolutionPolicies::new(config.target_dir.join(".dotman-backup"));
        policies.set(ConflictKind::FileExists, policy);
        policies.set(ConflictKind::WrongLink, policy);
        config.policies = policies;
    }
    Ok(Client::new(config))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Manage { packages, on_conflict } => {
            let client = build_client(&cli, Some(on_conflict))?;
            let refs: Vec<&str> = packages.iter().map(String::as_str).collect();
            info!(count = refs.len(), "managing packages");
            let result = client.manage(&refs)?;
            println!("installed {} links", result.executed.len());
        }
        Commands::PlanManage { packages } => {
            let client = build_client(&cli, None)?;
            let refs: Vec<&str> = packages.iter().map(String::as_str).collect();
            let plan = client.plan_manage(&refs)?;
            println!("{} operations planned:", plan.operations.len());
            for op in &plan.operations {
                println!("  {op}");
            }
            for warning in &plan.metadata.warning_infos {
                println!("warning: {}", warning.message);
            }
        }
        Commands::Unmanage { packages, purge, restore, cleanup } => {
            let client = build_client(&cli, None)?;
            let refs: Vec<&str> = packages.iter().map(String::as_str).collect();
            let opts = dotman::UnmanageOptions { purge: *purge, restore: *restore, cleanup: *cleanup };
            let result = client.unmanage_with_options(&opts, &refs)?;
            println!("removed {} links", result.executed.len());
        }
        Commands::UnmanageAll { purge, restore } => {
            let client = build_client(&cli, None)?;
            let opts = dotman::UnmanageOptions { purge: *purge, restore: *restore, cleanup: false };
            let count = client.unmanage_all(&opts)?;
            println!("unmanaged {count} packages");
        }
        Commands::Remanage { packages } => {
            let client = build_client(&cli, None)?;
            let refs: Vec<&str> = packages.iter().map(String::as_str).collect();
            let result = client.remanage(&refs)?;
            println!("re-linked {} symlinks", result.executed.len());
        }
        Commands::Adopt { package, files } => {
            let client = build_client(&cli, None)?;
            let refs: Vec<&str> = files.iter().map(String::as_str).collect();
            client.adopt(Some(package.as_str()), &refs)?;
            println!("adopted {} files into {package}", refs.len());
        }
        Commands::Status { packages } => {
            let client = build_client(&cli, None)?;
            let names = if packages.is_empty() {
                client.list()?.into_iter().map(|p| p.name).collect()
            } else {
                packages.clone()
            };
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let status = client.status(&refs)?;
            for entry in status.entries {
                if entry.consistent {
                    println!("{}: ok", entry.name);
                } else {
                    println!("{}: {} link(s) missing", entry.name, entry.missing_links.len());
                }
            }
        }
        Commands::List => {
            let client = build_client(&cli, None)?;
            for package in client.list()? {
                println!("{}\t{:?}\t{} links", package.name, package.source_kind, package.link_count);
            }
        }
        Commands::Doctor { parallel } => {
            let client = build_client(&cli, None)?;
            let opts = dotman::diagnostics::RunOptions { include_checks: Vec::new(), parallel: *parallel };
            let report = client.doctor_with_scan(&opts)?;
            println!("overall: {:?}", report.overall);
            for result in report.results {
                println!("  {}: {:?}", result.check_name, result.status);
                for issue in result.issues {
                    println!("    [{}] {}", issue.code, issue.message);
                }
            }
        }
    }

    Ok(())
}
