//! The public façade wiring the scanner, planner, executor, and manifest
//! store into the operations a CLI (or any other caller) drives.

use crate::diagnostics::checks::{ManagedPackagesCheck, ManifestIntegrityCheck, OrphanLinksCheck, PermissionsCheck};
use crate::diagnostics::{DiagnosticEngine, Report, RunOptions};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fs::{FileKind, Filesystem};
use crate::ignore::{BatchPrompter, IgnoreSet, LargeFilePrompter};
use crate::manifest::{self, PackageRecord, SourceKind};
use crate::operation::{Operation, OperationId, OperationKind};
use crate::path::{FilePath, PackagePath, TargetPath};
use crate::pipeline::CancellationToken;
use crate::plan::{ExecutionResult, Plan, PlanMetadata};
use crate::planner::conflict::{self, Conflict, ResolutionPolicies};
use crate::planner::desired_state::{compute_desired_state, CurrentState, DesiredState, FileState};
use crate::planner::graph::{build_graph, schedule_batches, topological_sort};
use crate::scanner::{self, untranslate_dotfile_name, ScanOptions};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Explicit configuration for one [`Client`]; no process-global state is
/// read or written anywhere in this crate.
pub struct ClientConfig {
    pub package_dir: PathBuf,
    pub target_dir: PathBuf,
    pub package_name_mapping: bool,
    pub max_file_size: u64,
    pub policies: ResolutionPolicies,
    pub fs: Arc<dyn Filesystem>,
    pub prompter: Arc<dyn LargeFilePrompter>,
}

impl ClientConfig {
    pub fn new(package_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        let target_dir = target_dir.into();
        Self {
            package_dir: package_dir.into(),
            target_dir: target_dir.clone(),
            package_name_mapping: false,
            max_file_size: 0,
            policies: ResolutionPolicies::new(target_dir.join(".dotman-backup")),
            fs,
            prompter: Arc::new(BatchPrompter),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnmanageOptions {
    pub purge: bool,
    pub restore: bool,
    pub cleanup: bool,
}

impl Default for UnmanageOptions {
    fn default() -> Self {
        Self { purge: false, restore: true, cleanup: false }
    }
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub source_kind: SourceKind,
    pub link_count: usize,
    pub installed_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub name: String,
    pub consistent: bool,
    pub missing_links: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub entries: Vec<StatusEntry>,
}

pub struct Client {
    config: ClientConfig,
    executor: Executor,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let executor = Executor::new(config.fs.clone());
        Self { config, executor }
    }

    fn ignore_set(&self) -> Result<IgnoreSet> {
        IgnoreSet::with_defaults()
    }

    fn scan_all(&self, packages: &[&str]) -> Result<Vec<crate::scanner::Package>> {
        let ignore = self.ignore_set()?;
        let opts = ScanOptions { ignore: &ignore, max_file_size: self.config.max_file_size, prompter: self.config.prompter.as_ref() };
        packages
            .iter()
            .map(|name| {
                if scanner::is_reserved_package_name(name) {
                    return Err(Error::InvalidPath { path: name.to_string(), reason: "reserved package name".to_string() });
                }
                let path = PackagePath::new(self.config.package_dir.join(name))?;
                let (package, _stats) = scanner::scan_package_with(self.config.fs.as_ref(), name, path, &opts)?;
                Ok(package)
            })
            .collect()
    }

    /// Probes actual filesystem state only for paths the desired state
    /// references, plus their ancestors.
    fn probe(&self, desired: &DesiredState) -> Result<CurrentState> {
        let mut current = CurrentState::default();
        for target in desired.links.keys() {
            self.probe_one(target, &mut current)?;
        }
        for dir in desired.dirs.keys() {
            if let Ok(target) = TargetPath::new(dir.as_path()) {
                self.probe_one(&target, &mut current)?;
            }
        }
        Ok(current)
    }

    fn probe_one(&self, target: &TargetPath, current: &mut CurrentState) -> Result<()> {
        if !self.config.fs.exists(target.as_path()) {
            return Ok(());
        }
        let meta = self.config.fs.lstat(target.as_path())?;
        match meta.kind {
            FileKind::Symlink => {
                let raw = self.config.fs.read_link(target.as_path())?;
                current.links.insert(target.clone(), raw);
            }
            FileKind::File => {
                current.files.insert(target.clone(), FileState { size: meta.size, mode: meta.mode });
            }
            FileKind::Dir => {
                current.dirs.insert(target.clone());
            }
        }
        Ok(())
    }

    pub fn plan_manage(&self, packages: &[&str]) -> Result<Plan> {
        let scanned = self.scan_all(packages)?;
        let target = TargetPath::new(&self.config.target_dir)?;
        let desired = compute_desired_state(&scanned, &target, self.config.package_name_mapping)?;
        let current = self.probe(&desired)?;
        let resolved = conflict::resolve(&desired, &current, &self.config.policies);

        if !resolved.conflicts.is_empty() {
            return Err(conflict_error(resolved.conflicts));
        }

        build_plan(scanned.iter().map(|p| p.name.clone()).collect(), resolved.operations, resolved.warnings)
    }

    pub fn manage(&self, packages: &[&str]) -> Result<ExecutionResult> {
        let plan = self.plan_manage(packages)?;
        let token = CancellationToken::new();
        let result = self.executor.execute(&plan, &token)?;
        self.record_manifest_after_manage(packages, &plan, SourceKind::Managed)?;
        Ok(result)
    }

    fn record_manifest_after_manage(&self, packages: &[&str], plan: &Plan, source_kind: SourceKind) -> Result<()> {
        let mut manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        for name in packages {
            let package_dir = self.config.package_dir.join(name);
            let content_hash = manifest::hash_package_dir(self.config.fs.as_ref(), &package_dir)?;
            let new_links: Vec<String> = plan
                .package_operations
                .get(*name)
                .map(|ids| {
                    plan.operations
                        .iter()
                        .filter(|op| ids.contains(op.id()))
                        .filter_map(|op| match op.kind() {
                            OperationKind::LinkCreate { target, .. } => target
                                .as_path()
                                .strip_prefix(&self.config.target_dir)
                                .ok()
                                .map(|p| p.display().to_string()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();

            // A link that already pointed at the right source doesn't produce a
            // LinkCreate op (resolve() treats it as a no-op), so an empty
            // `new_links` on a remanage doesn't mean the package has no links —
            // carry the existing record's links forward and merge in any new ones.
            let mut links = manifest.packages.get(*name).map(|r| r.links.clone()).unwrap_or_default();
            for link in new_links {
                if !links.contains(&link) {
                    links.push(link);
                }
            }

            manifest.packages.insert(
                name.to_string(),
                PackageRecord {
                    name: name.to_string(),
                    source_kind,
                    installed_at: Utc::now(),
                    link_count: links.len(),
                    links,
                    target_dir: self.config.target_dir.clone(),
                    package_dir,
                    content_hash,
                },
            );
        }
        manifest.updated_at = Utc::now();
        manifest::save(self.config.fs.as_ref(), &self.config.target_dir, &manifest)
    }

    /// Re-scans already-managed packages, re-linking anything new and
    /// refreshing each package's recorded content hash.
    pub fn remanage(&self, packages: &[&str]) -> Result<ExecutionResult> {
        let plan = self.plan_manage(packages)?;
        let token = CancellationToken::new();
        let result = if plan.is_empty() {
            ExecutionResult::default()
        } else {
            self.executor.execute(&plan, &token)?
        };
        self.record_manifest_after_manage(packages, &plan, SourceKind::Managed)?;
        Ok(result)
    }

    pub fn unmanage(&self, packages: &[&str]) -> Result<ExecutionResult> {
        self.unmanage_with_options(&UnmanageOptions::default(), packages)
    }

    pub fn unmanage_with_options(&self, opts: &UnmanageOptions, packages: &[&str]) -> Result<ExecutionResult> {
        let mut manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        let mut operations = Vec::new();
        let mut id = 0usize;
        let mut next_id = || {
            id += 1;
            OperationId::new(format!("unmanage-{id}"))
        };

        for name in packages {
            let Some(record) = manifest.packages.get(*name) else {
                return Err(Error::PackageNotFound { name: name.to_string() });
            };

            if opts.cleanup {
                continue;
            }

            for link in &record.links {
                let target = TargetPath::new(self.config.target_dir.join(link))?;
                operations.push(Operation::new(next_id(), OperationKind::LinkDelete { target }));
            }

            if opts.purge {
                operations.push(Operation::new(
                    next_id(),
                    OperationKind::DirRemoveAll { path: FilePath::new(&record.package_dir)? },
                ));
            } else if opts.restore && record.source_kind == SourceKind::Adopted {
                for link in &record.links {
                    let target_file = self.config.target_dir.join(link);
                    let package_file = untranslate_relative(&record.package_dir, link);
                    operations.push(Operation::new(
                        next_id(),
                        OperationKind::FileMove {
                            source: TargetPath::new(&package_file)?,
                            dest: FilePath::new(&target_file)?,
                        },
                    ));
                }
            }
        }

        let result = if operations.is_empty() {
            ExecutionResult::default()
        } else {
            let plan = Plan { operations, ..Default::default() };
            let token = CancellationToken::new();
            self.executor.execute(&plan, &token)?
        };

        for name in packages {
            manifest.packages.remove(*name);
        }
        manifest.updated_at = Utc::now();
        manifest::save(self.config.fs.as_ref(), &self.config.target_dir, &manifest)?;

        Ok(result)
    }

    pub fn unmanage_all(&self, opts: &UnmanageOptions) -> Result<usize> {
        let manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        let names: Vec<String> = manifest.packages.keys().cloned().collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        if refs.is_empty() {
            return Ok(0);
        }
        self.unmanage_with_options(opts, &refs)?;
        Ok(refs.len())
    }

    pub fn adopt(&self, package: Option<&str>, files: &[&str]) -> Result<ExecutionResult> {
        let package = package.ok_or_else(|| Error::NotImplemented("adopt requires an explicit package name".to_string()))?;
        if scanner::is_reserved_package_name(package) {
            return Err(Error::InvalidPath { path: package.to_string(), reason: "reserved package name".to_string() });
        }
        let package_dir = self.config.package_dir.join(package);
        self.config.fs.mkdir_all(&package_dir, 0o755)?;

        let mut operations = Vec::new();
        let mut id = 0usize;
        let mut next_id = || {
            id += 1;
            OperationId::new(format!("adopt-{id}"))
        };
        let mut links = Vec::new();

        for file in files {
            let target = TargetPath::new(*file)?;
            let basename = target
                .as_path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::InvalidPath { path: file.to_string(), reason: "no file name".to_string() })?;
            let package_name = crate::scanner::untranslate_dotfile_name(&basename);
            let dest = FilePath::new(package_dir.join(&package_name))?;
            operations.push(Operation::new(
                next_id(),
                OperationKind::FileMove { source: target.clone(), dest: dest.clone() },
            ));
            operations.push(Operation::new(next_id(), OperationKind::LinkCreate { source: dest, target: target.clone() }));
            links.push(basename);
        }

        let plan = Plan { operations, ..Default::default() };
        let token = CancellationToken::new();
        let result = self.executor.execute(&plan, &token)?;

        let content_hash = manifest::hash_package_dir(self.config.fs.as_ref(), &package_dir)?;
        let mut manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        manifest.packages.insert(
            package.to_string(),
            PackageRecord {
                name: package.to_string(),
                source_kind: SourceKind::Adopted,
                installed_at: Utc::now(),
                link_count: links.len(),
                links,
                target_dir: self.config.target_dir.clone(),
                package_dir,
                content_hash,
            },
        );
        manifest.updated_at = Utc::now();
        manifest::save(self.config.fs.as_ref(), &self.config.target_dir, &manifest)?;

        Ok(result)
    }

    pub fn status(&self, packages: &[&str]) -> Result<Status> {
        let manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        let mut entries = Vec::new();
        for name in packages {
            let Some(record) = manifest.packages.get(*name) else {
                return Err(Error::PackageNotFound { name: name.to_string() });
            };
            let mut missing = Vec::new();
            for link in &record.links {
                let target = self.config.target_dir.join(link);
                if !self.config.fs.is_symlink(&target).unwrap_or(false) {
                    missing.push(link.clone());
                }
            }
            entries.push(StatusEntry { name: name.to_string(), consistent: missing.is_empty(), missing_links: missing });
        }
        Ok(Status { entries })
    }

    pub fn list(&self) -> Result<Vec<PackageInfo>> {
        let manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        Ok(manifest
            .packages
            .values()
            .map(|r| PackageInfo { name: r.name.clone(), source_kind: r.source_kind, link_count: r.link_count, installed_at: r.installed_at })
            .collect())
    }

    pub fn doctor(&self) -> Result<Report> {
        self.doctor_with_scan(&RunOptions::default())
    }

    pub fn doctor_with_scan(&self, scan: &RunOptions) -> Result<Report> {
        let manifest = manifest::load(self.config.fs.as_ref(), &self.config.target_dir)?;
        let mut engine = DiagnosticEngine::new();
        engine.register(Box::new(PermissionsCheck::new(self.config.fs.clone(), self.config.target_dir.clone())));
        engine.register(Box::new(ManagedPackagesCheck::new(self.config.fs.clone(), self.config.target_dir.clone(), manifest.clone())));
        engine.register(Box::new(ManifestIntegrityCheck::new(manifest.clone())));
        engine.register(Box::new(OrphanLinksCheck::new(self.config.target_dir.clone(), manifest)));
        info!(checks = 4, "running doctor report");
        Ok(engine.run(scan))
    }
}

fn untranslate_relative(package_dir: &std::path::Path, target_relative: &str) -> PathBuf {
    let segments: Vec<String> = target_relative.split('/').map(untranslate_dotfile_name).collect();
    segments.iter().fold(package_dir.to_path_buf(), |acc, s| acc.join(s))
}

fn conflict_error(conflicts: Vec<Conflict>) -> Error {
    let errors: Vec<Error> = conflicts.into_iter().map(|c| Error::Conflict { path: c.path, kind: c.kind }).collect();
    if errors.len() == 1 {
        errors.into_iter().next().unwrap()
    } else {
        Error::multiple(errors)
    }
}

fn build_plan(package_names: Vec<String>, operations: Vec<Operation>, warnings: Vec<crate::planner::conflict::Warning>) -> Result<Plan> {
    let graph = build_graph(&operations);
    let sorted = topological_sort(&graph, &operations)?;
    let batches = schedule_batches(&graph, &sorted);

    let mut package_operations: HashMap<String, Vec<OperationId>> = HashMap::new();
    for op in &sorted {
        if let Some(path) = operation_path(op) {
            if let Some(name) = package_names.iter().find(|n| path.to_string_lossy().contains(n.as_str())) {
                package_operations.entry(name.clone()).or_default().push(op.id().clone());
            }
        }
    }

    let metadata = PlanMetadata {
        package_count: package_names.len(),
        operation_count: sorted.len(),
        conflict_infos: Vec::new(),
        warning_infos: warnings,
    };

    Ok(Plan { operations: sorted, batches: Some(batches), package_operations, metadata })
}

fn operation_path(op: &Operation) -> Option<PathBuf> {
    match op.kind() {
        OperationKind::LinkCreate { target, .. } => Some(target.as_path().to_path_buf()),
        OperationKind::DirCreate { path } => Some(path.as_path().to_path_buf()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFilesystem;

    fn client(fs: Arc<InMemoryFilesystem>) -> Client {
        let config = ClientConfig::new("/pkg", "/home", fs);
        Client::new(config)
    }

    #[test]
    fn happy_path_install_creates_symlink_and_manifest_entry() {
        let fs = Arc::new(InMemoryFilesystem::with_root("/"));
        fs.mkdir_all(std::path::Path::new("/pkg/vim"), 0o755).unwrap();
        fs.write_file(std::path::Path::new("/pkg/vim/dot-vimrc"), b"set nu", 0o644).unwrap();
        fs.mkdir_all(std::path::Path::new("/home"), 0o755).unwrap();

        let c = client(fs.clone());
        c.manage(&["vim"]).unwrap();

        assert!(fs.is_symlink(std::path::Path::new("/home/.vimrc")).unwrap());
        let manifest = manifest::load(fs.as_ref(), std::path::Path::new("/home")).unwrap();
        assert_eq!(manifest.packages["vim"].links, vec![".vimrc".to_string()]);
    }

    #[test]
    fn managing_missing_package_errors() {
        let fs = Arc::new(InMemoryFilesystem::with_root("/"));
        fs.mkdir_all(std::path::Path::new("/home"), 0o755).unwrap();
        let c = client(fs);
        let err = c.manage(&["ghost"]).unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }

    #[test]
    fn remanage_with_nothing_to_relink_keeps_manifest_links() {
        let fs = Arc::new(InMemoryFilesystem::with_root("/"));
        fs.mkdir_all(std::path::Path::new("/pkg/vim"), 0o755).unwrap();
        fs.write_file(std::path::Path::new("/pkg/vim/dot-vimrc"), b"set nu", 0o644).unwrap();
        fs.mkdir_all(std::path::Path::new("/home"), 0o755).unwrap();

        let c = client(fs.clone());
        c.manage(&["vim"]).unwrap();

        // Nothing changed: the existing symlink already points at the
        // right source, so resolve() emits zero ops for this package.
        c.remanage(&["vim"]).unwrap();

        let manifest = manifest::load(fs.as_ref(), std::path::Path::new("/home")).unwrap();
        let record = &manifest.packages["vim"];
        assert_eq!(record.links, vec![".vimrc".to_string()]);
        assert_eq!(record.link_count, 1);
    }
}
