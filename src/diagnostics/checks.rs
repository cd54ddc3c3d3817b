//! Concrete diagnostic checks. Each is constructed explicitly with the
//! state it needs (no ambient globals), per the core's explicit-handle
//! design. The secrets/pattern-category heuristics some "doctor" reports
//! offer are out of scope here; these four checks are the ones the core's
//! own contract names.

use super::{CheckResult, DiagnosticCheck, Issue, IssueSeverity, Status};
use crate::fs::Filesystem;
use crate::manifest::Manifest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct PermissionsCheck {
    fs: Arc<dyn Filesystem>,
    target_dir: PathBuf,
}

impl PermissionsCheck {
    pub fn new(fs: Arc<dyn Filesystem>, target_dir: PathBuf) -> Self {
        Self { fs, target_dir }
    }
}

impl DiagnosticCheck for PermissionsCheck {
    fn name(&self) -> &str {
        "permissions"
    }

    fn description(&self) -> &str {
        "checks that the target directory exists, is readable, and is writable"
    }

    fn run(&self) -> crate::error::Result<CheckResult> {
        let mut issues = Vec::new();
        if !self.fs.exists(&self.target_dir) {
            issues.push(Issue {
                code: "TARGET_MISSING".to_string(),
                message: format!("target directory {} does not exist", self.target_dir.display()),
                severity: IssueSeverity::Fatal,
                path: Some(self.target_dir.display().to_string()),
                context: HashMap::new(),
                remediation: Some("create the target directory before managing packages".to_string()),
            });
        } else {
            let meta = self.fs.stat(&self.target_dir)?;
            if meta.mode & 0o200 == 0 {
                issues.push(Issue {
                    code: "TARGET_NOT_WRITABLE".to_string(),
                    message: format!("target directory {} is not writable", self.target_dir.display()),
                    severity: IssueSeverity::Error,
                    path: Some(self.target_dir.display().to_string()),
                    context: HashMap::new(),
                    remediation: Some("chmod u+w the target directory".to_string()),
                });
            }
            if meta.mode & 0o400 == 0 {
                issues.push(Issue {
                    code: "TARGET_NOT_READABLE".to_string(),
                    message: format!("target directory {} is not readable", self.target_dir.display()),
                    severity: IssueSeverity::Error,
                    path: Some(self.target_dir.display().to_string()),
                    context: HashMap::new(),
                    remediation: Some("chmod u+r the target directory".to_string()),
                });
            }
        }

        let status = if issues.iter().any(|i| i.severity == IssueSeverity::Fatal) {
            Status::Fail
        } else if issues.is_empty() {
            Status::Pass
        } else {
            Status::Warning
        };
        Ok(CheckResult { check_name: self.name().to_string(), status, issues, stats: HashMap::new() })
    }
}

pub struct ManagedPackagesCheck {
    fs: Arc<dyn Filesystem>,
    target_dir: PathBuf,
    manifest: Manifest,
}

impl ManagedPackagesCheck {
    pub fn new(fs: Arc<dyn Filesystem>, target_dir: PathBuf, manifest: Manifest) -> Self {
        Self { fs, target_dir, manifest }
    }
}

impl DiagnosticCheck for ManagedPackagesCheck {
    fn name(&self) -> &str {
        "managed-packages"
    }

    fn description(&self) -> &str {
        "checks that each manifest link resolves and points into its package directory"
    }

    fn run(&self) -> crate::error::Result<CheckResult> {
        let mut issues = Vec::new();
        for (name, record) in &self.manifest.packages {
            for link in &record.links {
                let target = self.target_dir.join(link);
                let is_symlink = self.fs.is_symlink(&target).unwrap_or(false);
                if !is_symlink {
                    issues.push(Issue {
                        code: "LINK_MISSING".to_string(),
                        message: format!("expected symlink at {} for package {name}", target.display()),
                        severity: IssueSeverity::Error,
                        path: Some(target.display().to_string()),
                        context: HashMap::from([("package".to_string(), name.clone())]),
                        remediation: Some(format!("re-run `manage` for package {name}")),
                    });
                    continue;
                }
                let raw_target = self.fs.read_link(&target).unwrap_or_default();
                let package_dir_str = record.package_dir.display().to_string();
                if !raw_target.contains(&package_dir_str) {
                    issues.push(Issue {
                        code: "LINK_POINTS_ELSEWHERE".to_string(),
                        message: format!("{} points to {raw_target}, not under {package_dir_str}", target.display()),
                        severity: IssueSeverity::Warning,
                        path: Some(target.display().to_string()),
                        context: HashMap::from([("package".to_string(), name.clone())]),
                        remediation: Some("unmanage and remanage the package".to_string()),
                    });
                }
            }
        }
        let status = if issues.iter().any(|i| i.severity == IssueSeverity::Error) {
            Status::Fail
        } else if issues.is_empty() {
            Status::Pass
        } else {
            Status::Warning
        };
        Ok(CheckResult { check_name: self.name().to_string(), status, issues, stats: HashMap::new() })
    }
}

pub struct ManifestIntegrityCheck {
    manifest: Manifest,
}

impl ManifestIntegrityCheck {
    pub fn new(manifest: Manifest) -> Self {
        Self { manifest }
    }
}

impl DiagnosticCheck for ManifestIntegrityCheck {
    fn name(&self) -> &str {
        "manifest-integrity"
    }

    fn description(&self) -> &str {
        "checks that each package record's link_count matches its links list"
    }

    fn run(&self) -> crate::error::Result<CheckResult> {
        let mut issues = Vec::new();
        for (name, record) in &self.manifest.packages {
            if !record.is_internally_consistent() {
                issues.push(Issue {
                    code: "LINK_COUNT_MISMATCH".to_string(),
                    message: format!(
                        "package {name}: link_count={} but links has {} entries",
                        record.link_count,
                        record.links.len()
                    ),
                    severity: IssueSeverity::Warning,
                    path: None,
                    context: HashMap::from([("package".to_string(), name.clone())]),
                    remediation: Some("remanage the package to regenerate its manifest record".to_string()),
                });
            }
        }
        let status = if issues.is_empty() { Status::Pass } else { Status::Warning };
        Ok(CheckResult { check_name: self.name().to_string(), status, issues, stats: HashMap::new() })
    }
}

pub struct OrphanLinksCheck {
    target_dir: PathBuf,
    manifest: Manifest,
}

impl OrphanLinksCheck {
    pub fn new(target_dir: PathBuf, manifest: Manifest) -> Self {
        Self { target_dir, manifest }
    }

    fn known_links(&self) -> std::collections::HashSet<PathBuf> {
        self.manifest
            .packages
            .values()
            .flat_map(|r| r.links.iter().map(|l| self.target_dir.join(l)))
            .collect()
    }
}

impl DiagnosticCheck for OrphanLinksCheck {
    fn name(&self) -> &str {
        "orphan-links"
    }

    fn description(&self) -> &str {
        "walks the target directory for symlinks absent from the manifest"
    }

    fn run(&self) -> crate::error::Result<CheckResult> {
        let known = self.known_links();
        let mut issues = Vec::new();
        let mut scanned = 0u64;

        if self.target_dir.exists() {
            for entry in walkdir::WalkDir::new(&self.target_dir)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                let Ok(meta) = std::fs::symlink_metadata(path) else { continue };
                if !meta.file_type().is_symlink() {
                    continue;
                }
                scanned += 1;
                if known.contains(path) || is_manifest_file(path) {
                    continue;
                }
                let broken = std::fs::metadata(path).is_err();
                issues.push(Issue {
                    code: if broken { "ORPHAN_LINK_BROKEN".to_string() } else { "ORPHAN_LINK".to_string() },
                    message: format!("{} is not tracked by the manifest", path.display()),
                    severity: if broken { IssueSeverity::Error } else { IssueSeverity::Warning },
                    path: Some(path.display().to_string()),
                    context: HashMap::new(),
                    remediation: Some("adopt the link into a package or remove it manually".to_string()),
                });
            }
        }

        let status = if issues.iter().any(|i| i.severity == IssueSeverity::Error) {
            Status::Fail
        } else if issues.is_empty() {
            Status::Pass
        } else {
            Status::Warning
        };
        let mut stats = HashMap::new();
        stats.insert("symlinks_scanned".to_string(), serde_json::json!(scanned));
        Ok(CheckResult { check_name: self.name().to_string(), status, issues, stats })
    }
}

fn is_manifest_file(path: &Path) -> bool {
    path.file_name().map(|n| n == crate::manifest::MANIFEST_FILENAME).unwrap_or(false)
}
