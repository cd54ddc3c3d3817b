//! The durable, versioned on-disk record of installed packages.

use crate::error::{Error, Result};
use crate::fs::Filesystem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const MANIFEST_FILENAME: &str = ".dotman-manifest.json";
pub const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Managed,
    Adopted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub source_kind: SourceKind,
    pub installed_at: DateTime<Utc>,
    pub link_count: usize,
    pub links: Vec<String>,
    pub target_dir: PathBuf,
    pub package_dir: PathBuf,
    pub content_hash: String,
}

impl PackageRecord {
    /// `link_count = len(links)`, the manifest's own integrity invariant.
    pub fn is_internally_consistent(&self) -> bool {
        self.link_count == self.links.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorSection {
    #[serde(default)]
    pub ignored_links: Vec<String>,
    #[serde(default)]
    pub ignored_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub packages: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    pub doctor: DoctorSection,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            updated_at: Utc::now(),
            packages: BTreeMap::new(),
            doctor: DoctorSection::default(),
        }
    }
}

/// Migrates a raw JSON document from whatever version it was written with
/// up to [`CURRENT_VERSION`]. Unknown fields are tolerated by `serde`'s
/// default struct decoding; this chain only backfills fields that didn't
/// exist yet in older versions.
fn migrate(mut value: serde_json::Value) -> serde_json::Value {
    let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
    if version < 2 {
        if let Some(obj) = value.as_object_mut() {
            obj.entry("doctor").or_insert_with(|| {
                serde_json::json!({ "ignored_links": [], "ignored_patterns": [] })
            });
            obj.insert("version".to_string(), serde_json::json!(2));
        }
    }
    value
}

/// Loads the manifest for `target`. A missing manifest file is the normal
/// state for a fresh install and yields an empty, default manifest rather
/// than an error.
pub fn load(fs: &dyn Filesystem, target: &Path) -> Result<Manifest> {
    let path = target.join(MANIFEST_FILENAME);
    if !fs.exists(&path) {
        return Ok(Manifest::default());
    }
    let bytes = fs.read_file(&path)?;
    let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
    let migrated = migrate(raw);
    let manifest: Manifest = serde_json::from_value(migrated)?;

    for (name, record) in &manifest.packages {
        if !record.is_internally_consistent() {
            warn!(package = name, "manifest link_count does not match links length");
        }
    }

    Ok(manifest)
}

/// Writes the manifest atomically: serialize to a temp file beside the
/// final path, then rename over it.
pub fn save(fs: &dyn Filesystem, target: &Path, manifest: &Manifest) -> Result<()> {
    let path = target.join(MANIFEST_FILENAME);
    let tmp_path = target.join(format!("{MANIFEST_FILENAME}.tmp"));
    let bytes = serde_json::to_vec_pretty(manifest)?;
    fs.write_file(&tmp_path, &bytes, 0o644)?;
    fs.rename(&tmp_path, &path)
}

/// SHA-256 over every regular file under `package_dir`, processed in
/// sorted-relative-path order, hashing `relative_path || 0x00 || bytes` for
/// each. Symlinks and directories are skipped. The delimiter prevents a
/// file named `ab` and a file `a` containing prefix-colliding bytes from
/// ever hashing the same as a file named `a/b`.
pub fn hash_package_dir(fs: &dyn Filesystem, package_dir: &Path) -> Result<String> {
    let mut files = Vec::new();
    collect_regular_files(fs, package_dir, package_dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let full = package_dir.join(relative);
        let bytes = fs.read_file(&full)?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_regular_files(
    fs: &dyn Filesystem,
    root: &Path,
    dir: &Path,
    out: &mut Vec<String>,
) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        let full = dir.join(&entry.name);
        match entry.kind {
            crate::fs::FileKind::Dir => collect_regular_files(fs, root, &full, out)?,
            crate::fs::FileKind::File => {
                let relative = full
                    .strip_prefix(root)
                    .unwrap_or(&full)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                out.push(relative);
            }
            crate::fs::FileKind::Symlink => {}
        }
    }
    Ok(())
}
