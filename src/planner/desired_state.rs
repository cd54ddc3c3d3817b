//! Maps scanned package trees to a desired filesystem state: the set of
//! symlinks and parent directories that must exist for the packages to be
//! fully installed.

use crate::error::Result;
use crate::path::{FilePath, TargetPath};
use crate::scanner::{translate_dotfile_name, Node, Package};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub source: FilePath,
    pub target: TargetPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSpec {
    pub path: FilePath,
}

/// `target path -> link spec` and `path -> dir spec`, covering every
/// symlink and intermediate directory required to install the given
/// packages.
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub links: HashMap<TargetPath, LinkSpec>,
    pub dirs: HashMap<FilePath, DirSpec>,
}

/// `{size, mode}` for a probed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    pub size: u64,
    pub mode: u32,
}

/// A sparse snapshot of actual filesystem state, probed only for paths
/// referenced by the desired state and their ancestors.
#[derive(Debug, Clone, Default)]
pub struct CurrentState {
    pub files: HashMap<TargetPath, FileState>,
    pub links: HashMap<TargetPath, String>,
    pub dirs: std::collections::HashSet<TargetPath>,
}

pub fn compute_desired_state(
    packages: &[Package],
    target: &TargetPath,
    package_name_mapping: bool,
) -> Result<DesiredState> {
    let mut state = DesiredState::default();
    for package in packages {
        let prefix = if package_name_mapping {
            Some(translate_dotfile_name(&package.name))
        } else {
            None
        };
        visit(package, &package.tree, &[], target, prefix.as_deref(), &mut state)?;
    }
    Ok(state)
}

fn visit(
    package: &Package,
    node: &Node,
    source_segments: &[String],
    target_root: &TargetPath,
    package_prefix: Option<&str>,
    state: &mut DesiredState,
) -> Result<()> {
    match node {
        Node::Dir { children, .. } => {
            for child in children {
                let mut segments = source_segments.to_vec();
                segments.push(child.name().to_string());
                visit(package, child, &segments, target_root, package_prefix, state)?;
            }
            Ok(())
        }
        // Symlinks and the package's own root are not emitted as link specs.
        Node::Symlink { .. } => Ok(()),
        Node::File { .. } => {
            let translated_segments: Vec<String> =
                source_segments.iter().map(|s| translate_dotfile_name(s)).collect();

            let mut target = target_root.clone();
            if let Some(prefix) = package_prefix {
                target = target.join(prefix)?;
            }
            for segment in &translated_segments {
                target = target.join(segment)?;
            }

            let mut source = package.path.clone();
            for segment in source_segments {
                source = source.join(segment)?;
            }

            state
                .links
                .insert(target.clone(), LinkSpec { source: source.into(), target: target.clone() });

            let mut ancestor = target.parent();
            while let Some(dir) = ancestor {
                if dir.as_path() == target_root.as_path() || !dir.as_path().starts_with(target_root.as_path()) {
                    break;
                }
                let dir_file: FilePath = dir.clone().into();
                if state.dirs.contains_key(&dir_file) {
                    break;
                }
                state.dirs.insert(dir_file.clone(), DirSpec { path: dir_file });
                ancestor = dir.parent();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PackagePath;
    use crate::scanner::Node;

    #[test]
    fn single_file_produces_link_and_parent_dirs() {
        let package = Package {
            name: "vim".to_string(),
            path: PackagePath::new("/pkg/vim").unwrap(),
            tree: Node::Dir {
                name: "vim".to_string(),
                children: vec![Node::File { name: "dot-vimrc".to_string() }],
            },
        };
        let target = TargetPath::new("/home").unwrap();
        let state = compute_desired_state(&[package], &target, false).unwrap();
        let vimrc_target = TargetPath::new("/home/.vimrc").unwrap();
        assert!(state.links.contains_key(&vimrc_target));
        assert_eq!(
            state.links[&vimrc_target].source.as_path(),
            std::path::Path::new("/pkg/vim/dot-vimrc")
        );
    }

    #[test]
    fn package_name_mapping_prefixes_target() {
        let package = Package {
            name: "dot-gnupg".to_string(),
            path: PackagePath::new("/pkg/dot-gnupg").unwrap(),
            tree: Node::Dir {
                name: "dot-gnupg".to_string(),
                children: vec![Node::File { name: "common.conf".to_string() }],
            },
        };
        let target = TargetPath::new("/home").unwrap();
        let state = compute_desired_state(&[package], &target, true).unwrap();
        let expected = TargetPath::new("/home/.gnupg/common.conf").unwrap();
        assert!(state.links.contains_key(&expected));
        let parent_dir: FilePath = TargetPath::new("/home/.gnupg").unwrap().into();
        assert!(state.dirs.contains_key(&parent_dir));
    }
}
