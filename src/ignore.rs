//! Glob-based ignore matching with gitignore-style negation.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Patterns enabled by default regardless of any per-package `.dotignore`.
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    ".Trash",
    ".Spotlight-V100",
    ".TemporaryItems",
];

fn find_close_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
        j += 1;
    }
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

/// Compile one glob pattern into an anchored regex string.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => match find_close_bracket(&chars, i) {
                Some(end) => {
                    out.extend(chars[i..=end].iter());
                    i = end + 1;
                }
                None => {
                    out.push_str("\\[");
                    i += 1;
                }
            },
            c if "\\.+^$()|{}".contains(c) => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.push('$');
    out
}

/// One compiled ignore pattern.
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    source: String,
    negated: bool,
    /// Patterns containing a `/` (other than a leading `**/`) match the full
    /// relative path; patterns without one match only the basename.
    matches_full_path: bool,
    regex: Regex,
}

impl IgnorePattern {
    pub fn compile(source: &str) -> Result<Self> {
        let (negated, body) = match source.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, source),
        };
        let regex_source = glob_to_regex(body);
        let regex = Regex::new(&regex_source).map_err(|e| Error::InvalidIgnorePattern {
            file: PathBuf::new(),
            reason: format!("{source}: {e}"),
        })?;
        Ok(Self {
            source: source.to_string(),
            negated,
            matches_full_path: body.contains('/'),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    fn matches(&self, relative_path: &str, basename: &str) -> bool {
        if self.matches_full_path {
            self.regex.is_match(relative_path)
        } else {
            self.regex.is_match(basename)
        }
    }
}

/// An ordered set of ignore patterns with gitignore-style "last match wins"
/// negation semantics.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pattern(&mut self, source: &str) -> Result<()> {
        self.patterns.push(IgnorePattern::compile(source)?);
        Ok(())
    }

    pub fn with_defaults() -> Result<Self> {
        let mut set = Self::new();
        for pattern in DEFAULT_PATTERNS {
            set.add_pattern(pattern)?;
        }
        Ok(set)
    }

    /// Parse a `.dotignore` file's contents. Blank lines and `#`-prefixed
    /// comments are skipped. An invalid pattern fails with the file path
    /// attached so the scanner can surface which file was at fault.
    pub fn load_dotignore(&mut self, file: &Path, contents: &str) -> Result<()> {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let pattern = IgnorePattern::compile(line).map_err(|_| Error::InvalidIgnorePattern {
                file: file.to_path_buf(),
                reason: format!("invalid pattern {line:?}"),
            })?;
            self.patterns.push(pattern);
        }
        Ok(())
    }

    /// `relative_path` uses `/` separators regardless of host platform.
    pub fn should_ignore(&self, relative_path: &str) -> bool {
        let basename = relative_path.rsplit('/').next().unwrap_or(relative_path);
        let mut ignored = false;
        for pattern in &self.patterns {
            if pattern.matches(relative_path, basename) {
                ignored = !pattern.negated();
            }
        }
        ignored
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Decision returned by a [`LargeFilePrompter`] for a file that exceeds the
/// configured size threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDecision {
    Include,
    Skip,
}

/// Asked once per oversized file encountered during a scan.
pub trait LargeFilePrompter: Send + Sync {
    fn prompt(&self, path: &Path, size: u64) -> SizeDecision;
}

/// Always skips oversized files; used for non-interactive runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchPrompter;

impl LargeFilePrompter for BatchPrompter {
    fn prompt(&self, _path: &Path, _size: u64) -> SizeDecision {
        SizeDecision::Skip
    }
}

/// Reads a one-character decision from stdin (`i`nclude / `s`kip / `a`ll).
/// Once `a` has been chosen, every subsequent oversized file is included
/// without prompting again.
pub struct InteractivePrompter {
    include_all: std::sync::atomic::AtomicBool,
}

impl Default for InteractivePrompter {
    fn default() -> Self {
        Self {
            include_all: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl LargeFilePrompter for InteractivePrompter {
    fn prompt(&self, path: &Path, size: u64) -> SizeDecision {
        use std::sync::atomic::Ordering;
        if self.include_all.load(Ordering::Relaxed) {
            return SizeDecision::Include;
        }
        println!("{} is {size} bytes, exceeding the size limit. Include? [i]nclude/[s]kip/[a]ll:", path.display());
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return SizeDecision::Skip;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "i" => SizeDecision::Include,
            "a" => {
                self.include_all.store(true, Ordering::Relaxed);
                SizeDecision::Include
            }
            _ => SizeDecision::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_basename_regardless_of_directory() {
        let mut set = IgnoreSet::new();
        set.add_pattern("*.log").unwrap();
        assert!(set.should_ignore("build.log"));
        assert!(set.should_ignore("sub/build.log"));
    }

    #[test]
    fn double_star_matches_any_depth() {
        let mut set = IgnoreSet::new();
        set.add_pattern("**/node_modules").unwrap();
        assert!(set.should_ignore("a/b/node_modules"));
    }

    #[test]
    fn last_match_wins_with_negation() {
        let mut set = IgnoreSet::new();
        set.add_pattern("*.log").unwrap();
        set.add_pattern("!important.log").unwrap();
        assert!(set.should_ignore("debug.log"));
        assert!(!set.should_ignore("important.log"));
    }

    #[test]
    fn unmatched_bracket_is_literal() {
        let mut set = IgnoreSet::new();
        set.add_pattern("weird[file").unwrap();
        assert!(set.should_ignore("weird[file"));
    }

    #[test]
    fn dotignore_skips_comments_and_blanks() {
        let mut set = IgnoreSet::new();
        set.load_dotignore(Path::new("/pkg/.dotignore"), "# comment\n\n*.tmp\n")
            .unwrap();
        assert!(set.should_ignore("a.tmp"));
    }

    #[test]
    fn default_patterns_cover_vcs_dirs() {
        let set = IgnoreSet::with_defaults().unwrap();
        assert!(set.should_ignore(".git"));
        assert!(set.should_ignore(".DS_Store"));
    }
}
