//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the concierge crates honest:
//! - No sleeping in production code (wait on I/O or timers instead)
//! - No blocking I/O outside the synchronous config loader
//! - No OS threads; everything runs on the tokio runtime
//!
//! This library holds the shared scanning helpers. The checks themselves live
//! in `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["concierge/core/src", "concierge/shell/src"];

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under the production directories
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    PRODUCTION_DIRS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.exists())
        .flat_map(|dir| {
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
                .map(walkdir::DirEntry::into_path)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Code lines of a file, with line numbers, comments stripped and the
/// trailing `#[cfg(test)]` module excluded
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| {
            let trimmed = line.trim_start();
            !trimmed.starts_with("//") && !trimmed.starts_with("//!")
        })
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code.to_string())
        })
        .collect()
}

/// Scan production files for lines matching `is_violation`
///
/// Files whose path ends with one of `allowed` are skipped.
#[must_use]
pub fn scan(is_violation: impl Fn(&str) -> bool, allowed: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for path in production_files() {
        if allowed.iter().any(|suffix| path.ends_with(suffix)) {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for (line, code) in production_lines(&content) {
            if is_violation(&code) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    text: code.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Panic with a readable report when any violation was found
pub fn assert_clean(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} {rule} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_skip_comments_and_tests() {
        let source = "use std::fs; // blocking\n// std::thread::sleep(x)\nfn a() {}\n#[cfg(test)]\nmod tests { fn b() { std::thread::sleep(d); } }\n";
        let lines = production_lines(source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (1, "use std::fs; ".to_string()));
        assert_eq!(lines[1].0, 3);
    }

    #[test]
    fn test_production_dirs_exist() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).exists(), "missing {dir}");
        }
        assert!(!production_files().is_empty());
    }
}
