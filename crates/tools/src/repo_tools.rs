//! The `repo.*` tool family: read-only access to a checked-out repository.
//!
//! Every handler that takes a path argument runs it through
//! [`crate::sandbox::validate_path`] first, so escape attempts are rejected
//! before any filesystem call happens.

use std::path::Path;

use serde::Serialize;

use chainreview_domain::error::{Error, Result};

use crate::sandbox::validate_path;

#[derive(Debug, Clone, Serialize)]
pub struct RepoOpenResult {
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

pub async fn repo_open(repo_root: &Path) -> Result<RepoOpenResult> {
    if !repo_root.is_dir() {
        return Err(Error::ToolArgs(format!("repo_root '{}' is not a directory", repo_root.display())));
    }
    let name = repo_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo")
        .to_string();

    let branch = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(RepoOpenResult { path: repo_root.display().to_string(), name, branch })
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoTreeResult {
    pub files: Vec<String>,
    pub total_files: usize,
}

const TREE_WALK_CAP: usize = 20_000;

pub fn repo_tree(repo_root: &Path, pattern: Option<&str>) -> Result<RepoTreeResult> {
    let matcher = pattern
        .map(|p| glob::Pattern::new(p).map_err(|e| Error::ToolArgs(format!("invalid glob pattern: {e}"))))
        .transpose()?;

    let mut files = Vec::new();
    let mut stack = vec![repo_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Ok(rel) = path.strip_prefix(repo_root) else { continue };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if matcher.as_ref().map_or(true, |m| m.matches(&rel_str)) {
                files.push(rel_str);
            }
            if files.len() >= TREE_WALK_CAP {
                break;
            }
        }
    }
    files.sort();
    let total_files = files.len();
    Ok(RepoTreeResult { files, total_files })
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoFileResult {
    pub content: String,
    pub line_count: usize,
}

pub async fn repo_file(
    repo_root: &Path,
    path: &str,
    start_line: Option<u32>,
    end_line: Option<u32>,
) -> Result<RepoFileResult> {
    let resolved = validate_path(repo_root, path)?;
    let raw = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::ToolFailure(format!("failed to read '{path}': {e}")))?;
    let lines: Vec<&str> = raw.lines().collect();
    let line_count = lines.len();

    let content = match (start_line, end_line) {
        (Some(s), Some(e)) if s >= 1 && s <= e => {
            let start_idx = (s as usize).saturating_sub(1);
            let end_idx = (e as usize).min(line_count);
            lines.get(start_idx..end_idx).unwrap_or(&[]).join("\n")
        }
        _ => raw.clone(),
    };

    Ok(RepoFileResult { content, line_count })
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoSearchHit {
    pub file: String,
    pub line: u32,
    pub text: String,
}

pub fn repo_search(repo_root: &Path, pattern: &str, glob_filter: Option<&str>) -> Result<Vec<RepoSearchHit>> {
    let re = regex::Regex::new(pattern).map_err(|e| Error::ToolArgs(format!("invalid search pattern: {e}")))?;
    let tree = repo_tree(repo_root, glob_filter)?;

    let mut hits = Vec::new();
    for rel in tree.files {
        let full = repo_root.join(&rel);
        let Ok(content) = std::fs::read_to_string(&full) else { continue };
        for (idx, line) in content.lines().enumerate() {
            if re.is_match(line) {
                hits.push(RepoSearchHit { file: rel.clone(), line: (idx + 1) as u32, text: line.to_string() });
            }
        }
    }
    Ok(hits)
}

pub async fn repo_diff(repo_root: &Path, ref_a: Option<&str>, ref_b: Option<&str>) -> Result<String> {
    let args: Vec<&str> = match (ref_a, ref_b) {
        (Some(a), Some(b)) => vec!["diff", a, b],
        (Some(a), None) => vec!["diff", a],
        _ => vec!["diff"],
    };
    run_git(repo_root, &args).await
}

async fn run_git(repo_root: &Path, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .await
        .map_err(|e| Error::ToolFailure(format!("git invocation failed: {e}")))?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn repo_open_reports_name() {
        let dir = tempfile::tempdir().unwrap();
        let result = repo_open(dir.path()).await.unwrap();
        assert_eq!(result.path, dir.path().display().to_string());
    }

    #[test]
    fn repo_tree_lists_files_excluding_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let result = repo_tree(dir.path(), None).unwrap();
        assert_eq!(result.files, vec!["a.rs".to_string()]);
    }

    #[test]
    fn repo_tree_applies_glob_filter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();
        fs::write(dir.path().join("b.md"), "").unwrap();
        let result = repo_tree(dir.path(), Some("*.rs")).unwrap();
        assert_eq!(result.files, vec!["a.rs".to_string()]);
    }

    #[tokio::test]
    async fn repo_file_slices_by_line_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let result = repo_file(dir.path(), "a.txt", Some(2), Some(3)).await.unwrap();
        assert_eq!(result.content, "two\nthree");
        assert_eq!(result.line_count, 3);
    }

    #[tokio::test]
    async fn repo_file_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = repo_file(dir.path(), "../outside.txt", None, None).await.unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[test]
    fn repo_search_finds_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn unsafe_thing() {}\nfn safe() {}\n").unwrap();
        let hits = repo_search(dir.path(), "unsafe", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 1);
    }
}
