//! The `.chainreview/` scratch area: exported prompt files for a finding's
//! fix, written on demand under the repo root.

use std::path::{Path, PathBuf};

use chainreview_domain::error::Result;

const SCRATCH_DIR: &str = ".chainreview";

/// Slug a finding id by replacing every non-alphanumeric character with `-`.
pub fn finding_slug(finding_id: &str) -> String {
    finding_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Write `contents` to `.chainreview/fix-<finding-id-slug>.md`, creating the
/// scratch directory if needed. Returns the path written, relative to
/// `repo_root`.
pub async fn export_fix_prompt(repo_root: &Path, finding_id: &str, contents: &str) -> Result<PathBuf> {
    let dir = repo_root.join(SCRATCH_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    let rel = PathBuf::from(SCRATCH_DIR).join(format!("fix-{}.md", finding_slug(finding_id)));
    tokio::fs::write(repo_root.join(&rel), contents).await?;
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_replaces_non_alphanumeric_chars() {
        assert_eq!(finding_slug("abc-123/def:7"), "abc-123-def-7");
    }

    #[tokio::test]
    async fn export_writes_under_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rel = export_fix_prompt(dir.path(), "find/7", "do the thing").await.unwrap();
        assert_eq!(rel, PathBuf::from(".chainreview/fix-find-7.md"));
        let content = tokio::fs::read_to_string(dir.path().join(&rel)).await.unwrap();
        assert_eq!(content, "do the thing");
    }
}
