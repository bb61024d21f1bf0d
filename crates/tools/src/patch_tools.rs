//! The `patch.*` tool family: propose, validate, and apply single-file text
//! patches against a finding.
//!
//! `propose` requires the snippet it's replacing to occur exactly once in
//! the target file, so the patch has an unambiguous anchor. `validate` is a
//! pre-apply dry run: it passes when that anchor still matches exactly
//! once, confirming `apply` is safe to run against the file's current
//! contents. Once `apply` has rewritten the file, the anchor is gone and a
//! later `validate` call on the same patch correctly fails.

use std::path::Path;

use chainreview_domain::error::{Error, Result};
use chainreview_domain::model::Patch;

use crate::sandbox::validate_path;

/// Propose a patch: `original` must appear exactly once in the file at
/// `file_path`. Computes a unified diff but does not touch the filesystem.
pub async fn propose(
    repo_root: &Path,
    finding_id: &str,
    file_path: &str,
    original: &str,
    replacement: &str,
) -> Result<Patch> {
    let resolved = validate_path(repo_root, file_path)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::ToolFailure(format!("failed to read '{file_path}': {e}")))?;

    let occurrences = content.matches(original).count();
    if occurrences == 0 {
        return Err(Error::ToolArgs(format!(
            "original snippet not found in '{file_path}'"
        )));
    }
    if occurrences > 1 {
        return Err(Error::ToolArgs(format!(
            "original snippet occurs {occurrences} times in '{file_path}', expected exactly once"
        )));
    }

    let unified_diff = build_unified_diff(file_path, original, replacement);

    Ok(Patch {
        id: uuid::Uuid::new_v4().to_string(),
        finding_id: finding_id.to_string(),
        file_path: file_path.to_string(),
        original: original.to_string(),
        replacement: replacement.to_string(),
        unified_diff,
        validated: false,
        validation_message: None,
    })
}

/// Apply a patch to the repo tree: rewrites the file with `original`
/// replaced by `replacement`. Re-checks the single-occurrence invariant at
/// apply time, since the file may have changed since `propose`.
pub async fn apply(repo_root: &Path, patch: &Patch) -> Result<()> {
    let resolved = validate_path(repo_root, &patch.file_path)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::ToolFailure(format!("failed to read '{}': {e}", patch.file_path)))?;

    let occurrences = content.matches(patch.original.as_str()).count();
    if occurrences != 1 {
        return Err(Error::ToolArgs(format!(
            "original snippet occurs {occurrences} times in '{}' at apply time, expected exactly once",
            patch.file_path
        )));
    }

    let updated = content.replacen(&patch.original, &patch.replacement, 1);
    tokio::fs::write(&resolved, updated)
        .await
        .map_err(|e| Error::ToolFailure(format!("failed to write '{}': {e}", patch.file_path)))?;
    Ok(())
}

/// Validate a patch against the file's current contents: a pre-apply dry
/// run confirming the original snippet still anchors exactly once, the same
/// check `apply` itself re-does before rewriting. Does not mutate `patch`;
/// the caller decides what to do with the result.
pub async fn validate(repo_root: &Path, patch: &Patch) -> Result<(bool, Option<String>)> {
    let resolved = validate_path(repo_root, &patch.file_path)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::ToolFailure(format!("failed to read '{}': {e}", patch.file_path)))?;

    let occurrences = content.matches(patch.original.as_str()).count();
    if occurrences == 0 {
        return Ok((false, Some("original snippet is no longer present in the file".to_string())));
    }
    if occurrences > 1 {
        return Ok((
            false,
            Some(format!("original snippet occurs {occurrences} times, expected exactly once")),
        ));
    }
    Ok((true, None))
}

fn build_unified_diff(file_path: &str, original: &str, replacement: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("--- a/{file_path}\n"));
    out.push_str(&format!("+++ b/{file_path}\n"));
    for line in original.lines() {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    for line in replacement.lines() {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn propose_requires_exactly_one_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn f() { x(); }\nfn g() { x(); }\n").unwrap();
        let err = propose(dir.path(), "find-1", "a.rs", "x();", "y();").await.unwrap_err();
        assert!(matches!(err, Error::ToolArgs(_)));
    }

    #[tokio::test]
    async fn propose_succeeds_on_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn f() { unsafe_call(); }\n").unwrap();
        let patch = propose(dir.path(), "find-1", "a.rs", "unsafe_call();", "safe_call();")
            .await
            .unwrap();
        assert!(!patch.validated);
        assert!(patch.unified_diff.contains("-unsafe_call();"));
        assert!(patch.unified_diff.contains("+safe_call();"));
    }

    #[tokio::test]
    async fn apply_rewrites_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn f() { unsafe_call(); }\n").unwrap();
        let patch = propose(dir.path(), "find-1", "a.rs", "unsafe_call();", "safe_call();")
            .await
            .unwrap();
        apply(dir.path(), &patch).await.unwrap();
        let content = fs::read_to_string(dir.path().join("a.rs")).unwrap();
        assert!(content.contains("safe_call();"));
        assert!(!content.contains("unsafe_call();"));
    }

    #[tokio::test]
    async fn validate_passes_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn f() { unsafe_call(); }\n").unwrap();
        let patch = propose(dir.path(), "find-1", "a.rs", "unsafe_call();", "safe_call();")
            .await
            .unwrap();
        let (validated, message) = validate(dir.path(), &patch).await.unwrap();
        assert!(validated);
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn validate_fails_after_apply() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn f() { unsafe_call(); }\n").unwrap();
        let patch = propose(dir.path(), "find-1", "a.rs", "unsafe_call();", "safe_call();")
            .await
            .unwrap();
        apply(dir.path(), &patch).await.unwrap();
        let (validated, message) = validate(dir.path(), &patch).await.unwrap();
        assert!(!validated);
        assert!(message.unwrap().contains("no longer present"));
    }
}
