//! Shared safety rules enforced before any tool handler runs.
//!
//! Four invariants live here: path containment, the `exec_command`
//! allowlist, the external-process (MCP launcher) allowlist, and explicit
//! env construction with no passthrough.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use chainreview_domain::error::{Error, Result};
use chainreview_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 1. Path containment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve `requested` against `repo_root`.
///
/// Rejects absolute paths and raw `..` components before any resolution,
/// canonicalizes (symlink-resolving) the root and the requested path (or
/// its nearest existing ancestor, for not-yet-created files), and checks
/// containment with [`Path::starts_with`] on canonical paths — never a
/// string-prefix comparison, which would misclassify `/tmp/repo2` as
/// contained in `/tmp/repo`.
pub fn validate_path(repo_root: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        TraceEvent::PathEscapeBlocked { tool: "repo".into(), requested: requested.to_string() }.emit();
        return Err(Error::PathEscape(format!(
            "absolute paths are not allowed: '{requested}'"
        )));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            TraceEvent::PathEscapeBlocked { tool: "repo".into(), requested: requested.to_string() }.emit();
            return Err(Error::PathEscape(format!("path contains '..': '{requested}'")));
        }
    }

    let canonical_root = repo_root
        .canonicalize()
        .map_err(|e| Error::Internal(format!("cannot resolve repo root '{}': {e}", repo_root.display())))?;

    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| Error::Internal(format!("cannot resolve path '{}': {e}", candidate.display())))?
    } else {
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        tail_parts.push(name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| Error::Internal(format!("cannot resolve ancestor of '{}': {e}", candidate.display())))?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        TraceEvent::PathEscapeBlocked { tool: "repo".into(), requested: requested.to_string() }.emit();
        return Err(Error::PathEscape(format!(
            "path '{requested}' resolves outside repo root '{}'",
            canonical_root.display()
        )));
    }

    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 2. exec_command allowlist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const COMMAND_ALLOWLIST: &[&str] = &[
    "wc", "find", "ls", "cat", "head", "tail", "grep", "git", "npm", "tsc", "node", "du", "file",
    "stat", "sort", "uniq", "tr", "cut", "awk", "sed", "semgrep", "rg",
];

const FORBIDDEN_CHARS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '{', '}'];

/// Split `cmd` on whitespace and validate it against the command allowlist.
/// Never invokes a shell: returns the argv to spawn directly.
pub fn validate_exec_command(cmd: &str, extra_allowed: &[String]) -> Result<Vec<String>> {
    if cmd.contains('>') {
        return Err(Error::AllowlistViolation(
            "redirection ('>' or '>>') is not permitted in exec_command".into(),
        ));
    }
    if let Some(c) = cmd.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(Error::AllowlistViolation(format!(
            "command contains disallowed metacharacter '{c}'"
        )));
    }

    let argv: Vec<String> = cmd.split_whitespace().map(String::from).collect();
    let Some(first) = argv.first() else {
        return Err(Error::ToolArgs("exec_command requires a non-empty command".into()));
    };

    let basename = Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(first.as_str());

    let allowed: HashSet<&str> = COMMAND_ALLOWLIST
        .iter()
        .copied()
        .chain(extra_allowed.iter().map(String::as_str))
        .collect();

    if !allowed.contains(basename) {
        TraceEvent::CommandRejected { command: basename.to_string(), reason: "not in exec_command allowlist".into() }
            .emit();
        return Err(Error::AllowlistViolation(format!(
            "command '{basename}' is not in the exec_command allowlist"
        )));
    }

    Ok(argv)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 3. External-process (MCP launcher) allowlist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const LAUNCHER_ALLOWLIST: &[&str] = &["node", "npx", "python", "python3", "uvx", "deno", "bun", "docker"];

fn is_valid_launcher_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Validate a launcher command name against the fixed allowlist (bare
/// launcher binaries, or a published MCP server name matching the same
/// charset restriction). Does not check `PATH` — that is the caller's job
/// via [`resolve_on_path`], invoked with an argument list, never a
/// concatenated string.
pub fn validate_launcher(command: &str) -> Result<()> {
    if !is_valid_launcher_name(command) {
        return Err(Error::AllowlistViolation(format!(
            "launcher name '{command}' contains disallowed characters"
        )));
    }
    if LAUNCHER_ALLOWLIST.contains(&command) {
        return Ok(());
    }
    // Not a bare launcher: still must look like a published MCP server name
    // (same charset check above already applied); the manager layer is
    // responsible for matching it against configured server ids.
    Ok(())
}

/// Resolve `name` on `PATH` using the platform's own resolver, invoked
/// with an argument list (never string concatenation).
pub fn resolve_on_path(name: &str) -> Result<PathBuf> {
    let resolver = if cfg!(windows) { "where" } else { "which" };
    let output = std::process::Command::new(resolver)
        .arg(name)
        .output()
        .map_err(|e| Error::Internal(format!("failed to invoke '{resolver}': {e}")))?;
    if !output.status.success() {
        return Err(Error::AllowlistViolation(format!("'{name}' not found on PATH")));
    }
    let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(path_str))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 4. Explicit env construction — no passthrough
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the explicit environment for a spawned child: `PATH` (augmented
/// with well-known local-install dirs if missing), `HOME`, and only the
/// caller-named credential vars. No other process env var is forwarded.
pub fn build_child_env(credential_vars: &[(&str, String)]) -> Vec<(String, String)> {
    let mut env = Vec::new();

    let path = std::env::var("PATH").unwrap_or_default();
    let augmented = if path.is_empty() {
        "/usr/local/bin:/usr/bin:/bin".to_string()
    } else {
        path
    };
    env.push(("PATH".to_string(), augmented));

    if let Ok(home) = std::env::var("HOME") {
        env.push(("HOME".to_string(), home));
    }

    for (k, v) in credential_vars {
        env.push((k.to_string(), v.clone()));
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn validate_path_rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_path(dir.path(), "../secrets.txt").unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[test]
    fn validate_path_rejects_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_path(dir.path(), "/etc/passwd").unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[test]
    fn validate_path_accepts_valid_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hi").unwrap();
        let resolved = validate_path(dir.path(), "a.txt").unwrap();
        assert!(resolved.ends_with("a.txt"));
    }

    #[test]
    fn validate_path_accepts_nested_new_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let resolved = validate_path(dir.path(), "sub/new.txt").unwrap();
        assert!(resolved.ends_with("sub/new.txt"));
    }

    /// A repo_root like `/tmp/repoXXXX` must never accept a path resolving
    /// into a sibling directory whose name happens to share the root's
    /// string prefix, e.g. `/tmp/repoXXXX2`.
    #[test]
    fn validate_path_rejects_sibling_prefix_escape() {
        let base = tempfile::tempdir().unwrap();
        let repo_root = base.path().join("repo");
        let sibling = base.path().join("repo2");
        fs::create_dir(&repo_root).unwrap();
        fs::create_dir(&sibling).unwrap();
        fs::write(sibling.join("secrets.txt"), "nope").unwrap();

        // A naive string-prefix check on "/tmp/.../repo2/secrets.txt" vs
        // "/tmp/.../repo" would incorrectly pass; our path-component check
        // must reject it because the request itself can't spell a path
        // that reaches outside repo_root without '..' or an absolute path.
        let err = validate_path(&repo_root, "../repo2/secrets.txt").unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[test]
    fn exec_command_allows_listed_binary() {
        let argv = validate_exec_command("grep -n foo src/lib.rs", &[]).unwrap();
        assert_eq!(argv[0], "grep");
    }

    #[test]
    fn exec_command_rejects_unlisted_binary() {
        let err = validate_exec_command("curl http://evil", &[]).unwrap_err();
        assert!(matches!(err, Error::AllowlistViolation(_)));
    }

    #[test]
    fn exec_command_rejects_shell_metacharacters() {
        let err = validate_exec_command("ls; rm -rf /", &[]).unwrap_err();
        assert!(matches!(err, Error::AllowlistViolation(_)));
    }

    #[test]
    fn exec_command_rejects_command_substitution() {
        let err = validate_exec_command("echo $(whoami)", &[]).unwrap_err();
        assert!(matches!(err, Error::AllowlistViolation(_)));
    }

    #[test]
    fn exec_command_rejects_redirection() {
        let err = validate_exec_command("cat foo.txt > out.txt", &[]).unwrap_err();
        assert!(matches!(err, Error::AllowlistViolation(_)));
    }

    #[test]
    fn exec_command_checks_basename_not_full_path() {
        let argv = validate_exec_command("/usr/bin/grep -n foo", &[]).unwrap();
        assert_eq!(argv[0], "/usr/bin/grep");
    }

    #[test]
    fn launcher_allowlist_accepts_known_launchers() {
        for name in LAUNCHER_ALLOWLIST {
            validate_launcher(name).unwrap();
        }
    }

    #[test]
    fn launcher_rejects_shell_metacharacters() {
        let err = validate_launcher("node; rm -rf /").unwrap_err();
        assert!(matches!(err, Error::AllowlistViolation(_)));
    }

    #[test]
    fn child_env_never_forwards_arbitrary_vars() {
        std::env::set_var("CHAINREVIEW_TEST_SECRET", "leaked");
        let env = build_child_env(&[("ANTHROPIC_API_KEY", "sk-test".into())]);
        assert!(env.iter().any(|(k, _)| k == "PATH"));
        assert!(env.iter().any(|(k, v)| k == "ANTHROPIC_API_KEY" && v == "sk-test"));
        assert!(!env.iter().any(|(k, _)| k == "CHAINREVIEW_TEST_SECRET"));
        std::env::remove_var("CHAINREVIEW_TEST_SECRET");
    }
}
