//! The `code.*` tool family: lightweight, best-effort code structure queries
//! that don't require a language-specific parser.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use chainreview_domain::error::Result;

use crate::repo_tools::{repo_search, repo_tree, RepoSearchHit};

#[derive(Debug, Clone, Serialize)]
pub struct ImportGraph {
    pub adjacency: HashMap<String, Vec<String>>,
}

/// Best-effort, language-agnostic import graph: for each source file under
/// `path` (or the whole repo), collects the module/path tokens referenced
/// by its import-like statements. Not a real resolver — a hint for the
/// architecture agent, not a build-graph authority.
pub fn import_graph(repo_root: &Path, path: Option<&str>) -> Result<ImportGraph> {
    let re = regex::Regex::new(
        r#"^\s*(?:use\s+([\w:]+)|import\s+.*?['"]([^'"]+)['"]|from\s+([\w.]+)\s+import|#include\s*[<"]([^>"]+)[>"]|require\(['"]([^'"]+)['"]\))"#,
    )
    .expect("static regex");

    let scope = path.map(|p| format!("{p}*")).unwrap_or_else(|| "*".to_string());
    let tree = repo_tree(repo_root, Some(&scope)).or_else(|_| repo_tree(repo_root, None))?;

    let mut adjacency = HashMap::new();
    for rel in tree.files {
        let full = repo_root.join(&rel);
        let Ok(content) = std::fs::read_to_string(&full) else { continue };
        let mut refs = Vec::new();
        for line in content.lines() {
            if let Some(caps) = re.captures(line) {
                if let Some(m) = (1..=5).find_map(|i| caps.get(i)) {
                    refs.push(m.as_str().to_string());
                }
            }
        }
        if !refs.is_empty() {
            adjacency.insert(rel, refs);
        }
    }

    Ok(ImportGraph { adjacency })
}

/// Scan the repo for a structural/content pattern. Shares implementation
/// with `repo.search`; kept as a distinct tool name because callers reason
/// about it as a code-pattern query, not a free-text grep.
pub fn pattern_scan(repo_root: &Path, pattern: &str) -> Result<Vec<RepoSearchHit>> {
    repo_search(repo_root, pattern, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn import_graph_collects_rust_use_statements() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "use crate::foo::Bar;\nfn f() {}\n").unwrap();
        let graph = import_graph(dir.path(), None).unwrap();
        assert_eq!(graph.adjacency.get("a.rs").unwrap(), &vec!["crate::foo::Bar".to_string()]);
    }

    #[test]
    fn pattern_scan_finds_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "let x = eval(input);\n").unwrap();
        let hits = pattern_scan(dir.path(), r"eval\(").unwrap();
        assert_eq!(hits.len(), 1);
    }
}
