//! In-memory run storage. No on-disk persistence: a run's lifetime is the
//! lifetime of the process holding it (see the Run Store decision in
//! `DESIGN.md`).

use std::collections::HashMap;

use chainreview_domain::error::{Error, Result};
use chainreview_domain::model::Run;
use parking_lot::RwLock;

#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<String, Run>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: Run) {
        self.runs.write().insert(run.run_id.clone(), run);
    }

    pub fn get(&self, run_id: &str) -> Result<Run> {
        self.runs.read().get(run_id).cloned().ok_or_else(|| Error::NoSuchRun(run_id.to_string()))
    }

    pub fn exists(&self, run_id: &str) -> bool {
        self.runs.read().contains_key(run_id)
    }

    pub fn delete(&self, run_id: &str) -> Result<()> {
        self.runs
            .write()
            .remove(run_id)
            .map(|_| ())
            .ok_or_else(|| Error::NoSuchRun(run_id.to_string()))
    }

    /// Most-recently-started runs first, capped at `limit`.
    pub fn list(&self, limit: usize) -> Vec<Run> {
        let runs = self.runs.read();
        let mut all: Vec<Run> = runs.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all.truncate(limit);
        all
    }

    /// Apply `f` to the stored run under the write lock, returning its
    /// result. The single-writer pattern the orchestrator uses to mutate a
    /// run's findings/events/patches/status in place.
    pub fn with_mut<F, T>(&self, run_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Run) -> T,
    {
        let mut runs = self.runs.write();
        let run = runs.get_mut(run_id).ok_or_else(|| Error::NoSuchRun(run_id.to_string()))?;
        Ok(f(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainreview_domain::model::RunMode;

    fn run(id: &str) -> Run {
        Run::new(id.to_string(), "/repo".to_string(), RunMode::Repo)
    }

    #[test]
    fn insert_and_get_roundtrips() {
        let store = RunStore::new();
        store.insert(run("r1"));
        let fetched = store.get("r1").unwrap();
        assert_eq!(fetched.run_id, "r1");
    }

    #[test]
    fn get_missing_run_errors() {
        let store = RunStore::new();
        assert!(matches!(store.get("missing"), Err(Error::NoSuchRun(_))));
    }

    #[test]
    fn delete_removes_run() {
        let store = RunStore::new();
        store.insert(run("r1"));
        store.delete("r1").unwrap();
        assert!(!store.exists("r1"));
    }

    #[test]
    fn with_mut_applies_in_place() {
        let store = RunStore::new();
        store.insert(run("r1"));
        store
            .with_mut("r1", |run| {
                run.status = chainreview_domain::model::RunStatus::Complete;
            })
            .unwrap();
        assert_eq!(store.get("r1").unwrap().status, chainreview_domain::model::RunStatus::Complete);
    }

    #[test]
    fn list_orders_most_recent_first() {
        let store = RunStore::new();
        let mut a = run("a");
        let mut b = run("b");
        a.started_at = chrono::Utc::now() - chrono::Duration::seconds(10);
        b.started_at = chrono::Utc::now();
        store.insert(a);
        store.insert(b);
        let listed = store.list(10);
        assert_eq!(listed[0].run_id, "b");
    }
}
