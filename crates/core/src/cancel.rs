//! Per-run cancellation tokens with group fan-out.
//!
//! Each running review gets a `CancelToken`. Calling `cancel()` on it signals
//! the orchestrator to stop agents and the tool-use loop promptly.
//!
//! **Groups** support cascading cancellation: when a parent run is cancelled
//! (or finishes), runs spawned from it via `spawn_review` are cancelled too.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks active cancellation tokens per run id, with group support for
/// cascading parent→child cancellation.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self { tokens: Mutex::new(HashMap::new()), groups: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, run_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id.to_owned(), token.clone());
        token
    }

    /// Cancel a running review. Cascades to every run in its group.
    /// Returns true if a token was found for `run_id` itself.
    pub fn cancel(&self, run_id: &str) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(run_id) {
            token.cancel();
            true
        } else {
            false
        };

        if let Some(children) = self.groups.lock().get(run_id) {
            let tokens = self.tokens.lock();
            for child_id in children {
                if let Some(child_token) = tokens.get(child_id) {
                    child_token.cancel();
                }
            }
        }

        found
    }

    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
        self.groups.lock().remove(run_id);
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.tokens.lock().contains_key(run_id)
    }

    pub fn add_to_group(&self, parent_run_id: &str, child_run_id: &str) {
        self.groups
            .lock()
            .entry(parent_run_id.to_owned())
            .or_default()
            .insert(child_run_id.to_owned());
    }

    pub fn remove_from_group(&self, parent_run_id: &str, child_run_id: &str) {
        let mut groups = self.groups.lock();
        if let Some(children) = groups.get_mut(parent_run_id) {
            children.remove(child_run_id);
            if children.is_empty() {
                groups.remove(parent_run_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_map_register_and_cancel() {
        let map = CancelMap::new();
        let token = map.register("run1");
        assert!(map.is_running("run1"));
        assert!(map.cancel("run1"));
        assert!(token.is_cancelled());
        map.remove("run1");
        assert!(!map.is_running("run1"));
    }

    #[test]
    fn cancel_cascades_to_spawned_children() {
        let map = CancelMap::new();
        let parent = map.register("parent");
        let child = map.register("child");
        map.add_to_group("parent", "child");

        map.cancel("parent");
        assert!(parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn remove_from_group_stops_cascade() {
        let map = CancelMap::new();
        map.register("p");
        let child = map.register("c");
        map.add_to_group("p", "c");
        map.remove_from_group("p", "c");

        map.cancel("p");
        assert!(!child.is_cancelled());
    }

    #[test]
    fn cancel_nonexistent_run_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("ghost"));
    }
}
