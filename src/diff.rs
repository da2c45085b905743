//! Diffing local against remote state.
//!
//! Pure: no I/O, no clock. Modification times are opaque change tokens and
//! only ever compared with strict greater-than, so equal times mean
//! unchanged and a local file older than its indexed copy never rolls the
//! index back.

use std::collections::BTreeSet;

use crate::models::StateMap;

/// What a run has to do to bring the remote index in line with the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub to_add: BTreeSet<String>,
    pub to_update: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl SyncPlan {
    /// True if `id` must be extracted and upserted.
    pub fn needs_processing(&self, id: &str) -> bool {
        self.to_add.contains(id) || self.to_update.contains(id)
    }

    /// True if the plan requires no writes.
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

pub fn diff(local: &StateMap, remote: &StateMap) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (id, &local_mtime) in local {
        match remote.get(id) {
            None => {
                plan.to_add.insert(id.clone());
            }
            Some(&remote_mtime) if local_mtime > remote_mtime => {
                plan.to_update.insert(id.clone());
            }
            Some(_) => {
                plan.unchanged.insert(id.clone());
            }
        }
    }

    plan.to_delete = remote
        .keys()
        .filter(|id| !local.contains_key(*id))
        .cloned()
        .collect();

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MISSING_MTIME;

    fn state(entries: &[(&str, f64)]) -> StateMap {
        entries.iter().map(|(id, m)| (id.to_string(), *m)).collect()
    }

    fn ids(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn classifies_every_id_once() {
        let local = state(&[("new.txt", 5.0), ("newer.pdf", 20.0), ("same.epub", 7.0), ("older.txt", 1.0)]);
        let remote = state(&[("gone.txt", 3.0), ("newer.pdf", 10.0), ("same.epub", 7.0), ("older.txt", 2.0)]);

        let plan = diff(&local, &remote);
        assert_eq!(ids(&plan.to_add), vec!["new.txt"]);
        assert_eq!(ids(&plan.to_update), vec!["newer.pdf"]);
        assert_eq!(ids(&plan.to_delete), vec!["gone.txt"]);
        assert_eq!(ids(&plan.unchanged), vec!["older.txt", "same.epub"]);
    }

    #[test]
    fn equal_mtimes_are_unchanged() {
        let plan = diff(&state(&[("a", 1.5)]), &state(&[("a", 1.5)]));
        assert!(plan.to_update.is_empty());
        assert!(plan.is_noop());
    }

    #[test]
    fn zero_remote_mtime_is_always_stale() {
        let plan = diff(&state(&[("a", 0.001)]), &state(&[("a", 0.0)]));
        assert!(plan.needs_processing("a"));
    }

    #[test]
    fn missing_remote_mtime_is_stale_even_for_epoch_files() {
        let plan = diff(&state(&[("a", 0.0)]), &state(&[("a", MISSING_MTIME)]));
        assert_eq!(ids(&plan.to_update), vec!["a"]);
        assert!(plan.needs_processing("a"));
    }

    #[test]
    fn deletions_never_need_processing() {
        let plan = diff(&StateMap::new(), &state(&[("a", 1.0)]));
        assert_eq!(ids(&plan.to_delete), vec!["a"]);
        assert!(!plan.needs_processing("a"));
    }

    #[test]
    fn empty_sides() {
        assert!(diff(&StateMap::new(), &StateMap::new()).is_noop());
        let plan = diff(&state(&[("a", 1.0), ("b", 2.0)]), &StateMap::new());
        assert_eq!(ids(&plan.to_add), vec!["a", "b"]);
    }
}
