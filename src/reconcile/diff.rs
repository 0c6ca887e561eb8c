// This file is part of the terraform-provider-previder project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;

/// Partition of the keys of two keyed collections
///
/// Keys present on both sides and left unchanged appear in no list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<K> {
    pub to_create: Vec<K>,
    pub to_update: Vec<K>,
    pub to_delete: Vec<K>,
}

impl<K> Default for ChangeSet<K> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

impl<K> ChangeSet<K> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Match observed and desired entries by natural key
///
/// `unchanged` compares the entries sharing a key, `skip_delete` excludes
/// observed entries that must not be deleted again.
pub fn diff_by_key<K, O, D>(
    observed: &BTreeMap<K, O>,
    desired: &BTreeMap<K, D>,
    unchanged: impl Fn(&O, &D) -> bool,
    skip_delete: impl Fn(&O) -> bool,
) -> ChangeSet<K>
where
    K: Ord + Clone,
{
    let mut changes = ChangeSet::default();

    for (key, want) in desired {
        match observed.get(key) {
            None => changes.to_create.push(key.clone()),
            Some(have) if !unchanged(have, want) => changes.to_update.push(key.clone()),
            Some(_) => (),
        }
    }
    for (key, have) in observed {
        if !desired.contains_key(key) && !skip_delete(have) {
            changes.to_delete.push(key.clone());
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&'static str, &'static str)]) -> BTreeMap<&'static str, &'static str> {
        entries.iter().copied().collect()
    }

    #[test]
    fn partitions_by_natural_key() {
        let observed = map(&[("A", "x"), ("B", "y")]);
        let desired = map(&[("B", "y"), ("C", "z")]);

        let changes = diff_by_key(&observed, &desired, |o, d| o == d, |_| false);

        assert_eq!(changes.to_create, vec!["C"]);
        assert!(changes.to_update.is_empty());
        assert_eq!(changes.to_delete, vec!["A"]);
    }

    #[test]
    fn changed_entries_are_updated() {
        let observed = map(&[("disk1", "10"), ("disk2", "20")]);
        let desired = map(&[("disk1", "10"), ("disk2", "40")]);

        let changes = diff_by_key(&observed, &desired, |o, d| o == d, |_| false);

        assert_eq!(
            changes,
            ChangeSet {
                to_create: vec![],
                to_update: vec!["disk2"],
                to_delete: vec![],
            }
        );
    }

    #[test]
    fn terminated_entries_are_not_deleted_again() {
        let observed = map(&[("old", "GRACE_TERMINATED"), ("live", "READY")]);
        let desired = BTreeMap::<&str, &str>::new();

        let changes = diff_by_key(
            &observed,
            &desired,
            |o, d| o == d,
            |o| *o == "GRACE_TERMINATED",
        );

        assert_eq!(changes.to_delete, vec!["live"]);
    }

    #[test]
    fn identical_sides_produce_no_change() {
        let side = map(&[("a", "1"), ("b", "2")]);
        assert!(diff_by_key(&side, &side, |o, d| o == d, |_| false).is_empty());
    }
}
