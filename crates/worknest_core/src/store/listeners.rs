//! Listener bookkeeping shared by the bundled stores.

use super::{CollectionPath, CollectionSnapshot, ListenerId, SnapshotListener};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
pub(crate) struct ListenerTable {
    next_id: u64,
    entries: BTreeMap<ListenerId, (CollectionPath, SnapshotListener)>,
}

impl ListenerTable {
    pub(crate) fn register(&mut self, path: CollectionPath, listener: SnapshotListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.insert(id, (path, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Listeners attached to any of `paths`, grouped by path.
    pub(crate) fn watching<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a CollectionPath>,
    ) -> Vec<(CollectionPath, Vec<SnapshotListener>)> {
        let wanted = paths.into_iter().collect::<BTreeSet<_>>();
        let mut grouped: BTreeMap<&CollectionPath, Vec<SnapshotListener>> = BTreeMap::new();
        for (path, listener) in self.entries.values() {
            if wanted.contains(path) {
                grouped.entry(path).or_default().push(listener.clone());
            }
        }
        grouped
            .into_iter()
            .map(|(path, listeners)| (path.clone(), listeners))
            .collect()
    }
}

/// Snapshot plus the listeners it must be delivered to.
pub(crate) type PendingDelivery = (CollectionSnapshot, Vec<SnapshotListener>);

/// Invokes listeners. Callers must have released every store lock.
pub(crate) fn deliver(deliveries: Vec<PendingDelivery>) {
    for (snapshot, listeners) in deliveries {
        for listener in listeners {
            listener(&snapshot);
        }
    }
}
