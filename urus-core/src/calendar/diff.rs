//! Planning what to change in the calendar.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calendar::item::{ItemKey, SyncItem};
use crate::calendar::mapping::MappingEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffKind::Create => write!(f, "+"),
            DiffKind::Update => write!(f, "~"),
            DiffKind::Delete => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemDiff {
    Create { item: SyncItem },
    Update { item: SyncItem, event_id: String },
    Delete { key: ItemKey, event_id: String },
}

impl ItemDiff {
    pub fn kind(&self) -> DiffKind {
        match self {
            ItemDiff::Create { .. } => DiffKind::Create,
            ItemDiff::Update { .. } => DiffKind::Update,
            ItemDiff::Delete { .. } => DiffKind::Delete,
        }
    }

    pub fn key(&self) -> &ItemKey {
        match self {
            ItemDiff::Create { item } | ItemDiff::Update { item, .. } => &item.key,
            ItemDiff::Delete { key, .. } => key,
        }
    }
}

impl fmt::Display for ItemDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemDiff::Create { item } | ItemDiff::Update { item, .. } => {
                write!(f, "{} {}", self.kind(), item.fields.title)
            }
            ItemDiff::Delete { key, .. } => write!(f, "{} {}", self.kind(), key),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub to_create: Vec<ItemDiff>,
    pub to_update: Vec<ItemDiff>,
    pub to_delete: Vec<ItemDiff>,
}

impl SyncPlan {
    /// Compare the current items with what was last written to the calendar.
    ///
    /// An item with no entry is created, an entry whose hash differs is
    /// updated, and an entry with no current item is deleted. Keys listed in
    /// `keep` are never deleted even though they have no rendered item.
    pub fn new(
        items: &[SyncItem],
        entries: &BTreeMap<ItemKey, MappingEntry>,
        keep: &[ItemKey],
    ) -> Self {
        let mut plan = SyncPlan::default();

        for item in items {
            match entries.get(&item.key) {
                None => plan.to_create.push(ItemDiff::Create { item: item.clone() }),
                Some(entry) if entry.hash != item.hash => plan.to_update.push(ItemDiff::Update {
                    item: item.clone(),
                    event_id: entry.event_id.clone(),
                }),
                Some(_) => {}
            }
        }

        let current: HashSet<&ItemKey> = items.iter().map(|i| &i.key).chain(keep).collect();
        plan.to_delete = entries
            .iter()
            .filter(|(key, _)| !current.contains(key))
            .map(|(key, entry)| ItemDiff::Delete {
                key: key.clone(),
                event_id: entry.event_id.clone(),
            })
            .collect();

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    /// All diffs in apply order.
    pub fn diffs(&self) -> impl Iterator<Item = &ItemDiff> {
        self.to_create
            .iter()
            .chain(&self.to_update)
            .chain(&self.to_delete)
    }
}
