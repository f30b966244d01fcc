//! Calendar sync.
//!
//! Today's schedule items are planned against the mapping of what was last
//! written (`diff`), then the plan is applied through a `CalendarBackend`
//! (`sync`). The default backend talks to an external provider binary.

mod backend;
mod diff;
mod item;
mod mapping;
mod provider;
mod sync;

pub use backend::{CalendarBackend, EventFields, NativeCalendar};
pub use diff::{DiffKind, ItemDiff, SyncPlan};
pub use item::{DayItems, ItemKey, SyncItem, collect_items, priority_hash, routine_hash};
pub use mapping::{MappingEntry, SelectedCalendar, SyncMapping};
pub use provider::ProviderBackend;
pub use sync::{CalendarSync, ClearResult, SyncResult, auto_select};
