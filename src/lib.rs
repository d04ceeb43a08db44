// TaskTable - Task list with filtered views, statistics and JSON import/export

pub mod clock;
pub mod config;
pub mod filter;
pub mod ids;
pub mod persist;
pub mod slot;
pub mod stats;
pub mod store;
pub mod task;

// Re-export main types for convenience
pub use clock::{Clock, StepClock, SystemClock};
pub use config::{Config, IdScheme};
pub use filter::{Filter, Query, SortDirection, SortKey, view};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use persist::{ImportError, export_document, import_document};
pub use slot::{MemorySlot, Slot, SqliteSlot};
pub use stats::{Statistics, format_minutes, stats};
pub use store::{StoreError, TaskStore};
pub use task::{DraftError, Priority, Status, Task, TaskDraft, TaskId};
