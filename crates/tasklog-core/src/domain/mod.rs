//! Domain model (task ids, statuses, records, raw events, errors).
//!
//! ここにはスレッドやストアの知識を持たないデータ型だけを置く。

pub mod errors;
pub mod events;
pub mod record;
pub mod status;
pub mod task;

pub use self::errors::{ConfigError, MonitorError, SourceError, StoreError};
pub use self::events::{EventKind, RawEvent, TaskEventKind};
pub use self::record::{TaskRecord, UpdateField};
pub use self::status::TaskStatus;
pub use self::task::TaskId;
