pub mod dataset;
pub mod error;
pub mod properties;
pub mod snapshot;

pub use dataset::DatasetManager;
pub use error::{Result, ZfsError};
pub use properties::{DatasetEntry, SnapshotEntry, ZfsProperty};
pub use snapshot::{DeleteOutcome, SnapshotManager};
