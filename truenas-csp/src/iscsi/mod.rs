pub mod error;
pub mod initiator;
pub mod publish;
pub mod target;
pub mod types;

pub use error::{IscsiError, Result};
pub use initiator::InitiatorManager;
pub use publish::PublishCoordinator;
pub use target::{TargetComposer, TargetTriple};
