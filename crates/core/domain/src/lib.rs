pub mod hub;
pub mod partition;
pub mod signal;

pub use hub::{ChangedAttributes, HubRecord, HubState, Population, hub_address};
pub use partition::{PartitionDelta, PartitionId};
pub use signal::HubSignal;
