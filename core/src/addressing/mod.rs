//! Per-instance address bookkeeping and the pending-transmit queue.

mod manager;
mod queue;

pub use manager::{AddressManager, Prepared};
pub use queue::{Admission, IntentId, PendingTransmits};
