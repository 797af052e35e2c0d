pub mod clock;
pub mod store;
pub mod types;

pub use clock::{Clock, IdGenerator, ManualClock, SequentialIdGenerator, SystemClock, UuidGenerator};
pub use store::{ApprovalStore, InMemoryApprovalStore, StoreError};
pub use types::{ApprovalRequest, ApprovalStatus, Resolution};
