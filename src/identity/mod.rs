//! Identity store: primary identities, sub-identity delegation, two-phase
//! registration, and login verification.

pub mod delivery;
pub mod store;
pub mod throttle;
pub mod types;

pub use delivery::{ChannelDelivery, CodeDelivery, LogDelivery};
pub use store::IdentityStore;
pub use throttle::LoginThrottle;
pub use types::{IdentityRecord, NewIdentitySpec, PendingRegistration};
