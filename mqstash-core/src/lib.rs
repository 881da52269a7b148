//! Wire-level types shared by the mqstash crates.
//!
//! These mirror what the broker protocol layer hands over when a message has
//! to outlive the current processing step.

pub mod message;
pub mod properties;
pub mod qos;

pub use message::Message;
pub use properties::{MessageProperties, UserProperty};
pub use qos::QoS;
