pub mod election;
pub mod message;
pub mod transport;

pub use message::RingMessage;
