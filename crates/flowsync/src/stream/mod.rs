//! Hot streams with many consumers
//!
//! - `BroadcastStream` - live fan-out, optional replay of the last value
//! - `CurrentValueAsyncSubject` - always holds a value, replays it first
//! - `BufferedStream` - keeps and replays every value
//!
//! All three share one shape: a lock around a registry of per-consumer
//! channels. None of them applies backpressure to the producer.

mod channel;
mod broadcast;
mod buffered;
mod subject;

pub use broadcast::BroadcastStream;
pub use buffered::BufferedStream;
pub use channel::Values;
pub use subject::CurrentValueAsyncSubject;
