//! # flowsync - Async coordination primitives
//!
//! Building blocks for coordinating cooperative async tasks, independent of
//! any executor. Everything is expressed in terms of `Future`, `Waker` and
//! `futures::Stream`, so the same primitives run under tokio, async-std or
//! `futures::executor`.
//!
//! ## Features
//!
//! - **AsyncSemaphore**: counting semaphore with FIFO wake order and
//!   cancellable waits that refund their permit
//! - **Broadcast streams**: `BroadcastStream` (replay last),
//!   `CurrentValueAsyncSubject` (always has a value), `BufferedStream`
//!   (replay everything)
//! - **Pull streams**: demand-negotiated streams with explicit
//!   requested/satisfied accounting, including `combine_latest_many`
//! - **Bridge**: adapters between push signals and pull streams in both
//!   directions
//!
//! ## Quick Start
//!
//! ```ignore
//! use flowsync::{AsyncSemaphore, BroadcastStream, CancellationToken};
//! use futures::StreamExt;
//!
//! async fn run() {
//!     let permits = AsyncSemaphore::new(2);
//!     permits.wait().await;
//!     // ... at most two tasks in here ...
//!     permits.signal();
//!
//!     let prices = BroadcastStream::new();
//!     let mut ticks = prices.stream(true);
//!     prices.emit(101);
//!     assert_eq!(ticks.next().await, Some(101));
//!
//!     let token = CancellationToken::new();
//!     token.cancel();
//!     assert!(permits.wait_unless_cancelled(&token).await.is_err());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        User Code                             │
//! │        .await, Stream::next, subscribe / request / sink      │
//! └──────────────────────────────────────────────────────────────┘
//!          │                     │                      │
//!          ▼                     ▼                      ▼
//!   ┌─────────────┐      ┌──────────────┐      ┌─────────────────┐
//!   │  Semaphore  │      │  Broadcast   │      │  Pull streams   │◄──┐
//!   │  wait queue │      │  registries  │      │  DemandBuffer   │   │ bridge
//!   └─────────────┘      └──────────────┘      └─────────────────┘   │
//!          │                     │                      │       ┌────────────┐
//!          │                     │                      │       │push signals│
//!          └─────────────────────┼──────────────────────┘       └────────────┘
//!                                ▼
//!    ┌──────────────────────────────────────────────────────────┐
//!    │                    flowsync-core                         │
//!    │    Lock, CancellationToken, Demand, SubscriptionId       │
//!    └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Logging
//!
//! The crate logs through `tracing`: suspend/resume at `trace`,
//! subscribe/detach/cancel at `debug`, unbounded buffer growth at `warn`.
//! Install any `tracing` subscriber to see it.

pub mod config;
pub mod semaphore;
pub mod stream;
pub mod pull;
pub mod push;
pub mod bridge;

// Re-export core types
pub use flowsync_core::{
    CancellationToken,
    Demand,
    Lock,
    SubscriptionId,
    SyncError,
    SyncResult,
};

// Re-export env utilities
pub use flowsync_core::{env_get, env_get_bool};

pub use config::StreamConfig;
pub use semaphore::AsyncSemaphore;
pub use stream::{BroadcastStream, BufferedStream, CurrentValueAsyncSubject, Values};
pub use pull::{combine_latest_many, Completion, PullStream, PullStreamExt, Subscriber, Subscription};
pub use push::{Disposable, Event, Observer, PushSignal, PushSignalExt};
pub use bridge::{pull_to_push, push_to_pull};
