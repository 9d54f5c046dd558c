//! Tour of the flowsync primitives
//!
//! # Environment Variables
//!
//! - `FLOWSYNC_LOG=<filter>` - tracing filter (default: info), e.g.
//!   `FLOWSYNC_LOG=flowsync=debug`
//! - `FLOWSYNC_WORKERS=<n>` - tasks contending for the semaphore (default: 8)
//! - `FLOWSYNC_PERMITS=<n>` - semaphore permits (default: 3)
//! - `FLOWSYNC_BUFFER_WARN=<n>` - buffer growth warning threshold
//! - `FLOWSYNC_TRACE_WAITERS=1` - log semaphore waiters at debug level

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flowsync::config::StreamConfig;
use flowsync::pull::{iter, PullSubject};
use flowsync::push::{pipe, Event};
use flowsync::{
    combine_latest_many, env_get, AsyncSemaphore, BroadcastStream, BufferedStream, CancellationToken,
    Completion, CurrentValueAsyncSubject, PullStreamExt, PushSignalExt,
};

fn setup_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env("FLOWSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .context("failed to install tracing subscriber")
}

async fn semaphore_demo(workers: usize, permits: isize) -> Result<()> {
    println!("=== AsyncSemaphore ({} workers, {} permits) ===", workers, permits);

    let semaphore = Arc::new(AsyncSemaphore::new(permits));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let semaphore = Arc::clone(&semaphore);
        let inside = Arc::clone(&inside);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            semaphore.wait().await;
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tracing::debug!(id, now, "worker holds a permit");
            tokio::time::sleep(Duration::from_millis(5)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
            semaphore.signal();
        }));
    }
    for handle in handles {
        handle.await.context("semaphore worker panicked")?;
    }
    println!("  peak concurrency: {}", peak.load(Ordering::SeqCst));

    // A cancelled wait gives its permit back
    let token = CancellationToken::new();
    let gate = AsyncSemaphore::new(0);
    token.cancel();
    let outcome = gate.wait_unless_cancelled(&token).await;
    println!("  cancelled wait: {:?}, value after: {}", outcome, gate.value());
    println!();
    Ok(())
}

async fn stream_demo() -> Result<()> {
    println!("=== Broadcast / replay streams ===");

    let broadcast = BroadcastStream::new();
    broadcast.emit("first");
    let mut replaying = broadcast.stream(true);
    let mut live_only = broadcast.stream(false);
    broadcast.emit("second");
    broadcast.finish();
    println!(
        "  replaying consumer: {:?}",
        [replaying.next().await, replaying.next().await, replaying.next().await]
    );
    println!("  live-only consumer: {:?}", [live_only.next().await, live_only.next().await]);

    let subject = CurrentValueAsyncSubject::new(0);
    let mut values = subject.values();
    subject.send(1);
    subject.finish_continuations();
    let seen: Vec<i32> = values.collect().await;
    println!("  current-value subject: {:?} (value now {})", seen, subject.value());

    let buffered = BufferedStream::new();
    for i in 0..3 {
        buffered.yield_value(i);
    }
    let late = buffered.values();
    let producer = buffered.clone();
    tokio::spawn(async move {
        producer.yield_value(3);
        producer.finish();
    })
    .await
    .context("buffered producer panicked")?;
    let replayed: Vec<i32> = late.collect().await;
    println!("  buffered replay: {:?}", replayed);
    println!();
    Ok(())
}

async fn pull_demo() -> Result<()> {
    println!("=== combine_latest_many ===");

    let a = PullSubject::<i32, String>::new();
    let b = PullSubject::<i32, String>::new();
    let mut rows = combine_latest_many([a.clone(), b.clone()]).values();

    a.send(1);
    b.send(2);
    let first = rows.next().await;
    a.send(3);
    let second = rows.next().await;
    println!("  rows: {:?}, {:?}", first, second);

    b.fail("b went away".to_string());
    println!("  after failure: {:?}", rows.next().await);

    let empty: Vec<PullSubject<i32, String>> = Vec::new();
    let only: Vec<_> = combine_latest_many(empty).values().collect().await;
    println!("  zero sources: {:?}", only);

    let naturals = iter::<_, String>(0u64..);
    let firsts: Vec<_> = naturals.values().take(5).collect().await;
    println!("  first naturals on demand: {:?}", firsts);
    println!();
    Ok(())
}

async fn bridge_demo() -> Result<()> {
    println!("=== push <-> pull bridge ===");

    let (signal, input) = pipe::<&'static str, String>();
    let mut pulled = signal.into_pull_stream().values();
    // The first poll starts observing the pipe
    let nothing_yet = futures::future::poll_immediate(pulled.next()).await;
    input.send("ping");
    input.send("pong");
    input.complete();
    input.send("ignored");
    let seen: Vec<_> = pulled.collect().await;
    println!("  push -> pull: {:?} (before sending: {:?})", seen, nothing_yet);

    let events = Arc::new(flowsync::Lock::new(Vec::new()));
    let sink = Arc::clone(&events);
    let disposable = iter::<_, String>(vec![10, 20])
        .into_push_signal()
        .observe_with(move |event: Event<i32, String>| sink.with(|e| e.push(event)));
    println!("  pull -> push: {:?}", events.with(|e| e.clone()));
    disposable.dispose();

    let handle = iter::<_, String>(vec!["done"]).sink(
        |v| println!("  sink value: {}", v),
        |c: Completion<String>| println!("  sink completion: {:?}", c),
    );
    drop(handle);
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let workers: usize = env_get("FLOWSYNC_WORKERS", 8);
    let permits: isize = env_get("FLOWSYNC_PERMITS", 3);
    anyhow::ensure!(permits >= 0, "FLOWSYNC_PERMITS must be non-negative, got {}", permits);
    let config = StreamConfig::from_env();
    tracing::info!(?config, workers, permits, "flowsync playground starting");
    if config.clone().install().is_err() {
        tracing::warn!("stream config was already installed");
    }

    semaphore_demo(workers, permits).await?;
    stream_demo().await?;
    pull_demo().await?;
    bridge_demo().await?;

    println!("=== Done ===");
    Ok(())
}

