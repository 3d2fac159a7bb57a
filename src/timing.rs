//! Browser timer helpers
//!
//! Every network-bound wait in the engine goes through [`with_timeout`] so a
//! stalled STUN round-trip or backend fetch resolves to an inconclusive
//! result instead of hanging the scan.

use std::future::Future;

use futures::future::{select, Either};
use gloo_timers::future::TimeoutFuture;

/// Wall-clock timestamp in milliseconds; web-time makes this work on
/// wasm32 and native targets alike
pub fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Yield to the event loop for `ms` milliseconds.
///
/// Used before CPU-bound rendering (canvas, audio) so the UI thread gets a
/// paint in between probes.
pub async fn sleep_ms(ms: u32) {
    TimeoutFuture::new(ms).await;
}

/// Run `fut` against a hard deadline.
///
/// Returns `None` when the deadline expires first. The inner future is
/// dropped on expiry; callers own any cleanup of browser resources it held.
pub async fn with_timeout<F, T>(fut: F, timeout_ms: u32) -> Option<T>
where
    F: Future<Output = T>,
{
    let timeout = TimeoutFuture::new(timeout_ms);
    futures::pin_mut!(fut);
    futures::pin_mut!(timeout);

    match select(fut, timeout).await {
        Either::Left((value, _)) => Some(value),
        Either::Right(((), _)) => None,
    }
}
