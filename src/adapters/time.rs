//! Real-time driver for the scheduler [`Clock`].
//!
//! Device loops never arm timers of their own; they queue deadlines on
//! the clock.  This task sleeps on one `async_io_mini::Timer` until the
//! earliest queued deadline, fires everything that has come due, and
//! starts over.  If a task queues a deadline earlier than the one being
//! waited on, [`Clock::rearmed`] cuts the wait short.
//!
//! - **`target_os = "espidf"`**: `async-io-mini` timers sit on the
//!   ESP-IDF `select()` reactor.
//! - **host**: the same code runs on the std reactor, so the simulated
//!   board runs in wall-clock time.

use core::time::Duration;

use async_io_mini::Timer;
use futures_lite::future;

use crate::scheduler::{Clock, Runtime};

/// Longest single wait when nothing is queued.
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// How long to wait for the next deadline.
pub fn next_wait(clock: &Clock) -> Duration {
    clock
        .next_deadline()
        .map_or(IDLE_WAIT, |at| at.saturating_sub(clock.now()).min(IDLE_WAIT))
}

/// Perpetual task firing the clock's deadlines in real time.
pub async fn drive(clock: Clock) {
    loop {
        clock.fire_due();
        let wait = next_wait(&clock);
        if wait.is_zero() {
            future::yield_now().await;
            continue;
        }
        future::or(
            async {
                Timer::after(wait).await;
            },
            clock.rearmed(),
        )
        .await;
    }
}

/// A runtime on a monotonic clock with its real-time driver spawned.
pub fn realtime_runtime() -> Runtime {
    let runtime = Runtime::new(Clock::monotonic());
    runtime.spawn(drive(runtime.clock().clone()));
    runtime
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_is_capped_when_idle() {
        let clock = Clock::manual();
        assert_eq!(next_wait(&clock), IDLE_WAIT);
    }

    #[test]
    fn wait_tracks_earliest_deadline() {
        let clock = Clock::manual();
        let rt = Runtime::new(clock.clone());
        let c = clock.clone();
        rt.spawn(async move { c.sleep(Duration::from_millis(250)).await });
        rt.run_until_stalled();
        assert_eq!(next_wait(&clock), Duration::from_millis(250));
    }

    #[test]
    fn realtime_sleep_completes() {
        let rt = realtime_runtime();
        let clock = rt.clock().clone();
        let started = Instant::now();
        rt.block_on(async move { clock.sleep(Duration::from_millis(20)).await });
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
