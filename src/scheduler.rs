//! Cooperative scheduler: one executor thread, one deadline queue.
//!
//! Every perpetual task (one per device plus the request server) runs on
//! a single `edge_executor::LocalExecutor`.  Tasks suspend only on timed
//! sleeps and on I/O.  Sleeps do not arm individual hardware timers;
//! they register a deadline in the [`Clock`]'s min-ordered queue and a
//! driver fires whatever has come due.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  LocalExecutor                                               │
//!  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐    │
//!  │   │ button   │ │ switch   │ │ heartbeat│ │ request      │    │
//!  │   │ poll 0.1s│ │ poll 0.1s│ │ blink 1s │ │ server       │    │
//!  │   └────┬─────┘ └────┬─────┘ └────┬─────┘ └──────────────┘    │
//!  │        └──── clock.sleep(d) ─────┘                           │
//!  │                     ▼                                        │
//!  │   Clock: BinaryHeap<Reverse<(deadline, seq, waker)>>         │
//!  │                     ▲                                        │
//!  │   driver: real-time timer task (target)                      │
//!  │           or Runtime::run_for (tests, simulation)            │
//!  └──────────────────────────────────────────────────────────────┘
//! ```

use core::cell::RefCell;
use core::cmp::{Ordering, Reverse};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use core::time::Duration;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Instant;

use edge_executor::LocalExecutor;

/// Upper bound on concurrently spawned tasks (devices + server + driver
/// + in-flight connections).
pub const MAX_TASKS: usize = 64;

/// Ticks after which [`Runtime::run_until_stalled`] gives up on a task
/// set that keeps waking itself without sleeping.
const STALL_TICK_LIMIT: usize = 100_000;

// ═══════════════════════════════════════════════════════════════
//  Deadline queue
// ═══════════════════════════════════════════════════════════════

struct Deadline {
    at: Duration,
    seq: u64,
    waker: Waker,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

enum TimeSource {
    /// Time moves only when [`Clock::advance_to`] is called.
    Manual(Duration),
    /// Time is wall-clock uptime since the clock was created.
    Monotonic(Instant),
}

struct TimerQueue {
    source: TimeSource,
    seq: u64,
    pending: BinaryHeap<Reverse<Deadline>>,
    driver: Option<Waker>,
    rearm: bool,
}

impl TimerQueue {
    fn now(&self) -> Duration {
        match &self.source {
            TimeSource::Manual(now) => *now,
            TimeSource::Monotonic(start) => start.elapsed(),
        }
    }

    fn earliest(&self) -> Option<Duration> {
        self.pending.peek().map(|Reverse(d)| d.at)
    }

    fn take_due(&mut self, now: Duration) -> Vec<Waker> {
        let mut due = Vec::new();
        while let Some(Reverse(d)) = self.pending.peek() {
            if d.at > now {
                break;
            }
            if let Some(Reverse(d)) = self.pending.pop() {
                due.push(d.waker);
            }
        }
        due
    }
}

// ═══════════════════════════════════════════════════════════════
//  Clock
// ═══════════════════════════════════════════════════════════════

/// Shared time base and deadline queue.  Cheap to clone.
#[derive(Clone)]
pub struct Clock {
    inner: Rc<RefCell<TimerQueue>>,
}

impl Clock {
    fn with_source(source: TimeSource) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerQueue {
                source,
                seq: 0,
                pending: BinaryHeap::new(),
                driver: None,
                rearm: false,
            })),
        }
    }

    /// A virtual clock starting at zero that only moves when advanced.
    pub fn manual() -> Self {
        Self::with_source(TimeSource::Manual(Duration::ZERO))
    }

    /// A clock following wall-clock uptime; needs a real-time driver task.
    pub fn monotonic() -> Self {
        Self::with_source(TimeSource::Monotonic(Instant::now()))
    }

    /// Time since the clock started.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now()
    }

    /// Suspend the calling task for `duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(self.now() + duration)
    }

    /// Suspend the calling task until the clock reads `deadline`.
    pub fn sleep_until(&self, deadline: Duration) -> Sleep {
        Sleep {
            clock: self.clone(),
            deadline,
            registered: false,
        }
    }

    /// The earliest registered deadline, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.borrow().earliest()
    }

    /// Number of registered deadlines (including ones already satisfied
    /// but not yet fired).
    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Move a manual clock forward to `at` and fire every deadline that
    /// has come due.  A monotonic clock ignores `at` and only fires.
    pub fn advance_to(&self, at: Duration) -> usize {
        {
            let mut q = self.inner.borrow_mut();
            if let TimeSource::Manual(now) = &mut q.source {
                if at > *now {
                    *now = at;
                }
            }
        }
        self.fire_due()
    }

    /// Wake every task whose deadline has passed.  Returns how many fired.
    pub fn fire_due(&self) -> usize {
        let due = {
            let mut q = self.inner.borrow_mut();
            let now = q.now();
            q.take_due(now)
        };
        let fired = due.len();
        for waker in due {
            waker.wake();
        }
        fired
    }

    /// Resolves when a deadline earlier than every previously queued one
    /// has been registered.  Used by the real-time driver to re-arm.
    pub fn rearmed(&self) -> Rearmed {
        Rearmed { clock: self.clone() }
    }

    fn register(&self, at: Duration, waker: Waker) {
        let driver = {
            let mut q = self.inner.borrow_mut();
            let earlier = q.earliest().is_none_or(|e| at < e);
            let seq = q.seq;
            q.seq = q.seq.wrapping_add(1);
            q.pending.push(Reverse(Deadline { at, seq, waker }));
            if earlier {
                q.rearm = true;
                q.driver.take()
            } else {
                None
            }
        };
        if let Some(driver) = driver {
            driver.wake();
        }
    }
}

/// Future returned by [`Clock::sleep`].
pub struct Sleep {
    clock: Clock,
    deadline: Duration,
    registered: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.clock.now() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.registered {
            self.clock.register(self.deadline, cx.waker().clone());
            self.registered = true;
        }
        Poll::Pending
    }
}

/// Future returned by [`Clock::rearmed`].
pub struct Rearmed {
    clock: Clock,
}

impl Future for Rearmed {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut q = self.clock.inner.borrow_mut();
        if q.rearm {
            q.rearm = false;
            return Poll::Ready(());
        }
        q.driver = Some(cx.waker().clone());
        Poll::Pending
    }
}

// ═══════════════════════════════════════════════════════════════
//  Runtime
// ═══════════════════════════════════════════════════════════════

/// The executor plus the clock every task sleeps on.  Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    executor: Rc<LocalExecutor<'static, MAX_TASKS>>,
    clock: Clock,
}

impl Runtime {
    pub fn new(clock: Clock) -> Self {
        Self {
            executor: Rc::new(LocalExecutor::new()),
            clock,
        }
    }

    /// A runtime on a manual clock, driven with [`run_for`](Self::run_for).
    pub fn simulated() -> Self {
        Self::new(Clock::manual())
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Spawn a detached task; it runs until the process restarts.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.executor.spawn(task).detach();
    }

    /// Poll ready tasks until none is runnable.  Returns the tick count.
    pub fn run_until_stalled(&self) -> usize {
        let mut ticks = 0;
        while ticks < STALL_TICK_LIMIT && self.executor.try_tick() {
            ticks += 1;
        }
        ticks
    }

    /// Advance a manual clock by `duration`, stepping deadline by deadline
    /// so every task observes the intermediate wake-ups in order.
    pub fn run_for(&self, duration: Duration) {
        let target = self.clock.now() + duration;
        loop {
            self.run_until_stalled();
            match self.clock.next_deadline() {
                Some(at) if at <= target => {
                    self.clock.advance_to(at);
                }
                _ => break,
            }
        }
        self.clock.advance_to(target);
        self.run_until_stalled();
    }

    /// Drive the executor on the current thread until `fut` completes.
    pub fn block_on<F>(&self, fut: F) -> F::Output
    where
        F: Future + 'static,
    {
        futures_lite::future::block_on(self.executor.run(fut))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn sleep_completes_only_after_deadline() {
        let rt = Runtime::simulated();
        let done = Rc::new(Cell::new(false));
        let flag = done.clone();
        let clock = rt.clock().clone();
        rt.spawn(async move {
            clock.sleep(Duration::from_millis(100)).await;
            flag.set(true);
        });

        rt.run_for(Duration::from_millis(99));
        assert!(!done.get());
        rt.run_for(Duration::from_millis(1));
        assert!(done.get());
    }

    #[test]
    fn deadlines_fire_in_order() {
        let rt = Runtime::simulated();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (label, ms) in [("late", 300u64), ("early", 100), ("mid", 200)] {
            let clock = rt.clock().clone();
            let order = order.clone();
            rt.spawn(async move {
                clock.sleep(Duration::from_millis(ms)).await;
                order.borrow_mut().push((label, clock.now()));
            });
        }

        rt.run_for(Duration::from_secs(1));
        let order = order.borrow();
        assert_eq!(
            order.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
            vec!["early", "mid", "late"]
        );
        assert_eq!(order[0].1, Duration::from_millis(100));
        assert_eq!(order[2].1, Duration::from_millis(300));
    }

    #[test]
    fn periodic_task_ticks_once_per_interval() {
        let rt = Runtime::simulated();
        let ticks = Rc::new(Cell::new(0u32));
        let counter = ticks.clone();
        let clock = rt.clock().clone();
        rt.spawn(async move {
            loop {
                counter.set(counter.get() + 1);
                clock.sleep(Duration::from_millis(100)).await;
            }
        });

        rt.run_for(Duration::from_millis(550));
        // t = 0, 100, 200, 300, 400, 500
        assert_eq!(ticks.get(), 6);
    }

    #[test]
    fn earlier_deadline_marks_rearm() {
        let clock = Clock::manual();
        let waker = futures_lite::future::block_on(futures_lite::future::poll_fn(|cx| {
            Poll::Ready(cx.waker().clone())
        }));
        clock.register(Duration::from_secs(5), waker.clone());
        assert!(clock.inner.borrow().rearm);
        clock.inner.borrow_mut().rearm = false;
        clock.register(Duration::from_secs(9), waker.clone());
        assert!(!clock.inner.borrow().rearm);
        clock.register(Duration::from_secs(1), waker);
        assert!(clock.inner.borrow().rearm);
        assert_eq!(clock.next_deadline(), Some(Duration::from_secs(1)));
    }
}
