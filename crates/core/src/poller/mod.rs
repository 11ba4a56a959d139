//! Periodic state fetches alongside the push channel.
//!
//! Two independent timers drive fetches:
//! - the fallback timer, active while the push channel is not connected
//! - the running timer, active while the execution is starting or running
//!
//! Each timer fires immediately when it becomes active. Only one fetch may
//! be in flight at a time, whichever timer asked for it.

pub mod fetcher;

pub use fetcher::{FetchError, HttpStateFetcher, StateFetcher};

use pw_protocol::{ConnectionState, ExecutionStatus};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

/// Which trigger asked for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSource {
    Fallback,
    Running,
    Manual,
}

pub struct FallbackPoller {
    fallback_period: Duration,
    running_period: Duration,
    fallback: Option<Interval>,
    running: Option<Interval>,
    in_flight: Option<PollSource>,
}

impl FallbackPoller {
    pub fn new(fallback_period: Duration, running_period: Duration) -> Self {
        Self {
            fallback_period,
            running_period,
            fallback: None,
            running: None,
            in_flight: None,
        }
    }

    /// Start or stop the timers for the current connection and execution
    /// state. Timers already in the right state are left alone.
    pub fn update(&mut self, connection: ConnectionState, status: ExecutionStatus) {
        let want_fallback = connection != ConnectionState::Connected;
        let want_running = status.is_active();

        toggle(&mut self.fallback, want_fallback, self.fallback_period, "fallback");
        toggle(&mut self.running, want_running, self.running_period, "running");
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn running_active(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.fallback.is_none() && self.running.is_none()
    }

    /// Wait for the next timer tick. Never resolves while both are stopped.
    pub async fn tick(&mut self) -> PollSource {
        match (self.fallback.as_mut(), self.running.as_mut()) {
            (Some(fallback), Some(running)) => tokio::select! {
                _ = fallback.tick() => PollSource::Fallback,
                _ = running.tick() => PollSource::Running,
            },
            (Some(fallback), None) => {
                fallback.tick().await;
                PollSource::Fallback
            }
            (None, Some(running)) => {
                running.tick().await;
                PollSource::Running
            }
            (None, None) => std::future::pending().await,
        }
    }

    /// Claim the single fetch slot. Returns `false` when a fetch is already
    /// in flight, in which case the caller skips this one.
    pub fn try_begin(&mut self, source: PollSource) -> bool {
        if let Some(current) = self.in_flight {
            debug!(?source, ?current, "fetch already in flight, skipping");
            return false;
        }
        self.in_flight = Some(source);
        true
    }

    /// Release the fetch slot.
    pub fn finish(&mut self) {
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<PollSource> {
        self.in_flight
    }

    /// Stop both timers and release the fetch slot.
    pub fn cancel_all(&mut self) {
        self.fallback = None;
        self.running = None;
        self.in_flight = None;
    }
}

fn toggle(timer: &mut Option<Interval>, wanted: bool, period: Duration, name: &str) {
    match (timer.is_some(), wanted) {
        (false, true) => {
            debug!(timer = name, period_ms = period.as_millis() as u64, "poll timer started");
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *timer = Some(ticks);
        }
        (true, false) => {
            debug!(timer = name, "poll timer stopped");
            *timer = None;
        }
        _ => {}
    }
}
