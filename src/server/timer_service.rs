use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use super::messaging::EventSink;
use crate::protocol::{ServerEvent, TimerSyncPayload};

struct ActiveTimer {
    started_at: Instant,
    deadline: Instant,
    total: Duration,
    tick_task: JoinHandle<()>,
    expire_task: JoinHandle<()>,
}

/// Server-authoritative per-PIN countdowns.
///
/// Each timer owns two tasks: a 1 Hz tick broadcaster and the deadline task
/// that fires `on_expire`. The elapsed-time reading is the authoritative
/// input to answer scoring and is capped at the configured total, so a
/// packet arriving after the deadline but before the expiry callback still
/// earns the 50 % floor instead of scoring zero.
pub struct GameTimerService {
    timers: Arc<DashMap<String, ActiveTimer>>,
}

impl GameTimerService {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Start (or restart) the countdown for a room. Emits `timer_started`
    /// and an initial tick immediately, then ticks every second until the
    /// deadline, when `on_expire` runs.
    pub async fn start_timer<F>(
        &self,
        pin: &str,
        duration_secs: u64,
        sink: Arc<dyn EventSink>,
        on_expire: F,
    ) where
        F: Future<Output = ()> + Send + 'static,
    {
        self.stop_timer(pin);

        let total = Duration::from_secs(duration_secs);
        let started_at = Instant::now();
        let deadline = started_at + total;

        sink.broadcast_to_room(
            pin,
            Arc::new(ServerEvent::TimerStarted {
                duration_secs,
            }),
        )
        .await;
        sink.broadcast_to_room(
            pin,
            Arc::new(ServerEvent::TimerTick {
                remaining: duration_secs,
                remaining_ms: total.as_millis() as u64,
            }),
        )
        .await;

        let tick_task = {
            let sink = Arc::clone(&sink);
            let pin = pin.to_string();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // The first tick completes immediately; the initial tick
                // was already sent above.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let remaining_ms = (deadline - now).as_millis() as u64;
                    sink.broadcast_to_room(
                        &pin,
                        Arc::new(ServerEvent::TimerTick {
                            remaining: remaining_ms.div_ceil(1000),
                            remaining_ms,
                        }),
                    )
                    .await;
                }
            })
        };

        let expire_task = {
            let timers = Arc::clone(&self.timers);
            let sink = Arc::clone(&sink);
            let pin = pin.to_string();
            tokio::spawn(async move {
                sleep_until(deadline).await;
                // Remove the entry first so late submissions read "expired"
                // and fall back to the clamped total. Only the tick task is
                // aborted here; aborting this task would cancel `on_expire`.
                if let Some((_, entry)) = timers.remove(&pin) {
                    entry.tick_task.abort();
                }
                sink.broadcast_to_room(&pin, Arc::new(ServerEvent::TimeExpired))
                    .await;
                on_expire.await;
            })
        };

        self.timers.insert(
            pin.to_string(),
            ActiveTimer {
                started_at,
                deadline,
                total,
                tick_task,
                expire_task,
            },
        );
    }

    /// Idempotent cancel.
    pub fn stop_timer(&self, pin: &str) {
        if let Some((_, entry)) = self.timers.remove(pin) {
            entry.tick_task.abort();
            entry.expire_task.abort();
        }
    }

    pub fn stop_all(&self) {
        let pins: Vec<String> = self.timers.iter().map(|entry| entry.key().clone()).collect();
        for pin in pins {
            self.stop_timer(&pin);
        }
    }

    /// Authoritative elapsed time since the countdown started, capped at
    /// the configured total. `None` when no timer is running.
    pub fn elapsed_ms(&self, pin: &str) -> Option<u64> {
        self.timers.get(pin).map(|entry| {
            let elapsed = entry.started_at.elapsed();
            elapsed.min(entry.total).as_millis() as u64
        })
    }

    pub fn remaining_ms(&self, pin: &str) -> Option<u64> {
        self.timers.get(pin).map(|entry| {
            entry
                .deadline
                .saturating_duration_since(Instant::now())
                .as_millis() as u64
        })
    }

    pub fn is_active(&self, pin: &str) -> bool {
        self.timers.contains_key(pin)
    }

    /// A missing timer counts as expired.
    pub fn is_expired(&self, pin: &str) -> bool {
        match self.timers.get(pin) {
            Some(entry) => Instant::now() >= entry.deadline,
            None => true,
        }
    }

    /// Countdown snapshot for late joiners and reconnectors.
    pub fn timer_sync(&self, pin: &str) -> TimerSyncPayload {
        let server_time = Utc::now().timestamp_millis();
        match self.timers.get(pin) {
            Some(entry) => {
                let elapsed_ms = entry.started_at.elapsed().min(entry.total).as_millis() as i64;
                let remaining_ms = entry
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64;
                TimerSyncPayload {
                    active: true,
                    server_time,
                    start_time: Some(server_time - elapsed_ms),
                    end_time: Some(server_time + remaining_ms as i64),
                    remaining: remaining_ms.div_ceil(1000),
                    remaining_ms,
                    duration: entry.total.as_secs(),
                }
            }
            None => TimerSyncPayload {
                active: false,
                server_time,
                start_time: None,
                end_time: None,
                remaining: 0,
                remaining_ms: 0,
                duration: 0,
            },
        }
    }
}

impl Default for GameTimerService {
    fn default() -> Self {
        Self::new()
    }
}
