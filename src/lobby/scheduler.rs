//! Deferred and periodic room timers
//!
//! Timers never touch room state directly: when one fires it posts a
//! [`TimerEvent`] back into the lobby loop, which re-checks that the room still
//! exists before acting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::game::room::RoomId;

/// What a timer asks the lobby to do when it fires
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerEvent {
    /// Run one bot controller step
    BotTick { room_id: RoomId },
    /// One second of round time elapsed
    RoundTick { room_id: RoomId },
    /// Bring a dead bot back
    BotRespawn { room_id: RoomId, bot_id: Uuid },
    /// A bot's attack animation finished
    AttackRecovered { room_id: RoomId, bot_id: Uuid },
}

impl TimerEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            TimerEvent::BotTick { room_id }
            | TimerEvent::RoundTick { room_id }
            | TimerEvent::BotRespawn { room_id, .. }
            | TimerEvent::AttackRecovered { room_id, .. } => room_id,
        }
    }
}

/// Cancels its timer on `cancel()` or drop; cancelling twice is a no-op
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Arms timers that feed events back into the lobby
pub trait Scheduler: Send {
    /// Fire `event` every `period`, first after one full period
    fn every(&mut self, period: Duration, event: TimerEvent) -> TimerHandle;

    /// Fire `event` once after `delay`
    fn after(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle;
}

/// Real timers on the tokio runtime
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerEvent>,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self { tx }
    }
}

impl Scheduler for TokioScheduler {
    fn every(&mut self, period: Duration, event: TimerEvent) -> TimerHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.send(event.clone()).is_err() {
                    break;
                }
            }
        });
        TimerHandle::new(move || task.abort())
    }

    fn after(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(event);
        });
        TimerHandle::new(move || task.abort())
    }
}

/// A timer recorded by [`ManualScheduler`]
#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    pub event: TimerEvent,
    /// Some for periodic timers
    pub period: Option<Duration>,
    /// First fire delay
    pub delay: Duration,
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTimer {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Records timers instead of running them; tests fire events by hand
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<Vec<ScheduledTimer>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: TimerEvent, period: Option<Duration>, delay: Duration) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().push(ScheduledTimer {
            event,
            period,
            delay,
            cancelled: cancelled.clone(),
        });
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }

    /// Every timer ever armed, in arming order
    pub fn all(&self) -> Vec<ScheduledTimer> {
        self.timers.lock().clone()
    }

    /// Timers that have not been cancelled
    pub fn active(&self) -> Vec<ScheduledTimer> {
        self.timers
            .lock()
            .iter()
            .filter(|t| !t.is_cancelled())
            .cloned()
            .collect()
    }

    /// Active timers belonging to one room
    pub fn active_for(&self, room_id: &str) -> Vec<ScheduledTimer> {
        self.active()
            .into_iter()
            .filter(|t| t.event.room_id() == room_id)
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn every(&mut self, period: Duration, event: TimerEvent) -> TimerHandle {
        self.record(event, Some(period), period)
    }

    fn after(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        self.record(event, None, delay)
    }
}
