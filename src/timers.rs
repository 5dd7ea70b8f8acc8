//! Countdown timers
//!
//! Each running timer is one spawned task sleeping to its deadline.
//! Firing pushes a `TimerAlert` onto an mpsc channel the orchestrator
//! drains; the set itself never touches audio. Remaining time is always
//! computed from the deadline, never cached, so concurrent readers see
//! a non-increasing value. Timers live in memory only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Timer lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Paused,
}

/// Sent on the alert channel when a timer reaches its deadline
#[derive(Clone, Debug)]
pub struct TimerAlert {
    pub id: Uuid,
    pub label: Option<String>,
    pub duration: Duration,
}

/// Point-in-time view of a timer
#[derive(Clone, Debug)]
pub struct TimerSnapshot {
    pub id: Uuid,
    pub label: Option<String>,
    pub duration: Duration,
    pub remaining: Duration,
    pub state: TimerState,
}

struct TimerEntry {
    label: Option<String>,
    duration: Duration,
    state: TimerState,
    /// Deadline while running
    deadline: Instant,
    /// Exact remaining time while paused
    remaining: Duration,
    /// Creation order, tiebreak for equal deadlines
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerEntry {
    fn remaining_now(&self) -> Duration {
        match self.state {
            TimerState::Running => self.deadline.saturating_duration_since(Instant::now()),
            TimerState::Paused => self.remaining,
        }
    }
}

struct Shared {
    timers: Mutex<HashMap<Uuid, TimerEntry>>,
    alert_tx: mpsc::UnboundedSender<TimerAlert>,
}

/// The set of active timers
pub struct TimerSet {
    shared: Arc<Shared>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl TimerSet {
    /// Create an empty set and the alert channel the orchestrator reads.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerAlert>) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let set = Self {
            shared: Arc::new(Shared {
                timers: Mutex::new(HashMap::new()),
                alert_tx,
            }),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        };
        (set, alert_rx)
    }

    /// Start a timer. Returns its id.
    pub fn start(&self, duration: Duration, label: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        let deadline = Instant::now() + duration;
        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let handle = spawn_countdown(Arc::clone(&self.shared), deadline);

        if let Ok(mut timers) = self.shared.timers.lock() {
            timers.insert(
                id,
                TimerEntry {
                    label: label.clone(),
                    duration,
                    state: TimerState::Running,
                    deadline,
                    remaining: duration,
                    seq,
                    handle: Some(handle),
                },
            );
        }

        tracing::info!(id = %id, seconds = duration.as_secs(), label = ?label, "timer started");
        id
    }

    /// Cancel a timer by id. Returns its snapshot if it existed.
    pub fn cancel(&self, id: Uuid) -> Option<TimerSnapshot> {
        let mut timers = self.shared.timers.lock().ok()?;
        let entry = timers.remove(&id)?;
        if let Some(ref handle) = entry.handle {
            handle.abort();
        }
        tracing::info!(id = %id, "timer cancelled");
        Some(snapshot(id, &entry))
    }

    /// Cancel the most recently started timer ("cancel the timer").
    pub fn cancel_latest(&self) -> Option<TimerSnapshot> {
        let id = {
            let timers = self.shared.timers.lock().ok()?;
            timers
                .iter()
                .max_by_key(|(_, entry)| entry.seq)
                .map(|(id, _)| *id)?
        };
        self.cancel(id)
    }

    /// Pause a running timer, preserving its remaining time exactly.
    pub fn pause(&self, id: Uuid) -> bool {
        let Ok(mut timers) = self.shared.timers.lock() else {
            return false;
        };
        let Some(entry) = timers.get_mut(&id) else {
            return false;
        };
        if entry.state != TimerState::Running {
            return false;
        }

        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }
        entry.remaining = entry.deadline.saturating_duration_since(Instant::now());
        entry.state = TimerState::Paused;
        tracing::info!(id = %id, remaining_secs = entry.remaining.as_secs(), "timer paused");
        true
    }

    /// Resume a paused timer from its preserved remaining time.
    pub fn resume(&self, id: Uuid) -> bool {
        let Ok(mut timers) = self.shared.timers.lock() else {
            return false;
        };
        let Some(entry) = timers.get_mut(&id) else {
            return false;
        };
        if entry.state != TimerState::Paused {
            return false;
        }

        let deadline = Instant::now() + entry.remaining;
        entry.deadline = deadline;
        entry.state = TimerState::Running;
        entry.handle = Some(spawn_countdown(Arc::clone(&self.shared), deadline));
        tracing::info!(id = %id, "timer resumed");
        true
    }

    /// Active timers, soonest deadline first (creation order on ties).
    #[must_use]
    pub fn list(&self) -> Vec<TimerSnapshot> {
        let Ok(timers) = self.shared.timers.lock() else {
            return Vec::new();
        };

        let mut entries: Vec<(&Uuid, &TimerEntry)> = timers.iter().collect();
        entries.sort_by_key(|(_, entry)| (entry.remaining_now(), entry.seq));
        entries
            .into_iter()
            .map(|(id, entry)| snapshot(*id, entry))
            .collect()
    }

    /// Spoken summary of active timers.
    #[must_use]
    pub fn describe(&self) -> String {
        let timers = self.list();
        match timers.len() {
            0 => "You don't have any timers running.".to_string(),
            1 => {
                let t = &timers[0];
                format!(
                    "You have one timer with {} remaining.",
                    format_duration(t.remaining)
                )
            }
            n => {
                let parts: Vec<String> = timers
                    .iter()
                    .map(|t| format_duration(t.remaining))
                    .collect();
                format!("You have {n} timers: {} remaining.", parts.join(", and "))
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared
            .timers
            .lock()
            .map(|t| t.is_empty())
            .unwrap_or(true)
    }
}

fn spawn_countdown(shared: Arc<Shared>, deadline: Instant) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;

        // The first task to wake drains every due running timer, sorted
        // by deadline then creation order, so simultaneous deadlines
        // always alert in creation order. Tasks that wake later find
        // their entries already removed; cancelled or paused entries
        // never fire.
        let due = {
            let Ok(mut timers) = shared.timers.lock() else {
                return;
            };
            let now = Instant::now();
            let mut ready: Vec<(Instant, u64, Uuid)> = timers
                .iter()
                .filter(|(_, entry)| {
                    entry.state == TimerState::Running && entry.deadline <= now
                })
                .map(|(id, entry)| (entry.deadline, entry.seq, *id))
                .collect();
            ready.sort_unstable();

            ready
                .into_iter()
                .filter_map(|(_, _, id)| {
                    timers.remove(&id).map(|entry| TimerAlert {
                        id,
                        label: entry.label,
                        duration: entry.duration,
                    })
                })
                .collect::<Vec<_>>()
        };

        for alert in due {
            tracing::info!(id = %alert.id, "timer fired");
            if shared.alert_tx.send(alert).is_err() {
                tracing::warn!("alert channel closed, timer fired unheard");
            }
        }
    })
}

fn snapshot(id: Uuid, entry: &TimerEntry) -> TimerSnapshot {
    TimerSnapshot {
        id,
        label: entry.label.clone(),
        duration: entry.duration,
        remaining: entry.remaining_now(),
        state: entry.state,
    }
}

/// Render a duration the way it would be spoken ("10 minutes",
/// "1 hour 30 minutes", "45 seconds").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(plural(seconds, "second"));
    }

    parts.join(" ")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_spoken_durations() {
        assert_eq!(format_duration(Duration::from_secs(600)), "10 minutes");
        assert_eq!(
            format_duration(Duration::from_secs(5400)),
            "1 hour 30 minutes"
        );
        assert_eq!(format_duration(Duration::from_secs(45)), "45 seconds");
        assert_eq!(format_duration(Duration::from_secs(61)), "1 minute 1 second");
        assert_eq!(format_duration(Duration::ZERO), "0 seconds");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_at_deadline() {
        let (set, mut alerts) = TimerSet::new();
        set.start(Duration::from_secs(600), Some("pasta".to_string()));

        tokio::time::advance(Duration::from_secs(601)).await;
        tokio::task::yield_now().await;

        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.label.as_deref(), Some("pasta"));
        assert_eq!(alert.duration, Duration::from_secs(600));
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_never_increases_while_running() {
        let (set, _alerts) = TimerSet::new();
        let id = set.start(Duration::from_secs(600), None);

        let mut last = Duration::MAX;
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(30)).await;
            let remaining = set
                .list()
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.remaining)
                .unwrap();
            assert!(remaining <= last);
            last = remaining;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_preserves_remaining_exactly() {
        let (set, mut alerts) = TimerSet::new();
        let id = set.start(Duration::from_secs(600), None);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(set.pause(id));

        let paused_remaining = set.list()[0].remaining;
        assert_eq!(paused_remaining, Duration::from_secs(400));

        // Time passing does not erode a paused timer
        tokio::time::advance(Duration::from_secs(1000)).await;
        tokio::task::yield_now().await;
        assert_eq!(set.list()[0].remaining, paused_remaining);
        assert!(alerts.try_recv().is_err());

        assert!(set.resume(id));
        tokio::time::advance(Duration::from_secs(401)).await;
        tokio::task::yield_now().await;
        assert!(alerts.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_deadlines_fire_in_creation_order() {
        let (set, mut alerts) = TimerSet::new();
        set.start(Duration::from_secs(100), Some("first".to_string()));
        set.start(Duration::from_secs(100), Some("second".to_string()));

        tokio::time::advance(Duration::from_secs(101)).await;
        tokio::task::yield_now().await;

        let first = alerts.recv().await.unwrap();
        let second = alerts.recv().await.unwrap();
        assert_eq!(first.label.as_deref(), Some("first"));
        assert_eq!(second.label.as_deref(), Some("second"));
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (set, mut alerts) = TimerSet::new();
        let id = set.start(Duration::from_secs(10), None);
        assert!(set.cancel(id).is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_latest_picks_newest() {
        let (set, _alerts) = TimerSet::new();
        set.start(Duration::from_secs(100), Some("first".to_string()));
        set.start(Duration::from_secs(200), Some("second".to_string()));

        let cancelled = set.cancel_latest().unwrap();
        assert_eq!(cancelled.label.as_deref(), Some("second"));
        assert_eq!(set.list().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn list_sorted_by_deadline() {
        let (set, _alerts) = TimerSet::new();
        set.start(Duration::from_secs(300), Some("later".to_string()));
        set.start(Duration::from_secs(60), Some("sooner".to_string()));

        let timers = set.list();
        assert_eq!(timers[0].label.as_deref(), Some("sooner"));
        assert_eq!(timers[1].label.as_deref(), Some("later"));
    }

    #[tokio::test(start_paused = true)]
    async fn describe_counts_timers() {
        let (set, _alerts) = TimerSet::new();
        assert!(set.describe().contains("don't have any"));

        set.start(Duration::from_secs(600), None);
        assert!(set.describe().contains("10 minutes"));
    }
}
