//! Participation windows
//!
//! A window is a supervised task per trade strategy that polls for opt-ins,
//! executes each one, and posts heartbeats until its deadline or an explicit
//! cancel. Opt-ins are acknowledged only after they were handled, so a
//! restarted window sees unhandled ones again (at-least-once).

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::TradeEngine;
use crate::common::errors::{EngineError, ErrorKind, Result};
use crate::common::traits::{Notifier, ParticipantSource};
use crate::common::types::{OptIn, TradeStatus};
use crate::config::types::WindowConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTiming {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub duration: Duration,
}

impl From<&WindowConfig> for WindowTiming {
    fn from(config: &WindowConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_seconds),
            duration: Duration::from_secs(config.duration_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowClose {
    Deadline,
    Cancelled,
}

/// What a window did over its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSummary {
    pub trade_strategy_id: Uuid,
    pub executed: usize,
    /// Opt-ins rejected for good by validation or guard rails
    pub rejected: usize,
    /// Opt-ins from users already on the strategy
    pub duplicates: usize,
    pub heartbeats: usize,
    pub closed_by: WindowClose,
}

struct WindowHandle {
    cancel: watch::Sender<bool>,
    /// Taken while a caller is joining
    task: Option<JoinHandle<WindowSummary>>,
}

impl WindowHandle {
    fn is_running(&self) -> bool {
        self.task.as_ref().map_or(true, |t| !t.is_finished())
    }
}

/// Owns every open window; at most one per trade strategy
pub struct WindowSupervisor {
    engine: Arc<TradeEngine>,
    source: Arc<dyn ParticipantSource>,
    notifier: Arc<dyn Notifier>,
    timing: WindowTiming,
    windows: Mutex<HashMap<Uuid, WindowHandle>>,
}

impl WindowSupervisor {
    pub fn new(
        engine: Arc<TradeEngine>,
        source: Arc<dyn ParticipantSource>,
        notifier: Arc<dyn Notifier>,
        timing: WindowTiming,
    ) -> Self {
        Self {
            engine,
            source,
            notifier,
            timing,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Open a window for a strategy
    ///
    /// Windows that finished without being joined are dropped here, so their
    /// summaries are only available until the next `open`.
    ///
    /// # Arguments
    /// * `trade_strategy_id` - Strategy participants opt into
    /// * `channel_id` - Where heartbeats are posted
    pub async fn open(&self, trade_strategy_id: Uuid, channel_id: &str) -> Result<()> {
        let mut windows = self.windows.lock().await;
        windows.retain(|id, window| {
            let keep = window.is_running();
            if !keep {
                debug!(trade_strategy_id = %id, "dropping finished window");
            }
            keep
        });
        if windows.get(&trade_strategy_id).map_or(false, WindowHandle::is_running) {
            return Err(EngineError::already_exists("window.already_open")
                .with("trade_strategy_id", trade_strategy_id));
        }
        // Fails fast on unknown or closed strategies.
        let strategy = self.engine.read_trade_strategy_by_id(trade_strategy_id).await?;
        if strategy.status == TradeStatus::Closed {
            return Err(EngineError::precondition("window.trade_strategy_closed")
                .with("trade_strategy_id", trade_strategy_id));
        }

        let (cancel, cancelled) = watch::channel(false);
        let window = Window {
            trade_strategy_id,
            channel_id: channel_id.to_string(),
            symbol: strategy.signal.symbol(),
            engine: self.engine.clone(),
            source: self.source.clone(),
            notifier: self.notifier.clone(),
            timing: self.timing,
        };
        let task = tokio::spawn(window.run(cancelled));
        windows.insert(
            trade_strategy_id,
            WindowHandle {
                cancel,
                task: Some(task),
            },
        );

        info!(
            trade_strategy_id = %trade_strategy_id,
            duration_secs = self.timing.duration.as_secs(),
            "participation window opened"
        );
        Ok(())
    }

    pub async fn is_open(&self, trade_strategy_id: Uuid) -> bool {
        self.windows
            .lock()
            .await
            .get(&trade_strategy_id)
            .map_or(false, WindowHandle::is_running)
    }

    /// Ask a window to stop; it finishes the opt-in it is handling first
    pub async fn cancel(&self, trade_strategy_id: Uuid) -> Result<()> {
        let windows = self.windows.lock().await;
        let window = windows.get(&trade_strategy_id).ok_or_else(|| {
            EngineError::not_found("window.not_open").with("trade_strategy_id", trade_strategy_id)
        })?;
        // A send error means the task already exited.
        let _ = window.cancel.send(true);
        Ok(())
    }

    /// Wait for a window to close and remove it
    ///
    /// The window stays cancellable while a caller is joining it.
    pub async fn join(&self, trade_strategy_id: Uuid) -> Result<WindowSummary> {
        let task = {
            let mut windows = self.windows.lock().await;
            let window = windows.get_mut(&trade_strategy_id).ok_or_else(|| {
                EngineError::not_found("window.not_open").with("trade_strategy_id", trade_strategy_id)
            })?;
            window.task.take().ok_or_else(|| {
                EngineError::already_exists("window.already_joined")
                    .with("trade_strategy_id", trade_strategy_id)
            })?
        };

        let summary = task.await;
        self.windows.lock().await.remove(&trade_strategy_id);
        summary.map_err(|e| {
            EngineError::internal("window.task_failed")
                .with("trade_strategy_id", trade_strategy_id)
                .with("detail", e)
        })
    }
}

struct Window {
    trade_strategy_id: Uuid,
    channel_id: String,
    symbol: String,
    engine: Arc<TradeEngine>,
    source: Arc<dyn ParticipantSource>,
    notifier: Arc<dyn Notifier>,
    timing: WindowTiming,
}

enum OptInOutcome {
    Executed,
    Rejected,
    /// The user already joined; nothing to do
    Duplicate,
    /// Left unacknowledged for the next poll
    Retry,
}

impl Window {
    async fn run(self, mut cancelled: watch::Receiver<bool>) -> WindowSummary {
        let deadline = Instant::now() + self.timing.duration;
        let mut poll = interval(self.timing.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = interval(self.timing.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first heartbeat tick fires immediately; skip it.
        heartbeat.tick().await;

        let mut summary = WindowSummary {
            trade_strategy_id: self.trade_strategy_id,
            executed: 0,
            rejected: 0,
            duplicates: 0,
            heartbeats: 0,
            closed_by: WindowClose::Deadline,
        };

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    summary.closed_by = WindowClose::Deadline;
                    break;
                }
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        summary.closed_by = WindowClose::Cancelled;
                        break;
                    }
                }
                _ = poll.tick() => {
                    self.poll_once(&mut summary).await;
                }
                _ = heartbeat.tick() => {
                    summary.heartbeats += 1;
                    self.heartbeat(&summary).await;
                }
            }
        }

        info!(
            trade_strategy_id = %self.trade_strategy_id,
            executed = summary.executed,
            rejected = summary.rejected,
            duplicates = summary.duplicates,
            closed_by = ?summary.closed_by,
            "participation window closed"
        );
        let message = format!(
            "{} window closed: {} participants executed",
            self.symbol, summary.executed
        );
        if let Err(e) = self.notifier.notify_channel(&self.channel_id, &message).await {
            error!(channel_id = %self.channel_id, error = %e, "failed to notify channel");
        }
        summary
    }

    async fn poll_once(&self, summary: &mut WindowSummary) {
        let opt_ins = match self.source.poll_opt_ins(self.trade_strategy_id).await {
            Ok(opt_ins) => opt_ins,
            Err(e) => {
                warn!(trade_strategy_id = %self.trade_strategy_id, error = %e, "failed to poll opt-ins");
                return;
            }
        };
        if !opt_ins.is_empty() {
            debug!(trade_strategy_id = %self.trade_strategy_id, count = opt_ins.len(), "polled opt-ins");
        }

        for opt_in in opt_ins {
            match self.handle(&opt_in).await {
                OptInOutcome::Executed => summary.executed += 1,
                OptInOutcome::Rejected => summary.rejected += 1,
                OptInOutcome::Duplicate => summary.duplicates += 1,
                OptInOutcome::Retry => continue,
            }
            if let Err(e) = self.source.acknowledge(self.trade_strategy_id, &opt_in.user_id).await {
                warn!(user_id = %opt_in.user_id, error = %e, "failed to acknowledge opt-in");
            }
        }
    }

    async fn handle(&self, opt_in: &OptIn) -> OptInOutcome {
        let result = self
            .engine
            .execute_trade_strategy_for_participant(
                &opt_in.user_id,
                &opt_in.user_id,
                self.trade_strategy_id,
                opt_in.risk_percent,
                opt_in.venue,
            )
            .await;

        match result {
            Ok(_) => OptInOutcome::Executed,
            Err(e) if e.is(ErrorKind::AlreadyExists) => {
                debug!(user_id = %opt_in.user_id, "opt-in already handled");
                OptInOutcome::Duplicate
            }
            Err(e) if e.is(ErrorKind::Unavailable) => {
                warn!(user_id = %opt_in.user_id, error = %e, "transient failure, will retry opt-in");
                OptInOutcome::Retry
            }
            Err(e) => {
                warn!(user_id = %opt_in.user_id, error = %e, "opt-in rejected");
                let message = format!("Could not join {}: {}", self.symbol, e.user_message());
                if let Err(e) = self.notifier.notify_user(&opt_in.user_id, &message).await {
                    error!(user_id = %opt_in.user_id, error = %e, "failed to notify user");
                }
                OptInOutcome::Rejected
            }
        }
    }

    async fn heartbeat(&self, summary: &WindowSummary) {
        let message = format!(
            "{} window open: {} participants executed so far",
            self.symbol, summary.executed
        );
        if let Err(e) = self.notifier.notify_channel(&self.channel_id, &message).await {
            error!(channel_id = %self.channel_id, error = %e, "failed to notify channel");
        }
    }
}
