use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info};

use crate::engine::Registry;
use crate::model::*;
use crate::notify::NotifyHub;

/// One pending expiry: revert `token` on `resource_id` unless it has been
/// confirmed, released or superseded by then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldTimer {
    pub resource_id: ResourceId,
    pub holder: HolderId,
    pub token: HoldToken,
    pub fire_at: Ms,
}

type TimerKey = (ResourceId, HoldToken);

#[derive(Debug)]
enum TimerCommand {
    Schedule { timer: HoldTimer, after: Duration },
    Cancel { key: TimerKey },
}

/// Handle to the background task that expires holds.
///
/// Sending never blocks, so callers may schedule or cancel while holding a
/// resource lock. The task exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct HoldReaper {
    tx: mpsc::UnboundedSender<TimerCommand>,
}

impl HoldReaper {
    /// Spawn the reaper task. Must be called inside a tokio runtime.
    pub fn spawn(registry: Arc<Registry>, notify: Arc<NotifyHub>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_reaper(rx, registry, notify));
        Self { tx }
    }

    pub fn schedule(&self, timer: HoldTimer, after: Duration) {
        let _ = self.tx.send(TimerCommand::Schedule { timer, after });
    }

    /// Best effort: the token check in `expire_hold` is what makes a
    /// timer that slips through harmless.
    pub fn cancel(&self, resource_id: &str, token: HoldToken) {
        let _ = self.tx.send(TimerCommand::Cancel {
            key: (resource_id.to_string(), token),
        });
    }
}

/// Owns every pending timer. Firing spawns the release so a contended
/// resource lock never delays other timers.
async fn run_reaper(
    mut rx: mpsc::UnboundedReceiver<TimerCommand>,
    registry: Arc<Registry>,
    notify: Arc<NotifyHub>,
) {
    let mut queue: DelayQueue<HoldTimer> = DelayQueue::new();
    let mut keys: HashMap<TimerKey, delay_queue::Key> = HashMap::new();

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(TimerCommand::Schedule { timer, after }) => {
                        let key = (timer.resource_id.clone(), timer.token);
                        let qkey = queue.insert(timer, after);
                        if let Some(old) = keys.insert(key, qkey) {
                            queue.remove(&old);
                        }
                    }
                    Some(TimerCommand::Cancel { key }) => {
                        if let Some(qkey) = keys.remove(&key) {
                            queue.remove(&qkey);
                            debug!("cancelled hold timer {}#{}", key.0, key.1);
                        }
                    }
                    None => break,
                }
            }
            Some(expired) = queue.next(), if !queue.is_empty() => {
                let timer = expired.into_inner();
                keys.remove(&(timer.resource_id.clone(), timer.token));
                let registry = registry.clone();
                let notify = notify.clone();
                tokio::spawn(async move {
                    expire_hold(&registry, &notify, &timer).await;
                });
            }
        }
        metrics::gauge!(crate::observability::HOLD_TIMERS_PENDING).set(queue.len() as f64);
    }
}

/// Revert the timer's hold if it is still the current one. Returns true
/// when something was released.
pub async fn expire_hold(registry: &Registry, notify: &NotifyHub, timer: &HoldTimer) -> bool {
    match registry
        .release_hold(&timer.resource_id, &timer.holder, timer.token)
        .await
    {
        Ok(true) => {
            info!("reaped expired hold {}#{}", timer.resource_id, timer.token);
            metrics::counter!(crate::observability::HOLDS_RELEASED_TOTAL, "reason" => "expired")
                .increment(1);
            notify.send(Event::HoldReleased {
                resource_id: timer.resource_id.clone(),
                token: timer.token,
                reason: ReleaseReason::Expired,
            });
            true
        }
        Ok(false) => {
            // Confirmed, released or superseded in the meantime
            debug!("stale hold timer {}#{}", timer.resource_id, timer.token);
            false
        }
        Err(e) => {
            debug!("reaper skip {}#{}: {e}", timer.resource_id, timer.token);
            false
        }
    }
}
