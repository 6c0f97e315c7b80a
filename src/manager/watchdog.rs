use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::RecordingManager;
use crate::voice::PresenceChange;

/// Ends unattended sessions
///
/// Each presence change in the recorded guild schedules a re-check after
/// the grace period. The re-check queries live occupancy instead of
/// trusting the event, and only stops the session that was active when
/// the event arrived.
pub struct OccupancyWatchdog {
    manager: Arc<RecordingManager>,
    grace_period: Duration,
    stop_timeout: Duration,
}

impl OccupancyWatchdog {
    pub fn new(
        manager: Arc<RecordingManager>,
        grace_period: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            grace_period,
            stop_timeout,
        }
    }

    /// Consume presence notifications until the stream closes
    pub fn spawn(self, mut changes: broadcast::Receiver<PresenceChange>) -> JoinHandle<()> {
        let watchdog = Arc::new(self);

        tokio::spawn(async move {
            info!("Occupancy watchdog started (grace period {:?})", watchdog.grace_period);

            loop {
                match changes.recv().await {
                    Ok(change) => {
                        watchdog.on_presence_change(&change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events may include the last occupant leaving
                        warn!("Presence stream lagged by {} events, scheduling re-check", skipped);
                        if let Some(guild_id) = watchdog.manager.active_guild_id() {
                            watchdog.on_presence_change(&PresenceChange {
                                guild_id,
                                user_id: 0,
                                channel_id: None,
                            });
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            info!("Occupancy watchdog stopped");
        })
    }

    /// Schedule a debounced occupancy check if `change` concerns the active session
    pub fn on_presence_change(self: &Arc<Self>, change: &PresenceChange) -> Option<JoinHandle<()>> {
        let active = self.manager.active_session()?;
        if change.guild_id != active.meta.guild_id {
            return None;
        }

        debug!(
            "Presence change for user {} in guild {}, re-checking in {:?}",
            change.user_id, change.guild_id, self.grace_period
        );

        let watchdog = Arc::clone(self);
        let session_id = active.meta.session_id;

        Some(tokio::spawn(async move {
            tokio::time::sleep(watchdog.grace_period).await;

            let still_current = watchdog
                .manager
                .active_session()
                .is_some_and(|a| a.meta.session_id == session_id);
            if !still_current {
                return;
            }

            if watchdog.manager.has_active_members().await {
                return;
            }

            info!("Channel is empty, stopping recording.");
            watchdog
                .manager
                .stop_session(session_id, "channel empty", watchdog.stop_timeout)
                .await;
        }))
    }
}
