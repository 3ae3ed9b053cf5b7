//! Client-side notification store.
//!
//! Holds the visible notification list (newest first), the unread count and
//! the pagination cursor, and merges three sources of change:
//!
//! - REST pages (`fetch_initial`, `load_more`)
//! - live pushes from the real-time channel (`receive_push`)
//! - the user's own actions (`mark_read`, `mark_all_read`, `delete`)
//!
//! User actions are applied optimistically and then sent to the backend,
//! over the live channel while connected and over REST otherwise. Backend
//! failures never surface as errors to the caller: they are logged, published
//! as [`StoreEvent::ActionFailed`], and corrected either by restoring a
//! snapshot (mark-all-read) or by resynchronizing the unread count from the
//! server (mark-read, delete).
//!
//! The unread count is tracked separately from the list. It covers the whole
//! mailbox, not just the loaded pages, and it never goes below zero.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use gigboard_core::{
    defaults, ChannelCommand, Error, EventBus, EventEnvelope, LiveChannel, Notification,
    NotificationApi, StoreEvent,
};

use crate::sound::SoundEngine;

/// Observable state of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    /// Loaded notifications, newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    /// Last page fetched (1-based); 0 before the first fetch.
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    pub connected: bool,
}

impl NotificationState {
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }
}

#[derive(Debug)]
struct Inner {
    view: NotificationState,
    limit: u32,
    /// Bumped by `clear()` so late responses from a previous session are
    /// discarded instead of repopulating the store.
    generation: u64,
}

/// Notification list, unread count and pagination for one signed-in user.
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    sound: Arc<SoundEngine>,
    channel: RwLock<Option<Arc<dyn LiveChannel>>>,
    inner: RwLock<Inner>,
    events: EventBus,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>, sound: Arc<SoundEngine>) -> Self {
        Self {
            api,
            sound,
            channel: RwLock::new(None),
            inner: RwLock::new(Inner {
                view: NotificationState::default(),
                limit: defaults::NOTIFICATION_PAGE_LIMIT,
                generation: 0,
            }),
            events: EventBus::default(),
        }
    }

    /// Subscribe to store change events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn sound(&self) -> &Arc<SoundEngine> {
        &self.sound
    }

    /// Route mutations over `channel` while it reports connected.
    pub async fn attach_channel(&self, channel: Arc<dyn LiveChannel>) {
        *self.channel.write().await = Some(channel);
    }

    pub async fn detach_channel(&self) {
        *self.channel.write().await = None;
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> NotificationState {
        self.inner.read().await.view.clone()
    }

    pub async fn unread_count(&self) -> u64 {
        self.inner.read().await.view.unread_count
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.view.connected
    }

    /// Live channel, if one is attached and currently connected.
    async fn live_channel(&self) -> Option<Arc<dyn LiveChannel>> {
        self.channel
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_connected())
            .cloned()
    }

    // =========================================================================
    // Pages
    // =========================================================================

    /// Fetch page 1 and replace the list.
    pub async fn fetch_initial(&self, limit: u32) {
        let limit = limit.max(1);
        let generation = {
            let mut inner = self.inner.write().await;
            inner.limit = limit;
            inner.view.loading = true;
            inner.generation
        };

        let result = self.api.list(1, limit).await;

        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            debug!(op = "fetch_initial", "Discarding page for a cleared session");
            return;
        }
        inner.view.loading = false;
        match result {
            Ok(page) => {
                inner.view.has_more = page.has_more();
                inner.view.page = page.page.max(1);
                inner.view.notifications = page.notifications;
                let event = StoreEvent::ListUpdated {
                    len: inner.view.notifications.len(),
                    has_more: inner.view.has_more,
                };
                drop(inner);
                self.events.emit(event);
            }
            Err(e) => {
                drop(inner);
                warn!(subsystem = "store", op = "fetch_initial", error = %e, "Page fetch failed");
                self.report_failure("fetch_initial", &e, false);
            }
        }
    }

    /// Append the next page. No-op while a fetch is running or when the last
    /// page has been reached.
    pub async fn load_more(&self) {
        let (next, limit, generation) = {
            let mut inner = self.inner.write().await;
            if inner.view.loading || !inner.view.has_more {
                debug!(
                    op = "load_more",
                    loading = inner.view.loading,
                    has_more = inner.view.has_more,
                    "Nothing to load"
                );
                return;
            }
            inner.view.loading = true;
            (inner.view.page + 1, inner.limit, inner.generation)
        };

        let result = self.api.list(next, limit).await;

        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return;
        }
        inner.view.loading = false;
        match result {
            Ok(page) => {
                inner.view.has_more = page.has_more();
                inner.view.page = next;
                // Pushes shift server-side pages, so the next page can repeat
                // items already shown.
                for n in page.notifications {
                    if inner.view.get(&n.id).is_none() {
                        inner.view.notifications.push(n);
                    }
                }
                let event = StoreEvent::ListUpdated {
                    len: inner.view.notifications.len(),
                    has_more: inner.view.has_more,
                };
                drop(inner);
                self.events.emit(event);
            }
            Err(e) => {
                drop(inner);
                warn!(subsystem = "store", op = "load_more", error = %e, "Page fetch failed");
                self.report_failure("load_more", &e, false);
            }
        }
    }

    // =========================================================================
    // Live updates
    // =========================================================================

    /// Prepend a pushed notification and bump the unread count by one.
    ///
    /// Two pushes are not counted: a notification whose id is already in the
    /// list is dropped entirely (redelivery after a reconnect), and one that
    /// arrives already read is prepended without touching the count.
    ///
    /// The chime plays if sound is enabled at the moment the push is handled.
    pub async fn receive_push(&self, notification: Notification) {
        let count = {
            let mut inner = self.inner.write().await;
            if inner.view.get(&notification.id).is_some() {
                debug!(notification_id = %notification.id, "Duplicate push ignored");
                return;
            }
            if !notification.is_read {
                inner.view.unread_count = inner.view.unread_count.saturating_add(1);
            }
            inner.view.notifications.insert(0, notification.clone());
            inner.view.unread_count
        };

        let chime = self.sound.chime_if_enabled();
        info!(
            notification_id = %notification.id,
            kind = notification.kind.label(),
            unread_count = count,
            chime,
            "Notification received"
        );
        self.events.emit(StoreEvent::NotificationReceived {
            notification_id: notification.id,
            kind: notification.kind,
            title: notification.title,
            chime,
        });
        self.events.emit(StoreEvent::UnreadCountChanged { count });
    }

    /// Replace the unread count with an authoritative value.
    pub async fn apply_unread_count(&self, count: u64) {
        let changed = {
            let mut inner = self.inner.write().await;
            let changed = inner.view.unread_count != count;
            inner.view.unread_count = count;
            changed
        };
        if changed {
            debug!(unread_count = count, "Unread count updated");
            self.events.emit(StoreEvent::UnreadCountChanged { count });
        }
    }

    /// Ask the server for the unread count and apply it.
    ///
    /// Uses the live channel when connected, falling back to REST.
    pub async fn sync_unread_count(&self) {
        let generation = self.inner.read().await.generation;

        let mut result = None;
        if let Some(channel) = self.live_channel().await {
            match channel.request_unread_count().await {
                Ok(count) => result = Some(Ok(count)),
                Err(e) => debug!(error = %e, "Channel unread count failed, using REST"),
            }
        }
        let result = match result {
            Some(result) => result,
            None => self.api.unread_count().await,
        };

        match result {
            Ok(count) => {
                if self.inner.read().await.generation == generation {
                    self.apply_unread_count(count).await;
                }
            }
            Err(e) => warn!(op = "sync_unread_count", error = %e, "Unread count sync failed"),
        }
    }

    /// Record the live channel's connection state. Loaded notifications stay
    /// visible while disconnected.
    pub async fn set_connected(&self, connected: bool) {
        let changed = {
            let mut inner = self.inner.write().await;
            let changed = inner.view.connected != connected;
            inner.view.connected = connected;
            changed
        };
        if changed {
            self.events.emit(StoreEvent::ConnectionChanged { connected });
        }
    }

    /// Drop every notification and reset counters (logout).
    pub async fn clear(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.view = NotificationState::default();
            inner.generation += 1;
        }
        info!("Notification state cleared");
        self.events.emit(StoreEvent::Cleared);
    }

    // =========================================================================
    // User actions
    // =========================================================================

    /// Mark one notification read.
    ///
    /// Optimistic and never rolled back; on failure the unread count is
    /// resynchronized from the server.
    pub async fn mark_read(&self, id: &str) {
        let count = {
            let mut inner = self.inner.write().await;
            let now = Utc::now();
            let mut flipped = false;
            if let Some(n) = inner.view.notifications.iter_mut().find(|n| n.id == id) {
                if !n.mark_read(now) {
                    debug!(notification_id = %id, "Already read");
                    return;
                }
                flipped = true;
            }
            if flipped {
                inner.view.unread_count = inner.view.unread_count.saturating_sub(1);
            }
            flipped.then_some(inner.view.unread_count)
        };
        self.events.emit(StoreEvent::MarkedRead {
            notification_id: Some(id.to_string()),
        });
        if let Some(count) = count {
            self.events.emit(StoreEvent::UnreadCountChanged { count });
        }

        let result = match self.live_channel().await {
            Some(channel) => {
                channel
                    .emit(ChannelCommand::MarkRead {
                        notification_id: id.to_string(),
                    })
                    .await
            }
            None => self.api.mark_read(id).await,
        };

        if let Err(e) = result {
            warn!(
                subsystem = "store",
                op = "mark_read",
                notification_id = %id,
                error = %e,
                "Mark read failed"
            );
            self.report_failure("mark_read", &e, false);
            self.sync_unread_count().await;
        }
    }

    /// Mark every notification read, restoring the previous list and count if
    /// the backend rejects it.
    pub async fn mark_all_read(&self) {
        let (snapshot, generation) = {
            let mut inner = self.inner.write().await;
            let snapshot = (inner.view.notifications.clone(), inner.view.unread_count);
            let now = Utc::now();
            for n in inner.view.notifications.iter_mut() {
                n.mark_read(now);
            }
            inner.view.unread_count = 0;
            (snapshot, inner.generation)
        };
        self.events.emit(StoreEvent::MarkedRead {
            notification_id: None,
        });
        self.events.emit(StoreEvent::UnreadCountChanged { count: 0 });

        let result = match self.live_channel().await {
            Some(channel) => channel.emit(ChannelCommand::MarkAllRead).await,
            None => self.api.mark_all_read().await,
        };

        if let Err(e) = result {
            let (notifications, count) = snapshot;
            {
                let mut inner = self.inner.write().await;
                if inner.generation != generation {
                    return;
                }
                inner.view.notifications = notifications;
                inner.view.unread_count = count;
            }
            warn!(
                subsystem = "store",
                op = "mark_all_read",
                error = %e,
                rolled_back = true,
                "Mark all read failed"
            );
            self.report_failure("mark_all_read", &e, true);
            self.events.emit(StoreEvent::UnreadCountChanged { count });
        }
    }

    /// Remove a notification from view.
    ///
    /// Not restored on failure; the unread count is resynchronized instead.
    pub async fn delete(&self, id: &str) {
        let count = {
            let mut inner = self.inner.write().await;
            let position = inner.view.notifications.iter().position(|n| n.id == id);
            match position {
                Some(i) => {
                    let removed = inner.view.notifications.remove(i);
                    if !removed.is_read {
                        inner.view.unread_count = inner.view.unread_count.saturating_sub(1);
                        Some(inner.view.unread_count)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        self.events.emit(StoreEvent::Deleted {
            notification_id: id.to_string(),
        });
        if let Some(count) = count {
            self.events.emit(StoreEvent::UnreadCountChanged { count });
        }

        if let Err(e) = self.api.delete(id).await {
            warn!(
                subsystem = "store",
                op = "delete",
                notification_id = %id,
                error = %e,
                "Delete failed"
            );
            self.report_failure("delete", &e, false);
            self.sync_unread_count().await;
        }
    }

    fn report_failure(&self, action: &str, error: &Error, rolled_back: bool) {
        debug!(op = action, rolled_back, "Publishing action failure");
        self.events.emit(StoreEvent::ActionFailed {
            action: action.to_string(),
            error: error.user_message(),
            rolled_back,
        });
    }
}
