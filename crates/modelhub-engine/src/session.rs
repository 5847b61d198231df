//! Session controller
//!
//! Tracks which live session observes which model and fans out
//! notifications. Each session owns one bounded queue; delivery never
//! waits on a slow consumer. A full queue either drops the notification
//! for that session or disconnects it, per the overflow policy.
//!
//! Subscription changes take the write lock and delivery holds the read
//! lock across the whole fan-out, so an unsubscribe either completes before
//! a fan-out starts or after it ends.

use crate::config::OverflowPolicy;
use crate::notification::Notification;
use modelhub_core::{ExError, ExErrorKind};
use modelhub_core_types::SessionId;
use modelhub_store::{Result, SubscriptionIndex};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Debug)]
struct SessionEntry {
    tx: mpsc::Sender<Notification>,
    models: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
    subscriptions: HashMap<String, BTreeSet<SessionId>>,
}

impl Registry {
    fn remove_session(&mut self, session_id: &SessionId) -> bool {
        let Some(entry) = self.sessions.remove(session_id) else {
            return false;
        };
        for model_id in entry.models {
            if let Some(set) = self.subscriptions.get_mut(&model_id) {
                set.remove(session_id);
                if set.is_empty() {
                    self.subscriptions.remove(&model_id);
                }
            }
        }
        true
    }
}

/// Counts from one `notify` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
    pub disconnected: usize,
}

#[derive(Debug)]
pub struct SessionController {
    registry: RwLock<Registry>,
    overflow: OverflowPolicy,
}

impl SessionController {
    pub fn new(overflow: OverflowPolicy) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            overflow,
        }
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Open a session with a queue of `capacity` notifications
    pub fn connect(&self, capacity: usize) -> (SessionId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session_id = SessionId::new();
        self.registry.write().sessions.insert(
            session_id.clone(),
            SessionEntry {
                tx,
                models: BTreeSet::new(),
            },
        );
        tracing::debug!(session_id = session_id.as_str(), "session connected");
        (session_id, rx)
    }

    pub fn is_connected(&self, session_id: &SessionId) -> bool {
        self.registry.read().sessions.contains_key(session_id)
    }

    /// Subscribe a session to a model; subscribing twice is a no-op
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session is not connected.
    pub fn subscribe(&self, session_id: &SessionId, model_id: &str) -> Result<()> {
        let mut registry = self.registry.write();
        let Some(entry) = registry.sessions.get_mut(session_id) else {
            return Err(ExError::new(ExErrorKind::SessionClosed)
                .with_op("subscribe")
                .with_session_id(session_id.clone())
                .with_model_id(model_id)
                .with_message("session is not connected"));
        };
        if entry.models.insert(model_id.to_string()) {
            registry
                .subscriptions
                .entry(model_id.to_string())
                .or_default()
                .insert(session_id.clone());
            tracing::debug!(session_id = session_id.as_str(), model_id, "subscribed");
        }
        Ok(())
    }

    /// Remove a subscription; removing an absent one is a no-op
    pub fn unsubscribe(&self, session_id: &SessionId, model_id: &str) {
        let mut registry = self.registry.write();
        let removed = registry
            .sessions
            .get_mut(session_id)
            .is_some_and(|entry| entry.models.remove(model_id));
        if !removed {
            return;
        }
        if let Some(set) = registry.subscriptions.get_mut(model_id) {
            set.remove(session_id);
            if set.is_empty() {
                registry.subscriptions.remove(model_id);
            }
        }
        tracing::debug!(session_id = session_id.as_str(), model_id, "unsubscribed");
    }

    /// Drop a session and all of its subscriptions
    pub fn on_session_closed(&self, session_id: &SessionId) {
        if self.registry.write().remove_session(session_id) {
            tracing::debug!(session_id = session_id.as_str(), "session closed");
        }
    }

    /// Sessions subscribed to a model, in id order
    pub fn subscribers(&self, model_id: &str) -> Vec<SessionId> {
        self.registry
            .read()
            .subscriptions
            .get(model_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Models a session subscribes to
    pub fn subscriptions_of(&self, session_id: &SessionId) -> Vec<String> {
        self.registry
            .read()
            .sessions
            .get(session_id)
            .map(|entry| entry.models.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver a notification to every subscriber of its model
    ///
    /// Never blocks. A closed or overflowing session never affects delivery
    /// to the others.
    pub fn notify(&self, notification: Notification) -> DeliveryReport {
        let model_id = notification.model_id().to_string();
        let mut report = DeliveryReport::default();
        let mut lagging = Vec::new();

        {
            let registry = self.registry.read();
            let Some(subscribers) = registry.subscriptions.get(&model_id) else {
                return report;
            };
            for session_id in subscribers {
                let Some(entry) = registry.sessions.get(session_id) else {
                    continue;
                };
                match entry.tx.try_send(notification.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => match self.overflow {
                        OverflowPolicy::Drop => {
                            report.dropped += 1;
                            tracing::warn!(
                                session_id = session_id.as_str(),
                                model_id = model_id.as_str(),
                                "subscriber queue full, notification dropped"
                            );
                        }
                        OverflowPolicy::Disconnect => lagging.push(session_id.clone()),
                    },
                    Err(TrySendError::Closed(_)) => lagging.push(session_id.clone()),
                }
            }
        }

        if !lagging.is_empty() {
            let mut registry = self.registry.write();
            for session_id in &lagging {
                if registry.remove_session(session_id) {
                    report.disconnected += 1;
                    tracing::warn!(
                        session_id = session_id.as_str(),
                        model_id = model_id.as_str(),
                        "session disconnected"
                    );
                }
            }
        }

        tracing::debug!(
            model_id = model_id.as_str(),
            delivered = report.delivered,
            dropped = report.dropped,
            disconnected = report.disconnected,
            "notify"
        );
        report
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(OverflowPolicy::default())
    }
}

impl SubscriptionIndex for SessionController {
    fn subscriber_count(&self, model_id: &str) -> usize {
        self.registry
            .read()
            .subscriptions
            .get(model_id)
            .map_or(0, BTreeSet::len)
    }
}
