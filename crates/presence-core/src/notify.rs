//! Process-local publish/subscribe for live presence views.
//!
//! Two channels of unit ticks, both on `tokio::sync::broadcast`:
//! - availability: one sender; any session start/end (and any decay the
//!   sweep persists) publishes a tick so dashboards re-fetch.
//! - pings: one sender per target user id; a sent ping reaches only that
//!   user's receivers.
//!
//! A subscription is a `broadcast::Receiver<()>`; dropping it unsubscribes.
//! A receiver that falls more than [`CHANNEL_CAPACITY`] ticks behind sees
//! `Lagged` and skips ahead. Publishing never fails: with no receivers the
//! tick is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

/// Ticks buffered per channel before slow receivers start lagging.
pub const CHANNEL_CAPACITY: usize = 64;

struct Channels {
    /// `None` after shutdown.
    availability: Option<broadcast::Sender<()>>,
    pings: HashMap<String, broadcast::Sender<()>>,
    closed: bool,
}

/// The availability and ping channels, constructed once per process and
/// shared by handle.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Mutex<Channels>>,
}

/// A receiver whose sender is already gone: yields `Closed` immediately.
fn closed_receiver() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);
    drop(tx);
    rx
}

impl Notifier {
    pub fn new() -> Self {
        let (availability, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Channels {
                availability: Some(availability),
                pings: HashMap::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        // No code panics while holding the lock; a poisoned map is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe_availability(&self) -> broadcast::Receiver<()> {
        match &self.lock().availability {
            Some(tx) => tx.subscribe(),
            None => closed_receiver(),
        }
    }

    /// Returns how many receivers the tick reached.
    pub fn notify_availability_change(&self) -> usize {
        match &self.lock().availability {
            Some(tx) => tx.send(()).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscribe_pings(&self, user_id: impl Into<String>) -> broadcast::Receiver<()> {
        let mut channels = self.lock();
        if channels.closed {
            return closed_receiver();
        }
        channels.pings.retain(|_, tx| tx.receiver_count() > 0);
        channels
            .pings
            .entry(user_id.into())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many of the target's receivers the tick reached.
    pub fn notify_ping_sent(&self, target_user_id: &str) -> usize {
        let mut channels = self.lock();
        let Some(tx) = channels.pings.get(target_user_id) else {
            return 0;
        };
        match tx.send(()) {
            Ok(n) => n,
            Err(_) => {
                channels.pings.remove(target_user_id);
                0
            }
        }
    }

    pub fn availability_listeners(&self) -> usize {
        self.lock()
            .availability
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn ping_listeners(&self, user_id: &str) -> usize {
        self.lock()
            .pings
            .get(user_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Drop every sender. Open receivers drain what is buffered and then see
    /// `Closed`; later subscriptions are closed from the start.
    pub fn shutdown(&self) {
        let (availability, pings) = {
            let mut channels = self.lock();
            channels.closed = true;
            (
                channels.availability.take(),
                std::mem::take(&mut channels.pings),
            )
        };
        drop(availability);
        drop(pings);
        tracing::debug!("notifier shut down");
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn drain(rx: &mut broadcast::Receiver<()>) -> usize {
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[test]
    fn availability_reaches_every_subscriber() {
        let n = Notifier::new();
        let mut a = n.subscribe_availability();
        let mut b = n.subscribe_availability();

        assert_eq!(n.notify_availability_change(), 2);
        assert_eq!(drain(&mut a), 1);
        assert_eq!(drain(&mut b), 1);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let n = Notifier::new();
        assert_eq!(n.notify_availability_change(), 0);
        assert_eq!(n.notify_ping_sent("nobody"), 0);
    }

    #[test]
    fn ping_reaches_only_target() {
        let n = Notifier::new();
        let mut ana = n.subscribe_pings("ana");
        let mut bo = n.subscribe_pings("bo");

        assert_eq!(n.notify_ping_sent("ana"), 1);
        assert_eq!(drain(&mut ana), 1);
        assert_eq!(drain(&mut bo), 0);
    }

    #[test]
    fn dropping_receiver_unsubscribes() {
        let n = Notifier::new();
        let ana = n.subscribe_pings("ana");
        assert_eq!(n.ping_listeners("ana"), 1);
        drop(ana);
        assert_eq!(n.ping_listeners("ana"), 0);

        {
            let _rx = n.subscribe_availability();
            assert_eq!(n.availability_listeners(), 1);
        }
        assert_eq!(n.availability_listeners(), 0);
    }

    #[test]
    fn abandoned_ping_channels_are_pruned() {
        let n = Notifier::new();
        drop(n.subscribe_pings("ana"));
        drop(n.subscribe_pings("bo"));

        assert_eq!(n.notify_ping_sent("ana"), 0);
        assert!(!n.lock().pings.contains_key("ana"));

        let _cy = n.subscribe_pings("cy");
        let channels = n.lock();
        assert!(!channels.pings.contains_key("bo"));
        assert!(channels.pings.contains_key("cy"));
    }

    #[test]
    fn slow_receiver_lags_without_affecting_others() {
        let n = Notifier::new();
        let mut slow = n.subscribe_availability();
        let mut fast = n.subscribe_availability();

        for _ in 0..CHANNEL_CAPACITY {
            n.notify_availability_change();
            assert_eq!(fast.try_recv(), Ok(()));
        }
        n.notify_availability_change();
        assert_eq!(fast.try_recv(), Ok(()));

        assert!(matches!(slow.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(drain(&mut slow), CHANNEL_CAPACITY);
    }

    #[test]
    fn shutdown_closes_open_and_later_receivers() {
        let n = Notifier::new();
        let mut ana = n.subscribe_pings("ana");
        let mut board = n.subscribe_availability();
        n.notify_ping_sent("ana");
        n.shutdown();

        // Buffered ticks still drain, then the channel reports closed.
        assert_eq!(ana.try_recv(), Ok(()));
        assert_eq!(ana.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(board.try_recv(), Err(TryRecvError::Closed));

        let mut late = n.subscribe_pings("ana");
        assert_eq!(late.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(n.notify_ping_sent("ana"), 0);
        assert_eq!(n.notify_availability_change(), 0);
    }

    #[test]
    fn instances_are_isolated() {
        let a = Notifier::new();
        let b = Notifier::new();
        let mut rx = a.subscribe_availability();
        assert_eq!(b.notify_availability_change(), 0);
        assert_eq!(drain(&mut rx), 0);
    }
}
