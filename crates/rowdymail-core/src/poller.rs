//! Periodic inbox refresh
//!
//! A background task calls a refresh function on a fixed period and
//! publishes each result on a `watch` channel. The timer is paused while the
//! consuming surface is hidden or the network is offline, fires immediately
//! on resume, and is cancelled on [`InboxPoller::shutdown`] or drop.
//!
//! A refresh already in flight is not cancelled by a pause; only the next
//! tick is held back.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::mailsac::{MailsacClient, MessageSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Visibility {
    visible: bool,
    online: bool,
}

impl Visibility {
    fn is_active(self) -> bool {
        self.visible && self.online
    }
}

pub struct InboxPoller<T> {
    state: watch::Sender<Visibility>,
    updates: watch::Receiver<Option<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> InboxPoller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start polling `refresh` every `period`, visible and online
    ///
    /// The first refresh runs immediately. Must be called within a tokio
    /// runtime.
    pub fn spawn<F, Fut>(period: Duration, mut refresh: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send,
    {
        let (state_tx, mut state_rx) = watch::channel(Visibility {
            visible: true,
            online: true,
        });
        let (update_tx, update_rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let active = state_rx.borrow_and_update().is_active();

                if !active {
                    debug!("Inbox polling paused");
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                    if state_rx.borrow().is_active() {
                        debug!("Inbox polling resumed");
                        ticker.reset_immediately();
                    }
                    continue;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        let value = refresh().await;
                        update_tx.send_replace(Some(value));
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("Inbox poller stopped");
        });

        Self {
            state: state_tx,
            updates: update_rx,
            task: Some(task),
        }
    }

    /// Pause while hidden, resume with an immediate refresh when shown
    pub fn set_visible(&self, visible: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.visible != visible;
            s.visible = visible;
            changed
        });
    }

    /// Pause while offline, resume with an immediate refresh when back
    pub fn set_online(&self, online: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.online != online;
            s.online = online;
            changed
        });
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active()
    }

    /// Receiver of every published refresh result
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.updates.clone()
    }

    /// Most recent refresh result, if any
    pub fn latest(&self) -> Option<T> {
        self.updates.borrow().clone()
    }

    /// Stop the timer and wait for the task to finish
    ///
    /// An in-flight refresh is aborted.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Inbox poller task failed");
                }
            }
        }
    }
}

impl InboxPoller<Vec<MessageSummary>> {
    /// Poll one provider inbox; listing failures show as an empty inbox
    pub fn for_inbox(client: MailsacClient, address: String, period: Duration) -> Self {
        Self::spawn(period, move || {
            let client = client.clone();
            let address = address.clone();
            async move {
                client.list_messages(&address).await.unwrap_or_else(|e| {
                    warn!(address = %address, error = %e, "Inbox refresh failed");
                    Vec::new()
                })
            }
        })
    }
}

impl<T> Drop for InboxPoller<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_poller(period: Duration) -> (Arc<AtomicU32>, InboxPoller<u32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let poller = InboxPoller::spawn(period, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { n }
        });
        (calls, poller)
    }

    /// Let the poller task run without advancing the clock
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_on_period() {
        let (calls, poller) = counting_poller(Duration::from_secs(5));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(poller.latest(), Some(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(poller.latest(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_pauses_and_resume_fires_immediately() {
        let (calls, poller) = counting_poller(Duration::from_secs(5));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        poller.set_visible(false);
        settle().await;
        assert!(!poller.is_active());

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        poller.set_visible(true);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_pauses_until_online() {
        let (calls, poller) = counting_poller(Duration::from_secs(5));
        settle().await;

        poller.set_online(false);
        poller.set_visible(false);
        poller.set_online(true);
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        poller.set_visible(true);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_updates() {
        let (_calls, poller) = counting_poller(Duration::from_secs(1));
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(1));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_refreshing() {
        let (calls, poller) = counting_poller(Duration::from_secs(1));
        settle().await;
        poller.shutdown().await;

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let (calls, poller) = counting_poller(Duration::from_secs(1));
        settle().await;
        drop(poller);

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }
}
