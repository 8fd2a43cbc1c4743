//! Fans notifications out to every configured channel.
//!
//! Channels are attempted concurrently. Each attempt is bounded by a
//! timeout and a failed channel gets exactly one retry after a backoff.
//! A channel that is still failing is reported in its [`DispatchResult`];
//! it never blocks or fails the other channels.

use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::traits::{DispatchError, DispatchResult, Notification, Notifier, NotifyError};

const MAX_ATTEMPTS: u32 = 2;

/// Dispatches notifications to multiple channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
    timeout: Duration,
    retry_backoff: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the default 10s timeout and 2s backoff.
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            channels,
            timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(2),
        }
    }

    /// Create a dispatcher with no channels. Dispatch is a no-op.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_timeouts(mut self, timeout: Duration, retry_backoff: Duration) -> Self {
        self.timeout = timeout;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| c.channel_name().to_string())
            .collect()
    }

    /// Deliver a notification to all channels.
    ///
    /// Returns one result per channel, in channel order.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!(subject = %notification.subject, "No notification channels configured");
            return Vec::new();
        }

        join_all(
            self.channels
                .iter()
                .map(|channel| self.deliver(channel.as_ref(), notification)),
        )
        .await
    }

    async fn deliver(&self, channel: &dyn Notifier, notification: &Notification) -> DispatchResult {
        let target = notification.target().unwrap_or_default().to_string();
        let start = Instant::now();
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < MAX_ATTEMPTS {
            if attempts > 0 {
                tokio::time::sleep(self.retry_backoff).await;
            }
            attempts += 1;

            match self.attempt(channel, notification).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        target_name = %target,
                        channel = channel.channel_name(),
                        attempt = attempts,
                        error = %e,
                        "Notification attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let error = last_error.map(|e| DispatchError {
            channel: channel.channel_name().to_string(),
            attempts,
            reason: e.to_string(),
        });

        match &error {
            None => tracing::info!(
                target_name = %target,
                channel = channel.channel_name(),
                attempts,
                duration_ms,
                "Notification delivered"
            ),
            Some(e) => tracing::warn!(target_name = %target, error = %e, duration_ms, "Notification delivery failed"),
        }

        DispatchResult {
            channel: channel.channel_name().to_string(),
            target,
            attempts,
            duration_ms,
            error,
        }
    }

    async fn attempt(&self, channel: &dyn Notifier, notification: &Notification) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.timeout, channel.send(notification)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        }
    }

    /// Send a test notification through the channel at `channel_index`.
    pub async fn test_channel(&self, channel_index: usize) -> Result<(), NotifyError> {
        let channel = self.channels.get(channel_index).ok_or_else(|| {
            NotifyError::Config(format!("Channel index {channel_index} out of range"))
        })?;
        channel.test().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockNotifier {
        name: String,
        send_count: Arc<AtomicUsize>,
        /// Number of leading calls that fail.
        failures: usize,
        delay: Duration,
    }

    impl MockNotifier {
        fn new(name: &str, send_count: Arc<AtomicUsize>) -> Self {
            Self {
                name: name.to_string(),
                send_count,
                failures: 0,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            let call = self.send_count.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.failures {
                Err(NotifyError::Config("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn notification() -> Notification {
        Notification {
            subject: "test".to_string(),
            body: "test body".to_string(),
            metadata: HashMap::from([("target".to_string(), "Worker".to_string())]),
        }
    }

    fn fast(channels: Vec<Box<dyn Notifier>>) -> Dispatcher {
        Dispatcher::new(channels).with_timeouts(Duration::from_millis(200), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn dispatch_to_all_channels() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let dispatcher = fast(vec![
            Box::new(MockNotifier::new("a", count_a.clone())),
            Box::new(MockNotifier::new("b", count_b.clone())),
        ]);

        let results = dispatcher.dispatch(&notification()).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success() && r.attempts == 1));
        assert_eq!(results[0].target, "Worker");
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut flaky = MockNotifier::new("flaky", count.clone());
        flaky.failures = 1;

        let results = fast(vec![Box::new(flaky)]).dispatch(&notification()).await;
        assert!(results[0].success());
        assert_eq!(results[0].attempts, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_gives_up_after_retry() {
        let count = Arc::new(AtomicUsize::new(0));
        let ok_count = Arc::new(AtomicUsize::new(0));
        let mut broken = MockNotifier::new("broken", count.clone());
        broken.failures = usize::MAX;

        let results = fast(vec![
            Box::new(broken),
            Box::new(MockNotifier::new("ok", ok_count.clone())),
        ])
        .dispatch(&notification())
        .await;

        let err = results[0].error.as_ref().unwrap();
        assert_eq!(err.channel, "broken");
        assert_eq!(err.attempts, 2);
        assert!(err.reason.contains("mock failure"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(results[1].success());
        assert_eq!(ok_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_channel_times_out() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut slow = MockNotifier::new("slow", count.clone());
        slow.delay = Duration::from_secs(30);

        let dispatcher = Dispatcher::new(vec![Box::new(slow)])
            .with_timeouts(Duration::from_millis(20), Duration::from_millis(1));
        let results = dispatcher.dispatch(&notification()).await;

        let err = results[0].error.as_ref().unwrap();
        assert!(err.reason.contains("Timed out"), "got: {}", err.reason);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn channels_run_concurrently() {
        let channels: Vec<Box<dyn Notifier>> = (0..3)
            .map(|i| {
                let mut m = MockNotifier::new(&format!("c{i}"), Arc::new(AtomicUsize::new(0)));
                m.delay = Duration::from_millis(150);
                Box::new(m) as Box<dyn Notifier>
            })
            .collect();
        let dispatcher =
            Dispatcher::new(channels).with_timeouts(Duration::from_secs(5), Duration::ZERO);

        let start = Instant::now();
        let results = dispatcher.dispatch(&notification()).await;
        assert!(results.iter().all(|r| r.success()));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn empty_dispatcher_returns_nothing() {
        let dispatcher = Dispatcher::empty();
        assert!(dispatcher.is_empty());
        assert!(dispatcher.dispatch(&notification()).await.is_empty());
    }

    #[tokio::test]
    async fn test_channel_out_of_range() {
        let dispatcher = Dispatcher::empty();
        assert!(matches!(
            dispatcher.test_channel(0).await,
            Err(NotifyError::Config(_))
        ));
    }
}
