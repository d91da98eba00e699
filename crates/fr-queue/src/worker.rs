//! Retry worker
//!
//! Single consumer of the delivery queue. Each job is handed to the
//! dispatcher; a retryable failure increments the attempt counter, sleeps the
//! backoff delay in-line, and re-enqueues the job at the tail. The in-line
//! sleep serializes delivery work on purpose: contact-form volume is low and
//! ordering pressure beats throughput here.
//!
//! Delivery is at-least-once. A job mixing channels where one channel
//! succeeded and another failed is retried whole, so the successful channel
//! may receive the notification again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fr_common::{AuditEventType, AuditSink, DeliveryJob, DispatchOutcome};
use fr_dispatch::Dispatcher;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backoff::backoff_delay;
use crate::QueueHandle;

/// Poll interval for the queue receive loop. Bounds shutdown latency.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Retries permitted after the first failed attempt.
    pub max_retries: u32,
    /// Base of the exponential backoff schedule, in seconds.
    pub base_backoff_seconds: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff_seconds: 1.0,
        }
    }
}

/// The retry worker. [`DeliveryWorker::start`] consumes it and returns a
/// [`WorkerHandle`] for shutdown.
pub struct DeliveryWorker {
    dispatcher: Arc<dyn Dispatcher>,
    audit: Arc<dyn AuditSink>,
    requeue: QueueHandle,
    config: WorkerConfig,
}

impl DeliveryWorker {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        audit: Arc<dyn AuditSink>,
        requeue: QueueHandle,
        config: WorkerConfig,
    ) -> Self {
        Self {
            dispatcher,
            audit,
            requeue,
            config,
        }
    }

    /// Spawn the worker loop on the runtime.
    pub fn start(self, rx: mpsc::UnboundedReceiver<DeliveryJob>) -> WorkerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = running.clone();
        let join = tokio::spawn(async move {
            self.run(rx, loop_running).await;
        });
        WorkerHandle { running, join }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<DeliveryJob>, running: Arc<AtomicBool>) {
        info!(
            max_retries = self.config.max_retries,
            base_backoff_seconds = self.config.base_backoff_seconds,
            "Delivery worker started"
        );

        while running.load(Ordering::SeqCst) {
            match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => {
                    // All producers dropped
                    break;
                }
                Err(_) => continue,
            }
        }

        info!("Delivery worker exited");
    }

    async fn process(&self, mut job: DeliveryJob) {
        let outcome = self.dispatcher.dispatch(&job).await;

        match outcome {
            DispatchOutcome::Delivered => {
                info!(
                    recipients = job.recipients.len(),
                    subject = %job.subject,
                    attempts = job.attempts,
                    "Notification delivered"
                );
                self.audit
                    .record(
                        AuditEventType::Sent,
                        json!({
                            "recipients": job.recipients,
                            "subject": job.subject,
                            "attempts": job.attempts,
                        }),
                    )
                    .await;
            }
            DispatchOutcome::Failed { reason, retryable } => {
                job.attempts += 1;

                if retryable && job.attempts <= self.config.max_retries {
                    let delay = backoff_delay(job.attempts, self.config.base_backoff_seconds);
                    warn!(
                        attempt = job.attempts,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Dispatch failed, scheduling retry"
                    );
                    self.audit
                        .record(
                            AuditEventType::Retry,
                            json!({
                                "error": reason,
                                "attempt": job.attempts,
                                "subject": job.subject,
                            }),
                        )
                        .await;
                    tokio::time::sleep(delay).await;
                    if let Err(e) = self.requeue.enqueue(job) {
                        error!(error = %e, "Failed to re-enqueue job for retry");
                    }
                } else {
                    error!(
                        attempts = job.attempts,
                        retryable = retryable,
                        error = %reason,
                        subject = %job.subject,
                        "Giving up on notification"
                    );
                    self.audit
                        .record(
                            AuditEventType::PermanentFailure,
                            json!({
                                "error": reason,
                                "attempts": job.attempts,
                                "recipients": job.recipients,
                                "subject": job.subject,
                            }),
                        )
                        .await;
                }
            }
        }
    }
}

/// Handle for stopping a running worker.
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for the loop to exit. The worker
    /// finishes the job in hand first; queued jobs are dropped.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.join.await {
            error!(error = %e, "Delivery worker task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeliveryQueue;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<(AuditEventType, serde_json::Value)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn count(&self, event_type: AuditEventType) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|(t, _)| *t == event_type)
                .count()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, event_type: AuditEventType, details: serde_json::Value) {
            self.events.lock().push((event_type, details));
        }
    }

    /// Dispatcher that replays a scripted outcome sequence, then delivers.
    struct ScriptedDispatcher {
        script: Mutex<Vec<DispatchOutcome>>,
        calls: Mutex<Vec<(u32, std::time::Instant)>>,
    }

    impl ScriptedDispatcher {
        fn new(script: Vec<DispatchOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        fn attempt_counters(&self) -> Vec<u32> {
            self.calls.lock().iter().map(|(a, _)| *a).collect()
        }

        fn elapsed_between_first_and_last(&self) -> Duration {
            let calls = self.calls.lock();
            match (calls.first(), calls.last()) {
                (Some((_, first)), Some((_, last))) => last.duration_since(*first),
                _ => Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(&self, job: &DeliveryJob) -> DispatchOutcome {
            self.calls.lock().push((job.attempts, std::time::Instant::now()));
            let mut script = self.script.lock();
            if script.is_empty() {
                DispatchOutcome::Delivered
            } else {
                script.remove(0)
            }
        }
    }

    fn job() -> DeliveryJob {
        DeliveryJob::new(
            vec!["ops@example.com".to_string()],
            "subject".to_string(),
            "body".to_string(),
        )
    }

    fn fast_config(max_retries: u32) -> WorkerConfig {
        WorkerConfig {
            max_retries,
            base_backoff_seconds: 0.001,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(900)).await;
    }

    #[tokio::test]
    async fn test_successful_job_is_dispatched_once() {
        let queue = DeliveryQueue::new();
        let rx = queue.take_receiver().unwrap();
        let dispatcher = ScriptedDispatcher::new(vec![]);
        let sink = RecordingSink::new();

        let worker = DeliveryWorker::new(
            dispatcher.clone(),
            sink.clone(),
            queue.handle(),
            fast_config(5),
        );
        let handle = worker.start(rx);

        queue.handle().enqueue(job()).unwrap();
        settle().await;
        handle.stop().await;

        assert_eq!(dispatcher.call_count(), 1);
        assert_eq!(sink.count(AuditEventType::Sent), 1);
        assert_eq!(sink.count(AuditEventType::Retry), 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_ladder() {
        let queue = DeliveryQueue::new();
        let rx = queue.take_receiver().unwrap();
        // Fails forever: max_retries=2 means 3 dispatch attempts total
        let dispatcher = ScriptedDispatcher::new(vec![
            DispatchOutcome::failed("down"),
            DispatchOutcome::failed("down"),
            DispatchOutcome::failed("down"),
            DispatchOutcome::failed("down"),
        ]);
        let sink = RecordingSink::new();

        let worker = DeliveryWorker::new(
            dispatcher.clone(),
            sink.clone(),
            queue.handle(),
            fast_config(2),
        );
        let handle = worker.start(rx);

        queue.handle().enqueue(job()).unwrap();
        settle().await;
        handle.stop().await;

        assert_eq!(dispatcher.call_count(), 3);
        assert_eq!(sink.count(AuditEventType::Retry), 2);
        assert_eq!(sink.count(AuditEventType::PermanentFailure), 1);
        assert_eq!(sink.count(AuditEventType::Sent), 0);

        // Attempt counter visible to the dispatcher grows across retries
        assert_eq!(dispatcher.attempt_counters(), vec![0, 1, 2]);

        // Two backoff sleeps happened, each at least the floor
        assert!(dispatcher.elapsed_between_first_and_last() >= crate::BACKOFF_FLOOR * 2);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_skips_retry_ladder() {
        let queue = DeliveryQueue::new();
        let rx = queue.take_receiver().unwrap();
        let dispatcher =
            ScriptedDispatcher::new(vec![DispatchOutcome::failed_permanent("no sender")]);
        let sink = RecordingSink::new();

        let worker = DeliveryWorker::new(
            dispatcher.clone(),
            sink.clone(),
            queue.handle(),
            fast_config(5),
        );
        let handle = worker.start(rx);

        queue.handle().enqueue(job()).unwrap();
        settle().await;
        handle.stop().await;

        assert_eq!(dispatcher.call_count(), 1);
        assert_eq!(sink.count(AuditEventType::Retry), 0);
        assert_eq!(sink.count(AuditEventType::PermanentFailure), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_at_least_once() {
        let queue = DeliveryQueue::new();
        let rx = queue.take_receiver().unwrap();
        // One channel down on the first pass, whole job retried, second
        // pass delivers. The job is dispatched twice in full.
        let dispatcher = ScriptedDispatcher::new(vec![DispatchOutcome::failed(
            "Webhook POST failed: connect refused",
        )]);
        let sink = RecordingSink::new();

        let worker = DeliveryWorker::new(
            dispatcher.clone(),
            sink.clone(),
            queue.handle(),
            fast_config(5),
        );
        let handle = worker.start(rx);

        queue.handle().enqueue(job()).unwrap();
        settle().await;
        handle.stop().await;

        assert_eq!(dispatcher.call_count(), 2);
        assert_eq!(sink.count(AuditEventType::Retry), 1);
        assert_eq!(sink.count(AuditEventType::Sent), 1);
    }

    #[tokio::test]
    async fn test_email_without_relay_delivers_once_via_dev_fallback() {
        use fr_dispatch::{ChannelRouter, EmailChannel, SmtpSettings, WebhookChannel};

        let queue = DeliveryQueue::new();
        let rx = queue.take_receiver().unwrap();
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(ChannelRouter::new(
            EmailChannel::new(SmtpSettings {
                mail_from: Some("relay@example.com".to_string()),
                ..Default::default()
            }),
            WebhookChannel::default(),
        ));
        let sink = RecordingSink::new();

        let worker = DeliveryWorker::new(dispatcher, sink.clone(), queue.handle(), fast_config(5));
        let handle = worker.start(rx);

        queue.handle().enqueue(job()).unwrap();
        settle().await;
        handle.stop().await;

        assert_eq!(sink.count(AuditEventType::Sent), 1);
        assert_eq!(sink.count(AuditEventType::Retry), 0);
        assert_eq!(sink.count(AuditEventType::PermanentFailure), 0);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_exhausts_retries_end_to_end() {
        use fr_dispatch::{ChannelRouter, EmailChannel, SmtpSettings, WebhookChannel};

        let queue = DeliveryQueue::new();
        let rx = queue.take_receiver().unwrap();
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(ChannelRouter::new(
            EmailChannel::new(SmtpSettings::default()),
            WebhookChannel::default(),
        ));
        let sink = RecordingSink::new();

        let worker = DeliveryWorker::new(dispatcher, sink.clone(), queue.handle(), fast_config(1));
        let handle = worker.start(rx);

        // Port 1 on localhost refuses connections
        queue
            .handle()
            .enqueue(DeliveryJob::new(
                vec!["http://127.0.0.1:1/hook".to_string()],
                "subject".to_string(),
                "body".to_string(),
            ))
            .unwrap();
        settle().await;
        handle.stop().await;

        // max_retries=1 means two attempts total, then a single permanent drop
        assert_eq!(sink.count(AuditEventType::Retry), 1);
        assert_eq!(sink.count(AuditEventType::PermanentFailure), 1);
        assert_eq!(sink.count(AuditEventType::Sent), 0);
    }
}
