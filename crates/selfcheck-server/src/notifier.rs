//! Failure alerting: batches failure notices and delivers them to a webhook.

use crate::metrics::MetricsRegistry;
use async_trait::async_trait;
use selfcheck::{FailureHook, FailureNotice, HookError, OutcomeView};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, interval};
use tracing::{debug, info, warn};

/// Failure hook that queues notices for the [`Notifier`]
#[derive(Clone)]
pub struct ChannelHook {
    notice_tx: mpsc::Sender<FailureNotice>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ChannelHook {
    pub fn new(
        notice_tx: mpsc::Sender<FailureNotice>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self { notice_tx, metrics }
    }
}

#[async_trait]
impl FailureHook for ChannelHook {
    async fn on_failure(&self, notice: FailureNotice) -> Result<(), HookError> {
        match self.notice_tx.try_send(notice) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                if let Some(ref m) = self.metrics {
                    m.record_alerts("dropped", 1);
                }
                Err("alert queue is full, notice dropped".into())
            }
            Err(TrySendError::Closed(_)) => Err("notifier has stopped".into()),
        }
    }
}

/// JSON body posted to the webhook
#[derive(Debug, Serialize)]
pub struct AlertPayload<'a> {
    pub notices: Vec<NoticeView<'a>>,
}

/// One failed run inside an [`AlertPayload`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeView<'a> {
    pub request_id: Option<&'a str>,
    pub failed: Vec<OutcomeView<'a>>,
}

impl<'a> From<&'a FailureNotice> for NoticeView<'a> {
    fn from(notice: &'a FailureNotice) -> Self {
        Self {
            request_id: notice.request_id.as_deref(),
            failed: notice.failed.iter().map(|o| o.view()).collect(),
        }
    }
}

/// Notifier batches failure notices and delivers them
pub struct Notifier {
    /// Notice receiver
    notice_rx: mpsc::Receiver<FailureNotice>,

    /// Webhook client and URL, if alerts leave the process
    webhook: Option<(reqwest::Client, String)>,

    /// Batch delay
    batch_delay: Duration,

    /// Maximum batch size
    batch_size: usize,

    metrics: Option<Arc<MetricsRegistry>>,
}

impl Notifier {
    /// Create a new notifier; without a webhook, notices are logged
    pub fn new(
        notice_rx: mpsc::Receiver<FailureNotice>,
        webhook_url: Option<String>,
        batch_delay: Duration,
        batch_size: usize,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Result<Self, reqwest::Error> {
        let webhook = match webhook_url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()?;
                Some((client, url))
            }
            None => None,
        };

        Ok(Self {
            notice_rx,
            webhook,
            batch_delay,
            batch_size: batch_size.max(1),
            metrics,
        })
    }

    /// Run the notifier task until every sender is gone
    pub async fn run(mut self) {
        info!(webhook = self.webhook.is_some(), "Notifier task started");

        let mut batch = Vec::new();
        let mut batch_timer = interval(self.batch_delay);
        batch_timer.tick().await; // Skip first immediate tick

        let mut last_batch_time = Instant::now();

        loop {
            tokio::select! {
                notice = self.notice_rx.recv() => {
                    let Some(notice) = notice else {
                        self.send_batch(&mut batch).await;
                        info!("Notifier task stopped");
                        return;
                    };
                    debug!(request_id = notice.request_id.as_deref(), failed = notice.failed.len(), "Received failure notice");
                    batch.push(notice);

                    if batch.len() >= self.batch_size {
                        self.send_batch(&mut batch).await;
                        last_batch_time = Instant::now();
                        batch_timer.reset();
                    }
                }

                _ = batch_timer.tick() => {
                    if !batch.is_empty() && last_batch_time.elapsed() >= self.batch_delay {
                        self.send_batch(&mut batch).await;
                        last_batch_time = Instant::now();
                    }
                }
            }
        }
    }

    /// Deliver a batch of notices
    async fn send_batch(&self, batch: &mut Vec<FailureNotice>) {
        if batch.is_empty() {
            return;
        }

        let size = batch.len();
        match &self.webhook {
            Some((client, url)) => {
                let payload = AlertPayload {
                    notices: batch.iter().map(NoticeView::from).collect(),
                };
                let result = client
                    .post(url.as_str())
                    .json(&payload)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status());

                match result {
                    Ok(_) => {
                        info!(notices = size, "Delivered failure alert batch");
                        self.record("delivered", size);
                    }
                    Err(e) => {
                        warn!(error = %e, notices = size, "Failed to deliver failure alert batch");
                        self.record("failed", size);
                    }
                }
            }
            None => {
                for notice in batch.iter() {
                    let urls: Vec<&str> = notice.failed.iter().map(|o| o.url.as_str()).collect();
                    warn!(
                        request_id = notice.request_id.as_deref().unwrap_or(""),
                        failed = ?urls,
                        "Self-check failures"
                    );
                }
                self.record("logged", size);
            }
        }

        if let Some(ref m) = self.metrics {
            m.record_alert_batch(size);
        }
        batch.clear();
    }

    fn record(&self, result: &str, count: usize) {
        if let Some(ref m) = self.metrics {
            m.record_alerts(result, count);
        }
    }
}
