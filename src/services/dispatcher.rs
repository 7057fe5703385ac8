use super::cancel::CancelSignal;
use super::payload_builder::NotificationPayload;
use crate::domain::{ProviderKind, ProviderStats, PushTarget};
use crate::errors::ProviderError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Opaque acknowledgement from a push provider
#[derive(Debug, Clone, Default)]
pub struct ProviderReceipt {
    pub message_id: Option<String>,
}

/// Capability interface implemented once per push provider
#[async_trait]
pub trait PushProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Provider-specific encoding, computed once per payload and partition
    fn encode(&self, payload: &NotificationPayload) -> Value;

    async fn send(&self, token: &str, encoded: &Value) -> Result<ProviderReceipt, ProviderError>;
}

/// One payload and the devices that should receive it
#[derive(Debug, Clone)]
pub struct DispatchBatch {
    pub payload: NotificationPayload,
    pub targets: Vec<PushTarget>,
}

/// Aggregated outcome of a dispatch
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Never started because the dispatch was cancelled
    pub not_attempted: usize,
    /// Completed after cancellation; outcome dropped
    pub discarded: usize,
    pub per_provider: BTreeMap<String, ProviderStats>,
    /// Users with at least one send actually issued
    pub attempted_users: HashSet<String>,
}

impl DispatchReport {
    pub fn was_cancelled(&self) -> bool {
        self.not_attempted > 0 || self.discarded > 0
    }
}

enum SendOutcome {
    Sent,
    Failed,
    Discarded,
}

struct SendJob {
    provider: Arc<dyn PushProvider>,
    encoded: Arc<Value>,
    target: PushTarget,
}

/// Provider-keyed concurrent push delivery
pub struct Dispatcher {
    providers: HashMap<ProviderKind, Arc<dyn PushProvider>>,
    concurrency: usize,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(concurrency: usize, send_timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            concurrency: concurrency.max(1),
            send_timeout,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn PushProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Send one payload to every target
    pub async fn send(&self, payload: &NotificationPayload, targets: &[PushTarget]) -> DispatchReport {
        let batch = DispatchBatch {
            payload: payload.clone(),
            targets: targets.to_vec(),
        };
        self.dispatch(vec![batch], &CancelSignal::never()).await
    }

    /// Send every batch under a single concurrency bound.
    ///
    /// Sends are independent: a failure or timeout on one target never stops
    /// the others. Once `cancel` fires no new sends start; sends already in
    /// flight run to completion and their outcomes are discarded.
    pub async fn dispatch(&self, batches: Vec<DispatchBatch>, cancel: &CancelSignal) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut jobs = Vec::new();

        for batch in batches {
            let mut partitions: BTreeMap<ProviderKind, Vec<PushTarget>> = BTreeMap::new();
            for target in batch.targets {
                partitions.entry(target.provider).or_default().push(target);
            }

            for (kind, targets) in partitions {
                let stats = report.per_provider.entry(kind.to_string()).or_default();
                stats.targets += targets.len();

                let Some(provider) = self.providers.get(&kind) else {
                    let err = ProviderError::NotRegistered(kind.to_string());
                    for target in &targets {
                        warn!(device_id = %target.device_id, error = %err, "Push send skipped");
                    }
                    stats.failed += targets.len();
                    report.failed += targets.len();
                    continue;
                };

                let encoded = Arc::new(provider.encode(&batch.payload));
                jobs.extend(targets.into_iter().map(|target| SendJob {
                    provider: provider.clone(),
                    encoded: encoded.clone(),
                    target,
                }));
            }
        }

        let queued = jobs.len();
        let outcomes: Vec<(PushTarget, SendOutcome)> = stream::iter(jobs)
            .take_until(cancel.cancelled())
            .map(|job| self.attempt(job, cancel))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        report.not_attempted = queued - outcomes.len();
        for (target, outcome) in outcomes {
            report.attempted_users.insert(target.user_id.clone());
            let stats = report
                .per_provider
                .entry(target.provider.to_string())
                .or_default();
            match outcome {
                SendOutcome::Sent => {
                    stats.sent += 1;
                    report.sent += 1;
                }
                SendOutcome::Failed => {
                    stats.failed += 1;
                    report.failed += 1;
                }
                SendOutcome::Discarded => report.discarded += 1,
            }
        }

        report
    }

    async fn attempt(&self, job: SendJob, cancel: &CancelSignal) -> (PushTarget, SendOutcome) {
        let SendJob {
            provider,
            encoded,
            target,
        } = job;

        let result = match timeout(self.send_timeout, provider.send(&target.push_token, &encoded)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.send_timeout)),
        };

        if cancel.is_cancelled() {
            debug!(device_id = %target.device_id, "Discarding send outcome after cancellation");
            return (target, SendOutcome::Discarded);
        }

        match result {
            Ok(receipt) => {
                debug!(
                    device_id = %target.device_id,
                    provider = %target.provider,
                    message_id = ?receipt.message_id,
                    "Push sent"
                );
                (target, SendOutcome::Sent)
            }
            Err(e) => {
                warn!(
                    device_id = %target.device_id,
                    user_id = %target.user_id,
                    provider = %target.provider,
                    error = %e,
                    "Push send failed"
                );
                (target, SendOutcome::Failed)
            }
        }
    }
}
