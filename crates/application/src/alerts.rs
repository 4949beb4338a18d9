use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use domain::value_objects::{enums::plan_ids::PlanId, role_sync::RoleSyncFailure};

/// Operator alert raised when role projection fails after a committed
/// entitlement write.
#[derive(Clone, Debug)]
pub struct RoleSyncAlert {
    pub subject_id: String,
    pub desired_plan: PlanId,
    pub source_event_id: String,
    pub detail: String,
    pub failures: Vec<RoleSyncFailure>,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &RoleSyncAlert) -> Result<()>;
    fn sink_name(&self) -> &'static str;
}

/// Queues alerts for background delivery so the webhook path never waits on a
/// sink. A full queue drops the alert with a warning.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<RoleSyncAlert>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<RoleSyncAlert>(256);

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                for sink in &sinks {
                    if let Err(error) = sink.send(&alert).await {
                        warn!(
                            sink = sink.sink_name(),
                            error = %error,
                            "alerts: sink delivery failed"
                        );
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn try_dispatch(&self, alert: RoleSyncAlert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("alerts: queue full; dropping role sync alert");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("alerts: queue closed; dropping role sync alert");
            }
        }
    }
}
