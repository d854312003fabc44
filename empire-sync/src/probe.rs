//! Connectivity probe
//!
//! Polls the upstream and drives the service's readiness. Any HTTP response
//! counts as reachable (the upstream may answer 405 to a GET on its ingest
//! endpoint); connection failures and timeouts count as offline.
//!
//! A drain runs in its own task so the probe keeps polling while it is in
//! flight; an outage seen mid-drain stops the episode before the next item.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::SyncService;

pub struct ConnectivityProbe {
    http_client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(url: impl Into<String>, interval: Duration) -> anyhow::Result<Self> {
        // Fresh connection per check; a pooled socket can outlive the upstream
        let http_client = reqwest::Client::builder()
            .timeout(interval.min(Duration::from_secs(5)))
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            http_client,
            url: url.into(),
            interval,
        })
    }

    /// One reachability check
    pub async fn check(&self) -> bool {
        match self.http_client.get(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Upstream reachable");
                true
            }
            Err(e) => {
                debug!(url = %self.url, "Upstream unreachable: {}", e);
                false
            }
        }
    }

    /// Run the probe loop until the task is aborted
    pub fn spawn(self, service: Arc<SyncService>) -> JoinHandle<()> {
        info!("Connectivity probe on {} every {:?}", self.url, self.interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut drain_task: Option<JoinHandle<()>> = None;
            loop {
                ticker.tick().await;
                let online = self.check().await;
                if online != service.is_ready() {
                    if online {
                        info!("Upstream back online");
                    } else {
                        warn!("Upstream offline; queueing sync items");
                    }
                }

                if !online {
                    service.set_ready(false).await;
                    continue;
                }

                let idle = drain_task.as_ref().map_or(true, |task| task.is_finished());
                if !service.is_ready() && idle {
                    let service = Arc::clone(&service);
                    drain_task = Some(tokio::spawn(async move {
                        if let Some(report) = service.set_ready(true).await {
                            debug!("Reconnect drain finished: {:?}", report);
                        }
                    }));
                }
            }
        })
    }
}
