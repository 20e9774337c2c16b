//! End-to-end reconciliation run
//!
//! authenticate → fetch → decode → classify → (delete inventory ‖ delete service desk)
//!
//! Fatal errors stop the run and are returned; per-task deletion failures are
//! part of the [`RunReport`].

use crate::auth::{InventoryAuthenticator, TokenProvider};
use crate::classify::{Classifier, InconsistencyRule};
use crate::config::Config;
use crate::download::{Downloader, FetchRequest};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::report::RunReport;
use crate::snapshot::Snapshot;
use crate::targets::{InventoryTarget, ServiceDeskTarget};
use crate::types::{Event, Stage};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lag rather than block the run
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runs the whole reconciliation for one configuration
pub struct Reconciler {
    config: Arc<Config>,
    client: reqwest::Client,
    event_tx: broadcast::Sender<Event>,
    token_provider: Arc<dyn TokenProvider>,
    classifier: Classifier,
}

impl Reconciler {
    /// Validate `config` and prepare a run
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.download.connect_timeout)
            .build()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let token_provider = Arc::new(InventoryAuthenticator::new(
            client.clone(),
            &config.inventory,
        ));
        let classifier = Classifier::new(config.classifier.clone());

        Ok(Self {
            config: Arc::new(config),
            client,
            event_tx,
            token_provider,
            classifier,
        })
    }

    /// Replace the inventory login with another token source
    pub fn with_token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Arc::new(provider);
        self
    }

    /// Replace the default NIT mismatch rule
    pub fn with_rule(mut self, rule: impl InconsistencyRule + 'static) -> Self {
        self.classifier = Classifier::with_rule(self.config.classifier.clone(), rule);
        self
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration this run uses
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one run
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let config = &self.config;
        tracing::info!(mode = %config.mode, "reconciliation run starting");

        let token = if config.requires_token() {
            self.stage(Stage::Authenticate, self.token_provider.token())
                .await?
        } else {
            tracing::info!("local snapshot in simulation mode, skipping authentication");
            String::new()
        };

        let (snapshot, snapshot_recovered, download_attempts) =
            self.stage(Stage::Download, self.acquire_snapshot(&token)).await?;

        let classification = self
            .stage(Stage::Classify, async { self.classifier.classify(&snapshot) })
            .await?;
        let decode_stats = snapshot.decode_stats();
        drop(snapshot);

        self.event_tx
            .send(Event::ClassificationComplete {
                processed: classification.stats.processed,
                normal: classification.normal.len(),
                particular: classification.particular.len(),
                downstream: classification.downstream_subset().len(),
            })
            .ok();

        let orchestrator = Orchestrator::new(
            Arc::new(InventoryTarget::new(
                self.client.clone(),
                &config.inventory,
                token,
            )),
            Arc::new(ServiceDeskTarget::new(
                self.client.clone(),
                &config.service_desk,
            )),
            config.deletion.concurrency,
            self.event_tx.clone(),
        );
        let results = orchestrator
            .run(&classification.normal, config.mode, &config.deletion.retry)
            .await;

        let report = RunReport {
            mode: config.mode,
            started_at,
            finished_at: Utc::now(),
            local_snapshot: config.local_snapshot.is_some(),
            snapshot_recovered,
            download_attempts,
            decode_stats,
            classification,
            results,
        };

        let summary = report.summary();
        tracing::info!(
            mode = %summary.mode,
            normal = summary.normal,
            particular = summary.particular,
            downstream = summary.downstream,
            inventory_succeeded = summary.inventory.succeeded,
            inventory_failed = summary.inventory.failed(),
            service_desk_succeeded = summary.service_desk.succeeded,
            service_desk_failed = summary.service_desk.failed(),
            "reconciliation run finished"
        );
        Ok(report)
    }

    async fn acquire_snapshot(&self, token: &str) -> Result<(Snapshot, bool, u32)> {
        if let Some(path) = &self.config.local_snapshot {
            let snapshot = Snapshot::from_file(path).await?;
            return Ok((snapshot, false, 0));
        }

        let inventory = &self.config.inventory;
        let downloader = Downloader::with_client(
            self.client.clone(),
            self.config.download.clone(),
            self.event_tx.clone(),
        );
        let request = FetchRequest::post(&inventory.topology_url, &inventory.report_name)
            .bearer(token);
        let outcome = downloader.fetch(&request).await?;
        let snapshot = Snapshot::from_slice(&outcome.payload)?;
        Ok((snapshot, outcome.was_recovered, outcome.attempts))
    }

    async fn stage<T, F>(&self, stage: Stage, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        self.event_tx.send(Event::StageStarted { stage }).ok();
        let result = work.await;
        match &result {
            Ok(_) => {
                self.event_tx
                    .send(Event::StageFinished {
                        stage,
                        duration_ms: started.elapsed().as_millis() as u64,
                    })
                    .ok();
            }
            Err(e) => tracing::error!(?stage, error = %e, "stage failed"),
        }
        result
    }
}
