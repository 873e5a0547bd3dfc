//! Background identicon backfill
//!
//! Every cycle lists all components, asks the generator for an identicon
//! for each one that has none yet, and stores the result. Failures are
//! logged and left for the next cycle to retry, so a component converges to
//! exactly one image once the generator succeeds.
//!
//! The existence check is only an optimisation for skipping known images:
//! the store's insert-if-absent write is what guarantees a component never
//! receives a second image, even when two writers race past the check.

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{IdenticonGenerator, IdenticonRequest};
use crate::config::IdenticonConfig;
use crate::errors::RepositoryResult;
use crate::models::{Component, ImageInsertOutcome};
use crate::repositories::CatalogStore;

/// What happened to a single component during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOutcome {
    /// An identicon was already stored
    Skipped,
    /// A new identicon was generated and stored
    Generated,
    /// Generated, but another writer stored one first
    AlreadyPresent,
    /// Lookup, generation or storage failed; retried next cycle
    Failed,
}

/// Per-cycle tallies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub components: usize,
    pub skipped: usize,
    pub generated: usize,
    pub already_present: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: ComponentOutcome) {
        match outcome {
            ComponentOutcome::Skipped => self.skipped += 1,
            ComponentOutcome::Generated => self.generated += 1,
            ComponentOutcome::AlreadyPresent => self.already_present += 1,
            ComponentOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct IdenticonBackfill {
    store: Arc<dyn CatalogStore>,
    generator: Arc<dyn IdenticonGenerator>,
    poll_interval: Duration,
    max_concurrent_requests: usize,
}

impl IdenticonBackfill {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        generator: Arc<dyn IdenticonGenerator>,
        config: &IdenticonConfig,
    ) -> Self {
        Self {
            store,
            generator,
            poll_interval: config.poll_interval,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
        }
    }

    /// Run cycles until the token is cancelled
    ///
    /// Cancellation is honoured both while sleeping and in the middle of a
    /// cycle; an abandoned cycle leaves nothing half-written.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        info!(
            interval = ?self.poll_interval,
            max_concurrent = self.max_concurrent_requests,
            "Starting identicon backfill"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    info!("Identicon backfill cancelled during cycle");
                    break;
                }
                result = self.run_cycle() => match result {
                    Ok(report) => info!(
                        finished_at = %Utc::now(),
                        components = report.components,
                        skipped = report.skipped,
                        generated = report.generated,
                        already_present = report.already_present,
                        failed = report.failed,
                        "Identicon backfill cycle complete"
                    ),
                    Err(e) => error!("Failed to list components, skipping backfill cycle: {}", e),
                },
            }

            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    info!("Identicon backfill received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Identicon backfill stopped");
        Ok(())
    }

    /// One pass over every component
    ///
    /// Only a failure to list components fails the cycle; per-component
    /// failures are logged and counted in the report.
    pub async fn run_cycle(&self) -> RepositoryResult<CycleReport> {
        let components = self.store.list_components().await?;
        let mut report = CycleReport {
            components: components.len(),
            ..CycleReport::default()
        };

        let mut outcomes = stream::iter(components)
            .map(|component| async move { self.process_component(&component).await })
            .buffer_unordered(self.max_concurrent_requests);

        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }

        Ok(report)
    }

    async fn process_component(&self, component: &Component) -> ComponentOutcome {
        match self.store.get_image(component.id).await {
            Ok(Some(_)) => return ComponentOutcome::Skipped,
            Ok(None) => {}
            Err(e) => {
                warn!(
                    component_id = component.id,
                    "Failed to check identicon for component: {}", e
                );
                return ComponentOutcome::Failed;
            }
        }

        info!(component_id = component.id, "Generating identicon for component");

        let request = IdenticonRequest {
            id: component.id,
            name: component.name.clone(),
        };
        let image = match self.generator.generate(&request).await {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    component_id = component.id,
                    "Failed to generate identicon for component: {}", e
                );
                return ComponentOutcome::Failed;
            }
        };

        match self.store.put_image(component.id, &image).await {
            Ok(ImageInsertOutcome::Inserted) => {
                info!(
                    component_id = component.id,
                    bytes = image.len(),
                    "Stored identicon for component"
                );
                ComponentOutcome::Generated
            }
            Ok(ImageInsertOutcome::AlreadyExists) => {
                debug!(
                    component_id = component.id,
                    "Identicon already stored by another writer, discarding"
                );
                ComponentOutcome::AlreadyPresent
            }
            Err(e) => {
                error!(
                    component_id = component.id,
                    "Failed to store identicon for component: {}", e
                );
                ComponentOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{IdenticonError, IdenticonResult, RepositoryError};
    use crate::models::Team;
    use crate::repositories::{ComponentRepository, ImageRepository, InMemoryStore, TeamRepository};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Generator that answers from a closure and records every call
    struct ScriptedGenerator {
        calls: Mutex<Vec<i32>>,
        respond: Box<dyn Fn(usize, &IdenticonRequest) -> IdenticonResult<Vec<u8>> + Send + Sync>,
    }

    impl ScriptedGenerator {
        fn new(
            respond: impl Fn(usize, &IdenticonRequest) -> IdenticonResult<Vec<u8>>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn always(bytes: &'static [u8]) -> Arc<Self> {
            Self::new(move |_, _| Ok(bytes.to_vec()))
        }

        fn calls(&self) -> Vec<i32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdenticonGenerator for ScriptedGenerator {
        async fn generate(&self, request: &IdenticonRequest) -> IdenticonResult<Vec<u8>> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.id);
                calls.len()
            };
            (self.respond)(attempt, request)
        }
    }

    /// Generator whose request never completes
    #[derive(Default)]
    struct StalledGenerator {
        started: tokio::sync::Notify,
    }

    #[async_trait]
    impl IdenticonGenerator for StalledGenerator {
        async fn generate(&self, _request: &IdenticonRequest) -> IdenticonResult<Vec<u8>> {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    /// In-memory store with switchable faults
    #[derive(Default)]
    struct FaultyStore {
        inner: InMemoryStore,
        fail_list: AtomicBool,
        fail_put: AtomicBool,
        hide_images: AtomicBool,
    }

    #[async_trait]
    impl ComponentRepository for FaultyStore {
        async fn list_components(&self) -> RepositoryResult<Vec<Component>> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(RepositoryError::ConnectionFailed {
                    message: "connection refused".to_string(),
                });
            }
            self.inner.list_components().await
        }

        async fn list_components_by_team(&self, team_id: i32) -> RepositoryResult<Vec<Component>> {
            self.inner.list_components_by_team(team_id).await
        }

        async fn get_component(&self, id: i32) -> RepositoryResult<Option<Component>> {
            self.inner.get_component(id).await
        }

        async fn create_component(&self, component: &Component) -> RepositoryResult<()> {
            self.inner.create_component(component).await
        }
    }

    #[async_trait]
    impl TeamRepository for FaultyStore {
        async fn list_teams(&self) -> RepositoryResult<Vec<Team>> {
            self.inner.list_teams().await
        }

        async fn get_team(&self, id: i32) -> RepositoryResult<Option<Team>> {
            self.inner.get_team(id).await
        }

        async fn create_team(&self, team: &Team) -> RepositoryResult<()> {
            self.inner.create_team(team).await
        }
    }

    #[async_trait]
    impl ImageRepository for FaultyStore {
        async fn get_image(&self, component_id: i32) -> RepositoryResult<Option<Vec<u8>>> {
            if self.hide_images.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get_image(component_id).await
        }

        async fn put_image(
            &self,
            component_id: i32,
            image: &[u8],
        ) -> RepositoryResult<ImageInsertOutcome> {
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(RepositoryError::ConnectionFailed {
                    message: "connection reset".to_string(),
                });
            }
            self.inner.put_image(component_id, image).await
        }
    }

    #[async_trait]
    impl CatalogStore for FaultyStore {
        async fn ping(&self) -> RepositoryResult<()> {
            Ok(())
        }
    }

    async fn store_with(components: &[(i32, &str)]) -> Arc<FaultyStore> {
        let store = Arc::new(FaultyStore::default());
        store
            .create_team(&Team {
                id: 1,
                name: "platform".to_string(),
            })
            .await
            .unwrap();
        for (id, name) in components {
            store
                .create_component(&Component {
                    id: *id,
                    name: name.to_string(),
                    kind: "Service".to_string(),
                    team: 1,
                    language: "Go".to_string(),
                })
                .await
                .unwrap();
        }
        store
    }

    fn backfill(
        store: Arc<FaultyStore>,
        generator: Arc<ScriptedGenerator>,
        max_concurrent_requests: usize,
    ) -> IdenticonBackfill {
        let config = IdenticonConfig {
            poll_interval: Duration::from_millis(10),
            max_concurrent_requests,
            ..IdenticonConfig::default()
        };
        IdenticonBackfill::new(store, generator, &config)
    }

    #[tokio::test]
    async fn stores_generated_bytes_and_never_asks_twice() {
        let store = store_with(&[(1, "A")]).await;
        let generator = ScriptedGenerator::always(&[0xAA, 0xBB]);
        let backfill = backfill(store.clone(), generator.clone(), 1);

        let first = backfill.run_cycle().await.unwrap();
        assert_eq!(first.generated, 1);
        assert_eq!(store.get_image(1).await.unwrap(), Some(vec![0xAA, 0xBB]));

        let second = backfill.run_cycle().await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.generated, 0);
        assert_eq!(generator.calls(), vec![1]);
        assert_eq!(store.inner.image_writes(), 1);
    }

    #[tokio::test]
    async fn generator_receives_component_id_and_name() {
        let store = store_with(&[(4, "payments-api")]).await;
        let seen = Arc::new(Mutex::new(None));
        let seen_in_generator = seen.clone();
        let generator = ScriptedGenerator::new(move |_, request| {
            *seen_in_generator.lock().unwrap() = Some(request.clone());
            Ok(vec![1])
        });

        backfill(store, generator, 1).run_cycle().await.unwrap();

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(IdenticonRequest {
                id: 4,
                name: "payments-api".to_string()
            })
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn non_success_status_is_logged_and_retried() {
        let store = store_with(&[(2, "B")]).await;
        let generator = ScriptedGenerator::new(|_, _| Err(IdenticonError::Status { status: 500 }));
        let backfill = backfill(store.clone(), generator.clone(), 1);

        let report = backfill.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(store.get_image(2).await.unwrap(), None);
        assert!(logs_contain("Failed to generate identicon for component"));

        backfill.run_cycle().await.unwrap();
        assert_eq!(generator.calls(), vec![2, 2]);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_cycle() {
        let store = store_with(&[(1, "A"), (2, "B")]).await;
        let generator = ScriptedGenerator::new(|_, request| {
            if request.name == "A" {
                Err(IdenticonError::Transport {
                    url: "http://localhost:8081".to_string(),
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(vec![0x0B])
            }
        });

        let report = backfill(store.clone(), generator, 1).run_cycle().await.unwrap();

        assert_eq!(report.components, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.generated, 1);
        assert_eq!(store.get_image(1).await.unwrap(), None);
        assert_eq!(store.get_image(2).await.unwrap(), Some(vec![0x0B]));
    }

    #[tokio::test]
    async fn converges_within_failures_plus_one_cycles() {
        const FAILURES: usize = 3;
        let store = store_with(&[(9, "flaky")]).await;
        let generator = ScriptedGenerator::new(|attempt, _| {
            if attempt <= FAILURES {
                Err(IdenticonError::Timeout {
                    url: "http://localhost:8081".to_string(),
                })
            } else {
                Ok(vec![0x99])
            }
        });
        let backfill = backfill(store.clone(), generator.clone(), 1);

        let mut cycles = 0;
        while store.get_image(9).await.unwrap().is_none() {
            cycles += 1;
            assert!(cycles <= FAILURES + 1, "no identicon after {cycles} cycles");
            backfill.run_cycle().await.unwrap();
        }

        assert_eq!(cycles, FAILURES + 1);
        backfill.run_cycle().await.unwrap();
        assert_eq!(generator.calls().len(), FAILURES + 1);
        assert_eq!(store.inner.image_writes(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn storage_failures_leave_the_component_for_later() {
        let store = store_with(&[(3, "C")]).await;
        store.fail_put.store(true, Ordering::SeqCst);
        let generator = ScriptedGenerator::always(&[0x0C]);
        let backfill = backfill(store.clone(), generator.clone(), 1);

        let report = backfill.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(logs_contain("Failed to store identicon for component"));

        store.fail_put.store(false, Ordering::SeqCst);
        let report = backfill.run_cycle().await.unwrap();
        assert_eq!(report.generated, 1);
        assert_eq!(store.get_image(3).await.unwrap(), Some(vec![0x0C]));
        assert_eq!(generator.calls(), vec![3, 3]);
    }

    #[tokio::test]
    async fn racing_writer_is_not_overwritten() {
        let store = store_with(&[(5, "E")]).await;
        store.inner.put_image(5, &[0x01]).await.unwrap();
        store.hide_images.store(true, Ordering::SeqCst);
        let generator = ScriptedGenerator::always(&[0x02]);

        let report = backfill(store.clone(), generator, 1).run_cycle().await.unwrap();

        assert_eq!(report.already_present, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.inner.get_image(5).await.unwrap(), Some(vec![0x01]));
    }

    #[tokio::test]
    async fn concurrent_requests_still_store_one_image_each() {
        let components: Vec<(i32, String)> = (1..=12).map(|id| (id, format!("c{id}"))).collect();
        let refs: Vec<(i32, &str)> = components.iter().map(|(id, n)| (*id, n.as_str())).collect();
        let store = store_with(&refs).await;
        let generator = ScriptedGenerator::new(|_, request| Ok(vec![request.id as u8]));
        let backfill = backfill(store.clone(), generator.clone(), 4);

        let report = backfill.run_cycle().await.unwrap();
        assert_eq!(report.generated, 12);
        backfill.run_cycle().await.unwrap();

        let called: HashSet<i32> = generator.calls().into_iter().collect();
        assert_eq!(called.len(), 12);
        assert_eq!(generator.calls().len(), 12);
        assert_eq!(store.inner.image_count().await, 12);
        assert_eq!(store.get_image(7).await.unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn list_failure_fails_only_the_cycle() {
        let store = store_with(&[(1, "A")]).await;
        store.fail_list.store(true, Ordering::SeqCst);
        let generator = ScriptedGenerator::always(&[0x01]);
        let backfill = backfill(store.clone(), generator.clone(), 1);

        assert!(backfill.run_cycle().await.is_err());
        assert!(generator.calls().is_empty());

        store.fail_list.store(false, Ordering::SeqCst);
        assert_eq!(backfill.run_cycle().await.unwrap().generated, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn run_keeps_polling_through_store_outages_until_cancelled() {
        let store = store_with(&[(1, "A")]).await;
        store.fail_list.store(true, Ordering::SeqCst);
        let generator = ScriptedGenerator::always(&[0x01]);
        let backfill = backfill(store.clone(), generator, 1);
        let token = CancellationToken::new();

        let recover_then_cancel = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            store.fail_list.store(false, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        };
        let (result, _) = tokio::join!(backfill.run(token.clone()), recover_then_cancel);

        result.unwrap();
        assert!(logs_contain("Failed to list components"));
        assert_eq!(store.get_image(1).await.unwrap(), Some(vec![0x01]));
    }

    #[tokio::test]
    async fn run_stops_promptly_while_sleeping() {
        let store = store_with(&[]).await;
        let generator = ScriptedGenerator::always(&[0x01]);
        let config = IdenticonConfig {
            poll_interval: Duration::from_secs(3600),
            ..IdenticonConfig::default()
        };
        let backfill = IdenticonBackfill::new(store, generator, &config);
        let token = CancellationToken::new();

        let cancel_soon = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        };
        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(backfill.run(token.clone()), cancel_soon)
        })
        .await;

        let (result, _) = joined.expect("backfill did not stop after cancellation");
        result.unwrap();
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_work() {
        let store = store_with(&[(1, "A")]).await;
        let generator = ScriptedGenerator::always(&[0x01]);
        let backfill = backfill(store.clone(), generator.clone(), 1);
        let token = CancellationToken::new();
        token.cancel();

        backfill.run(token).await.unwrap();
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn run_stops_promptly_mid_cycle() {
        let store = store_with(&[(1, "A")]).await;
        let generator = Arc::new(StalledGenerator::default());
        let config = IdenticonConfig {
            poll_interval: Duration::from_millis(10),
            ..IdenticonConfig::default()
        };
        let backfill = IdenticonBackfill::new(store.clone(), generator.clone(), &config);
        let token = CancellationToken::new();

        let cancel_once_stalled = async {
            generator.started.notified().await;
            token.cancel();
        };
        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(backfill.run(token.clone()), cancel_once_stalled)
        })
        .await;

        let (result, _) = joined.expect("backfill did not stop while a request was in flight");
        result.unwrap();
        assert!(logs_contain("Identicon backfill cancelled during cycle"));
        assert_eq!(store.get_image(1).await.unwrap(), None);
    }
}
