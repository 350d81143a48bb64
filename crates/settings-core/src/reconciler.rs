//! Runs resources through resolution and section sync
//!
//! For each resource the `Reconciler` resolves the effective configuration,
//! syncs the `repository` section first and then every other dispatchable
//! section concurrently. A sweep over many resources runs with bounded
//! fan-out and funnels every descriptor into one [`RunReport`].

use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::change::ChangeDescriptor;
use crate::config::{ConfigResolver, Resolution};
use crate::error::Result;
use crate::report::RunReport;
use crate::sync::{AdapterRegistry, RunMode, SectionAdapter, SyncContext, SyncEngine};

/// Origin used for failures that are not tied to a section
const CONFIG_ORIGIN: &str = "config";

pub struct Reconciler {
    resolver: Arc<ConfigResolver>,
    adapters: AdapterRegistry,
    mode: RunMode,
    concurrency: usize,
}

impl Reconciler {
    /// Create a reconciler using the deployment's concurrency.
    pub fn new(resolver: Arc<ConfigResolver>, adapters: AdapterRegistry, mode: RunMode) -> Self {
        let concurrency = resolver.deployment().concurrency.max(1);
        Self {
            resolver,
            adapters,
            mode,
            concurrency,
        }
    }

    /// Override the number of resources reconciled at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Reconcile a single resource.
    ///
    /// Out-of-scope resources yield no descriptors. In dry-run mode a
    /// resolution failure becomes an error descriptor.
    ///
    /// # Errors
    ///
    /// In live mode, returns the resolution failure (for example a validator
    /// rejection). Failures of individual sections never surface here.
    pub async fn run_repository(&self, repo: &str) -> Result<Vec<ChangeDescriptor>> {
        let config = match self.resolver.resolve(repo).await {
            Ok(Resolution::Resolved(config)) => config,
            Ok(Resolution::Excluded) => return Ok(Vec::new()),
            Err(e) if self.mode.is_dry_run() => {
                tracing::error!(repo = %repo, error = %e, "Resolution failed");
                return Ok(vec![ChangeDescriptor::error(
                    e.section().unwrap_or(CONFIG_ORIGIN),
                    repo,
                    e.to_string(),
                )]);
            }
            Err(e) => return Err(e),
        };

        let mut changes = Vec::new();
        if let Some(desired) = config.section("repository")
            && let Some(adapter) = self.adapters.get("repository")
        {
            changes.extend(self.sync_section(repo, "repository", desired, adapter).await);
        }

        let dispatched = self.adapters.dispatch(&config);
        tracing::debug!(repo = %repo, sections = dispatched.len(), "Dispatching section adapters");
        let results = join_all(
            dispatched
                .iter()
                .map(|(section, desired, adapter)| self.sync_section(repo, section, desired, adapter)),
        )
        .await;
        changes.extend(results.into_iter().flatten());

        tracing::debug!(repo = %repo, changes = changes.len(), "Resource done");
        Ok(changes)
    }

    /// Reconcile many resources, at most `concurrency` at a time.
    pub async fn run<I, S>(&self, repos: I) -> RunReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut report = RunReport::new(self.mode.is_dry_run());
        tracing::info!(run_id = %report.run_id, mode = %self.mode, "Starting run");

        let mut results = stream::iter(repos.into_iter().map(Into::into))
            .map(|repo: String| async move {
                let result = self.run_repository(&repo).await;
                (repo, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some((repo, result)) = results.next().await {
            match result {
                Ok(changes) => report.extend(changes),
                Err(e) => {
                    tracing::error!(repo = %repo, error = %e, "Resource failed");
                    report.push(ChangeDescriptor::error(
                        e.section().unwrap_or(CONFIG_ORIGIN),
                        &repo,
                        e.to_string(),
                    ));
                }
            }
        }

        report.sort();
        tracing::info!(
            run_id = %report.run_id,
            changes = report.changes.len(),
            errors = report.errors().len(),
            "Run finished"
        );
        report
    }

    async fn sync_section(
        &self,
        repo: &str,
        section: &str,
        desired: &Value,
        adapter: &SectionAdapter,
    ) -> Vec<ChangeDescriptor> {
        let ctx = SyncContext::new(repo, section, self.mode);
        let result = match adapter {
            SectionAdapter::List(adapter) => SyncEngine::new(adapter.clone()).sync(&ctx, desired).await,
            SectionAdapter::Direct(adapter) => adapter.sync(&ctx, desired).await,
        };
        match result {
            Ok(changes) => changes,
            Err(e) if e.is_conflict() => {
                tracing::warn!(repo = %repo, section = %section, error = %e, "Ignoring conflict");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(repo = %repo, section = %section, error = %e, "Section sync failed");
                vec![ChangeDescriptor::error(section, repo, e.to_string())]
            }
        }
    }
}
