//! Failed-target queue and the tiered retry controller.
//!
//! Every target starts at tier 0. A target whose page cannot be loaded, or
//! whose record misses a required field, is recorded in the [`FailedQueue`].
//! Each later tier then replays the whole queue as it stood when the tier
//! began, with a looser schema. The first tier that produces a satisfying
//! record moves the target into the [`CanonicalStore`] and out of the queue.
//!
//! Phases are strictly sequential. Each phase gets its own navigation
//! session, opened at the start and closed on every exit path.
//!
//! ```text
//! Pending(0) ─┬─> Extracted
//!             └─> Failed ──> Pending(1) ─┬─> Extracted
//!                                        └─> Failed ──> Pending(2) ...
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::config::NavigationConfig;
use crate::driver::{DriverSession, NavigationDriver};
use crate::error::PersistError;
use crate::extract::Extractor;
use crate::models::{CrawlTarget, ExtractedRecord, FailedTarget};
use crate::persist::JsonFile;
use crate::schema::RetryLadder;
use crate::store::CanonicalStore;

/// Reason recorded when a tier's record misses a required field.
pub const MISSING_REQUIRED_FIELDS: &str = "Missing required fields";

/// Durable set of failed targets, keyed by url.
pub struct FailedQueue {
    file: JsonFile<FailedTarget>,
}

impl FailedQueue {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        Ok(Self {
            file: JsonFile::open_or_quarantine(path)?,
        })
    }

    /// Add `target`, or refresh its reason if it is already queued.
    ///
    /// The original `first_seen_at` is kept.
    pub fn record_failure(&mut self, target: &CrawlTarget, reason: &str) -> Result<(), PersistError> {
        self.file.update(|failed| {
            match failed.iter_mut().find(|f| f.url == target.url) {
                Some(existing) => existing.error_reason = reason.to_string(),
                None => failed.push(FailedTarget {
                    url: target.url.clone(),
                    display_name: target.display_name.clone(),
                    error_reason: reason.to_string(),
                    first_seen_at: Utc::now(),
                }),
            }
        })
    }

    /// Drop `url` from the queue. Returns whether it was present.
    pub fn remove(&mut self, url: &str) -> Result<bool, PersistError> {
        if !self.contains(url) {
            return Ok(false);
        }
        self.file.update(|failed| failed.retain(|f| f.url != url))?;
        Ok(true)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.file.items().iter().any(|f| f.url == url)
    }

    pub fn list(&self) -> &[FailedTarget] {
        self.file.items()
    }

    /// The queued targets, in queue order.
    pub fn snapshot(&self) -> Vec<CrawlTarget> {
        self.file.items().iter().map(FailedTarget::target).collect()
    }

    /// Empty the queue. Returns how many entries were dropped.
    pub fn clear(&mut self) -> Result<usize, PersistError> {
        let count = self.file.len();
        self.file.replace(Vec::new())?;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }
}

/// Result of running one target through one tier.
#[derive(Debug)]
pub enum Outcome {
    Extracted(Box<ExtractedRecord>),
    Failed(String),
}

/// Counts for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub tier: usize,
    pub tier_name: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Counts for a primary pass plus every retry tier.
#[derive(Debug, Clone, Default)]
pub struct LadderReport {
    pub passes: Vec<PassReport>,
    /// Targets still failed after the last tier.
    pub remaining: usize,
}

impl LadderReport {
    pub fn extracted(&self) -> usize {
        self.passes.iter().map(|p| p.succeeded).sum()
    }
}

pub struct TieredRetryController<'a> {
    ladder: &'a RetryLadder,
    extractor: &'a Extractor,
    navigation: &'a NavigationConfig,
}

impl<'a> TieredRetryController<'a> {
    pub fn new(
        ladder: &'a RetryLadder,
        extractor: &'a Extractor,
        navigation: &'a NavigationConfig,
    ) -> Self {
        Self {
            ladder,
            extractor,
            navigation,
        }
    }

    /// Primary pass over `targets`, then every retry tier over the queue.
    pub async fn run(
        &self,
        driver: &dyn NavigationDriver,
        targets: &[CrawlTarget],
        queue: &mut FailedQueue,
        store: &mut CanonicalStore,
    ) -> Result<LadderReport> {
        let mut report = LadderReport::default();
        report
            .passes
            .push(self.run_phase(driver, 0, targets, queue, store).await?);
        report.passes.extend(self.run_retries(driver, queue, store).await?);
        report.remaining = queue.len();
        Ok(report)
    }

    /// Replay the failed queue through tiers 1..N.
    pub async fn run_retries(
        &self,
        driver: &dyn NavigationDriver,
        queue: &mut FailedQueue,
        store: &mut CanonicalStore,
    ) -> Result<Vec<PassReport>> {
        let mut passes = Vec::new();
        for (tier, _) in self.ladder.retries() {
            let pending = queue.snapshot();
            if pending.is_empty() {
                tracing::info!(tier, "Failed queue is empty, stopping retry ladder");
                break;
            }
            passes.push(self.run_phase(driver, tier, &pending, queue, store).await?);
        }
        Ok(passes)
    }

    /// One phase with its own session, closed whether or not the pass succeeds.
    async fn run_phase(
        &self,
        driver: &dyn NavigationDriver,
        tier: usize,
        targets: &[CrawlTarget],
        queue: &mut FailedQueue,
        store: &mut CanonicalStore,
    ) -> Result<PassReport> {
        let mut session = driver
            .open()
            .await
            .context("Failed to open navigation session")?;
        let result = self
            .run_pass(session.as_mut(), tier, targets, queue, store)
            .await;
        session.close().await;
        result
    }

    async fn run_pass(
        &self,
        session: &mut dyn DriverSession,
        tier: usize,
        targets: &[CrawlTarget],
        queue: &mut FailedQueue,
        store: &mut CanonicalStore,
    ) -> Result<PassReport> {
        let spec = &self.ladder.tiers()[tier];
        let tier_name = spec.name.clone();
        tracing::info!(
            tier,
            tier_name = %tier_name,
            targets = targets.len(),
            timeout = %describe_timeout(spec.timeout(self.default_timeout_secs(tier))),
            "Starting extraction pass"
        );

        let mut report = PassReport {
            tier,
            tier_name,
            attempted: targets.len(),
            succeeded: 0,
            failed: 0,
        };

        for target in targets {
            match self.process_target(session, target, tier).await {
                Outcome::Extracted(record) => {
                    store.upsert(*record).context("Failed to write canonical store")?;
                    queue
                        .remove(&target.url)
                        .context("Failed to update failed queue")?;
                    report.succeeded += 1;
                }
                Outcome::Failed(reason) => {
                    report.failed += 1;
                    if store.contains(&target.url) {
                        tracing::debug!(url = %target.url, "Already stored, not queueing failure");
                        continue;
                    }
                    queue
                        .record_failure(target, &reason)
                        .context("Failed to update failed queue")?;
                }
            }
        }

        tracing::info!(
            tier,
            succeeded = report.succeeded,
            failed = report.failed,
            "Finished extraction pass"
        );
        Ok(report)
    }

    /// Load and extract one target with tier `tier`. Never fails; errors become [`Outcome::Failed`].
    pub async fn process_target(
        &self,
        session: &mut dyn DriverSession,
        target: &CrawlTarget,
        tier: usize,
    ) -> Outcome {
        let spec = &self.ladder.tiers()[tier];
        let timeout = spec.timeout(self.default_timeout_secs(tier));

        let page = match session.goto(&target.url, self.navigation.wait, timeout).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = %target.url, tier, error = %e, "Navigation failed");
                return Outcome::Failed(e.to_string());
            }
        };

        let record = self
            .extractor
            .extract_html(&page.html, &spec.fields, tier, target);
        if spec.is_satisfied_by(&record) {
            tracing::debug!(url = %target.url, tier, "Extracted");
            Outcome::Extracted(Box::new(record))
        } else {
            tracing::warn!(url = %target.url, tier, required = ?spec.required, "Missing required fields");
            Outcome::Failed(MISSING_REQUIRED_FIELDS.to_string())
        }
    }

    fn default_timeout_secs(&self, tier: usize) -> u64 {
        if tier == 0 {
            self.navigation.primary_timeout_secs
        } else {
            self.navigation.retry_timeout_secs
        }
    }
}

fn describe_timeout(timeout: Option<Duration>) -> String {
    match timeout {
        Some(after) => format!("{}s", after.as_secs()),
        None => "unbounded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_failure_has_set_semantics() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("failed-targets.json");
        let mut queue = FailedQueue::open(&path).unwrap();
        let target = CrawlTarget::new("https://x.com/p", "P");

        queue.record_failure(&target, "timeout").unwrap();
        let first_seen = queue.list()[0].first_seen_at;
        queue.record_failure(&target, MISSING_REQUIRED_FIELDS).unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.list()[0].error_reason, MISSING_REQUIRED_FIELDS);
        assert_eq!(queue.list()[0].first_seen_at, first_seen);

        let reopened = FailedQueue::open(&path).unwrap();
        assert_eq!(reopened.snapshot(), vec![target]);
    }

    #[test]
    fn test_remove_and_clear() {
        let tmp = TempDir::new().unwrap();
        let mut queue = FailedQueue::open(tmp.path().join("q.json")).unwrap();
        queue
            .record_failure(&CrawlTarget::new("a", "A"), "x")
            .unwrap();
        queue
            .record_failure(&CrawlTarget::new("b", "B"), "y")
            .unwrap();

        assert!(queue.remove("a").unwrap());
        assert!(!queue.remove("a").unwrap());
        assert!(!queue.contains("a"));
        assert_eq!(queue.clear().unwrap(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_describe_timeout() {
        assert_eq!(describe_timeout(None), "unbounded");
        assert_eq!(describe_timeout(Some(Duration::from_secs(30))), "30s");
    }
}
