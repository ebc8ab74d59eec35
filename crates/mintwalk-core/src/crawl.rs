use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{CheckpointError, CoreError};
use crate::fetch::TransferFetcher;
use crate::node::{AccountNode, NodePath};
use crate::types::CrawlConfig;

// ==============================================================================
// Crawl State
// ==============================================================================

/// A frontier node: its address and where it sits in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub address: String,
    pub path: NodePath,
}

/// Everything one step needs, passed from step to step by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    pub root: AccountNode,
    /// Nodes at depth `step` whose transfers have not been fetched yet.
    pub frontier: Vec<FrontierEntry>,
    pub step: u32,
    /// Addresses whose transfers could not be fetched, in discovery order.
    pub unexpanded: Vec<String>,
}

impl CrawlState {
    pub fn fresh(root_address: &str) -> Self {
        Self {
            root: AccountNode::root(root_address),
            frontier: vec![FrontierEntry {
                address: root_address.to_owned(),
                path: Vec::new(),
            }],
            step: 0,
            unexpanded: Vec::new(),
        }
    }

    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self, CheckpointError> {
        let paths = checkpoint.frontier_paths()?;
        let frontier = checkpoint
            .frontier
            .into_iter()
            .zip(paths)
            .map(|(address, path)| FrontierEntry { address, path })
            .collect();
        Ok(Self {
            root: checkpoint.root,
            frontier,
            step: checkpoint.step,
            unexpanded: checkpoint.unexpanded,
        })
    }

    pub fn frontier_addresses(&self) -> Vec<String> {
        self.frontier.iter().map(|e| e.address.clone()).collect()
    }
}

// ==============================================================================
// Reports
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStats {
    /// Depth of the frontier that was expanded.
    pub step: u32,
    pub expanded: usize,
    pub failed: usize,
    /// Nodes attached one level below.
    pub discovered: usize,
    /// Recipients not attached because the address was already in the tree.
    pub deduplicated: usize,
    pub total_nodes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxSteps,
    FrontierExhausted,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub root: AccountNode,
    pub start_step: u32,
    pub final_step: u32,
    /// Frontier left at `final_step`; the next run would expand it.
    pub frontier: Vec<String>,
    pub unexpanded: Vec<String>,
    pub steps: Vec<StepStats>,
    pub reason: TerminationReason,
}

// ==============================================================================
// Crawler
// ==============================================================================

/// Bounded, resumable breadth-first crawl over outgoing transfers.
///
/// Each step expands the whole frontier (fetches may run concurrently,
/// attachment is serial and in frontier order), then writes a checkpoint
/// before the next step begins. A crash therefore loses at most the step in
/// progress.
pub struct Crawler {
    fetcher: TransferFetcher,
    store: CheckpointStore,
    config: CrawlConfig,
    stop: Arc<AtomicBool>,
}

impl Crawler {
    pub fn new(
        fetcher: TransferFetcher,
        store: CheckpointStore,
        config: CrawlConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            fetcher: fetcher.with_max_pages(config.max_pages),
            store,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the returned flag ends the crawl at the next step boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn fetcher(&self) -> &TransferFetcher {
        &self.fetcher
    }

    /// Resume from the latest checkpoint when configured to, otherwise (or
    /// when there is none) start from a lone root.
    ///
    /// A fresh crawl refuses a checkpoint directory that already holds steps
    /// unless the store overwrites, before any explorer call is made.
    pub fn initialize(&self, root_address: &str) -> Result<CrawlState, CoreError> {
        if root_address.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "root address must not be empty".to_owned(),
            ));
        }
        if !self.config.resume {
            if !self.store.overwrites() {
                if let Some(&step) = self.store.list_steps()?.first() {
                    return Err(CheckpointError::Conflict {
                        step,
                        path: self.store.path_for(step),
                    }
                    .into());
                }
            }
            info!(root = root_address, "starting fresh crawl");
            return Ok(CrawlState::fresh(root_address));
        }

        match self.store.load_latest() {
            Ok(checkpoint) => {
                if checkpoint.root.address() != root_address {
                    return Err(CoreError::RootMismatch {
                        expected: root_address.to_owned(),
                        found: checkpoint.root.address().to_owned(),
                    });
                }
                info!(
                    step = checkpoint.step,
                    frontier = checkpoint.frontier.len(),
                    nodes = checkpoint.root.node_count(),
                    "resuming from checkpoint"
                );
                Ok(CrawlState::from_checkpoint(checkpoint)?)
            }
            Err(CheckpointError::NotFound { dir, .. }) => {
                info!(dir = %dir.display(), "no checkpoint to resume; starting fresh");
                Ok(CrawlState::fresh(root_address))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Expand every frontier entry of `state` one level.
    ///
    /// Fetch failures are isolated: the address is recorded as unexpanded
    /// and the step carries on.
    pub async fn expand_step(&self, state: CrawlState) -> Result<(CrawlState, StepStats), CoreError> {
        let CrawlState {
            mut root,
            frontier,
            step,
            mut unexpanded,
        } = state;
        info!(step, frontier = frontier.len(), "expanding step");

        let results: Vec<_> = stream::iter(frontier.iter())
            .map(|entry| self.fetcher.fetch_outgoing_transfers(&entry.address, step))
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let mut seen = if self.config.dedup_addresses {
            root.addresses()
        } else {
            HashSet::new()
        };
        let mut next_frontier = Vec::new();
        let mut stats = StepStats {
            step,
            expanded: 0,
            failed: 0,
            discovered: 0,
            deduplicated: 0,
            total_nodes: 0,
        };

        for (index, (entry, result)) in frontier.iter().zip(results).enumerate() {
            let recipients = match result {
                Ok(recipients) => recipients,
                Err(e) => {
                    warn!(address = %entry.address, step, error = %e, "skipping unexpanded address");
                    unexpanded.push(entry.address.clone());
                    stats.failed += 1;
                    continue;
                }
            };

            let node = root.node_at_mut(&entry.path).ok_or_else(|| {
                CheckpointError::Malformed(format!(
                    "frontier entry {} has no node at {:?}",
                    entry.address, entry.path
                ))
            })?;
            for recipient in recipients {
                if self.config.dedup_addresses && !seen.insert(recipient.clone()) {
                    stats.deduplicated += 1;
                    continue;
                }
                let child = node.add_child(recipient.clone());
                let mut path = entry.path.clone();
                path.push(child);
                next_frontier.push(FrontierEntry {
                    address: recipient,
                    path,
                });
            }
            stats.expanded += 1;
            debug!(step, processed = index + 1, total = frontier.len(), "expanded address");
        }

        stats.discovered = next_frontier.len();
        stats.total_nodes = root.node_count();

        let next = CrawlState {
            root,
            frontier: next_frontier,
            step: step + 1,
            unexpanded,
        };
        Ok((next, stats))
    }

    /// Persist `state` as the checkpoint for `state.step`.
    pub fn checkpoint(&self, state: &CrawlState) -> Result<(), CoreError> {
        let path = self.store.save(
            &state.root,
            &state.frontier_addresses(),
            state.step,
            &state.unexpanded,
        )?;
        debug!(step = state.step, path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// Run the crawl from `root_address` until the depth bound, an empty
    /// frontier or a stop request.
    pub async fn run(&self, root_address: &str) -> Result<CrawlSummary, CoreError> {
        let mut state = self.initialize(root_address)?;
        let start_step = state.step;
        let mut steps = Vec::new();

        let reason = loop {
            if let Some(reason) = self.termination(&state) {
                break reason;
            }
            if self.stop.load(Ordering::SeqCst) {
                info!(step = state.step, "stop requested; ending at step boundary");
                break TerminationReason::Stopped;
            }

            let (next, stats) = self.expand_step(state).await?;
            self.checkpoint(&next)?;
            info!(
                step = stats.step,
                expanded = stats.expanded,
                failed = stats.failed,
                discovered = stats.discovered,
                total_nodes = stats.total_nodes,
                "step complete"
            );
            steps.push(stats);
            state = next;
        };

        info!(
            final_step = state.step,
            nodes = state.root.node_count(),
            unexpanded = state.unexpanded.len(),
            ?reason,
            "crawl finished"
        );

        Ok(CrawlSummary {
            frontier: state.frontier_addresses(),
            root: state.root,
            start_step,
            final_step: state.step,
            unexpanded: state.unexpanded,
            steps,
            reason,
        })
    }

    fn termination(&self, state: &CrawlState) -> Option<TerminationReason> {
        if state.step >= self.config.max_steps {
            Some(TerminationReason::MaxSteps)
        } else if state.frontier.is_empty() {
            Some(TerminationReason::FrontierExhausted)
        } else {
            None
        }
    }
}

// ==============================================================================
// Tests
// ==============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::mock::MockApi;
    use crate::cache::TransferCache;
    use crate::test_util::{manual_throttle, scenario_tree, transfer};

    fn scenario_api() -> MockApi {
        MockApi::builder()
            .with_recipients("Mint1", &["Acc2", "Acc3"])
            .with_recipients("Acc2", &["Acc4"])
            .with_recipients("Acc3", &[])
            .with_recipients("Acc4", &["Acc5"])
            .build()
    }

    fn crawler(api: MockApi, store: CheckpointStore, config: CrawlConfig) -> Crawler {
        let (_, throttle) = manual_throttle(config.inter_call_delay_ms);
        let fetcher = TransferFetcher::new(Arc::new(api), throttle);
        Crawler::new(fetcher, store, config).expect("valid config")
    }

    fn config(max_steps: u32) -> CrawlConfig {
        CrawlConfig {
            max_steps,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn scenario_two_steps() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = CheckpointStore::new(dir.path());
        let crawler = crawler(scenario_api(), store.clone(), config(2));

        let summary = crawler.run("Mint1").await.expect("crawl");

        assert_eq!(summary.root, scenario_tree());
        assert_eq!(summary.frontier, vec!["Acc4"]);
        assert_eq!(summary.final_step, 2);
        assert_eq!(summary.reason, TerminationReason::MaxSteps);
        assert_eq!(summary.steps.len(), 2);
        assert_eq!(summary.steps[1].discovered, 1);
        assert_eq!(summary.steps[1].total_nodes, 4);
        assert!(summary.unexpanded.is_empty());

        assert_eq!(store.list_steps().expect("list"), vec![1, 2]);
        let step1 = store.load(1).expect("step 1");
        assert_eq!(step1.frontier, vec!["Acc2", "Acc3"]);
        assert_eq!(store.load_latest().expect("latest").root, scenario_tree());
    }

    #[tokio::test]
    async fn empty_frontier_terminates() {
        let dir = tempfile::tempdir().expect("temp dir");
        let api = MockApi::builder().with_recipients("Mint1", &[]).build();
        let crawler = crawler(api, CheckpointStore::new(dir.path()), config(5));

        let summary = crawler.run("Mint1").await.expect("crawl");

        assert_eq!(summary.reason, TerminationReason::FrontierExhausted);
        assert_eq!(summary.final_step, 1);
        assert_eq!(summary.root.node_count(), 1);
    }

    #[tokio::test]
    async fn frontier_never_exceeds_max_steps() {
        let dir = tempfile::tempdir().expect("temp dir");
        let api = MockApi::builder()
            .with_recipients("A0", &["A1"])
            .with_recipients("A1", &["A2"])
            .with_recipients("A2", &["A3"])
            .with_recipients("A3", &["A4"])
            .build();
        let crawler = crawler(api, CheckpointStore::new(dir.path()), config(3));

        let summary = crawler.run("A0").await.expect("crawl");

        assert_eq!(summary.root.max_depth(), 3);
        assert_eq!(summary.final_step, 3);
        assert_eq!(summary.frontier, vec!["A3"]);
    }

    #[tokio::test]
    async fn failed_address_is_skipped_and_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = CheckpointStore::new(dir.path());
        let api = MockApi::builder()
            .with_recipients("Mint1", &["Acc2", "Acc3"])
            .failing("Acc2")
            .with_recipients("Acc3", &["Acc6"])
            .build();
        let crawler = crawler(api, store.clone(), config(2));

        let summary = crawler.run("Mint1").await.expect("crawl");

        assert_eq!(summary.unexpanded, vec!["Acc2"]);
        assert_eq!(summary.frontier, vec!["Acc6"]);
        assert_eq!(summary.steps[1].failed, 1);
        assert_eq!(summary.steps[1].expanded, 1);
        assert_eq!(store.load(2).expect("checkpoint").unexpanded, vec!["Acc2"]);
    }

    #[tokio::test]
    async fn resumed_crawl_matches_uninterrupted_crawl() {
        let straight_dir = tempfile::tempdir().expect("temp dir");
        let straight = crawler(scenario_api(), CheckpointStore::new(straight_dir.path()), config(3))
            .run("Mint1")
            .await
            .expect("straight crawl");

        let dir = tempfile::tempdir().expect("temp dir");
        let store = CheckpointStore::new(dir.path());
        let first = crawler(scenario_api(), store.clone(), config(1))
            .run("Mint1")
            .await
            .expect("first leg");
        assert_eq!(first.final_step, 1);

        let resumed_config = CrawlConfig {
            resume: true,
            ..config(3)
        };
        let resumed = crawler(scenario_api(), store.clone(), resumed_config)
            .run("Mint1")
            .await
            .expect("resumed leg");

        assert_eq!(resumed.start_step, 1);
        assert_eq!(resumed.root, straight.root);
        assert_eq!(resumed.frontier, straight.frontier);
        assert_eq!(store.list_steps().expect("list"), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn resume_past_bound_makes_no_calls() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = CheckpointStore::new(dir.path());
        crawler(scenario_api(), store.clone(), config(2))
            .run("Mint1")
            .await
            .expect("first run");

        let api = Arc::new(scenario_api());
        let (_, throttle) = manual_throttle(0);
        let fetcher = TransferFetcher::new(api.clone(), throttle);
        let resumed = Crawler::new(
            fetcher,
            store,
            CrawlConfig {
                resume: true,
                ..config(2)
            },
        )
        .expect("valid config")
        .run("Mint1")
        .await
        .expect("resume");

        assert_eq!(resumed.reason, TerminationReason::MaxSteps);
        assert!(resumed.steps.is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn resume_without_checkpoint_starts_fresh() {
        let dir = tempfile::tempdir().expect("temp dir");
        let crawler = crawler(
            scenario_api(),
            CheckpointStore::new(dir.path()),
            CrawlConfig {
                resume: true,
                ..config(2)
            },
        );
        let summary = crawler.run("Mint1").await.expect("crawl");
        assert_eq!(summary.start_step, 0);
        assert_eq!(summary.root, scenario_tree());
    }

    #[tokio::test]
    async fn resume_rejects_other_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = CheckpointStore::new(dir.path());
        crawler(scenario_api(), store.clone(), config(1))
            .run("Mint1")
            .await
            .expect("first run");

        let err = crawler(
            scenario_api(),
            store,
            CrawlConfig {
                resume: true,
                ..config(2)
            },
        )
        .run("Other")
        .await
        .expect_err("root mismatch");
        assert!(matches!(err, CoreError::RootMismatch { .. }));
    }

    #[tokio::test]
    async fn fresh_run_over_existing_checkpoints_conflicts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = CheckpointStore::new(dir.path());
        crawler(scenario_api(), store.clone(), config(1))
            .run("Mint1")
            .await
            .expect("first run");

        let api = Arc::new(scenario_api());
        let (_, throttle) = manual_throttle(0);
        let fetcher = TransferFetcher::new(api.clone(), throttle);
        let err = Crawler::new(fetcher, store.clone(), config(1))
            .expect("valid config")
            .run("Mint1")
            .await
            .expect_err("step 1 already written");
        assert!(matches!(
            err,
            CoreError::Checkpoint(CheckpointError::Conflict { step: 1, .. })
        ));
        assert!(api.calls().is_empty());

        let overwriting = crawler(scenario_api(), store.with_overwrite(true), config(1))
            .run("Mint1")
            .await
            .expect("explicit overwrite starts fresh");
        assert_eq!(overwriting.final_step, 1);
    }

    #[tokio::test]
    async fn recurring_addresses_become_separate_nodes_by_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let api = MockApi::builder()
            .with_recipients("Mint1", &["A", "B"])
            .with_recipients("A", &["C", "Mint1"])
            .with_recipients("B", &["C"])
            .build();
        let summary = crawler(api, CheckpointStore::new(dir.path()), config(2))
            .run("Mint1")
            .await
            .expect("crawl");

        assert_eq!(summary.frontier, vec!["C", "Mint1", "C"]);
        assert_eq!(summary.root.node_count(), 6);
    }

    #[tokio::test]
    async fn dedup_flag_attaches_each_address_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let api = MockApi::builder()
            .with_recipients("Mint1", &["A", "B"])
            .with_recipients("A", &["C", "Mint1"])
            .with_recipients("B", &["C"])
            .build();
        let summary = crawler(
            api,
            CheckpointStore::new(dir.path()),
            CrawlConfig {
                dedup_addresses: true,
                ..config(2)
            },
        )
        .run("Mint1")
        .await
        .expect("crawl");

        assert_eq!(summary.frontier, vec!["C"]);
        assert_eq!(summary.root.node_count(), 4);
        assert_eq!(summary.steps[1].deduplicated, 2);
    }

    #[tokio::test]
    async fn stop_flag_ends_before_next_step() {
        let dir = tempfile::tempdir().expect("temp dir");
        let crawler = crawler(scenario_api(), CheckpointStore::new(dir.path()), config(3));
        crawler.stop_handle().store(true, Ordering::SeqCst);

        let summary = crawler.run("Mint1").await.expect("crawl");

        assert_eq!(summary.reason, TerminationReason::Stopped);
        assert!(summary.steps.is_empty());
        assert_eq!(summary.frontier, vec!["Mint1"]);
    }

    #[tokio::test]
    async fn concurrent_fetches_keep_frontier_order() {
        let api = || {
            MockApi::builder()
                .with_recipients("R", &["A", "B", "C", "D"])
                .with_recipients("A", &["A1", "A2"])
                .with_recipients("B", &["B1"])
                .with_recipients("C", &[])
                .with_recipients("D", &["D1"])
                .build()
        };
        let serial_dir = tempfile::tempdir().expect("temp dir");
        let serial = crawler(api(), CheckpointStore::new(serial_dir.path()), config(2))
            .run("R")
            .await
            .expect("serial");

        let parallel_dir = tempfile::tempdir().expect("temp dir");
        let parallel = crawler(
            api(),
            CheckpointStore::new(parallel_dir.path()),
            CrawlConfig {
                concurrency: 4,
                ..config(2)
            },
        )
        .run("R")
        .await
        .expect("parallel");

        assert_eq!(parallel.root, serial.root);
        assert_eq!(parallel.frontier, vec!["A1", "A2", "B1", "D1"]);
    }

    #[tokio::test]
    async fn cached_payload_yields_same_tree_as_live() {
        let payload = vec![transfer("Acc2", "Acc4")];

        let live_dir = tempfile::tempdir().expect("temp dir");
        let live = crawler(scenario_api(), CheckpointStore::new(live_dir.path()), config(2))
            .run("Mint1")
            .await
            .expect("live crawl");

        let dir = tempfile::tempdir().expect("temp dir");
        let cache = TransferCache::new(dir.path().join("transfers"));
        cache.store(1, "Acc2", &payload).expect("seed cache");
        let api = MockApi::builder()
            .with_recipients("Mint1", &["Acc2", "Acc3"])
            .failing("Acc2")
            .with_recipients("Acc3", &[])
            .build();
        let (_, throttle) = manual_throttle(0);
        let fetcher = TransferFetcher::new(Arc::new(api), throttle).with_cache(cache);
        let fallback = Crawler::new(
            fetcher,
            CheckpointStore::new(dir.path().join("checkpoints")),
            config(2),
        )
        .expect("valid config")
        .run("Mint1")
        .await
        .expect("fallback crawl");

        assert_eq!(fallback.root, live.root);
        assert!(fallback.unexpanded.is_empty());
    }

    #[tokio::test]
    async fn expand_step_works_on_a_standalone_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        let crawler = crawler(scenario_api(), CheckpointStore::new(dir.path()), config(5));
        let mut root = AccountNode::root("Mint1");
        root.add_child("Acc2");
        let state = CrawlState {
            root,
            frontier: vec![FrontierEntry {
                address: "Acc2".into(),
                path: vec![0],
            }],
            step: 1,
            unexpanded: Vec::new(),
        };

        let (next, stats) = crawler.expand_step(state).await.expect("expand");

        assert_eq!(next.step, 2);
        assert_eq!(next.frontier_addresses(), vec!["Acc4"]);
        assert_eq!(next.frontier[0].path, vec![0, 0]);
        assert_eq!(stats.discovered, 1);
        assert_eq!(stats.total_nodes, 3);
    }

    #[tokio::test]
    async fn calls_are_throttled_across_the_crawl() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (clock, throttle) = manual_throttle(200);
        let fetcher = TransferFetcher::new(Arc::new(scenario_api()), throttle);
        let crawler = Crawler::new(fetcher, CheckpointStore::new(dir.path()), config(2))
            .expect("valid config");

        crawler.run("Mint1").await.expect("crawl");

        // Mint1, Acc2, Acc3: three calls, two waits.
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(200); 2]);
    }
}
