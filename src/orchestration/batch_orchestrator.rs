//! Batch Orchestrator - runs many package pipelines with bounded concurrency
//!
//! Features:
//! - Fixed-size groups of `concurrency` items, a pacing delay between groups
//! - Failure isolation: an error or a panic only fails its own item
//! - De-duplication of the worklist; one package name never runs twice in
//!   the same group, so a partition always has a single writer

use crate::core::config::Settings;
use crate::core::types::PackageSpec;
use crate::orchestration::package_pipeline::{PackageRunner, PipelineOptions, PipelineReport};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Batch options
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Items per group (default: 5)
    pub concurrency: usize,

    /// Pause between two groups
    pub delay: Duration,

    /// Options passed to each pipeline run
    pub pipeline: PipelineOptions,
}

impl BatchOptions {
    pub fn from_settings(settings: &Settings, pipeline: PipelineOptions) -> Self {
        Self {
            concurrency: settings.concurrency,
            delay: settings.batch_delay,
            pipeline,
        }
    }
}

/// Lifecycle of one batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutcome {
    pub spec: String,
    pub state: ItemState,
    pub report: Option<PipelineReport>,
    pub error: Option<String>,
}

/// Batch result, outcomes in worklist order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub outcomes: Vec<BatchItemOutcome>,
    /// Specs dropped because they were already on the worklist
    pub duplicates: Vec<String>,
    pub groups: usize,
    pub max_observed_running: usize,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn succeeded(&self) -> impl Iterator<Item = &BatchItemOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == ItemState::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchItemOutcome> {
        self.outcomes.iter().filter(|o| o.state == ItemState::Failed)
    }

    pub fn success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Drop repeated specs, keeping the first occurrence
fn dedupe(specs: Vec<PackageSpec>) -> (Vec<PackageSpec>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut duplicates = Vec::new();
    for spec in specs {
        if seen.insert((spec.name.clone(), spec.version_or_tag().to_string())) {
            unique.push(spec);
        } else {
            duplicates.push(spec.to_string());
        }
    }
    (unique, duplicates)
}

/// Split the worklist into groups of at most `size` items with distinct
/// package names; an item whose name is taken waits for a later group
fn plan_groups(specs: &[PackageSpec], size: usize) -> Vec<Vec<usize>> {
    let size = size.max(1);
    let mut queue: VecDeque<usize> = (0..specs.len()).collect();
    let mut groups = Vec::new();

    while !queue.is_empty() {
        let mut group = Vec::new();
        let mut names = BTreeSet::new();
        let mut deferred = VecDeque::new();

        while let Some(idx) = queue.pop_front() {
            if group.len() < size && names.insert(specs[idx].name.as_str()) {
                group.push(idx);
            } else {
                deferred.push_back(idx);
            }
        }

        queue = deferred;
        groups.push(group);
    }
    groups
}

/// Tracks how many items are running right now and the peak
#[derive(Default)]
struct RunningGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl RunningGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the gauge even when the pipeline panics
struct RunningGuard(Arc<RunningGauge>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.leave();
    }
}

pub struct BatchOrchestrator {
    runner: Arc<dyn PackageRunner>,
}

impl BatchOrchestrator {
    pub fn new(runner: Arc<dyn PackageRunner>) -> Self {
        Self { runner }
    }

    /// Run every spec of the worklist
    pub async fn run(&self, specs: Vec<PackageSpec>, options: &BatchOptions) -> BatchResult {
        let started = Instant::now();
        let (specs, duplicates) = dedupe(specs);
        for duplicate in &duplicates {
            warn!("{} is listed more than once, running it once", duplicate);
        }

        let groups = plan_groups(&specs, options.concurrency);
        println!(
            "\n📦 Batch processing {} package(s) in {} group(s) (max {} concurrent)\n",
            specs.len(),
            groups.len(),
            options.concurrency.max(1)
        );

        let mut outcomes: Vec<BatchItemOutcome> = specs
            .iter()
            .map(|spec| BatchItemOutcome {
                spec: spec.to_string(),
                state: ItemState::Pending,
                report: None,
                error: None,
            })
            .collect();
        let gauge = Arc::new(RunningGauge::default());

        for (group_number, group) in groups.iter().enumerate() {
            if group_number > 0 && !options.delay.is_zero() {
                debug!("pausing {:?} before group {}", options.delay, group_number + 1);
                tokio::time::sleep(options.delay).await;
            }

            let mut join_set = JoinSet::new();
            for &idx in group {
                outcomes[idx].state = ItemState::Running;
                let runner = Arc::clone(&self.runner);
                let gauge = Arc::clone(&gauge);
                let spec = specs[idx].clone();
                let pipeline_options = options.pipeline.clone();

                join_set.spawn(async move {
                    gauge.enter();
                    let _guard = RunningGuard(gauge);
                    let report = runner.run(&spec, &pipeline_options).await;
                    (idx, report)
                });
            }

            let mut panics = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((idx, report)) => {
                        let outcome = &mut outcomes[idx];
                        if report.success() {
                            outcome.state = ItemState::Succeeded;
                        } else {
                            outcome.state = ItemState::Failed;
                            outcome.error = report.error.clone();
                        }
                        outcome.report = Some(report);
                    }
                    Err(e) => panics.push(e.to_string()),
                }
            }

            // a panicked task never hands its index back
            for &idx in group {
                if outcomes[idx].state == ItemState::Running {
                    let message = format!("task failed: {}", panics.join("; "));
                    warn!("{}: {}", outcomes[idx].spec, message);
                    outcomes[idx].state = ItemState::Failed;
                    outcomes[idx].error = Some(message);
                }
            }
        }

        let result = BatchResult {
            outcomes,
            duplicates,
            groups: groups.len(),
            max_observed_running: gauge.peak.load(Ordering::SeqCst),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        Self::print_summary(&result);
        result
    }

    /// Print batch summary
    fn print_summary(result: &BatchResult) {
        println!("\n{}", "=".repeat(60));
        println!("📊 Batch Summary");
        println!("{}", "=".repeat(60));

        let succeeded: Vec<&BatchItemOutcome> = result.succeeded().collect();
        println!("\n✅ Succeeded: {}", succeeded.len());
        for outcome in succeeded {
            let detail = outcome
                .report
                .as_ref()
                .map(|r| {
                    format!(
                        "{} ({})",
                        r.produced_version.as_deref().unwrap_or("-"),
                        r.status.map(|s| s.as_str()).unwrap_or("planned")
                    )
                })
                .unwrap_or_default();
            println!("   - {} {}", outcome.spec, detail);
        }

        let failed: Vec<&BatchItemOutcome> = result.failed().collect();
        println!("\n❌ Failed: {}", failed.len());
        for outcome in failed {
            let needs_operator = outcome.report.as_ref().is_some_and(|r| !r.recoverable);
            println!(
                "   - {}: {}{}",
                outcome.spec,
                outcome.error.as_deref().unwrap_or("unknown error"),
                if needs_operator { " (fix before retrying)" } else { "" }
            );
        }

        if !result.duplicates.is_empty() {
            println!("\n⏭️  Duplicates dropped: {}", result.duplicates.len());
        }

        println!("\n{}", "=".repeat(60));
        println!(
            "Overall Status: {} ({} group(s), peak {} running, {}ms)",
            if result.success() { "✅ SUCCESS" } else { "❌ FAILED" },
            result.groups,
            result.max_observed_running,
            result.duration_ms
        );
        println!("{}\n", "=".repeat(60));
    }
}
