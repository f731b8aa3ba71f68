//! Package Pipeline - one revision of one package, end to end
//!
//! Manages the complete revision workflow:
//! - Manifest resolution and revision allocation
//! - Extraction into `{store}/{pkg}/{base}/rev-{N}` and manifest rewrite
//! - Dependency bump, install/import checks (both optional)
//! - Publish gate and the final status record
//!
//! Steps run strictly in order and every run ends with a status entry once
//! its revision directory exists: `published` only when the publisher
//! confirmed, `failed` on any error.

use crate::core::config::Settings;
use crate::core::error::Result;
use crate::core::retry::with_timeout;
use crate::core::manifest::PackageManifest;
use crate::core::state_machine::{PipelineStage, StageTracker, StageTransition};
use crate::core::traits::{Installer, PublishReceipt, Publisher, Registry};
use crate::core::types::{PackageRef, PackageSpec, RevisionKey, RevisionStatus};
use crate::ledger::{IntegrityLedger, RevisionStore};
use crate::orchestration::dependency_bumper::{BumpResult, DependencyBumper};
use crate::orchestration::manifest_fetcher::ManifestFetcher;
use crate::orchestration::package_tester::{PackageTester, TestReport};
use crate::orchestration::publish_gate::{GateDecision, PublishGate};
use crate::orchestration::revision_allocator::RevisionAllocator;
use crate::plugins::{NpmInstaller, NpmPublisher, NpmRegistry};
use crate::security::token_manager::SecureTokenManager;
use crate::validation::manifest_validator::scoped_name;
use crate::validation::version_validator::produce_version;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-run switches passed from the CLI
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Rewrite dependencies to their latest versions
    pub bump: bool,

    /// Run the install/import checks
    pub test: bool,

    /// Publish when the gate allows it
    pub publish: bool,

    /// Resolve and allocate only; nothing is written
    pub dry_run: bool,

    /// Whole-run timeout (default: `timeouts.operationSecs`)
    pub timeout: Option<Duration>,
}

/// Report of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub spec: String,
    pub package: Option<PackageRef>,
    pub index: Option<u64>,
    pub produced_version: Option<String>,
    pub scoped_name: Option<String>,
    /// Last status written to the ledger; `None` when nothing was recorded
    pub status: Option<RevisionStatus>,
    pub dry_run: bool,
    pub bump: Option<BumpResult>,
    pub test: Option<TestReport>,
    pub decision: Option<GateDecision>,
    pub receipt: Option<PublishReceipt>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    /// `false` when the failure needs operator action before a retry
    pub recoverable: bool,
    pub stage: PipelineStage,
    /// Stage that was running when the run failed
    pub failed_at: Option<PipelineStage>,
    pub transitions: Vec<StageTransition>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub(crate) fn new(spec: &PackageSpec, dry_run: bool) -> Self {
        Self {
            spec: spec.to_string(),
            package: None,
            index: None,
            produced_version: None,
            scoped_name: None,
            status: None,
            dry_run,
            bump: None,
            test: None,
            decision: None,
            receipt: None,
            error: None,
            error_code: None,
            recoverable: true,
            stage: PipelineStage::Pending,
            failed_at: None,
            transitions: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn key(&self) -> Option<RevisionKey> {
        Some(self.package.as_ref()?.revision(self.index?))
    }
}

/// Capabilities a pipeline talks to
#[derive(Clone)]
pub struct PipelineServices {
    pub registry: Arc<dyn Registry>,
    pub installer: Arc<dyn Installer>,
    pub publisher: Arc<dyn Publisher>,
    pub tokens: Arc<SecureTokenManager>,
}

impl PipelineServices {
    /// npm registry, npm/node CLIs and the token from the environment
    pub fn npm(settings: &Settings) -> Self {
        Self {
            registry: Arc::new(NpmRegistry::new(settings.registry_url.clone())),
            installer: Arc::new(NpmInstaller::new()),
            publisher: Arc::new(NpmPublisher::new(settings.registry_url.clone())),
            tokens: Arc::new(SecureTokenManager::from_env()),
        }
    }
}

/// Runs one package spec through every step
#[async_trait]
pub trait PackageRunner: Send + Sync {
    async fn run(&self, spec: &PackageSpec, options: &PipelineOptions) -> PipelineReport;
}

/// Main revision pipeline
pub struct PackagePipeline {
    settings: Settings,
    fetcher: Arc<ManifestFetcher>,
    allocator: RevisionAllocator,
    bumper: DependencyBumper,
    tester: PackageTester,
    gate: PublishGate,
    ledger: IntegrityLedger,
}

impl PackagePipeline {
    pub fn new(settings: Settings, services: PipelineServices) -> Self {
        let store = RevisionStore::new(settings.store_dir.clone());
        let fetcher = Arc::new(ManifestFetcher::new(
            services.registry,
            settings.retry.clone(),
            settings.timeouts.registry,
        ));

        Self {
            bumper: DependencyBumper::new(fetcher.clone(), settings.timeouts.dependency),
            fetcher,
            allocator: RevisionAllocator::new(store.clone()),
            tester: PackageTester::new(services.installer, &settings.timeouts),
            gate: PublishGate::new(services.publisher, services.tokens, &settings),
            ledger: IntegrityLedger::new(store),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &IntegrityLedger {
        &self.ledger
    }

    /// Run the pipeline for one spec
    ///
    /// Never returns an error: failures end up in the report and, once a
    /// revision exists, as a `failed` status entry.
    pub async fn run(&self, spec: &PackageSpec, options: &PipelineOptions) -> PipelineReport {
        let started = Instant::now();
        let mut report = PipelineReport::new(spec, options.dry_run);
        let mut tracker = StageTracker::new();
        // status to record if the run stops before its final record
        let mut fallback: Option<(RevisionKey, RevisionStatus)> = None;
        let limit = options.timeout.unwrap_or(self.settings.timeouts.operation);

        let result = with_timeout(
            || format!("process {}", spec),
            limit,
            self.execute(spec, options, &mut report, &mut tracker, &mut fallback),
        )
        .await;

        if let Err(error) = result {
            tracker.fail(error.to_string());
            println!("  ❌ [{}] {}", spec, error);
            for action in error.suggested_actions() {
                debug!("suggested: {}", action);
            }
            report.error_code = Some(error.code().to_string());
            report.recoverable = error.is_recoverable();
            report.error = Some(error.to_string());

            if let Some((key, status)) = &fallback {
                match self.ledger.record_outcome(key, *status, Utc::now()).await {
                    Ok(_) => report.status = Some(*status),
                    Err(e) => warn!("{}: {} could not be recorded: {}", key, status, e),
                }
            }
        }

        report.stage = tracker.stage();
        if tracker.stage() == PipelineStage::Failed {
            report.failed_at = Some(tracker.last_active_stage());
        }
        debug!("{} stage history:\n{}", spec, tracker.history());
        report.transitions = tracker.transitions().to_vec();
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn execute(
        &self,
        spec: &PackageSpec,
        options: &PipelineOptions,
        report: &mut PipelineReport,
        tracker: &mut StageTracker,
        fallback: &mut Option<(RevisionKey, RevisionStatus)>,
    ) -> Result<()> {
        // 1. Resolve
        tracker.advance(PipelineStage::Fetching)?;
        println!("🔍 [{}] Resolving...", spec);
        let resolved = self.fetcher.fetch(spec).await?;
        let package = PackageRef::new(resolved.name, resolved.version);
        report.package = Some(package.clone());

        // 2. Allocate
        tracker.advance(PipelineStage::Allocating)?;
        let key = self.allocator.allocate(&package).await?;
        let produced = produce_version(&package.base_version, key.index);
        let target_name = scoped_name(&package.name, &self.settings.scope);
        report.index = Some(key.index);
        report.produced_version = Some(produced.clone());
        report.scoped_name = Some(target_name.clone());
        println!(
            "📦 [{}] {} → {}@{} (revision {})",
            spec, package, target_name, produced, key.index
        );

        if options.dry_run {
            println!("  🧪 Dry-run: nothing was written");
            tracker.advance(PipelineStage::Succeeded)?;
            return Ok(());
        }

        let dir = self.ledger.store().create_revision_dir(&key).await?;
        *fallback = Some((key.clone(), RevisionStatus::Failed));
        self.ledger
            .record_outcome(&key, RevisionStatus::Prepared, Utc::now())
            .await?;
        report.status = Some(RevisionStatus::Prepared);

        let exact = PackageSpec::new(package.name.clone(), Some(package.base_version.clone()));
        let extract_timeout = self.settings.timeouts.extract;
        with_timeout(
            || format!("extract {}", exact),
            extract_timeout,
            self.fetcher.registry().extract(&exact, &dir, extract_timeout),
        )
        .await?;

        let mut manifest = PackageManifest::load(&dir).await?;
        manifest.name = target_name;
        manifest.version = produced;
        manifest.save(&dir).await?;
        debug!("prepared {} in {}", key, dir.display());

        // 3. Bump
        let mut updated = 0;
        if options.bump {
            tracker.advance(PipelineStage::Bumping)?;
            println!("⬆️  [{}] Bumping dependencies...", spec);
            let bump = self.bumper.bump(&mut manifest).await;
            manifest.save(&dir).await?;

            println!(
                "  ✅ {} dependency update(s), {} warning(s)",
                bump.updated_count,
                bump.warnings.len()
            );
            for warning in &bump.warnings {
                println!("    ⚠️  {}: {}", warning.dependency, warning.message);
            }
            updated = bump.updated_count;
            report.bump = Some(bump);
        }

        // 4. Test
        if options.test {
            tracker.advance(PipelineStage::Testing)?;
            println!("🧪 [{}] Testing install and import...", spec);
            let test = self.tester.test(&dir, &manifest).await?;

            match (&test.install.strategy, test.install_failure(&manifest.name)) {
                (Some(strategy), _) => println!("  ✅ Install ok ({})", strategy.as_str()),
                (None, Some(flag)) => println!("  ⚠️  {}", flag),
                (None, None) => {}
            }
            match (&test.import, &test.import_error) {
                (Some(import), _) => println!("  ✅ Import ok: {}", import.summary()),
                (None, Some(error)) => println!("  ⚠️  Import test failed: {}", error),
                (None, None) => {}
            }
            report.test = Some(test);
        }

        // 5. Gate
        tracker.advance(PipelineStage::Gating)?;
        let decision = GateDecision::decide(key.index, updated, options.publish);
        report.decision = Some(decision);

        let status = if decision.should_publish() {
            println!("📤 [{}] Publishing {}@{}...", spec, manifest.name, manifest.version);
            let receipt = self.gate.publish(&dir, &manifest).await?;
            // the artifact is live, a later failure must not mark it failed
            *fallback = Some((key.clone(), RevisionStatus::Published));
            println!("  ✅ Published: {}", receipt.package_url);
            report.receipt = Some(receipt);
            RevisionStatus::Published
        } else {
            println!("⏭️  [{}] Not published: {}", spec, decision.reason());
            RevisionStatus::Skipped
        };

        // 6. Record
        tracker.advance(PipelineStage::Recording)?;
        self.ledger.record_outcome(&key, status, Utc::now()).await?;
        *fallback = None;
        report.status = Some(status);

        tracker.advance(PipelineStage::Succeeded)?;
        Ok(())
    }
}

#[async_trait]
impl PackageRunner for PackagePipeline {
    async fn run(&self, spec: &PackageSpec, options: &PipelineOptions) -> PipelineReport {
        PackagePipeline::run(self, spec, options).await
    }
}
