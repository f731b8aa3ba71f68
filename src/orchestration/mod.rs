//! Orchestration layer of the revision pipeline
//!
//! Leaves first: fetcher, allocator, bumper, tester and gate are composed
//! by [`PackagePipeline`] for one package; [`BatchOrchestrator`] runs many
//! pipelines with bounded concurrency.

pub mod batch_orchestrator;
pub mod dependency_bumper;
pub mod manifest_fetcher;
pub mod package_pipeline;
pub mod package_tester;
pub mod publish_gate;
pub mod revision_allocator;

// Re-export main types for convenience
pub use batch_orchestrator::{BatchItemOutcome, BatchOptions, BatchOrchestrator, BatchResult, ItemState};
pub use dependency_bumper::{BumpResult, DependencyBumper, DependencyEdge, DependencyWarning, WarningKind};
pub use manifest_fetcher::ManifestFetcher;
pub use package_pipeline::{
    PackagePipeline, PackageRunner, PipelineOptions, PipelineReport, PipelineServices,
};
pub use package_tester::{InstallOutcome, PackageTester, TestReport};
pub use publish_gate::{GateDecision, PublishGate};
pub use revision_allocator::RevisionAllocator;
