pub mod core;
pub mod ledger;
pub mod orchestration;
pub mod plugins;
pub mod security;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use crate::core::*;
pub use ledger::{IntegrityLedger, IntegrityReport, IntegritySnapshot, IntegrityStatus, RevisionStore};
pub use orchestration::{
    BatchOptions, BatchOrchestrator, BatchResult, PackagePipeline, PipelineOptions,
    PipelineReport, PipelineServices,
};
pub use plugins::{NpmInstaller, NpmPublisher, NpmRegistry};
pub use security::{CommandError, SafeCommandExecutor, SecureTokenManager};
