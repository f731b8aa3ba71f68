//! Persistent revision status and community integrity data
//!
//! Layout under the store root:
//!
//! ```text
//! {store}/{packageDir}/revisions.json
//! {store}/{packageDir}/integrity.json
//! {store}/{packageDir}/{baseVersion}/rev-{N}/
//! ```

mod json_file;
pub mod integrity;
pub mod report;
pub mod revision_store;

pub use integrity::{IntegrityLedger, IntegritySnapshot, IntegrityStatus, RevisionIntegrity, VoteDetail};
pub use report::IntegrityReport;
pub use revision_store::{RevisionEntry, RevisionRecord, RevisionStore};
