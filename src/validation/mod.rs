pub mod dependency_checker;
pub mod manifest_validator;
pub mod version_validator;

pub use dependency_checker::{DeclarationKind, Dependency, DependencyCheckResult, DependencyChecker};
pub use manifest_validator::{ManifestValidator, ValidationResult, scoped_name};
pub use version_validator::{
    VersionValidator, parse_produced_version, produce_version, repair_legacy_version,
};
