//! npm-backed implementations of the capability traits

pub mod npm_installer;
pub mod npm_publisher;
pub mod npm_registry;

pub use npm_installer::NpmInstaller;
pub use npm_publisher::NpmPublisher;
pub use npm_registry::NpmRegistry;
