pub mod config;
pub mod config_loader;
pub mod error;
pub mod manifest;
pub mod retry;
pub mod state_machine;
pub mod traits;
pub mod types;

pub use config::{DepupConfig, NpmAccess, Settings, Timeouts};
pub use config_loader::{ConfigLoadOptions, ConfigLoader, ConfigValidationResult};
pub use error::*;
pub use manifest::*;
pub use retry::*;
pub use state_machine::*;
pub use traits::*;
pub use types::*;
