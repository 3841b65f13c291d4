// Content Forensics Core Services

pub mod comparison;
pub mod config_store;
pub mod display;
pub mod inference;
pub mod providers;
pub mod session;
pub mod transform;

pub use comparison::*;
pub use config_store::*;
pub use display::*;
pub use providers::*;
pub use session::*;
pub use transform::*;

// Re-export the inference surface used by the binary
pub use inference::{analyze, AnalysisError, ArtifactError, ModelBundle, ModelError, ModelRegistry};
