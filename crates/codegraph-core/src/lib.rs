//! codegraph-core: Shared types, the graph-store contract, configuration and
//! errors for the codegraph indexing engine.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
