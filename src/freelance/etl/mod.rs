pub mod coerce;
pub mod config;
pub mod error;
pub mod identity;
pub mod io;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod partition;
pub mod phases;
pub mod schema;
pub mod validate;

pub use config::PipelineConfig;
pub use error::{ErrorClass, EtlError, Result, ValidationError};
