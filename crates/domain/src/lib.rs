pub mod entities;
pub mod ledger;
pub mod messaging;
pub mod repositories;
pub mod services;

pub use entities::*;
pub use ledger::*;
pub use messaging::*;
pub use pipeline_core::{PipelineError, PipelineResult};
pub use repositories::*;
pub use services::*;
