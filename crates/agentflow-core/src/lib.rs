pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use descriptor::{Describe, ParamSpec, TypeDescriptor};
pub use error::{AgentflowError, Result};
pub use event::EventBus;
pub use types::*;
