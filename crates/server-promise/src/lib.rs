pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod provider;

pub use bridge::{PendingSignal, Suspend, use_server_promise};
pub use cache::Cache;
pub use config::{Config, Mode};
pub use error::{Result, ServerPromiseError};
pub use provider::{
    Diagnostic, ProviderOptions, Rendered, ServerPromiseContext, ServerPromiseProvider,
};
