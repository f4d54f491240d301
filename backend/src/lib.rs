pub mod audit;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod models;
pub mod relay;
pub mod routes;
pub mod test_util;

pub use audit::{CallLogError, CallLogger};
pub use config::{Config, ServerProfile};
pub use error::ApiError;
pub use llm::{InferenceBackend, UpstreamError, VllmClient};
pub use relay::{BatchEvent, BatchMultiplexer, BatchRequest, BatchStream, RelayError};

use std::sync::Arc;

use axum::Router;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub llm_client: Arc<VllmClient>,
    pub call_logger: Arc<CallLogger>,
    pub multiplexer: BatchMultiplexer,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, CallLogError> {
        let call_logger = Arc::new(CallLogger::new(&config.database.path)?);
        let llm_client = Arc::new(VllmClient::new(config.relay.max_completion_tokens));
        let multiplexer = BatchMultiplexer::new(
            llm_client.clone(),
            call_logger.clone(),
            config.relay.max_batch_size,
        );
        Ok(Self {
            config,
            llm_client,
            call_logger,
            multiplexer,
        })
    }
}

/// Assemble the full API router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health::router(state.clone()))
        .merge(routes::chat::router(state.clone()))
        .merge(routes::completions::router(state.clone()))
        .merge(routes::servers::router(state.clone()))
        .merge(routes::prompts::router(state))
}
