use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
struct ServerEntry {
    name: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ServersResponse {
    default: String,
    servers: Vec<ServerEntry>,
}

/// GET /servers - the configured inference server profiles.
///
/// Profiles are fixed at startup; callers pick one per request via the
/// `server` field on the chat and completion endpoints.
async fn list_servers(State(state): State<Arc<AppState>>) -> Json<ServersResponse> {
    let mut servers: Vec<ServerEntry> = state
        .config
        .profiles
        .iter()
        .map(|(name, profile)| ServerEntry {
            name: name.clone(),
            base_url: profile.base_url.clone(),
            model: profile.model.clone(),
        })
        .collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));

    Json(ServersResponse {
        default: state.config.default_profile.clone(),
        servers,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/servers", get(list_servers))
        .with_state(state)
}
