pub mod chat;
pub mod completions;
pub mod health;
pub mod prompts;
pub mod servers;

use crate::config::ServerProfile;
use crate::error::ApiError;
use crate::AppState;

/// Resolve the server profile a request asked for (or the default).
pub(crate) fn resolve_profile(
    state: &AppState,
    server: Option<&str>,
) -> Result<ServerProfile, ApiError> {
    let name = server.unwrap_or(&state.config.default_profile);
    state
        .config
        .profile(Some(name))
        .cloned()
        .ok_or_else(|| ApiError::UnknownProfile(name.to_string()))
}
