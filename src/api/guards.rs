use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};

use crate::api::errors::ApiError;
use crate::core::state::AppState;

const TOKEN_HEADER: &str = "token";

/// Present only when the request carries the configured API token.
pub(crate) struct ApiToken;

#[async_trait]
impl FromRequestParts<AppState> for ApiToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Access is denied"))?;

        if token == state.settings().api().api_token {
            Ok(ApiToken)
        } else {
            Err(ApiError::Unauthorized("Access is denied"))
        }
    }
}

/// Address of the submitter as reported by the reverse proxy, or `-`.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    header_value(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
        .unwrap_or("-")
        .to_string()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
