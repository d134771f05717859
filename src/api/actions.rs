//! Login and action endpoints

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::AppState;
use crate::actions::ApiEnvelope;
use crate::services::auth::verify_login;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub wallpaper: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub cmd: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeyQuery {
    #[serde(default)]
    pub apikey: Option<String>,
}

/// Extract bearer token from Authorization header
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Api key from the Authorization header (bare or bearer) or the `apikey` query
fn extract_api_key<'a>(headers: &'a HeaderMap, query: &'a ApiKeyQuery) -> Option<&'a str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h))
        .or(query.apikey.as_deref())
        .filter(|k| !k.is_empty())
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "code": -1, "msg": "unauthorized access" })),
    )
}

/// Data the login page renders before a session exists
async fn login_page(State(state): State<AppState>) -> Json<LoginPage> {
    Json(LoginPage {
        wallpaper: state.wallpaper.current(),
    })
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<Value>)> {
    let settings = state.actions.settings.snapshot();
    let user = verify_login(&settings, &state.db.users(), &body.username, &body.password)
        .await
        .map_err(|e| {
            warn!(error = %e, "Login check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "code": -1, "msg": e.to_string() })),
            )
        })?;

    let Some(user) = user else {
        info!(user = %body.username, "Login rejected");
        return Err(unauthorized());
    };
    info!(user = %user.name, "User logged in");
    let token = state.actions.sessions.issue(user);
    Ok(Json(LoginResponse { token }))
}

/// Page actions, authenticated by a session token
async fn do_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(token) = extract_token(&headers) else {
        return Err(unauthorized());
    };
    let Some(user) = state.actions.sessions.validate(token) else {
        return Err(unauthorized());
    };
    debug!(user = %user.name, cmd = %body.cmd, "Page action");
    Ok(Json(state.actions.action_as(&body.cmd, body.data, Some(token)).await))
}

/// Script actions, authenticated by the configured api key
async fn api_action(
    State(state): State<AppState>,
    Path(cmd): Path<String>,
    Query(query): Query<ApiKeyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<ApiEnvelope>) {
    let settings = state.actions.settings.snapshot();
    let authorized = match (settings.api_key(), extract_api_key(&headers, &query)) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiEnvelope {
                code: -1,
                success: false,
                message: "security verification failed".to_string(),
                data: Value::Null,
            }),
        );
    }

    let data = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(data) => data,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiEnvelope {
                        code: -1,
                        success: false,
                        message: format!("invalid request: {}", e),
                        data: Value::Null,
                    }),
                );
            }
        }
    };
    (StatusCode::OK, Json(state.actions.api_action(&cmd, data).await))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/do", post(do_action))
        .route("/api/v1/action/{cmd}", post(api_action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_api_key_sources() {
        let mut headers = HeaderMap::new();
        let query = ApiKeyQuery {
            apikey: Some("from-query".to_string()),
        };
        assert_eq!(extract_api_key(&headers, &query), Some("from-query"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(extract_api_key(&headers, &query), Some("secret"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("secret"));
        assert_eq!(extract_api_key(&headers, &ApiKeyQuery::default()), Some("secret"));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers), Some("abc"));
    }
}
