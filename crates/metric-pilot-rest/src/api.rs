// crates/metric-pilot-rest/src/api.rs
// ============================================================================
// Module: REST API Plumbing
// Description: Error rendering, auth extraction, and bounded JSON bodies.
// Purpose: Map transport concerns onto the core error taxonomy.
// Dependencies: axum, metric-pilot-core, serde_json
// ============================================================================

//! ## Overview
//! Three pieces of plumbing shared by every route: [`ApiError`] renders a
//! [`CoreError`] as the documented wire shape, [`Ctx`] resolves the caller's
//! auth context from headers, and [`ApiJson`] deserializes request bodies
//! with the 1 MiB cap mapped to 413 and malformed JSON mapped to 400.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Response;
use metric_pilot_core::AuthContext;
use metric_pilot_core::CoreError;
use metric_pilot_core::ErrorKind;
use metric_pilot_core::Timestamp;
use serde_json::json;

/// Request body cap in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

// ============================================================================
// SECTION: Time
// ============================================================================

/// Returns the wall-clock timestamp supplied to core operations.
#[must_use]
pub fn now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Timestamp::from_unix_millis(millis)
}

// ============================================================================
// SECTION: Error Rendering
// ============================================================================

/// Transport wrapper rendering a [`CoreError`] as the wire shape.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status_code = error.http_status();
        let status =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": error.message,
            "statusCode": status_code,
        });
        if !error.checks.is_empty()
            && let Ok(checks) = serde_json::to_value(&error.checks)
            && let Some(map) = body.as_object_mut()
        {
            map.insert("checks".to_string(), checks);
        }
        if let Some(details) = error.details
            && let Some(map) = body.as_object_mut()
        {
            map.insert("details".to_string(), details);
        }
        (status, Json(body)).into_response()
    }
}

/// Route result alias.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// SECTION: Auth Extraction
// ============================================================================

/// Tenant-scoped auth context extractor.
#[derive(Debug, Clone)]
pub struct Ctx(pub AuthContext);

/// Copies the auth-relevant headers into a plain map for the core resolver.
fn header_map(parts: &Parts) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for name in ["x-tenant-id", "x-user-id", "x-user-role", "x-channel-id"] {
        if let Some(value) = parts.headers.get(name).and_then(|value| value.to_str().ok()) {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    headers
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = header_map(parts);
        AuthContext::resolve(&headers).map(Ctx).map_err(ApiError)
    }
}

// ============================================================================
// SECTION: Bounded JSON Bodies
// ============================================================================

/// JSON body extractor with the documented error mapping.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let kind = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ErrorKind::PayloadTooLarge
                } else {
                    ErrorKind::BadRequest
                };
                Err(ApiError(CoreError::new(kind, rejection.body_text())))
            }
        }
    }
}
