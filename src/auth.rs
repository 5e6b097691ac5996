//! Proxy user authentication.
//!
//! Holds the configured proxy users and guards the admin listener with
//! HTTP Basic authentication against them.

use crate::bootstrap::ProxyContext;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// A proxy user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyUser {
    /// Never serialized back out
    #[serde(skip_serializing)]
    pub password: String,
    /// Schemas this user may access. Empty means all schemas.
    #[serde(default)]
    pub authorized_schemas: Vec<String>,
}

impl ProxyUser {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            authorized_schemas: Vec::new(),
        }
    }

    pub fn with_schemas(mut self, schemas: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.authorized_schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Check whether this user may access a schema.
    pub fn can_access(&self, schema: &str) -> bool {
        self.authorized_schemas.is_empty() || self.authorized_schemas.iter().any(|s| s == schema)
    }
}

/// Authentication configuration for the proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(default)]
    users: IndexMap<String, ProxyUser>,
}

impl Authentication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: impl Into<String>, user: ProxyUser) -> Self {
        self.users.insert(username.into(), user);
        self
    }

    /// Validate the configured users.
    pub fn validate(&self) -> Result<(), String> {
        for (name, user) in &self.users {
            if name.trim().is_empty() {
                return Err("Empty user name in authentication configuration".to_string());
            }
            if user.password.is_empty() {
                return Err(format!("User '{}' has an empty password", name));
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    /// Verify credentials, returning the user on success.
    pub fn verify(&self, username: &str, password: &str) -> Option<&ProxyUser> {
        let user = self.users.get(username)?;
        if constant_time_eq(password.as_bytes(), user.password.as_bytes()) {
            Some(user)
        } else {
            None
        }
    }
}

/// Authentication middleware for admin HTTP requests.
///
/// Requests pass through untouched while no context is published or no
/// users are configured. Otherwise the verified [`ProxyUser`] is attached
/// as a request extension.
pub async fn auth_middleware(
    State(context): State<Arc<ProxyContext>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(snapshot) = context.snapshot() else {
        return next.run(request).await;
    };
    let authentication = snapshot.schema_contexts().authentication();
    if !authentication.is_enabled() {
        return next.run(request).await;
    }

    let (username, password) = match extract_basic_credentials(&request) {
        Ok(Some(credentials)) => credentials,
        Ok(None) => {
            warn!("Authentication failed: missing Authorization header");
            return unauthorized_response(
                "Missing Basic credentials in Authorization header",
                "Include proxy user credentials: 'Authorization: Basic <base64(user:password)>'",
            );
        }
        Err(msg) => {
            warn!("Authentication failed: invalid header format");
            return unauthorized_response(msg, "Use the format: 'Authorization: Basic <credentials>'");
        }
    };

    if let Some(user) = authentication.verify(&username, &password) {
        request.extensions_mut().insert(user.clone());
        next.run(request).await
    } else {
        warn!(user = %username, "Authentication failed: invalid credentials");
        unauthorized_response(
            "Invalid user name or password",
            "Check the proxy users in the authentication configuration",
        )
    }
}

fn extract_basic_credentials(
    request: &Request<Body>,
) -> Result<Option<(String, String)>, &'static str> {
    let Some(auth_header) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let Some(encoded) = auth_str.strip_prefix("Basic ") else {
        return Err("Invalid Authorization header format. Expected 'Basic <credentials>'");
    };

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| "Basic credentials are not valid base64")?;
    let decoded = String::from_utf8(decoded).map_err(|_| "Basic credentials are not UTF-8")?;

    match decoded.split_once(':') {
        Some((user, password)) if !user.is_empty() => {
            Ok(Some((user.to_string(), password.to_string())))
        }
        _ => Err("Basic credentials must be 'user:password'"),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn unauthorized_response(message: impl Into<String>, suggestion: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
        suggestion: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code: "unauthorized",
            message: message.into(),
            suggestion: suggestion.into(),
        },
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| {
        r#"{"error":{"code":"unauthorized","message":"Authentication failed"}}"#.to_string()
    });

    (
        StatusCode::UNAUTHORIZED,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::WWW_AUTHENTICATE, "Basic realm=\"db-proxy\""),
        ],
        json,
    )
        .into_response()
}
