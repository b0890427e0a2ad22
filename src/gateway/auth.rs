//! Authentication middleware
//!
//! Supports:
//! - User bearer tokens, verified against the data service and carried
//!   through to every downstream call
//! - A service bearer token for operational endpoints
//! - Per-user rate limiting
//! - Public paths that bypass authentication
//!
//! The gateway holds no credential store of its own. A user token is
//! opaque here; the data service verifies it and reports the user's
//! profile, including the action mode for this turn.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::data::DataService;
use crate::policy::ActionMode;

/// Type alias for our rate limiter
type UserRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Resolved authentication state shared across requests
pub struct AuthState {
    /// Whether auth is enforced
    pub enabled: bool,
    /// Resolved service bearer token
    pub service_token: Option<String>,
    /// Paths that bypass authentication
    pub public_paths: Vec<String>,
    rate_limit: u32,
    rate_limiters: DashMap<String, Arc<UserRateLimiter>>,
    data: Arc<dyn DataService>,
}

impl AuthState {
    /// Build auth state from config, expanding the service token
    pub fn from_config(config: &AuthConfig, data: Arc<dyn DataService>) -> Self {
        let service_token = config.resolve_bearer_token();

        if config.bearer_token.as_deref() == Some("auto") {
            if let Some(ref token) = service_token {
                tracing::info!("Auto-generated service token: {}", token);
            }
        }

        Self {
            enabled: config.enabled,
            service_token,
            public_paths: config.public_paths.clone(),
            rate_limit: config.rate_limit,
            rate_limiters: DashMap::new(),
            data,
        }
    }

    /// Check if a path is public (bypasses auth)
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p))
    }

    /// Check rate limit for a user. Returns true if allowed.
    #[must_use]
    pub fn check_rate_limit(&self, user_id: &str) -> bool {
        let Some(quota) = NonZeroU32::new(self.rate_limit) else {
            return true;
        };
        let limiter = self
            .rate_limiters
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_minute(quota))))
            .clone();
        limiter.check().is_ok()
    }

    /// Resolve a bearer token to a user, asking the data service for
    /// anything that is not the service token.
    pub async fn authenticate(&self, token: &str) -> Option<AuthenticatedUser> {
        if let Some(ref service) = self.service_token {
            if token == service {
                return Some(AuthenticatedUser::service(token));
            }
        }

        match self.data.verify_token(token).await {
            Ok(profile) => Some(AuthenticatedUser {
                user_id: profile.user_id,
                mode: profile.action_mode,
                token: token.to_string(),
            }),
            Err(e) => {
                debug!(error = %e, "Token verification failed");
                None
            }
        }
    }
}

/// The caller of an authenticated request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User id from the verified profile
    pub user_id: String,
    /// Action mode in effect for this user's turns
    pub mode: ActionMode,
    /// The raw bearer token, forwarded to every data-service call
    pub token: String,
}

impl AuthenticatedUser {
    /// The operational service identity. It carries no user profile, so
    /// actions stay off.
    #[must_use]
    pub fn service(token: &str) -> Self {
        Self {
            user_id: "service".to_string(),
            mode: ActionMode::Off,
            token: token.to_string(),
        }
    }

    fn anonymous(token: &str) -> Self {
        Self {
            user_id: "anonymous".to_string(),
            mode: ActionMode::default(),
            token: token.to_string(),
        }
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(auth): State<Arc<AuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::to_string);

    // With auth disabled the raw token (possibly empty) is still forwarded
    // so a local data service can run without credentials.
    if !auth.enabled {
        request
            .extensions_mut()
            .insert(AuthenticatedUser::anonymous(bearer.as_deref().unwrap_or("")));
        return next.run(request).await;
    }

    let path = request.uri().path();

    if auth.is_public_path(path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let Some(token) = bearer else {
        warn!(path = %path, "Missing Authorization header");
        return unauthorized_response(
            "Missing Authorization header. Use: Authorization: Bearer <token>",
        );
    };

    if let Some(user) = auth.authenticate(&token).await {
        if !auth.check_rate_limit(&user.user_id) {
            warn!(user = %user.user_id, path = %path, "Rate limit exceeded");
            return rate_limited_response();
        }

        debug!(user = %user.user_id, path = %path, "Authenticated request");
        request.extensions_mut().insert(user);
        next.run(request).await
    } else {
        warn!(path = %path, "Invalid token");
        unauthorized_response("Invalid token")
    }
}

/// Create a 401 Unauthorized response
fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Create a 429 Rate Limited response
fn rate_limited_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", "60")],
        Json(json!({ "error": "Rate limit exceeded. Try again later." })),
    )
        .into_response()
}
