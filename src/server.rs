//! HTTP dispatch.
//!
//! Every request goes through the same stages:
//!
//! 1. CORS: `OPTIONS` is answered with 204, everything else gets the
//!    allow-headers on the way out.
//! 2. Public routes: login and the documentation endpoints.
//! 3. Session gate: cookie or bearer token, verified by [`TokenService`].
//! 4. Status and logout, answered from the verified claims.
//! 5. Fixture dispatch: [`RouteTable`] then [`Negotiator`].
//!
//! Panics are caught at the outermost layer and turned into a generic 500.

use crate::config::{ConfigError, SimulatorConfig, DOCS_PATH, OPENAPI_PATH};
use crate::error::{internal_error_body, AppError};
use crate::negotiate::{Negotiator, PreferenceHint, PREFER_HEADER};
use crate::openapi::{self, OpenApi};
use crate::router::{Resolution, RouteTable};
use crate::session::{extract_token, SetCookie};
use crate::token::{Claims, Identity, TokenService};
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    SET_COOKIE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SimulatorConfig>,
    pub routes: Arc<RouteTable>,
    pub tokens: Arc<TokenService>,
    pub negotiator: Negotiator,
    pub openapi: Arc<OpenApi>,
}

impl AppState {
    /// Build the engine from a configuration.
    pub fn new(config: SimulatorConfig) -> Result<Self, ConfigError> {
        Self::with_overlay(config, None)
    }

    /// Build the engine, merging a hand-authored OpenAPI overlay over the
    /// generated document.
    pub fn with_overlay(
        config: SimulatorConfig,
        overlay: Option<OpenApi>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let routes = RouteTable::new(&config.services)?;
        let tokens = TokenService::new(&config.session);
        let negotiator = Negotiator::new(config.response_time, config.preference_fallback);

        let mut document = openapi::merge(
            openapi::synthesize(&routes, &config.openapi),
            openapi::auth_overlay(&config.base_uri, &config.session.cookie_name),
        );
        if let Some(overlay) = overlay {
            document = openapi::merge(document, overlay);
        }

        info!(
            services = routes.len(),
            users = config.users.len(),
            base_uri = %config.base_uri,
            min_ms = config.response_time.min,
            max_ms = config.response_time.max,
            "Loaded configuration"
        );

        Ok(Self {
            config: Arc::new(config),
            routes: Arc::new(routes),
            tokens: Arc::new(tokens),
            negotiator,
            openapi: Arc::new(document),
        })
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let login_path = state.config.login_path();
    let status_path = state.config.status_path();
    let logout_path = state.config.logout_path();

    let protected = Router::new()
        .route(&status_path, get(auth_status).fallback(get_only))
        .route(&logout_path, post(logout).fallback(post_only))
        .fallback(dispatch)
        .layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route(&login_path, post(login).fallback(post_only))
        .route(OPENAPI_PATH, get(openapi_json).fallback(get_only))
        .route(DOCS_PATH, get(docs).fallback(get_only))
        .merge(protected)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain and release the socket.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(detail = %detail, "Request handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, Json(internal_error_body())).into_response()
}

async fn get_only() -> AppError {
    AppError::MethodNotAllowed(vec![Method::GET])
}

async fn post_only() -> AppError {
    AppError::MethodNotAllowed(vec![Method::POST])
}

async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = {
        let Some((token, source)) =
            extract_token(request.headers(), &state.config.session.cookie_name)
        else {
            debug!(path = %request.uri().path(), "No session credentials");
            return Err(AppError::Unauthorized);
        };

        state.tokens.verify(token).map_err(|e| {
            debug!(reason = %e, source = %source, "Rejected session token");
            AppError::Unauthorized
        })?
    };

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
    #[serde(default)]
    return_token_in_response: bool,
}

async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: LoginRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::MalformedBody)?;

    let Some(user) = state
        .config
        .authenticate(&request.username, &request.password)
    else {
        warn!(username = %request.username, "Rejected login");
        return Err(AppError::InvalidCredentials);
    };

    let token = state
        .tokens
        .issue(&Identity::from(user))
        .map_err(|e| AppError::Internal(e.to_string()))?;

    info!(username = %user.username, "User logged in");

    if request.return_token_in_response {
        return Ok(Json(json!({
            "message": "Logged in successfully",
            "access_token": token,
        }))
        .into_response());
    }

    let session = &state.config.session;
    let cookie = SetCookie::session(&session.cookie_name, token, session.ttl_secs)
        .to_header()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Logged in successfully" })),
    )
        .into_response())
}

async fn auth_status(Extension(claims): Extension<Claims>) -> Json<serde_json::Value> {
    Json(json!({
        "user": {
            "username": claims.username,
            "fullName": claims.full_name,
            "role": claims.role,
        }
    }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let cookie = SetCookie::removal(&state.config.session.cookie_name)
        .to_header()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    info!(username = %claims.username, "User logged out");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response())
}

async fn openapi_json(State(state): State<AppState>) -> Json<OpenApi> {
    Json(state.openapi.as_ref().clone())
}

async fn docs(State(state): State<AppState>) -> Html<String> {
    Html(openapi::docs_page(&state.openapi.info.title))
}

async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = uri.path();

    let fixture = match state.routes.resolve(path, &method) {
        Resolution::Found(fixture) => fixture,
        Resolution::NotFound => {
            warn!(method = %method, path = %path, "No matching fixture found");
            return Err(AppError::NotFound);
        }
        Resolution::MethodNotAllowed { allowed } => {
            warn!(method = %method, path = %path, "Fixture exists for another method");
            return Err(AppError::MethodNotAllowed(allowed));
        }
    };

    let hint = headers
        .get(PREFER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(PreferenceHint::parse);

    let negotiated = state.negotiator.negotiate(fixture, hint.as_ref()).await;

    info!(
        fixture = %fixture.name,
        method = %method,
        path = %path,
        status = negotiated.status,
        preferred = hint.is_some(),
        "Request matched fixture"
    );

    let status = StatusCode::from_u16(negotiated.status)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(match negotiated.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    })
}
