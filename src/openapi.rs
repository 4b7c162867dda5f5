//! OpenAPI document synthesis.
//!
//! Builds an OpenAPI 3.1 description of the simulated surface from the
//! fixture table, and merges hand-authored partial documents over it. The
//! result is computed once at startup and served as-is.

use crate::config::{
    join_base, ConfigError, OpenApiSettings, LOGIN_PATH, LOGOUT_PATH, OPENAPI_PATH, STATUS_PATH,
};
use crate::router::RouteTable;
use axum::http::{Method, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

pub const OPENAPI_VERSION: &str = "3.1.0";

/// Tag for the login, status and logout endpoints.
pub const AUTH_TAG: &str = "Authentication";

/// Tag for operations generated from fixtures.
pub const SERVICES_TAG: &str = "Services";

const SESSION_COOKIE_SCHEME: &str = "sessionCookie";
const BEARER_SCHEME: &str = "bearerAuth";

/// Operations of a single path, keyed by lower-cased method.
pub type PathItem = IndexMap<String, Operation>;

/// OpenAPI document root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenApi {
    #[serde(default)]
    pub openapi: String,
    #[serde(default)]
    pub info: Info,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub paths: IndexMap<String, PathItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Tag {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// A single API operation.
///
/// Fields this module does not model are kept in `extra` so hand-authored
/// overlays survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "operationId", default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "requestBody", default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: IndexMap<String, Response>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<IndexMap<String, Vec<String>>>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl MediaType {
    fn example(value: Value) -> Self {
        Self {
            schema: None,
            example: Some(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub content: IndexMap<String, MediaType>,
}

impl Response {
    fn json(status: u16, body: Option<&Value>) -> Self {
        let mut content = IndexMap::new();
        if let Some(body) = body {
            content.insert("application/json".to_string(), MediaType::example(body.clone()));
        }
        Self {
            description: describe_status(status),
            content,
        }
    }
}

fn describe_status(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Response")
        .to_string()
}

fn session_security() -> Vec<IndexMap<String, Vec<String>>> {
    [SESSION_COOKIE_SCHEME, BEARER_SCHEME]
        .iter()
        .map(|scheme| IndexMap::from([(scheme.to_string(), Vec::new())]))
        .collect()
}

/// `post` + `/api/flight-booking/search` -> `post_api_flight_booking_search`
fn operation_id(method: &Method, path: &str) -> String {
    let slug = path
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let slug = if slug.is_empty() { "root".to_string() } else { slug };
    format!("{}_{}", method.as_str().to_ascii_lowercase(), slug)
}

/// Generate one operation per configured fixture.
pub fn synthesize(routes: &RouteTable, settings: &OpenApiSettings) -> OpenApi {
    let mut paths: IndexMap<String, PathItem> = IndexMap::new();

    for (path, method, fixture) in routes.iter() {
        let (content_type, request_example) = match &fixture.request {
            Some(request) => (
                request.content_type.clone(),
                request.body.clone().unwrap_or_else(|| json!({})),
            ),
            None => ("application/json".to_string(), json!({})),
        };

        let mut responses = IndexMap::new();
        responses.insert(
            fixture.response.status.to_string(),
            Response::json(fixture.response.status, fixture.response.body.as_ref()),
        );
        for (status, body) in fixture.response.keyed_examples() {
            responses
                .entry(status.to_string())
                .or_insert_with(|| Response::json(status, Some(body)));
        }

        let operation = Operation {
            operation_id: Some(operation_id(method, path)),
            summary: [&fixture.description, &fixture.name]
                .into_iter()
                .find(|s| !s.is_empty())
                .cloned(),
            description: Some(fixture.name.clone())
                .filter(|name| !name.is_empty() && !fixture.description.is_empty()),
            tags: vec![SERVICES_TAG.to_string()],
            request_body: Some(RequestBody {
                required: false,
                content: IndexMap::from([(content_type, MediaType::example(request_example))]),
            }),
            responses,
            security: session_security(),
            extra: IndexMap::new(),
        };

        paths
            .entry(path.to_string())
            .or_default()
            .insert(method.as_str().to_ascii_lowercase(), operation);
    }

    let tags = if paths.is_empty() {
        Vec::new()
    } else {
        vec![Tag::new(SERVICES_TAG, "Simulated backend routes")]
    };

    OpenApi {
        openapi: OPENAPI_VERSION.to_string(),
        info: Info {
            title: settings.title.clone(),
            version: settings.version.clone(),
            description: settings.description.clone(),
        },
        servers: vec![Server {
            url: settings.server_url.clone(),
            description: None,
        }],
        tags,
        paths,
        components: None,
    }
}

/// Hand-authored description of the built-in authentication endpoints.
pub fn auth_overlay(base_uri: &str, cookie_name: &str) -> OpenApi {
    let unauthorized = Response::json(401, Some(&json!({ "error": "Unauthorized" })));
    let tagged = |operation_id: &str, summary: &str| Operation {
        operation_id: Some(operation_id.to_string()),
        summary: Some(summary.to_string()),
        tags: vec![AUTH_TAG.to_string()],
        ..Operation::default()
    };

    let login = Operation {
        description: Some(format!(
            "Issues a session token. Returned in the `{}` cookie, or in the body when `return_token_in_response` is set.",
            cookie_name
        )),
        request_body: Some(RequestBody {
            required: true,
            content: IndexMap::from([(
                "application/json".to_string(),
                MediaType::example(json!({ "username": "user", "password": "1234" })),
            )]),
        }),
        responses: IndexMap::from([
            (
                "200".to_string(),
                Response::json(200, Some(&json!({ "message": "Logged in successfully" }))),
            ),
            (
                "400".to_string(),
                Response::json(400, Some(&json!({ "error": "Invalid request body" }))),
            ),
            (
                "401".to_string(),
                Response::json(401, Some(&json!({ "error": "Invalid username or password" }))),
            ),
        ]),
        ..tagged("auth_login", "Log in")
    };

    let status = Operation {
        responses: IndexMap::from([
            (
                "200".to_string(),
                Response::json(
                    200,
                    Some(&json!({
                        "user": { "username": "user", "fullName": "Mock User", "role": "user" }
                    })),
                ),
            ),
            ("401".to_string(), unauthorized.clone()),
        ]),
        security: session_security(),
        ..tagged("auth_status", "Current session")
    };

    let logout = Operation {
        responses: IndexMap::from([
            (
                "200".to_string(),
                Response::json(200, Some(&json!({ "message": "Logged out successfully" }))),
            ),
            ("401".to_string(), unauthorized),
        ]),
        security: session_security(),
        ..tagged("auth_logout", "Log out")
    };

    let paths = IndexMap::from([
        (
            join_base(base_uri, LOGIN_PATH),
            IndexMap::from([("post".to_string(), login)]),
        ),
        (
            join_base(base_uri, STATUS_PATH),
            IndexMap::from([("get".to_string(), status)]),
        ),
        (
            join_base(base_uri, LOGOUT_PATH),
            IndexMap::from([("post".to_string(), logout)]),
        ),
    ]);

    OpenApi {
        tags: vec![Tag::new(AUTH_TAG, "Mock session management")],
        paths,
        components: Some(json!({
            "securitySchemes": {
                SESSION_COOKIE_SCHEME: { "type": "apiKey", "in": "cookie", "name": cookie_name },
                BEARER_SCHEME: { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }
            }
        })),
        ..OpenApi::default()
    }
}

/// Load a partial document from a YAML or JSON file.
pub fn load_overlay(path: &Path) -> Result<OpenApi, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Merge `overlay` over `base`.
///
/// Overlay operations replace generated ones with the same path and method.
/// Paths only the overlay knows come first. The authentication tag is always
/// listed first.
pub fn merge(base: OpenApi, overlay: OpenApi) -> OpenApi {
    let (fresh, shared): (Vec<_>, Vec<_>) = overlay
        .paths
        .into_iter()
        .partition(|(path, _)| !base.paths.contains_key(path));
    let mut shared: IndexMap<String, PathItem> = shared.into_iter().collect();

    let mut paths: IndexMap<String, PathItem> = fresh.into_iter().collect();
    for (path, mut operations) in base.paths {
        if let Some(overrides) = shared.shift_remove(&path) {
            operations.extend(overrides);
        }
        paths.insert(path, operations);
    }

    let mut tags = overlay.tags;
    for tag in base.tags {
        if !tags.iter().any(|t| t.name == tag.name) {
            tags.push(tag);
        }
    }
    for name in paths
        .values()
        .flat_map(|item| item.values())
        .flat_map(|op| op.tags.iter())
    {
        if !tags.iter().any(|t| &t.name == name) {
            tags.push(Tag {
                name: name.clone(),
                description: None,
            });
        }
    }
    if let Some(pos) = tags.iter().position(|t| t.name == AUTH_TAG) {
        let auth = tags.remove(pos);
        tags.insert(0, auth);
    }

    let components = match (base.components, overlay.components) {
        (Some(mut base), Some(overlay)) => {
            merge_values(&mut base, overlay);
            Some(base)
        }
        (base, overlay) => overlay.or(base),
    };

    OpenApi {
        openapi: if overlay.openapi.is_empty() {
            base.openapi
        } else {
            overlay.openapi
        },
        info: if overlay.info.title.is_empty() {
            base.info
        } else {
            overlay.info
        },
        servers: if overlay.servers.is_empty() {
            base.servers
        } else {
            overlay.servers
        },
        tags,
        paths,
        components,
    }
}

/// Recursively merge JSON objects; `overlay` wins on conflicts.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Minimal documentation viewer for the served document.
pub fn docs_page(title: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            margin: 0;
            padding: 0;
        }}
    </style>
</head>
<body>
    <redoc spec-url="{spec_url}"></redoc>
    <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"></script>
</body>
</html>"##,
        title = html_escape(title),
        spec_url = OPENAPI_PATH,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
