#![allow(dead_code)]

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mockup_server::{app, AppState, SimulatorConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const CONFIG: &str = r#"
baseURI: /
users:
  - { username: user, password: "1234", fullName: Mock User, role: user }
  - { username: admin, password: secret, fullName: Mock Admin, role: admin }
services:
  /api/cities:
    name: City list
    description: Cities served by the booking backend
    method: GET
    response:
      status: 200
      body: [Bangkok, Chiang Mai]
  POST /api/flights/search:
    name: Search flights
    request:
      contentType: application/json
      body: { from: BKK, to: CNX }
    response:
      status: 200
      body: [{ flight: TG102 }]
      examples:
        "404": { error: No flights found }
        "500": { error: Backend down }
  DELETE /api/bookings:
    name: Cancel booking
    response:
      status: 204
"#;

pub fn router(yaml: &str) -> Router {
    let config = SimulatorConfig::from_yaml(yaml).unwrap();
    app(AppState::new(config).unwrap())
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(COOKIE, cookie.parse().unwrap());
    request
}

pub fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

/// Raw `Set-Cookie` header, if any.
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string())
}

/// `name=value` pair a browser would send back for a `Set-Cookie` header.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_string()
}

/// Log in and return the bearer token.
pub async fn login_token(router: &Router, username: &str, password: &str) -> String {
    let response = send(
        router,
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "username": username, "password": password, "return_token_in_response": true }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}
