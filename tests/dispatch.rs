mod common;

use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::{json, Value};

async fn authed(router: &Router, request: Request<axum::body::Body>) -> axum::http::Response<axum::body::Body> {
    let token = login_token(router, "user", "1234").await;
    send(router, with_bearer(request, &token)).await
}

fn with_prefer(mut request: Request<axum::body::Body>, prefer: &str) -> Request<axum::body::Body> {
    request
        .headers_mut()
        .insert("prefer", prefer.parse().unwrap());
    request
}

#[tokio::test]
async fn test_fixture_requires_session() {
    let router = router(CONFIG);
    let response = send(&router, empty_request("GET", "/api/cities")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_fixture_served_as_configured() {
    let router = router(CONFIG);

    let response = authed(&router, empty_request("GET", "/api/cities")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(body_json(response).await, json!(["Bangkok", "Chiang Mai"]));

    // Query strings do not take part in matching
    let response = authed(&router, empty_request("GET", "/api/cities?page=2")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = authed(
        &router,
        json_request("POST", "/api/flights/search", json!({ "anything": true })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([{ "flight": "TG102" }]));
}

#[tokio::test]
async fn test_fixture_without_body() {
    let router = router(CONFIG);
    let response = authed(&router, empty_request("DELETE", "/api/bookings")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_unknown_path_is_not_found_for_every_method() {
    let router = router(CONFIG);

    for method in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
        for path in ["/api/unknown", "/api/cities/", "/API/cities"] {
            let response = authed(&router, empty_request(method, path)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, path);
            assert_eq!(body_json(response).await, json!({ "error": "Not Found" }));
        }
    }
}

#[tokio::test]
async fn test_method_mismatch() {
    let router = router(CONFIG);

    let response = authed(&router, empty_request("POST", "/api/cities")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET");
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Method Not Allowed" })
    );

    let response = authed(&router, empty_request("GET", "/api/flights/search")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "POST");
}

#[tokio::test]
async fn test_prefer_selects_example() {
    let router = router(CONFIG);

    let response = authed(
        &router,
        with_prefer(
            json_request("POST", "/api/flights/search", json!({})),
            "status=404",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "No flights found" })
    );

    let response = authed(
        &router,
        with_prefer(
            json_request("POST", "/api/flights/search", json!({})),
            "status=500; example=outage",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({ "error": "Backend down" }));

    // The configured status is always available
    let response = authed(
        &router,
        with_prefer(empty_request("GET", "/api/cities"), "status=200"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!(["Bangkok", "Chiang Mai"]));
}

#[tokio::test]
async fn test_builtin_endpoints_reject_other_methods() {
    let router = router(CONFIG);

    for (method, path, allow) in [
        ("GET", "/api/auth/login", "POST"),
        ("PUT", "/api/auth/login", "POST"),
        ("POST", "/openapi-json", "GET"),
        ("DELETE", "/docs", "GET"),
    ] {
        let response = send(&router, empty_request(method, path)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, path);
        assert_eq!(response.headers()[ALLOW], allow);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Method Not Allowed" })
        );
    }

    // Session endpoints still sit behind the gate
    let response = send(&router, empty_request("GET", "/api/auth/logout")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for (method, path, allow) in [
        ("GET", "/api/auth/logout", "POST"),
        ("POST", "/api/auth/status", "GET"),
    ] {
        let response = authed(&router, empty_request(method, path)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, path);
        assert_eq!(response.headers()[ALLOW], allow);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Method Not Allowed" })
        );
    }
}

#[tokio::test]
async fn test_unknown_preference_echoes_status() {
    let router = router(CONFIG);

    let response = authed(
        &router,
        with_prefer(empty_request("GET", "/api/cities"), "status=418"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_unknown_preference_service_unavailable() {
    let yaml = format!("preferenceFallback: serviceUnavailable\n{}", CONFIG);
    let router = router(&yaml);

    let response = authed(
        &router,
        with_prefer(empty_request("GET", "/api/cities"), "status=418"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_malformed_preference_is_ignored() {
    let router = router(CONFIG);

    for prefer in ["status=abc", "status=99", "status=102", "respond-async", ""] {
        let response = authed(
            &router,
            with_prefer(empty_request("GET", "/api/cities"), prefer),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "Prefer: {}", prefer);
    }
}

#[tokio::test]
async fn test_preflight_is_answered_without_session() {
    let router = router(CONFIG);

    for path in ["/api/cities", "/api/auth/login", "/nowhere"] {
        let response = send(&router, empty_request("OPTIONS", path)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers["access-control-allow-methods"],
            "GET, POST, OPTIONS"
        );
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        assert!(body_bytes(response).await.is_empty());
    }
}

#[tokio::test]
async fn test_cors_headers_on_every_response() {
    let router = router(CONFIG);

    let response = send(&router, empty_request("GET", "/api/cities")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let response = authed(&router, empty_request("GET", "/api/cities")).await;
    assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_openapi_document_is_public() {
    let router = router(CONFIG);

    let response = send(&router, empty_request("GET", "/openapi-json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let document: Value = body_json(response).await;

    assert_eq!(document["openapi"], "3.1.0");
    assert_eq!(document["tags"][0]["name"], "Authentication");

    let paths = document["paths"].as_object().unwrap();
    for (path, method) in [
        ("/api/cities", "get"),
        ("/api/flights/search", "post"),
        ("/api/bookings", "delete"),
        ("/api/auth/login", "post"),
        ("/api/auth/status", "get"),
        ("/api/auth/logout", "post"),
    ] {
        assert!(paths[path].get(method).is_some(), "{} {}", method, path);
    }

    let fixture_operations: usize = paths
        .iter()
        .filter(|(path, _)| !path.starts_with("/api/auth/"))
        .map(|(_, item)| item.as_object().unwrap().len())
        .sum();
    assert_eq!(fixture_operations, 3);

    let search = &paths["/api/flights/search"]["post"];
    assert_eq!(search["summary"], "Search flights");
    assert!(search.get("description").is_none());

    let cities = &paths["/api/cities"]["get"];
    assert_eq!(cities["summary"], "Cities served by the booking backend");
    assert_eq!(cities["description"], "City list");
    assert!(search["responses"]["404"].is_object());
    assert!(search["responses"]["500"].is_object());
    assert_eq!(
        search["requestBody"]["content"]["application/json"]["example"],
        json!({ "from": "BKK", "to": "CNX" })
    );
}

#[tokio::test]
async fn test_docs_page_is_public() {
    let router = router(CONFIG);

    let response = send(&router, empty_request("GET", "/docs")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("/openapi-json"));
}
