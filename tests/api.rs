#![allow(clippy::unwrap_used)]

mod common;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tessera::api;
use tower::ServiceExt;

fn app() -> Router {
    api::router(Arc::new(common::pipeline(common::engine())), None)
}

fn rpc(path: &str, body: &Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("user-agent", "api-test/1.0");
    if let Some(token) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_body() -> Value {
    json!({
        "email": common::EMAIL,
        "password": common::PASSWORD,
        "passwordConfirm": common::PASSWORD,
    })
}

#[tokio::test]
async fn register_returns_a_token_pair() {
    let response = app()
        .oneshot(rpc("/auth.AuthService/Register", &register_body(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("grpc-status").unwrap(), "0");
    assert!(response.headers().get("x-request-id").is_some());

    let body = json_body(response).await;
    assert!(body["accessToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["refreshToken"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn missing_fields_are_invalid_arguments() {
    let response = app()
        .oneshot(rpc(
            "/auth.AuthService/Register",
            &json!({"password": "x", "passwordConfirm": "x"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get("grpc-status").unwrap(), "3");

    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("email is required"));
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/auth.AuthService/Login")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_rpc_without_bearer_is_unauthorized() {
    let response = app()
        .oneshot(rpc(
            "/user.UserService/GetUserByEmail",
            &json!({"email": common::EMAIL}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("grpc-status").unwrap(), "16");
    let body = json_body(response).await;
    assert_eq!(body["code"], "UNAUTHENTICATED");
    assert_eq!(body["message"], "authentication failed");
}

#[tokio::test]
async fn user_lookup_with_bearer() {
    let app = app();

    let response = app
        .clone()
        .oneshot(rpc("/auth.AuthService/Register", &register_body(), None))
        .await
        .unwrap();
    let tokens = json_body(response).await;
    let access = tokens["accessToken"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(rpc(
            "/user.UserService/GetUserByEmail",
            &json!({"email": common::EMAIL}),
            Some(&access),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let user = json_body(response).await;
    assert_eq!(user["email"], common::EMAIL);
    assert_eq!(user["isActive"], true);

    let response = app
        .oneshot(rpc(
            "/user.UserService/GetUserById",
            &json!({"userId": uuid::Uuid::new_v4().to_string()}),
            Some(&access),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_build() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let x_app = response.headers().get("X-App").unwrap().to_str().unwrap();
    assert!(x_app.starts_with(&format!(
        "{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )));

    let body = json_body(response).await;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc = json_body(response).await;
    assert!(doc["paths"]["/auth.AuthService/Login"].is_object());
    assert!(doc["paths"]["/user.UserService/UpdateUserPassword"].is_object());
}

#[tokio::test]
async fn graceful_shutdown_stops_the_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(api::serve(
        listener,
        app(),
        async move {
            let _ = rx.await;
        },
        std::time::Duration::from_secs(1),
    ));

    tx.send(()).unwrap();
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
