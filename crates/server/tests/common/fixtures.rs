//! Request builders and token minting.

use super::server::TEST_JWT_SECRET;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

/// A valid bearer token for [`TEST_JWT_SECRET`].
#[allow(dead_code)]
pub fn valid_token() -> String {
    token_signed_with(TEST_JWT_SECRET)
}

/// An HS256 token signed with an arbitrary secret.
#[allow(dead_code)]
pub fn token_signed_with(secret: &str) -> String {
    encode(
        &Header::default(),
        &json!({"sub": "turbo", "scope": "cache"}),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Fully buffered response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Send a request through the router and buffer the response.
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Request builder with an optional bearer token.
#[allow(dead_code)]
pub fn request(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header("Authorization", format!("Bearer {token}")),
        None => builder,
    }
}

/// PUT an artifact body with a matching Content-Length.
#[allow(dead_code)]
pub async fn put_artifact(
    router: &axum::Router,
    uri: &str,
    body: &[u8],
    token: &str,
) -> TestResponse {
    let req = request("PUT", uri, Some(token))
        .header("Content-Length", body.len().to_string())
        .body(Body::from(body.to_vec()))
        .unwrap();
    send(router, req).await
}

/// POST a JSON body.
#[allow(dead_code)]
pub async fn post_json(router: &axum::Router, uri: &str, body: Value, token: &str) -> TestResponse {
    let req = request("POST", uri, Some(token))
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(router, req).await
}
