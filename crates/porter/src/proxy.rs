use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use serde_json::json;
use std::sync::Arc;

use crate::gate::GateState;

const HOP_HEADERS: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

/// Pass-through to the upstream page origin, preserving method, headers,
/// and body. Pages themselves are rendered upstream; porter only decides
/// who gets to ask for them.
pub async fn forward(State(state): State<Arc<GateState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({ "error": "Invalid request body" })),
            )
                .into_response();
        }
    };

    let path_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream_url, path_query);

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut outbound = state.client.request(method, url);
    for (name, value) in parts.headers.iter() {
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        outbound = outbound.header(name.as_str(), value.as_bytes());
    }

    let upstream = match outbound.body(bytes.to_vec()).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("upstream unreachable: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                axum::Json(json!({ "error": "Upstream unreachable" })),
            )
                .into_response();
        }
    };

    let mut builder = Response::builder().status(upstream.status().as_u16());
    for (name, value) in upstream.headers().iter() {
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let body = upstream.bytes().await.unwrap_or_default();
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
