use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use log::debug;
use std::sync::Arc;

pub struct GateState {
    pub client: reqwest::Client,
    pub auth_url: String,
    pub upstream_url: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Redirect(&'static str),
}

/// Only these paths are gated; everything else skips the session check
/// entirely.
pub fn is_gated(path: &str) -> bool {
    path == "/login"
        || path == "/signup"
        || path == "/dashboard"
        || path.starts_with("/dashboard/")
}

/// Redirect rules over (path, session presence). Pure so the rule matrix
/// is testable without HTTP.
pub fn decide(path: &str, logged_in: bool) -> Verdict {
    if logged_in && (path == "/login" || path == "/signup") {
        return Verdict::Redirect("/dashboard");
    }
    if !logged_in && (path == "/dashboard" || path.starts_with("/dashboard/")) {
        return Verdict::Redirect("/login");
    }
    Verdict::Pass
}

pub async fn auth_gate(
    State(state): State<Arc<GateState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !is_gated(&path) {
        return next.run(req).await;
    }

    let cookies = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let logged_in = has_session(&state, &cookies).await;

    match decide(&path, logged_in) {
        Verdict::Pass => next.run(req).await,
        Verdict::Redirect(to) => {
            debug!("redirecting {} -> {}", path, to);
            Redirect::temporary(to).into_response()
        }
    }
}

/// Ask the auth provider for the caller's session, forwarding their
/// cookies. Every failure mode here means "no session"; the caller never
/// sees an error from this check.
async fn has_session(state: &GateState, cookies: &str) -> bool {
    let url = format!("{}/api/auth/get-session", state.auth_url);

    let response = match state.client.get(url).header("cookie", cookies).send().await {
        Ok(response) => response,
        Err(_) => return false,
    };

    if !response.status().is_success() {
        return false;
    }

    match response.json::<serde_json::Value>().await {
        Ok(session) => session.get("user").map(|user| !user.is_null()).unwrap_or(false),
        Err(_) => false,
    }
}
