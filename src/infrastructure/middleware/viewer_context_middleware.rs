// ViewerContext Middleware - Creates the request's ViewerContext and injects it into request extensions

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::infrastructure::viewer::ViewerContext;

pub const VIEWER_ID_HEADER: &str = "x-viewer-id";
pub const VIEWER_ADMIN_HEADER: &str = "x-viewer-admin";
pub const SHOW_HIDDEN_HEADER: &str = "x-show-hidden";

/// ViewerContext middleware that creates request-scoped viewer context.
/// Session handling lives upstream; this layer trusts the forwarded headers.
pub async fn viewer_context_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let viewer_context = extract_viewer_from_headers(request.headers())?;
    request.extensions_mut().insert(Arc::new(viewer_context));
    Ok(next.run(request).await)
}

/// Reads the viewer from request headers; a missing id is the logged-out visitor
fn extract_viewer_from_headers(headers: &HeaderMap) -> Result<ViewerContext, StatusCode> {
    let user_id = match headers.get(VIEWER_ID_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| StatusCode::BAD_REQUEST)?
            .trim()
            .parse::<i64>()
            .map_err(|_| StatusCode::BAD_REQUEST)?,
        None => 0,
    };
    if user_id < 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let viewer = ViewerContext {
        user_id,
        is_admin: user_id > 0 && header_flag(headers, VIEWER_ADMIN_HEADER),
        show_hidden: header_flag(headers, SHOW_HIDDEN_HEADER),
    };
    Ok(viewer)
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
