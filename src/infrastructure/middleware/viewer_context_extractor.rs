use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use crate::error::AppError;
use crate::infrastructure::viewer::ViewerContext;

/// Viewer of the current request, placed in the extensions by
/// `viewer_context_middleware`. Derefs to [`ViewerContext`].
#[derive(Debug, Clone)]
pub struct Vc(Arc<ViewerContext>);

impl Vc {
    pub fn new(viewer: ViewerContext) -> Self {
        Self(Arc::new(viewer))
    }

    pub fn into_inner(self) -> Arc<ViewerContext> {
        self.0
    }
}

impl std::ops::Deref for Vc {
    type Target = ViewerContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Vc
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<ViewerContext>>()
            .cloned()
            .map(Vc)
            .ok_or_else(|| AppError::Internal("Viewer middleware is not installed".to_string()))
    }
}
