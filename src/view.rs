use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

use crate::error::AppError;

#[derive(Error, Debug)]
#[error("view `{view}`: {reason}")]
pub struct RenderError {
    pub view: String,
    pub reason: String,
}

/// Renderer Trait
///
/// The presentation collaborator: turns a named view and its payload into a response.
/// Handlers never build page bodies themselves, so an HTML template engine can replace
/// the JSON renderer without touching them.
pub trait Renderer: Send + Sync {
    fn render(&self, view: &str, payload: Value) -> Result<Response, RenderError>;
}

/// RendererState
///
/// The concrete type used to share the renderer across the application state.
pub type RendererState = Arc<dyn Renderer>;

/// JsonRenderer
///
/// Emits `{ "view": <name>, "data": <payload> }`.
#[derive(Clone, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, view: &str, payload: Value) -> Result<Response, RenderError> {
        Ok(Json(json!({ "view": view, "data": payload })).into_response())
    }
}

/// render
///
/// Serializes `payload` and hands it to `renderer`. Failures on either step become
/// `AppError::Render` and are reported, never swallowed.
pub fn render<T: Serialize>(
    renderer: &dyn Renderer,
    view: &str,
    payload: &T,
) -> Result<Response, AppError> {
    let value = serde_json::to_value(payload).map_err(|e| RenderError {
        view: view.to_string(),
        reason: e.to_string(),
    })?;
    Ok(renderer.render(view, value)?)
}
