use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::HttpError;
use crate::domain::types::ConnectionStatus;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Responsive image as the templates consume it: primary source plus the
/// candidate set and the low-resolution placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsiveImageView {
    pub src: String,
    pub src_set: Option<String>,
    pub sizes: Option<String>,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub placeholder: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostCardView {
    /// Element identity for the keyed morph; stable across updates.
    pub id: String,
    pub content_html: Option<String>,
    pub photos: Vec<ResponsiveImageView>,
    pub author_name: String,
    pub avatar: ResponsiveImageView,
    pub published_relative: String,
    pub published_iso: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPanelView {
    pub code: String,
    pub message: String,
    /// Pretty-printed raw response payload; rendered only when present.
    pub payload: Option<String>,
}

/// Everything the live page needs for one paint.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedContext {
    pub status: ConnectionStatus,
    pub error: Option<ErrorPanelView>,
    pub posts: Vec<PostCardView>,
    pub transition_ms: u64,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: FeedContext,
}

#[derive(Template)]
#[template(path = "partials/status.html")]
pub struct StatusTemplate<'a> {
    pub view: &'a FeedContext,
}

#[derive(Template)]
#[template(path = "partials/error_panel.html")]
pub struct ErrorPanelTemplate<'a> {
    pub view: &'a FeedContext,
}

#[derive(Template)]
#[template(path = "partials/post_list.html")]
pub struct PostListTemplate<'a> {
    pub view: &'a FeedContext,
}
