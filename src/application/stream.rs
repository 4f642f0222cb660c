//! Helpers for building server-driven datastar SSE responses for the live
//! view.

use askama::Template;
use axum::response::sse::Event;
use datastar::prelude::{ElementPatchMode, PatchElements};

use crate::presentation::views::{
    ErrorPanelTemplate, FeedContext, PostListTemplate, StatusTemplate, TemplateRenderError,
};

/// Patch targets; each matches one region rendered by the index template.
pub const STATUS_SELECTOR: &str = "#connection-status";
pub const ERROR_PANEL_SELECTOR: &str = "#channel-error";
pub const FEED_SELECTOR: &str = "#post-feed";

/// An ordered batch of datastar patch events for one snapshot paint.
pub struct PatchBatch {
    events: Vec<Event>,
}

impl PatchBatch {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an element patch targeting the supplied selector.
    pub fn push_patch(
        &mut self,
        html: String,
        selector: &str,
        mode: ElementPatchMode,
    ) -> &mut Self {
        let event = PatchElements::new(html)
            .selector(selector)
            .mode(mode)
            .write_as_axum_sse_event();
        self.events.push(event);
        self
    }

    /// Append a morph patch that runs inside a view transition, so keyed
    /// elements animate in and out.
    pub fn push_transition_patch(&mut self, html: String, selector: &str) -> &mut Self {
        let event = PatchElements::new(html)
            .selector(selector)
            .mode(ElementPatchMode::Outer)
            .use_view_transition(true)
            .write_as_axum_sse_event();
        self.events.push(event);
        self
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for PatchBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one snapshot paint into patches for the three live regions.
///
/// The feed patch morphs by element id (`post-<id>`), so unchanged posts
/// keep their DOM nodes and only arriving/departing entries transition.
pub fn snapshot_patches(view: &FeedContext) -> Result<PatchBatch, TemplateRenderError> {
    const SOURCE: &str = "application::stream::snapshot_patches";

    let status_html = StatusTemplate { view }
        .render()
        .map_err(|err| TemplateRenderError::new(SOURCE, "Status banner rendering failed", err))?;
    let error_html = ErrorPanelTemplate { view }
        .render()
        .map_err(|err| TemplateRenderError::new(SOURCE, "Error panel rendering failed", err))?;
    let posts_html = PostListTemplate { view }
        .render()
        .map_err(|err| TemplateRenderError::new(SOURCE, "Post list rendering failed", err))?;

    let mut batch = PatchBatch::new();
    batch.push_patch(status_html, STATUS_SELECTOR, ElementPatchMode::Outer);
    batch.push_patch(error_html, ERROR_PANEL_SELECTOR, ElementPatchMode::Outer);
    batch.push_transition_patch(posts_html, FEED_SELECTOR);
    Ok(batch)
}
