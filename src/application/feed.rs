use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::application::content::{ContentSource, QueryRequest, SourceError};
use crate::application::render::render_service;
use crate::application::subscription::Snapshot;
use crate::config::FeedSettings;
use crate::domain::entities::{FeedData, PostRecord, ResponsiveImage};
use crate::domain::types::ChannelError;
use crate::presentation::views::{
    ErrorPanelView, FeedContext, PostCardView, ResponsiveImageView,
};
use crate::util::timeago;

/// Assembles the live page: the initial fetch and the pure snapshot-to-view
/// mapping shared by the index render and the live stream.
pub struct FeedService {
    source: Arc<dyn ContentSource>,
    limit: u32,
    transition_ms: u64,
}

impl FeedService {
    pub fn new(source: Arc<dyn ContentSource>, settings: &FeedSettings) -> Self {
        Self {
            source,
            limit: settings.limit.get(),
            transition_ms: settings.transition_ms,
        }
    }

    /// The query both stages share, so live updates stay diff-compatible
    /// with the seed.
    pub fn request(&self) -> QueryRequest {
        QueryRequest::feed(self.limit)
    }

    /// Initial fetch stage: one query per page request. Faults propagate to
    /// the caller unmasked; there is no cached fallback.
    pub async fn initial_feed(&self) -> Result<FeedData, SourceError> {
        counter!("diretta_feed_fetch_total").increment(1);
        match self.source.fetch_feed(&self.request()).await {
            Ok(data) => {
                info!(
                    target = "diretta::feed",
                    posts = data.posts.len(),
                    "initial feed fetched"
                );
                Ok(data)
            }
            Err(err) => {
                counter!("diretta_feed_fetch_error_total").increment(1);
                Err(err)
            }
        }
    }

    /// Map a snapshot to the view context for one paint.
    ///
    /// Pure: identical `(snapshot, now)` inputs produce identical contexts.
    /// Post order is taken from the snapshot verbatim; the CMS owns sorting.
    pub fn view_context(&self, snapshot: &Snapshot, now: OffsetDateTime) -> FeedContext {
        let posts = snapshot
            .data
            .as_ref()
            .map(|data| data.posts.iter().map(|post| post_card(post, now)).collect())
            .unwrap_or_default();

        FeedContext {
            status: snapshot.status,
            error: snapshot.error.as_ref().map(error_panel),
            posts,
            transition_ms: self.transition_ms,
        }
    }
}

fn error_panel(error: &ChannelError) -> ErrorPanelView {
    ErrorPanelView {
        code: error.code.clone(),
        message: error.message.clone(),
        payload: error.response.as_ref().map(|value| {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }),
    }
}

fn post_card(record: &PostRecord, now: OffsetDateTime) -> PostCardView {
    let content_html = record
        .content
        .as_deref()
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(|content| render_service().render(content));

    PostCardView {
        id: record.id.clone(),
        content_html,
        photos: record
            .photos
            .iter()
            .map(|photo| image_view(&photo.responsive_image))
            .collect(),
        author_name: record.author.name.clone(),
        avatar: image_view(&record.author.avatar.responsive_image),
        published_relative: timeago::relative(record.first_published_at, now),
        published_iso: record
            .first_published_at
            .format(&Rfc3339)
            .unwrap_or_default(),
    }
}

fn image_view(image: &ResponsiveImage) -> ResponsiveImageView {
    ResponsiveImageView {
        src: image.src.clone(),
        src_set: image.src_set.clone(),
        sizes: image.sizes.clone(),
        width: image.width,
        height: image.height,
        aspect_ratio: image.aspect_ratio,
        placeholder: image.base64.clone(),
        alt: image.alt.clone(),
        title: image.title.clone(),
    }
}
