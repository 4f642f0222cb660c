//! Content records mirrored from the CMS query result.
//!
//! All records are owned and mutated exclusively by the CMS; this system
//! only observes snapshots of them. Serde renames follow the wire shape of
//! the feed query so that the initial fetch and every live update
//! deserialize identically.

use serde::Deserialize;
use time::OffsetDateTime;

/// The full result of the feed query: the most recent posts, ordered by the
/// CMS (descending first-published instant, capped at the query limit).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedData {
    pub posts: Vec<PostRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostRecord {
    pub id: String,
    /// Markdown body; absent for photo-only entries.
    pub content: Option<String>,
    #[serde(rename = "_firstPublishedAt", with = "time::serde::rfc3339")]
    pub first_published_at: OffsetDateTime,
    #[serde(default)]
    pub photos: Vec<PhotoRecord>,
    pub author: AuthorRecord,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhotoRecord {
    #[serde(rename = "responsiveImage")]
    pub responsive_image: ResponsiveImage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorRecord {
    pub name: String,
    pub avatar: AvatarRecord,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AvatarRecord {
    #[serde(rename = "responsiveImage")]
    pub responsive_image: ResponsiveImage,
}

/// Responsive image descriptor as delivered by the CMS image pipeline.
///
/// Every `src_set` candidate derives from the same underlying asset; only
/// the resolution varies.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveImage {
    pub aspect_ratio: f64,
    /// Base64-encoded low-resolution placeholder shown while the real asset
    /// loads.
    pub base64: Option<String>,
    pub height: u32,
    pub width: u32,
    pub sizes: Option<String>,
    pub src: String,
    pub src_set: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
}
