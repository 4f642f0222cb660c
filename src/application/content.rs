//! Seams to the external content source: the one-shot feed query and the
//! live channel. Both are injected capabilities so the HTTP surface and the
//! tests never depend on a concrete transport.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::domain::{
    entities::FeedData,
    types::ChannelError,
};

/// The fixed feed query. The same document drives the initial fetch and the
/// live channel registration so that incremental updates stay
/// diff-compatible with the seed data.
pub const FEED_QUERY: &str = r"
query HomePage($limit: IntType) {
  posts: allPosts(first: $limit, orderBy: _firstPublishedAt_DESC) {
    id
    content
    _firstPublishedAt
    photos {
      responsiveImage(imgixParams: {auto: [format]}) {
        ...imageFields
      }
    }
    author {
      name
      avatar {
        responsiveImage(imgixParams: {auto: [format], w: 60}) {
          ...imageFields
        }
      }
    }
  }
}

fragment imageFields on ResponsiveImage {
  aspectRatio
  base64
  height
  sizes
  src
  srcSet
  width
  alt
  title
}
";

/// A query document plus its variables, ready to send to either endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub variables: serde_json::Value,
}

impl QueryRequest {
    pub fn feed(limit: u32) -> Self {
        Self {
            query: FEED_QUERY.to_string(),
            variables: json!({ "limit": limit }),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content transport error: {0}")]
    Transport(String),
    #[error("query execution failed: {summary}")]
    Query {
        summary: String,
        response: serde_json::Value,
    },
    #[error("failed to decode content response: {0}")]
    Decode(String),
}

/// One-shot query execution against the content API.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_feed(&self, request: &QueryRequest) -> Result<FeedData, SourceError>;
}

/// Events delivered by the live channel, in delivery order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The channel is established and will deliver updates.
    Open,
    /// A fresh full query result matching the registered query.
    Update(FeedData),
    /// A transport or query-execution fault. Non-fatal unless followed by
    /// `Closed`.
    Error(ChannelError),
    /// The channel terminated, by server or client teardown.
    Closed,
}

/// Push-based delivery of content changes matching a registered query.
///
/// Reconnection, backoff, and message framing are the transport's concern;
/// consumers only observe the event stream. Dropping the stream releases
/// the channel.
pub trait ChannelSource: Send + Sync {
    fn open_channel(&self, request: &QueryRequest) -> BoxStream<'static, ChannelEvent>;
}
