//! Reqwest-backed client for the CMS GraphQL endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::application::content::{ContentSource, QueryRequest, SourceError};
use crate::config::CmsSettings;
use crate::domain::entities::FeedData;
use crate::infra::error::InfraError;

pub struct CmsClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl CmsClient {
    pub fn new(settings: &CmsSettings) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            token: settings.token.clone(),
        })
    }
}

pub(crate) fn user_agent() -> &'static str {
    concat!("diretta/", env!("CARGO_PKG_VERSION"))
}

/// GraphQL response envelope: `errors` may accompany or replace `data`.
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    data: Option<Value>,
    errors: Option<Vec<Value>>,
}

#[async_trait]
impl ContentSource for CmsClient {
    async fn fetch_feed(&self, request: &QueryRequest) -> Result<FeedData, SourceError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|err| SourceError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Transport(format!(
                "CMS responded with {status}: {body}"
            )));
        }

        let envelope: GraphqlEnvelope = response
            .json()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))?;

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let summary = errors
                .first()
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("query returned errors")
                .to_string();
            return Err(SourceError::Query {
                summary,
                response: Value::Array(errors),
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| SourceError::Decode("response carried no data".to_string()))?;

        serde_json::from_value(data).map_err(|err| SourceError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn feed_data_decodes_from_query_shape() {
        let data = json!({
            "posts": [{
                "id": "p1",
                "content": "**Kickoff!**",
                "_firstPublishedAt": "2024-03-01T12:00:00Z",
                "photos": [{
                    "responsiveImage": {
                        "aspectRatio": 1.5,
                        "base64": "data:image/jpeg;base64,abc",
                        "height": 400,
                        "sizes": "(max-width: 600px) 100vw, 600px",
                        "src": "https://images.example/a.jpg",
                        "srcSet": "https://images.example/a.jpg?w=300 300w",
                        "width": 600,
                        "alt": "kickoff",
                        "title": null
                    }
                }],
                "author": {
                    "name": "Reporter",
                    "avatar": {
                        "responsiveImage": {
                            "aspectRatio": 1.0,
                            "base64": null,
                            "height": 60,
                            "sizes": null,
                            "src": "https://images.example/avatar.jpg",
                            "srcSet": null,
                            "width": 60,
                            "alt": null,
                            "title": null
                        }
                    }
                }
            }]
        });

        let feed: FeedData = serde_json::from_value(data).expect("decodes");
        assert_eq!(feed.posts.len(), 1);
        let post = &feed.posts[0];
        assert_eq!(post.id, "p1");
        assert_eq!(post.photos[0].responsive_image.width, 600);
        assert_eq!(post.author.avatar.responsive_image.width, 60);
        assert_eq!(post.first_published_at.year(), 2024);
    }

    #[test]
    fn photoless_posts_decode_with_empty_photos() {
        let data = json!({
            "posts": [{
                "id": "p2",
                "content": null,
                "_firstPublishedAt": "2024-03-01T12:05:00Z",
                "author": {
                    "name": "Reporter",
                    "avatar": {
                        "responsiveImage": {
                            "aspectRatio": 1.0,
                            "base64": null,
                            "height": 60,
                            "sizes": null,
                            "src": "https://images.example/avatar.jpg",
                            "srcSet": null,
                            "width": 60,
                            "alt": null,
                            "title": null
                        }
                    }
                }
            }]
        });

        let feed: FeedData = serde_json::from_value(data).expect("decodes");
        assert!(feed.posts[0].photos.is_empty());
        assert!(feed.posts[0].content.is_none());
    }
}
