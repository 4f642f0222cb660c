//! Router-level coverage for the live page: the initial render and the live
//! patch stream, driven by scripted content and channel sources.

use std::{
    num::NonZeroU32,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use diretta::{
    application::{
        content::{ChannelEvent, ChannelSource, ContentSource, QueryRequest, SourceError},
        feed::FeedService,
    },
    config::FeedSettings,
    domain::{
        entities::{AuthorRecord, AvatarRecord, FeedData, PostRecord, ResponsiveImage},
        types::ChannelError,
    },
    infra::http::{HttpState, build_router},
};
use futures::stream::{self, BoxStream};
use http_body_util::BodyExt;
use serde_json::json;
use time::macros::datetime;
use tower::ServiceExt;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct StubContent {
    data: FeedData,
}

#[async_trait]
impl ContentSource for StubContent {
    async fn fetch_feed(&self, _request: &QueryRequest) -> Result<FeedData, SourceError> {
        Ok(self.data.clone())
    }
}

struct FailingContent;

#[async_trait]
impl ContentSource for FailingContent {
    async fn fetch_feed(&self, _request: &QueryRequest) -> Result<FeedData, SourceError> {
        Err(SourceError::Transport("connection refused".to_string()))
    }
}

struct StubChannel {
    events: Vec<ChannelEvent>,
}

impl ChannelSource for StubChannel {
    fn open_channel(&self, _request: &QueryRequest) -> BoxStream<'static, ChannelEvent> {
        Box::pin(stream::iter(self.events.clone()))
    }
}

fn image(width: u32) -> ResponsiveImage {
    ResponsiveImage {
        aspect_ratio: 1.5,
        base64: Some("data:image/jpeg;base64,abc".to_string()),
        height: width * 2 / 3,
        width,
        sizes: Some("(max-width: 600px) 100vw, 600px".to_string()),
        src: format!("https://images.example/photo-{width}.jpg"),
        src_set: Some(format!(
            "https://images.example/photo-{width}.jpg?w=300 300w"
        )),
        alt: Some("scene".to_string()),
        title: None,
    }
}

fn post(id: &str, published: time::OffsetDateTime) -> PostRecord {
    PostRecord {
        id: id.to_string(),
        content: Some(format!("Update **{id}**")),
        first_published_at: published,
        photos: vec![diretta::domain::entities::PhotoRecord {
            responsive_image: image(600),
        }],
        author: AuthorRecord {
            name: "Field Reporter".to_string(),
            avatar: AvatarRecord {
                responsive_image: image(60),
            },
        },
    }
}

fn feed(ids: &[&str]) -> FeedData {
    // Newest first, matching the CMS sort order.
    let base = datetime!(2024-03-01 12:00 UTC);
    FeedData {
        posts: ids
            .iter()
            .enumerate()
            .map(|(index, id)| post(id, base - time::Duration::minutes(index as i64)))
            .collect(),
    }
}

fn router_with(content: Arc<dyn ContentSource>, events: Vec<ChannelEvent>) -> Router {
    let settings = FeedSettings {
        limit: NonZeroU32::new(10).expect("non-zero"),
        timestamp_refresh: Duration::from_secs(30),
        transition_ms: 1200,
    };
    let feed = Arc::new(FeedService::new(content, &settings));
    let channel: Arc<dyn ChannelSource> = Arc::new(StubChannel { events });

    build_router(HttpState {
        feed,
        channel,
        last_feed: Arc::new(RwLock::new(None)),
        timestamp_refresh: Duration::from_secs(30),
    })
}

async fn body_string(
    response: axum::response::Response,
) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn assert_order(haystack: &str, first: &str, second: &str) {
    let first_at = haystack.find(first).unwrap_or_else(|| panic!("missing `{first}`"));
    let second_at = haystack
        .find(second)
        .unwrap_or_else(|| panic!("missing `{second}`"));
    assert!(
        first_at < second_at,
        "`{first}` should appear before `{second}`"
    );
}

#[tokio::test]
async fn index_renders_posts_in_delivered_order_with_connecting_banner() -> TestResult {
    let router = router_with(Arc::new(StubContent { data: feed(&["p1", "p2"]) }), Vec::new());

    let response = router
        .oneshot(Request::get("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await?;
    assert!(body.contains("Connecting to the live feed"));
    assert_order(&body, "id=\"post-p1\"", "id=\"post-p2\"");
    assert!(body.contains("Field Reporter"));
    assert!(body.contains("srcset"));
    Ok(())
}

#[tokio::test]
async fn index_fetch_fault_fails_the_page_render() -> TestResult {
    let router = router_with(Arc::new(FailingContent), Vec::new());

    let response = router
        .oneshot(Request::get("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = body_string(response).await?;
    assert!(body.contains("Content service unavailable"));
    Ok(())
}

#[tokio::test]
async fn live_stream_delivers_new_post_at_the_top() -> TestResult {
    let router = router_with(
        Arc::new(StubContent { data: feed(&["p1", "p2"]) }),
        vec![
            ChannelEvent::Open,
            ChannelEvent::Update(feed(&["p3", "p1", "p2"])),
            ChannelEvent::Closed,
        ],
    );

    let response = router
        .oneshot(Request::get("/live").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await?;
    assert_order(&body, "id=\"post-p3\"", "id=\"post-p1\"");
    assert_order(&body, "id=\"post-p1\"", "id=\"post-p2\"");
    Ok(())
}

#[tokio::test]
async fn live_stream_error_panel_is_additive_to_the_post_list() -> TestResult {
    let payload = json!({"errors": [{"message": "token expired"}]});
    let router = router_with(
        Arc::new(StubContent { data: feed(&["p1"]) }),
        vec![
            ChannelEvent::Open,
            ChannelEvent::Update(feed(&["p3", "p1", "p2"])),
            ChannelEvent::Error(
                ChannelError::new("TOKEN_EXPIRED", "The API token has expired")
                    .with_response(payload),
            ),
            ChannelEvent::Closed,
        ],
    );

    let response = router
        .oneshot(Request::get("/live").body(Body::empty())?)
        .await?;
    let body = body_string(response).await?;

    assert!(body.contains("Error: TOKEN_EXPIRED"));
    assert!(body.contains("The API token has expired"));
    assert!(body.contains("token expired"));
    // The fault leaves the previously delivered posts rendered.
    assert!(body.contains("id=\"post-p3\""));
    assert!(body.contains("id=\"post-p1\""));
    assert!(body.contains("id=\"post-p2\""));
    Ok(())
}

#[tokio::test]
async fn live_stream_without_error_never_renders_a_panel() -> TestResult {
    let router = router_with(
        Arc::new(StubContent { data: feed(&["p1"]) }),
        vec![
            ChannelEvent::Open,
            ChannelEvent::Update(feed(&["p1"])),
            ChannelEvent::Closed,
        ],
    );

    let response = router
        .oneshot(Request::get("/live").body(Body::empty())?)
        .await?;
    let body = body_string(response).await?;

    assert!(body.contains("Connection closed"));
    assert!(body.contains("id=\"post-p1\""));
    assert!(!body.contains("channel-error-panel"));
    Ok(())
}

#[tokio::test]
async fn live_stream_is_seeded_from_the_last_page_fetch() -> TestResult {
    let router = router_with(
        Arc::new(StubContent { data: feed(&["p1", "p2"]) }),
        vec![ChannelEvent::Closed],
    );

    // The index fetch stores the seed the live view starts from.
    let page = router
        .clone()
        .oneshot(Request::get("/").body(Body::empty())?)
        .await?;
    assert_eq!(page.status(), StatusCode::OK);

    let response = router
        .oneshot(Request::get("/live").body(Body::empty())?)
        .await?;
    let body = body_string(response).await?;

    // No update was ever delivered, yet the seed posts are painted.
    assert!(body.contains("id=\"post-p1\""));
    assert!(body.contains("id=\"post-p2\""));
    assert!(body.contains("Connection closed"));
    Ok(())
}

#[tokio::test]
async fn health_endpoint_reports_no_content() -> TestResult {
    let router = router_with(Arc::new(FailingContent), Vec::new());

    let response = router
        .oneshot(Request::get("/_health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}
