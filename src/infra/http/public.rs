use std::{
    convert::Infallible,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_stream::stream;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::get,
};
use metrics::gauge;
use time::OffsetDateTime;
use tracing::error;

use crate::{
    application::{
        content::ChannelSource,
        error::HttpError,
        feed::FeedService,
        stream::snapshot_patches,
        subscription::{QuerySubscription, Snapshot},
    },
    domain::{entities::FeedData, types::ConnectionStatus},
    presentation::views::{IndexTemplate, render_template_response},
};

use super::middleware::{log_responses, set_request_context};

const FAVICON_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16 16"><circle cx="8" cy="8" r="6" fill="#ec4899"/><circle cx="8" cy="8" r="3" fill="#fff"/></svg>"##;

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub channel: Arc<dyn ChannelSource>,
    /// Most recent feed fetched by any page render; seeds new live views so
    /// their first paint needs no extra fetch.
    pub last_feed: Arc<RwLock<Option<FeedData>>>,
    pub timestamp_refresh: Duration,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/live", get(live))
        .route("/favicon.ico", get(favicon))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Initial fetch stage: one query per page visit, rendered server-side. A
/// fetch fault fails this page response; nothing is served from a cache.
async fn index(State(state): State<HttpState>) -> Response {
    match state.feed.initial_feed().await {
        Ok(data) => {
            if let Ok(mut guard) = state.last_feed.write() {
                *guard = Some(data.clone());
            }
            let snapshot = Snapshot::seeded(Some(data));
            let view = state.feed.view_context(&snapshot, OffsetDateTime::now_utc());
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Live subscription stage: one channel per page view. Patches are emitted
/// in snapshot-change order, interleaved with a periodic tick that keeps
/// relative timestamps advancing. Dropping the response (client gone) drops
/// the subscription, which releases the channel.
async fn live(State(state): State<HttpState>) -> Response {
    let seed = match state.last_feed.read() {
        Ok(guard) => guard.clone(),
        Err(_) => None,
    };

    let subscription = QuerySubscription::open(state.channel.clone(), &state.feed.request(), seed);
    let feed = state.feed.clone();
    let refresh = state.timestamp_refresh;

    let patches = stream! {
        let _active = ActiveStreamGuard::new();
        let mut rx = subscription.watch();
        let mut ticker = tokio::time::interval(refresh);
        ticker.tick().await; // consume the immediate first tick

        loop {
            let snapshot = rx.borrow_and_update().clone();
            let closed = snapshot.status == ConnectionStatus::Closed;

            let view = feed.view_context(&snapshot, OffsetDateTime::now_utc());
            match snapshot_patches(&view) {
                Ok(batch) => {
                    for event in batch.into_events() {
                        yield Ok::<Event, Infallible>(event);
                    }
                }
                Err(err) => {
                    error!(
                        target = "diretta::http::live",
                        error = %err,
                        "failed to render live patches"
                    );
                    break;
                }
            }

            if closed {
                break;
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }
        }

        drop(subscription);
    };

    Sse::new(patches).into_response()
}

struct ActiveStreamGuard;

impl ActiveStreamGuard {
    fn new() -> Self {
        gauge!("diretta_live_streams_active").increment(1.0);
        Self
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        gauge!("diretta_live_streams_active").decrement(1.0);
    }
}

async fn favicon() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "image/svg+xml; charset=utf-8")
        .header(CACHE_CONTROL, "public, max-age=3600")
        .body(Body::from(FAVICON_SVG))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
