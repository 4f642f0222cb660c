//! SSE-backed implementation of the live channel.
//!
//! The CMS real-time API takes the same query document as the content
//! endpoint: the query is registered with a POST, the response names the
//! channel URL, and the channel delivers `update` / `channelError` events
//! over an event stream. Reconnection and backoff are deliberately absent;
//! a broken channel surfaces as an error followed by closure.

use async_stream::stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::application::content::{ChannelEvent, ChannelSource, QueryRequest};
use crate::config::CmsSettings;
use crate::domain::entities::FeedData;
use crate::domain::types::ChannelError;
use crate::infra::cms::user_agent;
use crate::infra::error::InfraError;

pub struct SseChannelSource {
    http: Client,
    listen_endpoint: Url,
    token: String,
}

impl SseChannelSource {
    pub fn new(settings: &CmsSettings) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            http,
            listen_endpoint: settings.listen_endpoint.clone(),
            token: settings.token.clone(),
        })
    }
}

impl ChannelSource for SseChannelSource {
    fn open_channel(&self, request: &QueryRequest) -> BoxStream<'static, ChannelEvent> {
        let http = self.http.clone();
        let listen_endpoint = self.listen_endpoint.clone();
        let token = self.token.clone();
        let request = request.clone();

        Box::pin(stream! {
            let channel_url = match register(&http, &listen_endpoint, &token, &request).await {
                Ok(url) => url,
                Err(error) => {
                    yield ChannelEvent::Error(error);
                    yield ChannelEvent::Closed;
                    return;
                }
            };

            let response = match http
                .get(channel_url)
                .bearer_auth(&token)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    yield ChannelEvent::Error(ChannelError::new(
                        "CONNECTION_FAILED",
                        format!("channel responded with {}", response.status()),
                    ));
                    yield ChannelEvent::Closed;
                    return;
                }
                Err(err) => {
                    yield ChannelEvent::Error(ChannelError::new(
                        "CONNECTION_FAILED",
                        err.to_string(),
                    ));
                    yield ChannelEvent::Closed;
                    return;
                }
            };

            yield ChannelEvent::Open;

            let mut decoder = EventStreamDecoder::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for record in decoder.push(&bytes) {
                            if let Some(event) = decode_event(&record) {
                                yield event;
                            }
                        }
                    }
                    Err(err) => {
                        yield ChannelEvent::Error(ChannelError::new(
                            "STREAM_INTERRUPTED",
                            err.to_string(),
                        ));
                        break;
                    }
                }
            }

            yield ChannelEvent::Closed;
        })
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    url: String,
}

/// Register the query with the listen endpoint; the response names the
/// channel to consume.
async fn register(
    http: &Client,
    listen_endpoint: &Url,
    token: &str,
    request: &QueryRequest,
) -> Result<Url, ChannelError> {
    let response = http
        .post(listen_endpoint.clone())
        .bearer_auth(token)
        .json(request)
        .send()
        .await
        .map_err(|err| ChannelError::new("CONNECTION_FAILED", err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let mut error = ChannelError::new(
            "REGISTRATION_FAILED",
            format!("listen endpoint responded with {status}"),
        );
        if let Ok(payload) = serde_json::from_str(&body) {
            error = error.with_response(payload);
        }
        return Err(error);
    }

    let registration: RegistrationResponse = response
        .json()
        .await
        .map_err(|err| ChannelError::new("REGISTRATION_FAILED", err.to_string()))?;

    let url = Url::parse(&registration.url).map_err(|err| {
        ChannelError::new(
            "REGISTRATION_FAILED",
            format!("invalid channel url `{}`: {err}", registration.url),
        )
    })?;

    debug!(target = "diretta::realtime", channel = %url, "channel registered");
    Ok(url)
}

/// One event-stream record: the `event` field plus its joined `data` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental decoder for `text/event-stream` payloads. Chunks may split
/// records and even lines arbitrarily; state carries across `push` calls.
pub(crate) struct EventStreamDecoder {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            event: None,
            data_lines: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut records = Vec::new();
        while let Some(position) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=position).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(record) = self.finish_record() {
                    records.push(record);
                }
                continue;
            }

            self.push_line(line);
        }
        records
    }

    fn push_line(&mut self, line: &str) {
        // Comment lines (used by servers as keep-alives) carry no fields.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
    }

    fn finish_record(&mut self) -> Option<SseRecord> {
        let event = self.event.take();
        let data_lines = std::mem::take(&mut self.data_lines);
        if event.is_none() && data_lines.is_empty() {
            return None;
        }
        Some(SseRecord {
            event,
            data: data_lines.join("\n"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UpdateEnvelope {
    response: UpdateResponse,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    data: FeedData,
}

/// Map a decoded record to a channel event. Unknown and keep-alive records
/// yield nothing; malformed payloads surface as channel errors rather than
/// being dropped.
fn decode_event(record: &SseRecord) -> Option<ChannelEvent> {
    match record.event.as_deref() {
        Some("update") => match serde_json::from_str::<UpdateEnvelope>(&record.data) {
            Ok(envelope) => Some(ChannelEvent::Update(envelope.response.data)),
            Err(err) => Some(ChannelEvent::Error(ChannelError::new(
                "DECODE_ERROR",
                format!("malformed update payload: {err}"),
            ))),
        },
        Some("channelError") => match serde_json::from_str::<ChannelError>(&record.data) {
            Ok(error) => Some(ChannelEvent::Error(error)),
            Err(err) => Some(ChannelEvent::Error(ChannelError::new(
                "DECODE_ERROR",
                format!("malformed channelError payload: {err}"),
            ))),
        },
        _ => None,
    }
}
