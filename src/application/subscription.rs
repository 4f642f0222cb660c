//! Live query subscription: an in-memory snapshot kept synchronized with
//! channel events.

use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::application::content::{ChannelEvent, ChannelSource, QueryRequest};
use crate::domain::{
    entities::FeedData,
    types::{ChannelError, ConnectionStatus},
};

/// The most recently known `{data, status, error}` tuple.
///
/// `data` starts at the seed so the first paint shows real content with no
/// loading flicker. `error`, once set, means the data may be stale; a
/// subsequent successful update clears it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub data: Option<FeedData>,
    pub status: ConnectionStatus,
    pub error: Option<ChannelError>,
}

impl Snapshot {
    pub fn seeded(data: Option<FeedData>) -> Self {
        Self {
            data,
            status: ConnectionStatus::Connecting,
            error: None,
        }
    }
}

/// A live channel bound to one page view.
///
/// Owns the snapshot exclusively; consumers read it through cloned watch
/// receivers. Created when the page view mounts, discarded when it unmounts;
/// dropping it aborts the driver task, which releases the channel. No
/// background work outlives the owning view.
pub struct QuerySubscription {
    rx: watch::Receiver<Snapshot>,
    driver: JoinHandle<()>,
}

impl QuerySubscription {
    pub fn open(
        source: Arc<dyn ChannelSource>,
        request: &QueryRequest,
        seed: Option<FeedData>,
    ) -> Self {
        let (tx, rx) = watch::channel(Snapshot::seeded(seed));
        let mut events = source.open_channel(request);

        let driver = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                counter!("diretta_channel_events_total", "kind" => event_kind(&event))
                    .increment(1);
                debug!(
                    target = "diretta::subscription",
                    kind = event_kind(&event),
                    "channel event"
                );

                let closed = matches!(event, ChannelEvent::Closed);
                tx.send_modify(|snapshot| apply_event(snapshot, event));
                if closed {
                    return;
                }
            }

            // Stream ended without an explicit close event; the channel is
            // gone either way.
            tx.send_if_modified(|snapshot| {
                if snapshot.status == ConnectionStatus::Closed {
                    false
                } else {
                    snapshot.status = ConnectionStatus::Closed;
                    true
                }
            });
        });

        Self { rx, driver }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change in delivery order.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.rx.clone()
    }

    pub fn close(&self) {
        self.driver.abort();
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn apply_event(snapshot: &mut Snapshot, event: ChannelEvent) {
    match event {
        ChannelEvent::Open => snapshot.status = ConnectionStatus::Connected,
        ChannelEvent::Update(data) => {
            snapshot.data = Some(data);
            snapshot.error = None;
        }
        ChannelEvent::Error(error) => snapshot.error = Some(error),
        ChannelEvent::Closed => snapshot.status = ConnectionStatus::Closed,
    }
}

fn event_kind(event: &ChannelEvent) -> &'static str {
    match event {
        ChannelEvent::Open => "open",
        ChannelEvent::Update(_) => "update",
        ChannelEvent::Error(_) => "error",
        ChannelEvent::Closed => "closed",
    }
}
