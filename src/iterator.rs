//! Range reads: [`ReadBuilder`] and the [`EventStream`] it produces.

use crate::error::StreamError;
use crate::pipeline::{self, Delivery, RangeQuery};
use crate::retry::{RetryConfig, RetrySession};
use crate::stream::StreamHandle;
use crate::time::Timestamp;
use crate::types::{Cursor, Event, Order};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

/// Builder for configuring a range read.
#[derive(Debug)]
#[must_use = "builders do nothing unless you call .send()"]
pub struct ReadBuilder {
    stream: StreamHandle,
    start: Cursor,
    end: Timestamp,
    limit: Option<u64>,
    order: Order,
    retry: RetryConfig,
    read_timeout: Duration,
}

impl ReadBuilder {
    pub(crate) fn new(stream: StreamHandle, start: Cursor, end: Timestamp) -> Self {
        let retry = stream.client.retry.clone();
        let read_timeout = stream.client.read_timeout;
        Self {
            stream,
            start,
            end,
            limit: None,
            order: Order::Ascending,
            retry,
            read_timeout,
        }
    }

    /// Cap the number of events returned.
    ///
    /// The cap holds across resumed requests.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the order events are returned in.
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Override the retry policy for this read.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt read timeout: the longest wait for the response
    /// to start, or for the next piece of its body.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Start the read.
    ///
    /// Spawns the background worker on the current Tokio runtime; the first
    /// request goes out right away.
    pub fn send(self) -> EventStream {
        let query = RangeQuery {
            url: self.stream.client.url(crate::client::EVENTS_GET_PATH),
            stream: self.stream.name.clone(),
            namespace: self.stream.namespace().map(str::to_string),
            end: self.end,
            order: self.order,
            read_timeout: self.read_timeout,
        };
        let session = RetrySession::new(self.retry, self.start, self.limit);

        // A single slot plus the receipt wait in the worker makes the handoff synchronous.
        let (tx, rx) = mpsc::channel(1);
        let transport = self.stream.client.transport.clone();
        tokio::spawn(pipeline::run(transport, query, session, tx));

        EventStream {
            rx: Some(rx),
            failed: false,
        }
    }
}

/// Events of a range, in the order the service returns them.
///
/// Ends with `None` once the range is exhausted, or after yielding exactly
/// one `Err` if the read could not be completed. Single pass: read the
/// range again with a fresh [`ReadBuilder`].
///
/// Dropping the stream (or calling [`close`](Self::close)) stops the
/// background worker and releases its connection.
#[derive(Debug)]
pub struct EventStream {
    rx: Option<mpsc::Receiver<Delivery>>,
    failed: bool,
}

impl EventStream {
    /// Stop the read and release resources.
    pub fn close(&mut self) {
        self.rx = None;
    }

    /// Whether the stream has ended, normally or not.
    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    /// Whether the read ended with an error.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Fetch the next event.
    pub async fn next_event(&mut self) -> Option<Result<Event, StreamError>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect_events(mut self) -> Result<Vec<Event>, StreamError> {
        let mut events = Vec::new();
        while let Some(item) = self.next_event().await {
            events.push(item?);
        }
        Ok(events)
    }
}

impl Stream for EventStream {
    type Item = Result<Event, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(delivery)) => {
                let _ = delivery.taken.send(());
                if delivery.item.is_err() {
                    self.failed = true;
                    self.rx = None;
                }
                Poll::Ready(Some(delivery.item))
            }
            Poll::Ready(None) => {
                self.rx = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
