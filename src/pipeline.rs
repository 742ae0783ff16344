//! Background worker behind a range read.
//!
//! The worker owns the response body, decodes events as bytes arrive and
//! hands each one to the consumer through a rendezvous: it does not read
//! further until the consumer has taken the previous event. On transport
//! failure it asks the [`RetrySession`] whether and where to resume.

use crate::decode::EventDecoder;
use crate::error::StreamError;
use crate::retry::{Resume, RetrySession};
use crate::transport::{Transport, TransportRequest};
use crate::types::{Cursor, Event, Order};
use crate::time::Timestamp;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

/// One item crossing the delivery channel, with the receipt the consumer
/// completes by taking it.
pub(crate) struct Delivery {
    pub(crate) item: Result<Event, StreamError>,
    pub(crate) taken: oneshot::Sender<()>,
}

/// Everything a read needs, fixed for the lifetime of the read.
#[derive(Debug, Clone)]
pub(crate) struct RangeQuery {
    pub(crate) url: String,
    pub(crate) stream: String,
    pub(crate) namespace: Option<String>,
    pub(crate) end: Timestamp,
    pub(crate) order: Order,
    pub(crate) read_timeout: Duration,
}

/// Wire body of a range request.
#[derive(Debug, Serialize)]
pub(crate) struct WireRangeRequest<'a> {
    stream: &'a str,
    end_time: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    order: Order,
}

impl<'a> WireRangeRequest<'a> {
    pub(crate) fn new(query: &'a RangeQuery, cursor: &'a Cursor, limit: Option<u64>) -> Self {
        let (start_time, start_id) = match cursor {
            Cursor::At(ts) => (Some(*ts), None),
            Cursor::After(id) => (None, Some(id.as_str())),
        };
        Self {
            stream: &query.stream,
            end_time: query.end,
            start_time,
            start_id,
            namespace: query.namespace.as_deref(),
            limit,
            order: query.order,
        }
    }
}

/// How one attempt ended, short of a transport failure.
enum Outcome {
    /// Body fully read, or the limit was met.
    Complete,
    /// The consumer went away.
    Cancelled,
}

/// Run a read to completion, delivering events and at most one terminal error.
pub(crate) async fn run(
    transport: Arc<dyn Transport>,
    query: RangeQuery,
    mut session: RetrySession,
    tx: mpsc::Sender<Delivery>,
) {
    loop {
        debug!(
            stream = %query.stream,
            cursor = %session.cursor(),
            attempt = session.attempts() + 1,
            "requesting range"
        );

        let err = match attempt(transport.as_ref(), &query, &mut session, &tx).await {
            Ok(Outcome::Complete) => {
                debug!(stream = %query.stream, "range read complete");
                return;
            }
            Ok(Outcome::Cancelled) => {
                debug!(stream = %query.stream, "range read cancelled by consumer");
                return;
            }
            Err(err) if err.is_transport() => err,
            Err(err) => {
                error!(stream = %query.stream, error = %err, "range read failed");
                let _ = hand_off(&tx, Err(err)).await;
                return;
            }
        };

        match session.on_failure(err) {
            Resume::Retry { cursor, delay } => {
                warn!(
                    stream = %query.stream,
                    attempt = session.attempts(),
                    %cursor,
                    last_id = ?session.last_id(),
                    ?delay,
                    "transport failure, resuming"
                );
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = tx.closed() => return,
                    }
                }
            }
            Resume::GiveUp(err) => {
                error!(stream = %query.stream, error = %err, "range read failed");
                let _ = hand_off(&tx, Err(err)).await;
                return;
            }
        }
    }
}

/// One request: open the body and pump events until it ends.
async fn attempt(
    transport: &dyn Transport,
    query: &RangeQuery,
    session: &mut RetrySession,
    tx: &mpsc::Sender<Delivery>,
) -> Result<Outcome, StreamError> {
    if session.limit_reached() {
        return Ok(Outcome::Complete);
    }

    let wire = WireRangeRequest::new(query, session.cursor(), session.remaining());
    let request = TransportRequest::post_json(query.url.clone(), &wire)?;

    let mut body = tokio::select! {
        opened = tokio::time::timeout(query.read_timeout, transport.execute(request)) => {
            opened.map_err(|_| StreamError::Timeout)??
        }
        _ = tx.closed() => return Ok(Outcome::Cancelled),
    };

    let mut decoder = EventDecoder::new();
    loop {
        while let Some(event) = decoder.next_event()? {
            trace!(id = ?event.id(), "decoded event");
            session.record(&event);
            if !hand_off(tx, Ok(event)).await {
                return Ok(Outcome::Cancelled);
            }
            if session.limit_reached() {
                return Ok(Outcome::Complete);
            }
        }

        let chunk = tokio::select! {
            chunk = tokio::time::timeout(query.read_timeout, body.next()) => {
                chunk.map_err(|_| StreamError::Timeout)?
            }
            _ = tx.closed() => return Ok(Outcome::Cancelled),
        };

        match chunk {
            Some(bytes) => decoder.push(&bytes?),
            None => {
                decoder.finish()?;
                return Ok(Outcome::Complete);
            }
        }
    }
}

/// Hand one item to the consumer and wait until it is taken.
///
/// Returns `false` if the consumer is gone.
async fn hand_off(tx: &mpsc::Sender<Delivery>, item: Result<Event, StreamError>) -> bool {
    let (taken, receipt) = oneshot::channel();
    if tx.send(Delivery { item, taken }).await.is_err() {
        return false;
    }
    receipt.await.is_ok()
}
