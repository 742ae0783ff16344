//! Event Log Rust Client
//!
//! A Rust client library for an append-only event log service: named streams
//! of JSON events, each with a sortable identifier and a timestamp.
//!
//! Range reads stream their results: events are decoded as the response
//! arrives and handed over one at a time, and a read that loses its
//! connection picks up right after the last event it delivered.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use eventlog::{Client, Event, Timestamp};
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder("http://localhost:8150")
//!         .namespace("kronos")
//!         .build()?;
//!     let stream = client.stream("page_views");
//!
//!     // Submit an event
//!     let mut event = Event::new();
//!     event.insert("path", "/home")?;
//!     stream.put(event).await?;
//!
//!     // Read the last hour back
//!     let end = Timestamp::now();
//!     let start = end.saturating_sub(Duration::from_secs(3600));
//!     let mut events = stream.read(start, end).limit(100).send();
//!     while let Some(event) = events.next().await {
//!         let event = event?;
//!         println!("{:?} {:?}", event.id(), event.get("path"));
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod decode;
mod error;
mod iterator;
mod pipeline;
mod retry;
mod stream;
mod time;
mod transport;
mod types;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder, ServiceResponse};
pub use decode::EventDecoder;
pub use error::{InvalidHeaderError, StreamError};
pub use iterator::{EventStream, ReadBuilder};
pub use retry::{JitterMode, RetryConfig};
pub use stream::{DeleteResponse, StreamHandle};
pub use time::{Timestamp, TICKS_PER_SECOND};
pub use transport::{
    BodyStream, HeaderProvider, HttpTransport, HttpTransportBuilder, Transport, TransportRequest,
};
pub use types::{
    Cursor, Event, EventId, Library, Order, CLIENT_NAME, CLIENT_VERSION, ID_FIELD, LIBRARY_FIELD,
    SUCCESS_FIELD, TIME_FIELD,
};
