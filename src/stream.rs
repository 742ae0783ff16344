//! Stream handle and operations.

use crate::client::{
    Client, ServiceResponse, EVENTS_DELETE_PATH, EVENTS_PUT_PATH, INFER_SCHEMA_PATH,
};
use crate::error::StreamError;
use crate::iterator::ReadBuilder;
use crate::time::Timestamp;
use crate::transport::TransportRequest;
use crate::types::{Cursor, Event};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A handle to a named stream.
///
/// This is a lightweight, cloneable object - not a persistent connection.
/// Operations make HTTP requests on demand.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) client: Client,
}

impl StreamHandle {
    /// Get the stream name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace operations on this handle use: its own if set, else the client's.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace
            .as_deref()
            .or(self.client.namespace.as_deref())
    }

    /// Use `namespace` for this handle instead of the client default.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Submit one event.
    ///
    /// The event is stamped with this library's identity and, if it has no
    /// time, the current time. Any identifier on it is dropped; the service
    /// assigns one.
    pub async fn put(&self, mut event: Event) -> Result<ServiceResponse, StreamError> {
        #[derive(Serialize)]
        struct WirePutRequest<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            namespace: Option<&'a str>,
            events: BTreeMap<&'a str, [&'a Event; 1]>,
        }

        event.stamp_for_submit();
        let wire = WirePutRequest {
            namespace: self.namespace(),
            events: BTreeMap::from([(self.name.as_str(), [&event])]),
        };
        let request = TransportRequest::post_json(self.client.url(EVENTS_PUT_PATH), &wire)?;
        self.client.call(request).await
    }

    /// Delete the events from `start` up to and including `end`.
    pub async fn delete(
        &self,
        start: impl Into<Cursor>,
        end: Timestamp,
    ) -> Result<DeleteResponse, StreamError> {
        #[derive(Serialize)]
        struct WireDeleteRequest<'a> {
            stream: &'a str,
            end_time: Timestamp,
            #[serde(skip_serializing_if = "Option::is_none")]
            start_time: Option<Timestamp>,
            #[serde(skip_serializing_if = "Option::is_none")]
            start_id: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            namespace: Option<&'a str>,
        }

        let start = start.into();
        let (start_time, start_id) = match &start {
            Cursor::At(ts) => (Some(*ts), None),
            Cursor::After(id) => (None, Some(id.as_str())),
        };
        let wire = WireDeleteRequest {
            stream: &self.name,
            end_time: end,
            start_time,
            start_id,
            namespace: self.namespace(),
        };
        let request = TransportRequest::post_json(self.client.url(EVENTS_DELETE_PATH), &wire)?;
        let response = self.client.call(request).await?;

        Ok(DeleteResponse {
            stream: self.name.clone(),
            response,
        })
    }

    /// Ask the service to infer a JSON schema for this stream's events.
    ///
    /// The schema comes back as the service produced it.
    pub async fn infer_schema(&self) -> Result<ServiceResponse, StreamError> {
        #[derive(Serialize)]
        struct WireSchemaRequest<'a> {
            stream: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            namespace: Option<&'a str>,
        }

        let wire = WireSchemaRequest {
            stream: &self.name,
            namespace: self.namespace(),
        };
        let request = TransportRequest::post_json(self.client.url(INFER_SCHEMA_PATH), &wire)?;
        self.client.call(request).await
    }

    /// Create a reader for the events from `start` up to and including `end`.
    pub fn read(&self, start: impl Into<Cursor>, end: Timestamp) -> ReadBuilder {
        ReadBuilder::new(self.clone(), start.into(), end)
    }
}

/// Response from a delete operation.
#[derive(Clone, Debug)]
pub struct DeleteResponse {
    stream: String,
    response: ServiceResponse,
}

impl DeleteResponse {
    /// Events deleted, summed over every storage backend holding the stream.
    pub fn num_deleted(&self) -> u64 {
        self.response
            .get(&self.stream)
            .and_then(Value::as_object)
            .map(|backends| {
                backends
                    .values()
                    .filter_map(|backend| backend.get("num_deleted").and_then(Value::as_u64))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// The raw service response.
    pub fn response(&self) -> &ServiceResponse {
        &self.response
    }
}
