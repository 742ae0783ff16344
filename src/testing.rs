//! In-memory transports for tests.

use crate::client::Client;
use crate::error::StreamError;
use crate::retry::RetryConfig;
use crate::transport::{BodyStream, Transport, TransportRequest};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// A client over `transport` that retries without delay.
pub(crate) fn client<T: Transport>(transport: T) -> Client {
    Client::builder("http://eventlog.test")
        .transport(transport)
        .retry(RetryConfig::immediate())
        .build()
        .expect("test client builds")
}

fn body_of(chunks: Vec<Result<Bytes, StreamError>>) -> BodyStream {
    futures::stream::iter(chunks).boxed()
}

/// What a scripted request gets back.
enum Reply {
    Body(BodyStream),
    Fail(StreamError),
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Body(_) => f.write_str("Body(..)"),
            Reply::Fail(err) => f.debug_tuple("Fail").field(err).finish(),
        }
    }
}

/// Replays canned replies in order and records every request.
///
/// Once the script runs out every request fails with a 503.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<Reply>,
    requests: Vec<TransportRequest>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, body: &[u8]) {
        self.respond_chunks(vec![Ok(Bytes::copy_from_slice(body))]);
    }

    pub(crate) fn respond_chunks(&self, chunks: Vec<Result<Bytes, StreamError>>) {
        self.respond_stream(body_of(chunks));
    }

    pub(crate) fn respond_stream(&self, body: BodyStream) {
        self.state.lock().replies.push_back(Reply::Body(body));
    }

    pub(crate) fn fail(&self, err: StreamError) {
        self.state.lock().replies.push_back(Reply::Fail(err));
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().requests.clone()
    }

    /// JSON body of the `n`th request.
    pub(crate) fn json_body(&self, n: usize) -> Value {
        let requests = self.state.lock();
        let body = requests.requests[n].body.as_ref().expect("request has a body");
        serde_json::from_slice(body).expect("request body is JSON")
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<BodyStream, StreamError>> {
        let mut state = self.state.lock();
        let url = request.url.clone();
        state.requests.push(request);
        let reply = state.replies.pop_front();
        drop(state);

        Box::pin(async move {
            match reply {
                Some(Reply::Body(body)) => Ok(body),
                Some(Reply::Fail(err)) => Err(err),
                None => Err(StreamError::from_status(503, &url)),
            }
        })
    }
}

/// Failure injected into the next range request.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Refuse the request with a 503.
    Refuse,
    /// Send this many events, then drop the connection halfway through the next.
    CutAfter(usize),
    /// Send this many events, then go quiet forever.
    StallAfter(usize),
}

/// A small event log service: stores events, assigns identifiers, and
/// answers range requests the way the real service does.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeLog {
    state: Arc<Mutex<LogState>>,
}

#[derive(Debug, Default)]
struct LogState {
    /// Events per stream, keyed by identifier.
    streams: BTreeMap<String, BTreeMap<String, Value>>,
    seq: u64,
    faults: VecDeque<Fault>,
    range_requests: Vec<Value>,
}

impl FakeLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store an event at `time` directly, returning its identifier.
    pub(crate) fn insert(&self, stream: &str, time: u64, fields: Value) -> String {
        let mut event = fields.as_object().cloned().unwrap_or_default();
        event.insert("@time".into(), json!(time));
        self.state.lock().store(stream, event)
    }

    pub(crate) fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Bodies of every range request received so far.
    pub(crate) fn range_requests(&self) -> Vec<Value> {
        self.state.lock().range_requests.clone()
    }

    pub(crate) fn len(&self, stream: &str) -> usize {
        self.state.lock().streams.get(stream).map_or(0, BTreeMap::len)
    }

    fn handle(&self, request: &TransportRequest) -> Result<BodyStream, StreamError> {
        let body: Value = match &request.body {
            Some(body) => serde_json::from_slice(body)?,
            None => Value::Null,
        };
        let mut state = self.state.lock();

        if request.url.ends_with("/1.0/events/get") {
            state.range_requests.push(body.clone());
            let events = state.range(&body);
            return match state.faults.pop_front() {
                None => Ok(body_of(events.iter().map(|e| Ok(encode(e))).collect())),
                Some(Fault::Refuse) => Err(StreamError::from_status(503, &request.url)),
                Some(Fault::CutAfter(n)) => {
                    let mut chunks: Vec<_> = events.iter().take(n).map(|e| Ok(encode(e))).collect();
                    if let Some(next) = events.get(n) {
                        let half = encode(next);
                        chunks.push(Ok(half.slice(..half.len() / 2)));
                    }
                    Ok(body_of(chunks))
                }
                Some(Fault::StallAfter(n)) => {
                    let sent: Vec<_> = events.iter().take(n).map(|e| Ok(encode(e))).collect();
                    Ok(futures::stream::iter(sent)
                        .chain(futures::stream::pending())
                        .boxed())
                }
            };
        }

        if request.url.ends_with("/1.0/events/put") {
            let mut stored = Map::new();
            if let Some(events) = body["events"].as_object() {
                for (stream, events) in events {
                    let events = events.as_array().cloned().unwrap_or_default();
                    for event in events {
                        state.store(stream, event.as_object().cloned().unwrap_or_default());
                    }
                    stored.insert(stream.clone(), json!({"memory": {"errors": []}}));
                }
            }
            stored.insert("@success".into(), json!(true));
            return Ok(body_of(vec![Ok(encode(&Value::Object(stored)))]));
        }

        if request.url.ends_with("/1.0/events/delete") {
            let stream = body["stream"].as_str().unwrap_or_default().to_string();
            let doomed: Vec<String> = state
                .range(&json!({
                    "stream": stream,
                    "start_time": body["start_time"],
                    "start_id": body["start_id"],
                    "end_time": body["end_time"],
                }))
                .iter()
                .filter_map(|e| e["@id"].as_str().map(str::to_string))
                .collect();
            if let Some(events) = state.streams.get_mut(&stream) {
                for id in &doomed {
                    events.remove(id);
                }
            }
            let reply = json!({
                "@success": true,
                stream: {"memory": {"num_deleted": doomed.len()}},
            });
            return Ok(body_of(vec![Ok(encode(&reply))]));
        }

        if request.url.ends_with("/1.0/streams") {
            let names: String = state.streams.keys().map(|s| format!("{}\r\n", s)).collect();
            return Ok(body_of(vec![Ok(Bytes::from(names))]));
        }

        Err(StreamError::from_status(404, &request.url))
    }
}

impl LogState {
    fn store(&mut self, stream: &str, mut event: Map<String, Value>) -> String {
        self.seq += 1;
        let time = event.get("@time").and_then(Value::as_u64).unwrap_or_default();
        let id = format!("{:020}-{:08}", time, self.seq);
        event.insert("@id".into(), json!(id));
        self.streams
            .entry(stream.to_string())
            .or_default()
            .insert(id.clone(), Value::Object(event));
        id
    }

    /// Events matching a range request, in the requested order.
    ///
    /// `start_id` is exclusive in the requested order: for a descending read
    /// it bounds the range from above. This is the server contract resumed
    /// descending reads depend on; a service that always treats `start_id`
    /// as a lower bound will not resume them correctly.
    fn range(&self, query: &Value) -> Vec<Value> {
        let Some(events) = query["stream"].as_str().and_then(|s| self.streams.get(s)) else {
            return Vec::new();
        };
        let end = query["end_time"].as_u64().unwrap_or(u64::MAX);
        let descending = query["order"] == "descending";
        let start_time = query["start_time"].as_u64();
        let start_id = query["start_id"].as_str();

        let mut matched: Vec<Value> = events
            .iter()
            .filter(|(id, event)| {
                let time = event["@time"].as_u64().unwrap_or_default();
                let after_start = match (start_id, start_time) {
                    (Some(start), _) if descending => id.as_str() < start,
                    (Some(start), _) => id.as_str() > start,
                    (None, Some(start)) => time >= start,
                    (None, None) => true,
                };
                after_start && time <= end
            })
            .map(|(_, event)| event.clone())
            .collect();

        if descending {
            matched.reverse();
        }
        if let Some(limit) = query["limit"].as_u64() {
            matched.truncate(limit as usize);
        }
        matched
    }
}

fn encode(value: &Value) -> Bytes {
    Bytes::from(serde_json::to_vec(value).expect("JSON values always encode"))
}

impl Transport for FakeLog {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<BodyStream, StreamError>> {
        let result = self.handle(&request);
        Box::pin(async move { result })
    }
}
