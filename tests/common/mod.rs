//! Shared test fixtures: mock engine adapters and a closure dispatcher.

use portico::error::HttpError;
use portico::exchange::Exchange;
use portico::handler::{Dispatched, RequestDispatcher};
use portico::headers::Headers;
use portico::server::raw::{
    ChunkReceiver, RawRequest, RawResponse, RequestHead, ResponseHead,
};
use http::Method;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What a mock native response received at flush time.
#[derive(Debug, Clone)]
pub struct SentResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl SentResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

pub struct MockRequest {
    head: RequestHead,
    body: Option<Vec<u8>>,
    reads: Arc<AtomicUsize>,
}

impl RawRequest for MockRequest {
    fn head(&self) -> &RequestHead {
        &self.head
    }

    fn read_body(&mut self) -> Result<Vec<u8>, HttpError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.take().unwrap_or_default())
    }
}

pub struct MockResponse {
    sent: Arc<Mutex<Option<SentResponse>>>,
    sends: Arc<AtomicUsize>,
}

impl RawResponse for MockResponse {
    fn send(&mut self, head: ResponseHead, body: Vec<u8>) -> Result<(), HttpError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        *self.sent.lock().unwrap() = Some(SentResponse {
            status: head.status,
            headers: head.headers,
            body,
        });
        Ok(())
    }

    fn send_stream(&mut self, head: ResponseHead, chunks: ChunkReceiver) -> Result<(), HttpError> {
        let mut body = Vec::new();
        while let Ok(Ok(chunk)) = chunks.recv() {
            body.extend_from_slice(&chunk);
        }
        self.send(head, body)
    }

    fn send_file(&mut self, head: ResponseHead, path: &Path) -> Result<(), HttpError> {
        let bytes = std::fs::read(path).map_err(HttpError::ResponseWrite)?;
        self.send(head, bytes)
    }
}

/// Handles to observe what a mock request/response pair did.
pub struct MockHandles {
    pub sent: Arc<Mutex<Option<SentResponse>>>,
    pub sends: Arc<AtomicUsize>,
    pub body_reads: Arc<AtomicUsize>,
}

impl MockHandles {
    pub fn sent(&self) -> Option<SentResponse> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn body_read_count(&self) -> usize {
        self.body_reads.load(Ordering::SeqCst)
    }
}

/// Build a mock native pair for one request.
pub fn mock_pair(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> (Box<MockRequest>, Box<MockResponse>, MockHandles) {
    let mut header_map = Headers::new();
    for (name, value) in headers {
        header_map.add(*name, *value);
    }
    if let Some(body) = body {
        if header_map.get("content-length").is_none() {
            header_map.add("Content-Length", body.len().to_string());
        }
    }
    let reads = Arc::new(AtomicUsize::new(0));
    let sent = Arc::new(Mutex::new(None));
    let sends = Arc::new(AtomicUsize::new(0));
    let request = Box::new(MockRequest {
        head: RequestHead::new(method, uri, header_map, None),
        body: body.map(|b| b.to_vec()),
        reads: reads.clone(),
    });
    let response = Box::new(MockResponse {
        sent: sent.clone(),
        sends: sends.clone(),
    });
    (
        request,
        response,
        MockHandles {
            sent,
            sends,
            body_reads: reads,
        },
    )
}

/// A dispatcher from a closure, for tests that script the application side.
pub struct FnDispatcher<F>(pub F);

impl<F> RequestDispatcher for FnDispatcher<F>
where
    F: Fn(Exchange) -> Dispatched + Send + Sync,
{
    fn dispatch(&self, exchange: Exchange) -> Dispatched {
        (self.0)(exchange)
    }
}
