//! Handler lifecycle, synchronous and asynchronous service paths.

mod common;

use common::{mock_pair, FnDispatcher, SentResponse};
use http::Method;
use may::sync::mpsc;
use portico::error::{HttpError, LifecycleError};
use portico::exchange::ResponseBody;
use portico::handler::{
    Dispatched, HttpHandler, RequestDispatcher, RequestObserver, ServiceOutcome,
};
use portico::server::raw::RequestHead;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn hello_handler() -> HttpHandler {
    HttpHandler::new(Arc::new(FnDispatcher(|mut exchange: portico::Exchange| {
        let _ = exchange
            .response_mut()
            .set_body(ResponseBody::Text("Hello".to_string()));
        Dispatched::Completed(Box::new(exchange))
    })))
}

#[test]
fn test_get_hello_end_to_end() {
    let handler = hello_handler();
    handler.start();
    let (req, res, handles) = mock_pair(Method::GET, "/hello", &[], None);
    assert!(matches!(
        handler.service(req, res).unwrap(),
        ServiceOutcome::Completed
    ));
    let sent: SentResponse = handles.sent().expect("response was flushed");
    assert_eq!(sent.status, 200);
    assert_eq!(sent.header("content-type"), Some("text/plain"));
    assert_eq!(sent.body, b"Hello");
    assert_eq!(sent.header("content-length"), Some("5"));
    assert_eq!(handles.send_count(), 1);
}

#[test]
fn test_post_json_round_trip() {
    let handler = HttpHandler::new(Arc::new(FnDispatcher(
        |mut exchange: portico::Exchange| {
            let decoded = exchange
                .request_mut()
                .get_body(portico::exchange::BodyTarget::Json)
                .unwrap();
            let portico::exchange::DecodedBody::Json(value) = decoded else {
                unreachable!("json target produces json");
            };
            let _ = exchange
                .response_mut()
                .set_body(ResponseBody::Json(json!({ "echo": value })));
            Dispatched::Completed(Box::new(exchange))
        },
    )));
    handler.start();
    let (req, res, handles) = mock_pair(
        Method::POST,
        "/echo",
        &[("Content-Type", "application/json")],
        Some(b"{\"x\":1}"),
    );
    handler.service(req, res).unwrap();
    let sent = handles.sent().unwrap();
    assert_eq!(sent.status, 200);
    assert_eq!(sent.header("content-type"), Some("application/json"));
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&sent.body).unwrap(),
        json!({ "echo": { "x": 1 } })
    );
}

#[test]
fn test_async_continuation_completes_exactly_once_after_event() {
    let (event_tx, event_rx) = mpsc::channel::<()>();
    let event_rx = Arc::new(Mutex::new(Some(event_rx)));
    let handler = HttpHandler::new(Arc::new(FnDispatcher(move |exchange: portico::Exchange| {
        let event_rx = event_rx.lock().unwrap().take().expect("single request");
        let gate = exchange
            .execute_async(move |mut async_exchange| {
                // Block until the external event before producing output.
                let _ = event_rx.recv();
                let _ = async_exchange
                    .response_mut()
                    .set_body(ResponseBody::Text("done".to_string()));
                async_exchange.complete();
            })
            .expect("async supported");
        Dispatched::Suspended(gate)
    })));
    handler.start();

    let (req, res, handles) = mock_pair(Method::GET, "/slow", &[], None);
    let outcome = handler.service(req, res).unwrap();
    let ServiceOutcome::Suspended(gate) = outcome else {
        panic!("expected a suspended outcome");
    };

    // The continuation is waiting on the event: nothing flushed yet.
    std::thread::sleep(Duration::from_millis(50));
    assert!(handles.sent().is_none());
    assert_eq!(handles.send_count(), 0);

    event_tx.send(()).unwrap();
    let status = gate.wait().expect("continuation signals the gate");
    assert_eq!(status, 200);
    let sent = handles.sent().unwrap();
    assert_eq!(sent.body, b"done");
    assert_eq!(handles.send_count(), 1);
}

#[test]
fn test_async_continuation_panic_still_terminates_response() {
    let handler = HttpHandler::new(Arc::new(FnDispatcher(|exchange: portico::Exchange| {
        let gate = exchange
            .execute_async(|_async_exchange| {
                panic!("continuation exploded");
            })
            .expect("async supported");
        Dispatched::Suspended(gate)
    })));
    handler.start();

    let (req, res, handles) = mock_pair(Method::GET, "/boom", &[], None);
    let outcome = handler.service(req, res).unwrap();
    let ServiceOutcome::Suspended(gate) = outcome else {
        panic!("expected a suspended outcome");
    };
    let status = gate.wait().expect("gate released despite panic");
    assert_eq!(status, 500);
    assert_eq!(handles.sent().unwrap().status, 500);
    assert_eq!(handles.send_count(), 1);
}

#[test]
fn test_dispatch_failure_maps_to_error_response() {
    let handler = HttpHandler::new(Arc::new(FnDispatcher(|exchange: portico::Exchange| {
        Dispatched::Failed(
            Box::new(exchange),
            HttpError::UnsupportedMediaType("text/csv".to_string()),
        )
    })));
    handler.start();
    let (req, res, handles) = mock_pair(Method::POST, "/csv", &[], None);
    handler.service(req, res).unwrap();
    let sent = handles.sent().unwrap();
    assert_eq!(sent.status, 415);
    assert!(sent.body_text().contains("text/csv"));
}

#[test]
fn test_dispatch_panic_still_terminates_response() {
    struct Panicking;
    impl RequestDispatcher for Panicking {
        fn dispatch(&self, _exchange: portico::Exchange) -> Dispatched {
            panic!("dispatch exploded");
        }
    }
    let handler = HttpHandler::new(Arc::new(Panicking));
    handler.start();
    let (req, res, handles) = mock_pair(Method::GET, "/panic", &[], None);
    assert!(matches!(
        handler.service(req, res).unwrap(),
        ServiceOutcome::Completed
    ));
    assert_eq!(handles.sent().unwrap().status, 500);
    assert_eq!(handles.send_count(), 1);
}

#[test]
fn test_service_after_close_fails_fast() {
    let handler = hello_handler();
    handler.start();
    handler.close();
    assert!(!handler.is_running());
    let (req, res, handles) = mock_pair(Method::GET, "/late", &[], None);
    let err = handler.service(req, res).err().unwrap();
    assert!(matches!(
        err,
        HttpError::Lifecycle(LifecycleError::AlreadyClosed)
    ));
    // The handler never touched the native response.
    assert_eq!(handles.send_count(), 0);
}

#[test]
fn test_start_is_idempotent() {
    let handler = hello_handler();
    handler.start();
    handler.start();
    assert!(handler.is_running());
    let (req, res, handles) = mock_pair(Method::GET, "/hello", &[], None);
    handler.service(req, res).unwrap();
    assert_eq!(handles.sent().unwrap().status, 200);
}

struct CountingObserver {
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<(String, u16, bool)>>>,
}

impl RequestObserver for CountingObserver {
    fn on_complete(&self, head: &RequestHead, status: u16, error: Option<&HttpError>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((head.path().to_string(), status, error.is_some()));
    }
}

#[test]
fn test_observer_runs_exactly_once_per_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));
    let handler = hello_handler().with_observer(Arc::new(CountingObserver {
        calls: calls.clone(),
        last: last.clone(),
    }));
    handler.start();

    let (req, res, _handles) = mock_pair(Method::GET, "/observed", &[], None);
    handler.service(req, res).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        last.lock().unwrap().clone(),
        Some(("/observed".to_string(), 200, false))
    );

    let (req, res, _handles) = mock_pair(Method::GET, "/observed-2", &[], None);
    handler.service(req, res).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_observer_sees_async_completion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));
    let handler = HttpHandler::new(Arc::new(FnDispatcher(|exchange: portico::Exchange| {
        let gate = exchange
            .execute_async(|mut async_exchange| {
                let _ = async_exchange
                    .response_mut()
                    .set_body(ResponseBody::Text("late".to_string()));
                async_exchange.complete();
            })
            .expect("async supported");
        Dispatched::Suspended(gate)
    })))
    .with_observer(Arc::new(CountingObserver {
        calls: calls.clone(),
        last: last.clone(),
    }));
    handler.start();

    let (req, res, _handles) = mock_pair(Method::GET, "/async-observed", &[], None);
    let ServiceOutcome::Suspended(gate) = handler.service(req, res).unwrap() else {
        panic!("expected a suspended outcome");
    };
    gate.wait();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        last.lock().unwrap().clone(),
        Some(("/async-observed".to_string(), 200, false))
    );
}
