//! Binder resolution precedence and bind outcomes.

mod common;

use common::{mock_pair, FnDispatcher};
use http::Method;
use portico::binding::{
    ArgumentSpec, BinderRegistry, BindingAnnotation, BindingResult, BoundValue, TargetType,
};
use portico::exchange::Exchange;
use portico::handler::{Dispatched, HttpHandler};
use serde_json::json;
use std::sync::{Arc, Mutex};

type Recorded = Arc<Mutex<Vec<BindingResult>>>;

/// Run the given argument specs through a registry against one request.
fn bind_all_with(
    registry: BinderRegistry,
    specs: Vec<ArgumentSpec>,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> Vec<BindingResult> {
    let registry = Arc::new(registry);
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded_in_dispatch = recorded.clone();
    let registry_in_dispatch = registry.clone();
    let specs = Arc::new(specs);
    let specs_in_dispatch = specs.clone();

    let handler = HttpHandler::new(Arc::new(FnDispatcher(move |mut exchange: Exchange| {
        for spec in specs_in_dispatch.iter() {
            let binder = registry_in_dispatch.find_argument_binder(spec);
            let result = binder.bind(spec, exchange.request_mut());
            recorded_in_dispatch.lock().unwrap().push(result);
        }
        Dispatched::Completed(Box::new(exchange))
    })));
    handler.start();

    let method = if body.is_some() { Method::POST } else { Method::GET };
    let (req, res, _handles) = mock_pair(method, uri, headers, body);
    handler.service(req, res).unwrap();

    let results = recorded.lock().unwrap().clone();
    results
}

fn bind_all(
    specs: Vec<ArgumentSpec>,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> Vec<BindingResult> {
    bind_all_with(BinderRegistry::new(), specs, uri, headers, body)
}

struct SentinelBinder;

impl portico::binding::ArgumentBinder for SentinelBinder {
    fn bind(
        &self,
        _spec: &ArgumentSpec,
        _request: &mut portico::exchange::ExchangeRequest,
    ) -> BindingResult {
        BindingResult::Satisfied(BoundValue::Text("from-class-binder".to_string()))
    }
}

#[test]
fn test_annotation_binder_wins_over_class_binder() {
    // The argument's declared class also has a class-keyed binder
    // registered, but the Header annotation must take precedence.
    let mut registry = BinderRegistry::new();
    registry.register_type_binder(TargetType::Text, Arc::new(SentinelBinder));

    let spec = ArgumentSpec::new("x-tag", TargetType::Text)
        .annotated(BindingAnnotation::Header);
    let results = bind_all_with(
        registry,
        vec![spec],
        "/anything",
        &[("X-Tag", "from-header")],
        None,
    );
    assert_eq!(
        results[0],
        BindingResult::Satisfied(BoundValue::Text("from-header".to_string()))
    );

    // Without the annotation the class-keyed sentinel is selected.
    let mut registry = BinderRegistry::new();
    registry.register_type_binder(TargetType::Text, Arc::new(SentinelBinder));
    let spec = ArgumentSpec::new("x-tag", TargetType::Text);
    let results = bind_all_with(registry, vec![spec], "/anything", &[("X-Tag", "v")], None);
    assert_eq!(
        results[0],
        BindingResult::Satisfied(BoundValue::Text("from-class-binder".to_string()))
    );
}

#[test]
fn test_class_binder_used_without_annotation() {
    let spec = ArgumentSpec::new("request", TargetType::RequestInfo);
    let results = bind_all(vec![spec], "/info?a=1", &[], None);
    match &results[0] {
        BindingResult::Satisfied(BoundValue::RequestInfo(head)) => {
            assert_eq!(head.path(), "/info");
            assert_eq!(head.query(), "a=1");
        }
        other => panic!("expected request info, got {other:?}"),
    }
}

#[test]
fn test_fallback_body_binder_is_total() {
    // No annotation, no class entry for Json: the fallback body binder
    // must be selected and decode the body.
    let spec = ArgumentSpec::new("payload", TargetType::Json);
    let results = bind_all(
        vec![spec],
        "/items",
        &[("Content-Type", "application/json")],
        Some(b"{\"x\":1}"),
    );
    assert_eq!(
        results[0],
        BindingResult::Satisfied(BoundValue::Json(json!({"x": 1})))
    );
}

#[test]
fn test_missing_optional_source_is_unsatisfied_not_failed() {
    let results = bind_all(
        vec![
            ArgumentSpec::new("absent", TargetType::Text).annotated(BindingAnnotation::QueryValue),
            ArgumentSpec::new("missing-cookie", TargetType::Text)
                .annotated(BindingAnnotation::CookieValue),
            ArgumentSpec::new("body", TargetType::Json),
        ],
        "/nothing",
        &[],
        None,
    );
    for result in &results {
        assert_eq!(result, &BindingResult::Unsatisfied);
    }
}

#[test]
fn test_query_binding_last_occurrence_wins() {
    let spec = ArgumentSpec::new("limit", TargetType::Text)
        .annotated(BindingAnnotation::QueryValue);
    let results = bind_all(vec![spec], "/list?limit=10&limit=25", &[], None);
    assert_eq!(
        results[0],
        BindingResult::Satisfied(BoundValue::Text("25".to_string()))
    );
}

#[test]
fn test_named_body_field_selection() {
    let spec = ArgumentSpec::new("x", TargetType::Json)
        .annotated(BindingAnnotation::Body)
        .from_source("x");
    let results = bind_all(
        vec![spec],
        "/items",
        &[("Content-Type", "application/json")],
        Some(b"{\"x\": 41, \"y\": 2}"),
    );
    assert_eq!(
        results[0],
        BindingResult::Satisfied(BoundValue::Json(json!(41)))
    );
}

#[test]
fn test_source_rename_for_headers() {
    let spec = ArgumentSpec::new("request_id", TargetType::Text)
        .annotated(BindingAnnotation::Header)
        .from_source("X-Request-Id");
    let results = bind_all(vec![spec], "/", &[("X-Request-Id", "abc-123")], None);
    assert_eq!(
        results[0],
        BindingResult::Satisfied(BoundValue::Text("abc-123".to_string()))
    );
}

#[test]
fn test_conversion_failure_is_structured() {
    // A header source cannot produce a multipart upload; the binder must
    // report a structured failure, not panic or error out of dispatch.
    let spec = ArgumentSpec::new("x-tag", TargetType::Upload)
        .annotated(BindingAnnotation::Header);
    let results = bind_all(vec![spec], "/", &[("X-Tag", "v")], None);
    match &results[0] {
        BindingResult::Failed(err) => assert_eq!(err.argument, "x-tag"),
        other => panic!("expected a conversion failure, got {other:?}"),
    }
}
