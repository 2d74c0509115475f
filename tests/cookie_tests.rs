//! Cookie collection semantics through the exchange.

mod common;

use common::{mock_pair, FnDispatcher};
use http::Method;
use portico::cookies::Cookie;
use portico::exchange::ResponseBody;
use portico::handler::{Dispatched, HttpHandler};
use std::sync::{Arc, Mutex};

#[test]
fn test_request_cookies_last_wins_and_get_all() {
    let observed = Arc::new(Mutex::new(None));
    let observed_in_dispatch = observed.clone();
    let handler = HttpHandler::new(Arc::new(FnDispatcher(
        move |exchange: portico::Exchange| {
            let jar = exchange.request().cookies();
            let find_a = jar.find_cookie("a").map(|c| c.value().to_string());
            let all = jar.get_all().len();
            let typed: Option<u32> = jar.get("b");
            *observed_in_dispatch.lock().unwrap() = Some((find_a, all, typed));
            Dispatched::Completed(Box::new(exchange))
        },
    )));
    handler.start();

    let (req, res, _handles) = mock_pair(
        Method::GET,
        "/",
        &[("Cookie", "a=1; b=2; a=3")],
        None,
    );
    handler.service(req, res).unwrap();

    let (find_a, all, typed) = observed.lock().unwrap().take().unwrap();
    // Last occurrence wins for lookup; get_all keeps every occurrence.
    assert_eq!(find_a.as_deref(), Some("3"));
    assert_eq!(all, 3);
    assert_eq!(typed, Some(2));
}

#[test]
fn test_response_cookies_render_as_set_cookie_headers() {
    let handler = HttpHandler::new(Arc::new(FnDispatcher(
        |mut exchange: portico::Exchange| {
            let mut session = Cookie::new("session", "abc123");
            session.set_path("/").set_http_only(true);
            let _ = exchange.response_mut().add_cookie(session);
            let _ = exchange.response_mut().add_cookie(Cookie::new("theme", "dark"));
            let _ = exchange
                .response_mut()
                .set_body(ResponseBody::Text("ok".to_string()));
            Dispatched::Completed(Box::new(exchange))
        },
    )));
    handler.start();

    let (req, res, handles) = mock_pair(Method::GET, "/login", &[], None);
    handler.service(req, res).unwrap();
    let sent = handles.sent().unwrap();
    assert_eq!(
        sent.headers.get_all("set-cookie"),
        vec!["session=abc123; Path=/; HttpOnly", "theme=dark"]
    );
}
