mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use tollgate::middleware::{AccessLog, ErrorTranslation};
use tollgate::{BoxFuture, Interceptor, Next, Outcome, Pipeline, RateLimitOptions, RateLimiter, Request, Response, TokenValidator};

use common::{LogCapture, Spy, authed, bearer_expiring_in, body_json, options, settle, spied_pipeline};

// ── Authentication ────────────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_tokens_never_reach_the_handler() {
    let (pipeline, spy, _) = spied_pipeline(options(100, 0));

    let cases = [
        Request::new(Method::GET, "/api/users"),
        Request::new(Method::GET, "/api/users").with_header("Authorization", ""),
        Request::new(Method::GET, "/api/users").with_header("Authorization", "Bearer"),
        Request::new(Method::GET, "/api/users").with_header("Authorization", "Bearer not-a-jwt"),
        Request::new(Method::GET, "/api/users").with_header("Authorization", &bearer_expiring_in(-60)),
    ];

    for req in cases {
        let res = pipeline.handle(req).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.header("www-authenticate"), Some("Bearer"));
        assert_eq!(body_json(&res)["error"], "Unauthorized");
    }
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn valid_token_reaches_the_handler_once() {
    let (pipeline, spy, _) = spied_pipeline(options(100, 0));
    let res = pipeline.handle(authed(Method::GET, "/anything")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn unauthorized_requests_are_not_access_logged() {
    let (logs, _guard) = LogCapture::install();
    let (pipeline, _, _) = spied_pipeline(options(100, 0));

    pipeline.handle(Request::new(Method::GET, "/secret")).await;
    assert!(logs.lines_containing("incoming request").is_empty());

    pipeline.handle(authed(Method::GET, "/secret")).await;
    assert_eq!(logs.lines_containing("incoming request").len(), 1);
}

#[tokio::test]
async fn rate_limit_runs_before_authentication() {
    let (pipeline, spy, _) = spied_pipeline(options(1, 0));

    let first = pipeline.handle(Request::new(Method::GET, "/")).await;
    assert_eq!(first.status_code(), StatusCode::UNAUTHORIZED);

    // The unauthenticated request still spent the only permit.
    let second = pipeline.handle(authed(Method::GET, "/")).await;
    assert_eq!(second.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(spy.calls(), 0);
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn eleventh_request_waits_for_the_next_window() {
    let (pipeline, spy, _) = spied_pipeline(RateLimitOptions::default());

    for _ in 0..10 {
        let res = pipeline.handle(authed(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    let p = pipeline.clone();
    let eleventh = tokio::spawn(async move { p.handle(authed(Method::GET, "/")).await });
    settle().await;
    assert!(!eleventh.is_finished(), "eleventh request must be queued, not answered");
    assert_eq!(spy.calls(), 10);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let res = eleventh.await.unwrap();
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(spy.calls(), 11);
}

#[tokio::test(start_paused = true)]
async fn burst_of_sixteen_splits_ten_five_one() {
    let (pipeline, spy, _) = spied_pipeline(RateLimitOptions::default());

    for _ in 0..10 {
        let res = pipeline.handle(authed(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    let mut pending = Vec::new();
    for _ in 0..6 {
        let p = pipeline.clone();
        pending.push(tokio::spawn(async move { p.handle(authed(Method::GET, "/")).await }));
    }
    settle().await;

    let (done, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|h| h.is_finished());
    assert_eq!(done.len(), 1);
    assert_eq!(waiting.len(), 5);

    let rejected = done.into_iter().next().unwrap().await.unwrap();
    assert_eq!(rejected.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.header("retry-after"), Some("60"));
    assert_eq!(body_json(&rejected)["error"], "Too Many Requests");

    tokio::time::sleep(Duration::from_secs(61)).await;
    for handle in waiting {
        assert_eq!(handle.await.unwrap().status_code(), StatusCode::OK);
    }
    assert_eq!(spy.calls(), 15);
}

#[tokio::test(start_paused = true)]
async fn queued_requests_are_served_in_arrival_order() {
    let (pipeline, spy, _) = spied_pipeline(options(1, 3));

    pipeline.handle(authed(Method::GET, "/first")).await;

    let mut handles = Vec::new();
    for path in ["/q0", "/q1", "/q2"] {
        let p = pipeline.clone();
        handles.push(tokio::spawn(async move { p.handle(authed(Method::GET, path)).await }));
        settle().await;
    }

    for served in 2..=4 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(spy.calls(), served);
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status_code(), StatusCode::OK);
    }
    assert_eq!(spy.paths(), ["/first", "/q0", "/q1", "/q2"]);
}

#[tokio::test(start_paused = true)]
async fn clients_are_limited_independently() {
    let (pipeline, spy, _) = spied_pipeline(options(1, 0));
    let a: SocketAddr = "198.51.100.1:4000".parse().unwrap();
    let b: SocketAddr = "198.51.100.2:4000".parse().unwrap();

    let from = |addr: SocketAddr| authed(Method::GET, "/").with_remote_addr(addr);

    assert_eq!(pipeline.handle(from(a)).await.status_code(), StatusCode::OK);
    assert_eq!(pipeline.handle(from(a)).await.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(pipeline.handle(from(b)).await.status_code(), StatusCode::OK);
    assert_eq!(spy.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn contended_last_permit_goes_to_exactly_one_request() {
    for _ in 0..25 {
        let (pipeline, spy, _) = spied_pipeline(options(1, 0));
        let (p1, p2) = (pipeline.clone(), pipeline.clone());

        let a = tokio::spawn(async move { p1.handle(authed(Method::GET, "/")).await });
        let b = tokio::spawn(async move { p2.handle(authed(Method::GET, "/")).await });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let mut statuses = [a.status_code().as_u16(), b.status_code().as_u16()];
        statuses.sort_unstable();
        assert_eq!(statuses, [200, 429]);
        assert_eq!(spy.calls(), 1);
    }
}

// ── Error translation ─────────────────────────────────────────────────────────

fn failing_pipeline() -> Pipeline {
    let limiter = Arc::new(RateLimiter::new(options(100, 0)));
    Pipeline::new(limiter, TokenValidator::new(), |_req: Request| async {
        Err::<Response, _>(std::io::Error::other("database connection refused"))
    })
}

#[tokio::test]
async fn handler_failure_becomes_500_envelope() {
    let res = failing_pipeline().handle(authed(Method::GET, "/")).await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.header("content-type"), Some("application/json"));
    let body = body_json(&res);
    assert_eq!(body["StatusCode"], 500);
    assert_eq!(body["Message"], "An unexpected error occurred.");
    assert_eq!(body["Details"], "database connection refused");
}

#[tokio::test]
async fn failure_still_produces_exit_log_with_status_500() {
    let (logs, _guard) = LogCapture::install();

    failing_pipeline().handle(authed(Method::GET, "/")).await;

    let exits = logs.lines_containing("outgoing response");
    assert_eq!(exits.len(), 1, "logs:\n{}", logs.contents());
    assert!(exits[0].contains("status=500"), "exit line: {}", exits[0]);
    assert!(exits[0].contains("elapsed_ms="), "exit line: {}", exits[0]);
}

#[tokio::test]
async fn handler_panic_becomes_500_envelope() {
    let limiter = Arc::new(RateLimiter::new(options(100, 0)));
    let pipeline = Pipeline::new(limiter, TokenValidator::new(), |_req: Request| async {
        if true {
            panic!("index out of range");
        }
        Ok::<_, std::convert::Infallible>(Response::status(StatusCode::OK))
    });

    let res = pipeline.handle(authed(Method::GET, "/")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let details = body_json(&res)["Details"].as_str().unwrap_or_default().to_owned();
    assert!(details.contains("index out of range"), "details: {details}");
}

#[tokio::test]
async fn bare_404_becomes_not_found_envelope() {
    let spy = Spy::default();
    let limiter = Arc::new(RateLimiter::new(options(100, 0)));
    let pipeline = Pipeline::new(limiter, TokenValidator::new(), spy.handler(StatusCode::NOT_FOUND));

    let res = pipeline.handle(authed(Method::GET, "/missing")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), br#"{"StatusCode":404,"Message":"Resource not found."}"#);
}

// ── Composition ───────────────────────────────────────────────────────────────

/// Answers `403` without delegating.
struct Deny;

impl Interceptor for Deny {
    fn call(&self, _req: Request, _next: Next) -> BoxFuture {
        let outcome: Outcome = Ok(Response::status(StatusCode::FORBIDDEN));
        Box::pin(std::future::ready(outcome))
    }
}

#[tokio::test]
async fn standard_pipeline_has_four_stages() {
    let (pipeline, _, _) = spied_pipeline(options(1, 0));
    assert_eq!(pipeline.len(), 4);
}

#[tokio::test]
async fn short_circuiting_stage_hides_inner_stages() {
    let (logs, _guard) = LogCapture::install();
    let spy = Spy::default();
    let pipeline = Pipeline::from_stages(
        vec![Arc::new(ErrorTranslation::new()), Arc::new(Deny), Arc::new(AccessLog::new())],
        spy.handler(StatusCode::OK),
    );

    let res = pipeline.handle(Request::new(Method::GET, "/")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(spy.calls(), 0);
    assert!(logs.lines_containing("incoming request").is_empty());
}

#[tokio::test]
async fn empty_pipeline_calls_the_handler_directly() {
    let spy = Spy::default();
    let pipeline = Pipeline::from_stages(Vec::new(), spy.handler(StatusCode::ACCEPTED));
    assert!(pipeline.is_empty());

    let res = pipeline.handle(Request::new(Method::POST, "/")).await;
    assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    assert_eq!(spy.calls(), 1);
}
