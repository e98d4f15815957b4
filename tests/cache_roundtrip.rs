// tests/cache_roundtrip.rs
//
// MISS → HIT behaviour of both result caches through the router.
//
// Covered:
// - identical search served from cache: same payload, upstream hit once
// - cache key ignores case/whitespace of the term
// - discover caches per user; clear and clear-all evict
// - updating preferences evicts that user's cached discoveries only
// - stats endpoint reports both caches

mod support;

use axum::http::{Request, StatusCode};
use axum::body::Body;
use serde_json::json;
use tower::ServiceExt as _;

use support::*;

fn cache_header(resp: &axum::http::Response<Body>) -> String {
    resp.headers()
        .get("x-research-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn second_identical_search_is_a_hit_with_same_payload() {
    let (sources, stubs) = uniform_sources(|| Reply::Offers(vec![coursera()]));
    let app = test_app(sources);

    let first = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/affiliate-research/search",
            &json!({ "search_term": "Online Learning" }),
        ))
        .await
        .expect("first");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(cache_header(&first), "MISS");
    let first = json_body(first).await;

    let second = app
        .router
        .oneshot(post_json(
            "/api/affiliate-research/search",
            &json!({ "search_term": "  online learning " }),
        ))
        .await
        .expect("second");
    assert_eq!(cache_header(&second), "HIT");
    let second = json_body(second).await;

    assert_eq!(first["data"], second["data"], "cached payload must be identical");
    assert!(stubs.iter().all(|s| s.calls() == 1), "upstream called once");
}

#[tokio::test]
async fn different_niche_is_a_separate_entry() {
    let (sources, stubs) = uniform_sources(|| Reply::Offers(vec![coursera()]));
    let app = test_app(sources);

    for niche in ["education", "technology"] {
        let resp = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/affiliate-research/search",
                &json!({ "search_term": "online learning", "niche": niche }),
            ))
            .await
            .expect("search");
        assert_eq!(cache_header(&resp), "MISS");
    }
    assert_eq!(stubs[0].calls(), 2);
}

#[tokio::test]
async fn discover_cache_is_per_user_and_can_be_cleared() {
    let (sources, stubs) = uniform_sources(|| Reply::Offers(vec![coursera()]));
    let app = test_app(sources);
    let req = |user: &str| {
        post_json(
            "/api/enhanced-affiliate/discover",
            &json!({ "search_terms": ["online learning"], "user_id": user }),
        )
    };

    let r = app.router.clone().oneshot(req("a")).await.expect("a1");
    assert_eq!(cache_header(&r), "MISS");
    let r = app.router.clone().oneshot(req("a")).await.expect("a2");
    assert_eq!(cache_header(&r), "HIT");
    let r = app.router.clone().oneshot(req("b")).await.expect("b1");
    assert_eq!(cache_header(&r), "MISS");
    // default scope is comprehensive: store, api and llm, no web search
    assert_eq!(stubs[0].calls(), 2);
    assert_eq!(stubs[2].calls(), 0);

    let r = app
        .router
        .clone()
        .oneshot(get("/api/enhanced-affiliate/cache/stats"))
        .await
        .expect("stats");
    let v = json_body(r).await;
    assert_eq!(v["discover"]["entries"], 2);
    assert_eq!(v["discover"]["hits"], 1);
    assert_eq!(v["search"]["entries"], 0);

    let r = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/enhanced-affiliate/cache/clear",
            &json!({ "search_terms": ["ONLINE LEARNING"], "user_id": "a" }),
        ))
        .await
        .expect("clear");
    let v = json_body(r).await;
    assert_eq!(v["cleared"], true);

    let r = app.router.clone().oneshot(req("a")).await.expect("a3");
    assert_eq!(cache_header(&r), "MISS");

    let clear_all = Request::builder()
        .method("DELETE")
        .uri("/api/enhanced-affiliate/cache/clear-all")
        .body(Body::empty())
        .expect("build DELETE");
    let r = app.router.clone().oneshot(clear_all).await.expect("clear all");
    let v = json_body(r).await;
    assert_eq!(v["cleared"], 2);

    let r = app.router.oneshot(req("b")).await.expect("b2");
    assert_eq!(cache_header(&r), "MISS");
}

#[tokio::test]
async fn preference_update_evicts_only_that_users_discoveries() {
    let (sources, stubs) = uniform_sources(|| Reply::Offers(vec![coursera()]));
    let app = test_app(sources);
    let req = |user: &str| {
        post_json(
            "/api/enhanced-affiliate/discover",
            &json!({ "search_terms": ["online learning"], "user_id": user }),
        )
    };

    for user in ["a", "b"] {
        let r = app.router.clone().oneshot(req(user)).await.expect("warm");
        assert_eq!(cache_header(&r), "MISS");
    }

    let r = app
        .router
        .clone()
        .oneshot(put_json(
            "/api/enhanced-affiliate/preferences/a",
            &json!({ "preferred_networks": ["CJ Affiliate"] }),
        ))
        .await
        .expect("put prefs");
    assert_eq!(r.status(), StatusCode::OK);

    let r = app.router.clone().oneshot(req("a")).await.expect("a again");
    assert_eq!(cache_header(&r), "MISS");
    let v = json_body(r).await;
    assert_eq!(v["personalized"], true);

    let r = app.router.oneshot(req("b")).await.expect("b again");
    assert_eq!(cache_header(&r), "HIT");
    assert_eq!(stubs[0].calls(), 3);
}
