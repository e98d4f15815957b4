// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/affiliate-research/search (body shape, cache header, 400 on empty term)
// - GET  /api/affiliate-research/history and /history/{id} (list + 404)
// - POST /api/affiliate-research/classify
// - POST /api/enhanced-affiliate/discover
// - GET/PUT /api/enhanced-affiliate/preferences/{user_id}
// - POST /api/content-ideas/generate + GET /api/content-ideas

mod support;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt as _; // for `oneshot`

use support::*;

fn app_with_coursera() -> TestApp {
    let (sources, _stubs) = uniform_sources(|| Reply::Offers(vec![coursera()]));
    test_app(sources)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = app_with_coursera();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.router.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "OK", "health body should be 'OK'");
}

#[tokio::test]
async fn search_returns_programs_analysis_and_cache_header() {
    let app = app_with_coursera();

    let req = post_json(
        "/api/affiliate-research/search",
        &json!({ "search_term": "online learning" }),
    );
    let resp = app.router.oneshot(req).await.expect("oneshot search");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("x-research-cache")
            .and_then(|v| v.to_str().ok()),
        Some("MISS")
    );

    let v = json_body(resp).await;
    assert_eq!(v["success"], true);
    let data = &v["data"];
    assert_eq!(data["total_programs"], 1);
    assert_eq!(data["programs"][0]["name"], "Coursera Affiliate Program");
    assert!(data["programs"][0]["scores"]["overall"].as_f64().is_some());
    assert_eq!(data["analysis"]["category"], "education");
    assert_eq!(data["analysis"]["total_found"], 4);
    assert_eq!(data["analysis"]["duplicates_removed"], 3);
    assert_eq!(data["analysis"]["sources"].as_array().map(Vec::len), Some(4));
    assert!(data["analysis"]["research_id"].as_str().is_some());
}

#[tokio::test]
async fn search_with_blank_term_is_400() {
    let app = app_with_coursera();

    let req = post_json(
        "/api/affiliate-research/search",
        &json!({ "search_term": "   " }),
    );
    let resp = app.router.oneshot(req).await.expect("oneshot search");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let v = json_body(resp).await;
    assert_eq!(v["success"], false);
    assert!(v["message"].as_str().unwrap_or_default().contains("search_term"));
}

#[tokio::test]
async fn search_with_overlong_term_is_400() {
    let app = app_with_coursera();
    let term = "a".repeat(201);

    let req = post_json("/api/affiliate-research/search", &json!({ "search_term": term }));
    let resp = app.router.oneshot(req).await.expect("oneshot search");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_lists_saved_research_and_fetches_by_id() {
    let app = app_with_coursera();

    let req = post_json(
        "/api/affiliate-research/search",
        &json!({ "search_term": "language courses", "user_id": "u-1" }),
    );
    let resp = app.router.clone().oneshot(req).await.expect("search");
    let v = json_body(resp).await;
    let id = v["data"]["analysis"]["research_id"]
        .as_str()
        .expect("research id")
        .to_string();

    let resp = app
        .router
        .clone()
        .oneshot(get("/api/affiliate-research/history?user_id=u-1"))
        .await
        .expect("history");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["total"], 1);
    assert_eq!(v["data"][0]["search_term"], "language courses");

    let resp = app
        .router
        .clone()
        .oneshot(get(&format!("/api/affiliate-research/history/{id}")))
        .await
        .expect("history item");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["data"]["id"], id.as_str());

    let resp = app
        .router
        .oneshot(get("/api/affiliate-research/history/nope"))
        .await
        .expect("missing history item");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let v = json_body(resp).await;
    assert_eq!(v["success"], false);
}

#[tokio::test]
async fn classify_uses_keywords_when_llm_is_off() {
    let app = app_with_coursera();

    let resp = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/affiliate-research/classify",
            &json!({ "topic": "best hiking boots for beginners" }),
        ))
        .await
        .expect("classify");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["category"], "outdoor_recreation");

    let resp = app
        .router
        .oneshot(post_json(
            "/api/affiliate-research/classify",
            &json!({ "topic": "" }),
        ))
        .await
        .expect("classify empty");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn discover_returns_ranked_offers_for_each_term() {
    let app = app_with_coursera();

    let resp = app
        .router
        .oneshot(post_json(
            "/api/enhanced-affiliate/discover",
            &json!({
                "search_terms": ["data science courses", "Data Science Courses"],
                "research_scope": "deep",
                "max_offers": 5
            }),
        ))
        .await
        .expect("discover");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("x-research-cache")
            .and_then(|v| v.to_str().ok()),
        Some("MISS")
    );
    let v = json_body(resp).await;
    assert_eq!(v["success"], true);
    assert_eq!(v["search_terms"].as_array().map(Vec::len), Some(1));
    assert_eq!(v["research_scope"], "deep");
    assert_eq!(v["offers"].as_array().map(Vec::len), Some(1));
    assert_eq!(v["personalized"], false);
}

#[tokio::test]
async fn discover_without_terms_is_400() {
    let app = app_with_coursera();

    let resp = app
        .router
        .oneshot(post_json(
            "/api/enhanced-affiliate/discover",
            &json!({ "search_terms": [] }),
        ))
        .await
        .expect("discover");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preferences_are_created_then_updated() {
    let app = app_with_coursera();

    let resp = app
        .router
        .clone()
        .oneshot(get("/api/enhanced-affiliate/preferences/u-9"))
        .await
        .expect("get prefs");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["data"]["user_id"], "u-9");
    assert_eq!(v["data"]["preferred_networks"], json!([]));
    assert_eq!(v["data"]["learning_enabled"], true);

    let resp = app
        .router
        .clone()
        .oneshot(put_json(
            "/api/enhanced-affiliate/preferences/u-9",
            &json!({ "preferred_networks": ["CJ Affiliate", " cj affiliate ", ""] }),
        ))
        .await
        .expect("put prefs");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["data"]["preferred_networks"], json!(["CJ Affiliate"]));

    let resp = app
        .router
        .oneshot(get("/api/enhanced-affiliate/preferences/u-9"))
        .await
        .expect("get prefs again");
    let v = json_body(resp).await;
    assert_eq!(v["data"]["preferred_networks"], json!(["CJ Affiliate"]));
}

#[tokio::test]
async fn content_ideas_are_generated_and_listed() {
    let app = app_with_coursera();

    let resp = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/content-ideas/generate",
            &json!({
                "topic_id": "t-1",
                "topic_title": "Home espresso",
                "subtopics": ["grinders", "milk frothing"],
                "keywords": ["espresso machine"],
                "user_id": "u-2",
                "content_types": ["blog_post"]
            }),
        ))
        .await
        .expect("generate ideas");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let v = json_body(resp).await;
    let generated = v["total"].as_u64().expect("total");
    assert!(generated > 0);
    assert!(v["data"]
        .as_array()
        .expect("ideas")
        .iter()
        .all(|i| i["content_type"] == "blog_post" && i["origin"] == "template"));

    let resp = app
        .router
        .oneshot(get("/api/content-ideas?user_id=u-2"))
        .await
        .expect("list ideas");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["total"].as_u64(), Some(generated));
}
