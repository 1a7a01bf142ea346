mod common;

use axum::http::StatusCode;

// ============================================================================
// S3 — feed fan-out (spec.md §8 S3)
// ============================================================================

#[tokio::test]
async fn feed_includes_posts_from_subscribed_channels() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (alice_id, alice_token) =
        common::create_user_with_token(&pool, &common::unique_name("alice")).await;
    let (bob_id, bob_token) =
        common::create_user_with_token(&pool, &common::unique_name("bob")).await;

    let post = common::create_post(app.clone(), &alice_token, "alice's top-level post").await;
    let post_id = post["id"].as_str().unwrap();

    let (status, body) = common::get_authed(app.clone(), "/feed", &bob_token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let publications = body["publications"].as_array().unwrap();
    assert!(
        !publications.iter().any(|p| p["post"]["id"] == post_id),
        "bob should not see alice's post before subscribing"
    );

    // Subscribe bob to alice's own channel (channel_id == alice's user id).
    common::subscribe(&pool, bob_id, alice_id).await;

    let (status, body) = common::get_authed(app, "/feed", &bob_token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let publications = body["publications"].as_array().unwrap();
    assert!(publications.iter().any(|p| p["post"]["id"] == post_id));
}

#[tokio::test]
async fn feed_always_includes_own_posts() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("solo")).await;

    let post = common::create_post(app.clone(), &token, "my own post").await;
    let post_id = post["id"].as_str().unwrap();

    let (status, body) = common::get_authed(app, "/feed", &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let publications = body["publications"].as_array().unwrap();
    assert!(publications.iter().any(|p| p["post"]["id"] == post_id));
}

#[tokio::test]
async fn feed_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());

    let (status, _) = common::get_no_auth(app, "/feed").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn feed_does_not_include_replies() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let root = common::create_post(app.clone(), &token, "root").await;
    let root_id = root["id"].as_str().unwrap().to_owned();
    let reply = common::create_reply(app.clone(), &token, &root_id, "reply").await;
    let reply_id = reply["id"].as_str().unwrap().to_owned();

    let (status, body) = common::get_authed(app, "/feed", &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let publications = body["publications"].as_array().unwrap();
    assert!(publications.iter().any(|p| p["post"]["id"] == root_id));
    assert!(!publications.iter().any(|p| p["post"]["id"] == reply_id));
}
