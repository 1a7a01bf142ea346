mod common;

use axum::http::StatusCode;

// ============================================================================
// S4 — reply notification (spec.md §8 S4)
// ============================================================================

#[tokio::test]
async fn reply_notifies_parent_author() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, alice_token) =
        common::create_user_with_token(&pool, &common::unique_name("alice")).await;
    let (_, bob_token) = common::create_user_with_token(&pool, &common::unique_name("bob")).await;

    let root = common::create_post(app.clone(), &alice_token, "alice's post").await;
    let root_id = root["id"].as_str().unwrap().to_owned();

    let (status, body) = common::get_authed(app.clone(), "/notifications", &alice_token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(body["notifications"].as_array().unwrap().is_empty());

    let reply = common::create_reply(app.clone(), &bob_token, &root_id, "bob replies").await;
    let reply_id = reply["id"].as_str().unwrap();

    let (status, body) = common::get_authed(app, "/notifications", &alice_token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let notifications = body["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "reply");
    assert_eq!(notifications[0]["reply_post"]["id"], reply_id);
}

#[tokio::test]
async fn reply_to_own_post_still_notifies() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let root = common::create_post(app.clone(), &token, "root").await;
    let root_id = root["id"].as_str().unwrap().to_owned();
    let reply = common::create_reply(app.clone(), &token, &root_id, "replying to myself").await;
    let reply_id = reply["id"].as_str().unwrap().to_owned();

    let (status, body) = common::get_authed(app, "/notifications", &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let notifications = body["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "reply");
    assert_eq!(notifications[0]["reply_post"]["id"], reply_id);
}

#[tokio::test]
async fn top_level_posts_do_not_generate_notifications() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let _post = common::create_post(app.clone(), &token, "no parent, no notification").await;

    let (status, body) = common::get_authed(app, "/notifications", &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(body["notifications"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn notifications_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());

    let (status, _) = common::get_no_auth(app, "/notifications").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
