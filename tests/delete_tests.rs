mod common;

use axum::http::StatusCode;

// ============================================================================
// S6 — delete tombstones a post (spec.md §8 S6)
// ============================================================================

#[tokio::test]
async fn author_can_delete_own_post() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let post = common::create_post(app.clone(), &token, "to be deleted").await;
    let post_id = post["id"].as_str().unwrap().to_owned();

    let (status, body) =
        common::delete_authed(app.clone(), &format!("/posts/{post_id}"), &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");

    let (status, body) = common::get_no_auth(app, &format!("/posts/{post_id}")).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(body["content"].is_null(), "content should be blanked after deletion");
    assert!(body["warning"].is_null());
    assert!(!body["deleted_at"].is_null(), "deleted_at should be set");
}

#[tokio::test]
async fn non_author_cannot_delete_post() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, alice_token) =
        common::create_user_with_token(&pool, &common::unique_name("alice")).await;
    let (_, bob_token) = common::create_user_with_token(&pool, &common::unique_name("bob")).await;

    let post = common::create_post(app.clone(), &alice_token, "alice's post").await;
    let post_id = post["id"].as_str().unwrap().to_owned();

    let (status, _) =
        common::delete_authed(app.clone(), &format!("/posts/{post_id}"), &bob_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = common::get_no_auth(app, &format!("/posts/{post_id}")).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(!body["content"].is_null(), "post should survive the rejected delete");
}

#[tokio::test]
async fn delete_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let post = common::create_post(app.clone(), &token, "post").await;
    let post_id = post["id"].as_str().unwrap().to_owned();

    let req = axum::http::Request::builder()
        .method(axum::http::Method::DELETE)
        .uri(format!("/posts/{post_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app, req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_missing_post_is_not_found() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let (status, _) = common::delete_authed(
        app,
        "/posts/aaaaaaaaaaaaaaaaaaaaaaaaaa",
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_post_from_feed() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone());
    let (_, token) = common::create_user_with_token(&pool, &common::unique_name("u")).await;

    let post = common::create_post(app.clone(), &token, "will vanish from feed").await;
    let post_id = post["id"].as_str().unwrap().to_owned();

    let (status, body) = common::get_authed(app.clone(), "/feed", &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(body["publications"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["post"]["id"] == post_id));

    let (status, _) =
        common::delete_authed(app.clone(), &format!("/posts/{post_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::get_authed(app, "/feed", &token).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(!body["publications"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["post"]["id"] == post_id));
}
