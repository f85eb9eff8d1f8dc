//! JSON API integration tests
//!
//! Requests go through `routes::route` exactly as the server dispatches them,
//! minus the socket.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use http_body_util::BodyExt;
use hyper::header::AUTHORIZATION;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use weblog::auth::TokenPurpose;
use weblog::config::Args;
use weblog::db::WeblogDb;
use weblog::mail::Mailer;
use weblog::routes::{route, ApiRequest};
use weblog::services::DISABLED_COMMENT_BODY;
use weblog::AppState;

const PASSWORD: &str = "secret123";

fn state_with(extra: &[&str]) -> AppState {
    let mut argv = vec!["weblog", "--dev-mode", "--database-path", ":memory:"];
    argv.extend_from_slice(extra);
    let args = Args::try_parse_from(argv).unwrap();

    let db = Arc::new(WeblogDb::open_in_memory().unwrap());
    let state = AppState::new(args, db, Mailer::tracing("noreply@weblog.test")).unwrap();
    state.accounts.ensure_roles().unwrap();
    state
}

async fn call(state: &AppState, req: ApiRequest) -> (StatusCode, Value) {
    let resp = route(state, &req);
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Register, confirm and log in; returns (user id, API token)
async fn confirmed_user(state: &AppState, name: &str) -> (i64, String) {
    let (status, body) = call(
        state,
        ApiRequest::new(Method::POST, "/auth/register").with_json(&json!({
            "name": name,
            "email": format!("{}@example.com", name),
            "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let id = body["id"].as_i64().unwrap();

    let user = state.accounts.get_user(id).unwrap();
    let confirm = state
        .accounts
        .generate_token(&user, TokenPurpose::ConfirmIdentity)
        .unwrap();
    let api = state.accounts.issue_api_token(&user).unwrap();

    let (status, body) = call(
        state,
        ApiRequest::new(Method::POST, "/auth/confirm")
            .with_bearer(&api)
            .with_json(&json!({ "token": confirm })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "confirmed");

    (id, api)
}

async fn admin_token(state: &AppState) -> String {
    let admin = state
        .accounts
        .ensure_admin("root@example.com", "root", PASSWORD)
        .unwrap();
    state.accounts.issue_api_token(&admin).unwrap()
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let state = state_with(&[]);
    let (status, body) = call(&state, ApiRequest::new(Method::GET, "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["stats"]["user_count"], 0);
}

#[tokio::test]
async fn test_api_requires_credentials() {
    let state = state_with(&[]);
    let (status, body) = call(&state, ApiRequest::new(Method::GET, "/api/v1/blogs")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs").with_bearer("not-a-token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unconfirmed_account_is_forbidden() {
    let state = state_with(&[]);
    call(
        &state,
        ApiRequest::new(Method::POST, "/auth/register").with_json(&json!({
            "name": "ann", "email": "ann@example.com", "password": PASSWORD,
        })),
    )
    .await;

    let (status, body) = call(
        &state,
        ApiRequest::new(Method::POST, "/auth/login")
            .with_json(&json!({ "login": "ANN@example.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["confirmed"], false);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs").with_bearer(&token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Authorization denied: unconfirmed account");

    // /auth/* stays reachable
    let (status, body) = call(&state, ApiRequest::new(Method::GET, "/auth/me").with_bearer(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "User");
}

#[tokio::test]
async fn test_basic_auth_with_password_or_token() {
    let state = state_with(&[]);
    let (_, token) = confirmed_user(&state, "ann").await;

    let basic = format!("Basic {}", BASE64.encode(format!("ann:{}", PASSWORD)));
    let (status, _) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs").with_header(AUTHORIZATION, &basic),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let basic_token = format!("Basic {}", BASE64.encode(format!("{}:", token)));
    let (status, _) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs").with_header(AUTHORIZATION, &basic_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let wrong = format!("Basic {}", BASE64.encode("ann:wrong1"));
    let (status, _) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs").with_header(AUTHORIZATION, &wrong),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let state = state_with(&[]);
    confirmed_user(&state, "ann").await;
    let (status, body) = call(
        &state,
        ApiRequest::new(Method::POST, "/auth/register").with_json(&json!({
            "name": "other", "email": "Ann@Example.com", "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

// =============================================================================
// Blogs, comments, follows
// =============================================================================

#[tokio::test]
async fn test_blog_lifecycle() {
    let state = state_with(&[]);
    let (ann_id, ann) = confirmed_user(&state, "ann").await;
    let (_, bob) = confirmed_user(&state, "bob").await;

    let req = ApiRequest::new(Method::POST, "/api/v1/blogs")
        .with_bearer(&ann)
        .with_json(&json!({ "body": "Hello *world*" }));
    let resp = route(&state, &req);
    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp.headers()["location"].to_str().unwrap().to_string();

    let (status, blog) = call(&state, ApiRequest::new(Method::GET, &location).with_bearer(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(blog["body_html"].as_str().unwrap().contains("<em>world</em>"));
    assert_eq!(blog["author_id"], ann_id);

    let (status, _) = call(
        &state,
        ApiRequest::new(Method::PUT, &location)
            .with_bearer(&bob)
            .with_json(&json!({ "body": "mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &state,
        ApiRequest::new(Method::POST, "/api/v1/blogs")
            .with_bearer(&ann)
            .with_json(&json!({ "body": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let comments_url = format!("{}/comments", location);
    let (status, _) = call(
        &state,
        ApiRequest::new(Method::POST, &comments_url)
            .with_bearer(&bob)
            .with_json(&json!({ "body": "nice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listing) = call(&state, ApiRequest::new(Method::GET, &comments_url).with_bearer(&ann)).await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["comments"][0]["body"], "nice");

    let (_, found) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/search?q=WORLD").with_bearer(&bob),
    )
    .await;
    assert_eq!(found["count"], 1);
}

#[tokio::test]
async fn test_followed_listing_paginates() {
    let state = state_with(&["--blogs-per-page", "1"]);
    let (ann_id, ann) = confirmed_user(&state, "ann").await;
    let (bob_id, bob) = confirmed_user(&state, "bob").await;
    let (_, cat) = confirmed_user(&state, "cat").await;

    for body in ["one", "two"] {
        call(
            &state,
            ApiRequest::new(Method::POST, "/api/v1/blogs")
                .with_bearer(&bob)
                .with_json(&json!({ "body": body })),
        )
        .await;
    }
    call(
        &state,
        ApiRequest::new(Method::POST, "/api/v1/blogs")
            .with_bearer(&cat)
            .with_json(&json!({ "body": "unfollowed" })),
    )
    .await;

    let follow = format!("/api/v1/users/{}/follow", bob_id);
    let (status, body) = call(&state, ApiRequest::new(Method::POST, &follow).with_bearer(&ann)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "now_following");
    let (_, body) = call(&state, ApiRequest::new(Method::POST, &follow).with_bearer(&ann)).await;
    assert_eq!(body["result"], "already_following");

    let (_, page1) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs?followed=true").with_bearer(&ann),
    )
    .await;
    assert_eq!(page1["count"], 2);
    assert_eq!(page1["blogs"][0]["body"], "two");
    assert_eq!(page1["prev"], Value::Null);
    assert_eq!(page1["next"], "/api/v1/blogs?followed=true&page=2");

    let (_, page3) = call(
        &state,
        ApiRequest::new(Method::GET, "/api/v1/blogs?followed=true&page=3").with_bearer(&ann),
    )
    .await;
    assert_eq!(page3["blogs"].as_array().unwrap().len(), 0);

    let (_, everything) = call(&state, ApiRequest::new(Method::GET, "/api/v1/blogs").with_bearer(&ann)).await;
    assert_eq!(everything["count"], 3);

    let (_, followers) = call(
        &state,
        ApiRequest::new(Method::GET, &format!("/api/v1/users/{}/followers", bob_id)).with_bearer(&ann),
    )
    .await;
    assert_eq!(followers["followers"][0]["user"]["id"], ann_id);
}

#[tokio::test]
async fn test_comment_moderation() {
    let state = state_with(&[]);
    let admin = admin_token(&state).await;
    let (_, ann) = confirmed_user(&state, "ann").await;
    let (_, bob) = confirmed_user(&state, "bob").await;

    let (_, blog) = call(
        &state,
        ApiRequest::new(Method::POST, "/api/v1/blogs")
            .with_bearer(&ann)
            .with_json(&json!({ "body": "post" })),
    )
    .await;
    let (_, comment) = call(
        &state,
        ApiRequest::new(Method::POST, &format!("/api/v1/blogs/{}/comments", blog["id"]))
            .with_bearer(&bob)
            .with_json(&json!({ "body": "rude" })),
    )
    .await;
    let visibility = format!("/admin/comments/{}/visibility", comment["id"]);

    let (status, _) = call(
        &state,
        ApiRequest::new(Method::PUT, &visibility)
            .with_bearer(&ann)
            .with_json(&json!({ "disabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, unchanged) = call(
        &state,
        ApiRequest::new(Method::GET, &format!("/api/v1/comments/{}", comment["id"])).with_bearer(&ann),
    )
    .await;
    assert_eq!(unchanged["disabled"], false);

    let (status, body) = call(
        &state,
        ApiRequest::new(Method::PUT, &visibility)
            .with_bearer(&admin)
            .with_json(&json!({ "disabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "changed");

    let comment_url = format!("/api/v1/comments/{}", comment["id"]);
    let (_, as_user) = call(&state, ApiRequest::new(Method::GET, &comment_url).with_bearer(&ann)).await;
    assert_eq!(as_user["body"], DISABLED_COMMENT_BODY);
    assert_eq!(as_user["disabled"], true);
    let (_, as_admin) = call(&state, ApiRequest::new(Method::GET, &comment_url).with_bearer(&admin)).await;
    assert_eq!(as_admin["body"], "rude");

    let (status, _) = call(&state, ApiRequest::new(Method::GET, "/admin/comments").with_bearer(&ann)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, all) = call(&state, ApiRequest::new(Method::GET, "/admin/comments").with_bearer(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["count"], 1);
}

#[tokio::test]
async fn test_admin_deletes_user_and_content() {
    let state = state_with(&[]);
    let admin = admin_token(&state).await;
    let (ann_id, ann) = confirmed_user(&state, "ann").await;

    let (_, blog) = call(
        &state,
        ApiRequest::new(Method::POST, "/api/v1/blogs")
            .with_bearer(&ann)
            .with_json(&json!({ "body": "soon gone" })),
    )
    .await;

    let user_url = format!("/admin/users/{}", ann_id);
    let (status, _) = call(&state, ApiRequest::new(Method::DELETE, &user_url).with_bearer(&ann)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&state, ApiRequest::new(Method::DELETE, &user_url).with_bearer(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(
        &state,
        ApiRequest::new(Method::GET, &format!("/api/v1/blogs/{}", blog["id"])).with_bearer(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // the deleted account's token no longer authenticates
    let (status, _) = call(&state, ApiRequest::new(Method::GET, "/auth/me").with_bearer(&ann)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_assigns_role() {
    let state = state_with(&[]);
    let admin = admin_token(&state).await;
    let (ann_id, ann) = confirmed_user(&state, "ann").await;

    let (_, roles) = call(&state, ApiRequest::new(Method::GET, "/admin/roles").with_bearer(&admin)).await;
    let moderator_id = roles["roles"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "Moderator")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let (status, body) = call(
        &state,
        ApiRequest::new(Method::PUT, &format!("/admin/users/{}", ann_id))
            .with_bearer(&admin)
            .with_json(&json!({ "role_id": moderator_id, "location": "Berlin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["role"], "Moderator");
    assert_eq!(body["location"], "Berlin");

    let (status, _) = call(&state, ApiRequest::new(Method::GET, "/admin/comments").with_bearer(&ann)).await;
    assert_eq!(status, StatusCode::OK);
}
