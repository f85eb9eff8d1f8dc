//! JSON API v1
//!
//! Every route requires a confirmed identity (Bearer or Basic). Listings are
//! paginated with `?page=N` and answer `{ <items>, prev, next, count }`.

use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::views::{
    blog_url, comment_url, reveals_disabled, AccountView, BlogView, CommentView, FollowView,
    UserView,
};
use super::{
    created_response, json_response, lenient_page, listing_response, not_found, parse_id,
    require_confirmed, ApiRequest, JsonResponse, PageQuery,
};
use crate::db::users::UserRow;
use crate::server::AppState;
use crate::services::ProfileUpdate;
use crate::types::WeblogError;

const PREFIX: &str = "/api/v1";

#[derive(Debug, Deserialize)]
pub struct BodyRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlogsQuery {
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,
    #[serde(default)]
    pub followed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct FollowResponse<T: Serialize> {
    result: T,
    following: bool,
}

pub fn handle_api_request(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let viewer = require_confirmed(state, req)?;

    match (&req.method, req.segments(PREFIX).as_slice()) {
        // Users
        (&Method::GET, ["users", id]) => get_user(state, parse_id(id)?),
        (&Method::GET, ["users", id, "blogs"]) => get_user_blogs(state, req, parse_id(id)?),
        (&Method::GET, ["users", id, "followed_blogs"]) => get_followed_blogs(state, req, parse_id(id)?),
        (&Method::GET, ["users", id, "followers"]) => get_followers(state, req, parse_id(id)?),
        (&Method::GET, ["users", id, "followed"]) => get_followed(state, req, parse_id(id)?),
        (&Method::POST, ["users", id, "follow"]) => follow(state, &viewer, parse_id(id)?),
        (&Method::POST, ["users", id, "unfollow"]) => unfollow(state, &viewer, parse_id(id)?),
        (&Method::PUT, ["profile"]) => update_profile(state, req, &viewer),

        // Blogs
        (&Method::GET, ["blogs"]) => get_blogs(state, req, &viewer),
        (&Method::POST, ["blogs"]) => new_blog(state, req, &viewer),
        (&Method::GET, ["blogs", id]) => get_blog(state, parse_id(id)?),
        (&Method::PUT, ["blogs", id]) => edit_blog(state, req, &viewer, parse_id(id)?),
        (&Method::GET, ["blogs", id, "comments"]) => get_blog_comments(state, req, &viewer, parse_id(id)?),
        (&Method::POST, ["blogs", id, "comments"]) => add_blog_comment(state, req, &viewer, parse_id(id)?),

        // Comments and search
        (&Method::GET, ["comments"]) => get_comments(state, req, &viewer),
        (&Method::GET, ["comments", id]) => get_comment(state, &viewer, parse_id(id)?),
        (&Method::GET, ["search"]) => search(state, req),

        _ => Err(not_found(req)),
    }
}

// =============================================================================
// Users
// =============================================================================

fn get_user(state: &AppState, id: i64) -> Result<JsonResponse, WeblogError> {
    let user = state.accounts.get_user(id)?;
    Ok(json_response(StatusCode::OK, &UserView::build(state, &user)?))
}

fn get_user_blogs(state: &AppState, req: &ApiRequest, id: i64) -> Result<JsonResponse, WeblogError> {
    let query: PageQuery = req.query()?;
    let page = state
        .content
        .list_user_content(id, query.request(state.args.blogs_per_page))?
        .try_map(|blog| BlogView::build(state, &blog))?;
    listing_response("blogs", &page, &req.path, &[])
}

fn get_followed_blogs(state: &AppState, req: &ApiRequest, id: i64) -> Result<JsonResponse, WeblogError> {
    let query: PageQuery = req.query()?;
    let page = state
        .social
        .followed_content(id, query.request(state.args.blogs_per_page))?
        .try_map(|blog| BlogView::build(state, &blog))?;
    listing_response("blogs", &page, &req.path, &[])
}

fn get_followers(state: &AppState, req: &ApiRequest, id: i64) -> Result<JsonResponse, WeblogError> {
    let query: PageQuery = req.query()?;
    let page = state
        .social
        .followers_of(id, query.request(state.args.users_per_page))?
        .try_map(|entry| FollowView::build(state, &entry))?;
    listing_response("followers", &page, &req.path, &[])
}

fn get_followed(state: &AppState, req: &ApiRequest, id: i64) -> Result<JsonResponse, WeblogError> {
    let query: PageQuery = req.query()?;
    let page = state
        .social
        .followed_by_user(id, query.request(state.args.users_per_page))?
        .try_map(|entry| FollowView::build(state, &entry))?;
    listing_response("followed", &page, &req.path, &[])
}

fn follow(state: &AppState, viewer: &UserRow, id: i64) -> Result<JsonResponse, WeblogError> {
    let result = state.social.follow(viewer, id)?;
    Ok(json_response(StatusCode::OK, &FollowResponse { result, following: true }))
}

fn unfollow(state: &AppState, viewer: &UserRow, id: i64) -> Result<JsonResponse, WeblogError> {
    let result = state.social.unfollow(viewer, id)?;
    Ok(json_response(StatusCode::OK, &FollowResponse { result, following: false }))
}

fn update_profile(state: &AppState, req: &ApiRequest, viewer: &UserRow) -> Result<JsonResponse, WeblogError> {
    let update: ProfileUpdate = req.json()?;
    let updated = state.accounts.update_profile(viewer, &update)?;
    Ok(json_response(StatusCode::OK, &AccountView::build(state, &updated)?))
}

// =============================================================================
// Blogs
// =============================================================================

fn get_blogs(state: &AppState, req: &ApiRequest, viewer: &UserRow) -> Result<JsonResponse, WeblogError> {
    let query: BlogsQuery = req.query()?;
    let page_req = PageQuery { page: query.page }.request(state.args.blogs_per_page);

    let followed = query.followed.unwrap_or(false);
    let page = if followed {
        state.social.followed_content(viewer.id, page_req)?
    } else {
        state.content.list_content(page_req)?
    };
    let page = page.try_map(|blog| BlogView::build(state, &blog))?;

    let extra = if followed {
        vec![("followed", "true".to_string())]
    } else {
        Vec::new()
    };
    listing_response("blogs", &page, &req.path, &extra)
}

fn new_blog(state: &AppState, req: &ApiRequest, viewer: &UserRow) -> Result<JsonResponse, WeblogError> {
    let body: BodyRequest = req.json()?;
    let blog = state.content.create_content(viewer, &body.body)?;
    Ok(created_response(&blog_url(blog.id), &BlogView::build(state, &blog)?))
}

fn get_blog(state: &AppState, id: i64) -> Result<JsonResponse, WeblogError> {
    let blog = state.content.get_content(id)?;
    Ok(json_response(StatusCode::OK, &BlogView::build(state, &blog)?))
}

fn edit_blog(state: &AppState, req: &ApiRequest, viewer: &UserRow, id: i64) -> Result<JsonResponse, WeblogError> {
    let body: BodyRequest = req.json()?;
    let blog = state.content.edit_content(viewer, id, &body.body)?;
    Ok(json_response(StatusCode::OK, &BlogView::build(state, &blog)?))
}

fn get_blog_comments(
    state: &AppState,
    req: &ApiRequest,
    viewer: &UserRow,
    id: i64,
) -> Result<JsonResponse, WeblogError> {
    let query: PageQuery = req.query()?;
    let reveal = reveals_disabled(state, viewer)?;
    let page = state
        .content
        .list_content_comments(id, query.request(state.args.comments_per_page))?
        .map(|comment| CommentView::new(&comment, reveal));
    listing_response("comments", &page, &req.path, &[])
}

fn add_blog_comment(
    state: &AppState,
    req: &ApiRequest,
    viewer: &UserRow,
    id: i64,
) -> Result<JsonResponse, WeblogError> {
    let body: BodyRequest = req.json()?;
    let comment = state.content.add_comment(viewer, id, &body.body)?;
    Ok(created_response(&comment_url(comment.id), &CommentView::new(&comment, true)))
}

// =============================================================================
// Comments and search
// =============================================================================

fn get_comments(state: &AppState, req: &ApiRequest, viewer: &UserRow) -> Result<JsonResponse, WeblogError> {
    let query: PageQuery = req.query()?;
    let reveal = reveals_disabled(state, viewer)?;
    let page = state
        .content
        .list_comments(query.request(state.args.comments_per_page))?
        .map(|comment| CommentView::new(&comment, reveal));
    listing_response("comments", &page, &req.path, &[])
}

fn get_comment(state: &AppState, viewer: &UserRow, id: i64) -> Result<JsonResponse, WeblogError> {
    let comment = state.content.get_comment(id)?;
    let reveal = reveals_disabled(state, viewer)?;
    Ok(json_response(StatusCode::OK, &CommentView::new(&comment, reveal)))
}

fn search(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let query: SearchQuery = req.query()?;
    let page_req = PageQuery { page: query.page }.request(state.args.blogs_per_page);
    let page = state
        .content
        .search_content(&query.q, page_req)?
        .try_map(|blog| BlogView::build(state, &blog))?;
    listing_response("blogs", &page, &req.path, &[("q", query.q.trim().to_string())])
}
