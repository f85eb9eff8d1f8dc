//! Moderation and administration routes
//!
//! - GET    /admin/comments                  - Every comment, newest first (MODERATE)
//! - PUT    /admin/comments/{id}/visibility  - `{ "disabled": bool }` (MODERATE)
//! - GET    /admin/roles                     - Role table (ADMINISTER)
//! - PUT    /admin/users/{id}                - Edit profile, role, confirmation (ADMINISTER)
//! - DELETE /admin/users/{id}                - Delete an account and its content (ADMINISTER)
//!
//! The services re-check permissions inside their transactions; the checks
//! here only cover the read-only listings.

use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::views::{AccountView, CommentView};
use super::{
    json_response, listing_response, no_content, not_found, parse_id, require_confirmed, ApiRequest,
    JsonResponse, PageQuery,
};
use crate::auth::{require_permission, Permission};
use crate::db::users::UserRow;
use crate::server::AppState;
use crate::services::{AdminProfileUpdate, VisibilityOutcome};
use crate::types::WeblogError;

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
struct VisibilityResponse {
    result: VisibilityOutcome,
    comment: CommentView,
}

pub fn handle_admin_request(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let caller = require_confirmed(state, req)?;

    match (&req.method, req.segments("/admin").as_slice()) {
        (&Method::GET, ["comments"]) => list_comments(state, req, &caller),
        (&Method::PUT, ["comments", id, "visibility"]) => set_visibility(state, req, &caller, parse_id(id)?),
        (&Method::GET, ["roles"]) => list_roles(state, &caller),
        (&Method::PUT, ["users", id]) => update_user(state, req, &caller, parse_id(id)?),
        (&Method::DELETE, ["users", id]) => delete_user(state, &caller, parse_id(id)?),
        _ => Err(not_found(req)),
    }
}

fn require(state: &AppState, caller: &UserRow, permission: Permission) -> Result<(), WeblogError> {
    state
        .db
        .with_conn(|conn| require_permission(conn, caller.id, permission))
}

fn list_comments(state: &AppState, req: &ApiRequest, caller: &UserRow) -> Result<JsonResponse, WeblogError> {
    require(state, caller, Permission::Moderate)?;
    let query: PageQuery = req.query()?;
    let page = state
        .content
        .list_comments(query.request(state.args.comments_per_page))?
        .map(|comment| CommentView::new(&comment, true));
    listing_response("comments", &page, &req.path, &[])
}

fn set_visibility(
    state: &AppState,
    req: &ApiRequest,
    caller: &UserRow,
    id: i64,
) -> Result<JsonResponse, WeblogError> {
    let body: VisibilityRequest = req.json()?;
    let result = state.content.set_comment_visibility(caller, id, body.disabled)?;
    let comment = state.content.get_comment(id)?;
    Ok(json_response(
        StatusCode::OK,
        &VisibilityResponse {
            result,
            comment: CommentView::new(&comment, true),
        },
    ))
}

fn list_roles(state: &AppState, caller: &UserRow) -> Result<JsonResponse, WeblogError> {
    require(state, caller, Permission::Administer)?;
    let roles = state.accounts.list_roles()?;
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "roles": roles })))
}

fn update_user(state: &AppState, req: &ApiRequest, caller: &UserRow, id: i64) -> Result<JsonResponse, WeblogError> {
    let update: AdminProfileUpdate = req.json()?;
    let updated = state.accounts.admin_update_profile(caller, id, &update)?;
    Ok(json_response(StatusCode::OK, &AccountView::build(state, &updated)?))
}

fn delete_user(state: &AppState, caller: &UserRow, id: i64) -> Result<JsonResponse, WeblogError> {
    state.accounts.delete_user(caller, id)?;
    Ok(no_content())
}
