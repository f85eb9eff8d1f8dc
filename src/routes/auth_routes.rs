//! HTTP Routes for Authentication
//!
//! - POST /auth/register                - Create an account (mails a confirmation token)
//! - POST /auth/login                   - Exchange credentials for an API token
//! - GET  /auth/me                      - Current account
//! - POST /auth/confirm                 - Confirm with a mailed token
//! - POST /auth/resend-confirmation     - Mail another confirmation token
//! - POST /auth/change-password         - Change password (old one required)
//! - POST /auth/reset-password/request  - Mail a reset token
//! - POST /auth/reset-password          - Set a new password with a reset token
//! - POST /auth/change-email            - Move to a new email (re-confirmation required)
//!
//! Unconfirmed accounts may use every route here.

use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::views::AccountView;
use super::{
    created_response, json_response, message_response, not_found, require_identity, ApiRequest,
    JsonResponse,
};
use crate::server::AppState;
use crate::services::RegisterInput;
use crate::types::WeblogError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or user name
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: AccountView,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub name: String,
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeEmailRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct OutcomeResponse<T: Serialize> {
    result: T,
}

// =============================================================================
// Dispatch
// =============================================================================

pub fn handle_auth_request(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    match (&req.method, req.path.trim_end_matches('/')) {
        (&Method::POST, "/auth/register") => handle_register(state, req),
        (&Method::POST, "/auth/login") => handle_login(state, req),
        (&Method::GET, "/auth/me") => handle_me(state, req),
        (&Method::POST, "/auth/confirm") => handle_confirm(state, req),
        (&Method::POST, "/auth/resend-confirmation") => handle_resend(state, req),
        (&Method::POST, "/auth/change-password") => handle_change_password(state, req),
        (&Method::POST, "/auth/reset-password/request") => handle_reset_request(state, req),
        (&Method::POST, "/auth/reset-password") => handle_reset_password(state, req),
        (&Method::POST, "/auth/change-email") => handle_change_email(state, req),
        _ => Err(not_found(req)),
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

fn handle_register(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let input: RegisterInput = req.json()?;
    let user = state.accounts.register(&input)?;
    let view = AccountView::build(state, &user)?;
    Ok(created_response(&view.user.url, &view))
}

fn handle_login(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let body: LoginRequest = req.json()?;
    if body.login.trim().is_empty() || body.password.is_empty() {
        return Err(WeblogError::BadRequest("Missing required fields: login, password".into()));
    }

    let user = state.accounts.authenticate(body.login.trim(), &body.password)?;
    state.accounts.ping(user.id)?;
    let token = state.accounts.issue_api_token(&user)?;
    info!(user_id = user.id, "API token issued");

    Ok(json_response(
        StatusCode::OK,
        &LoginResponse {
            token,
            expires_in: state.args.session_ttl().as_secs(),
            user: AccountView::build(state, &user)?,
        },
    ))
}

fn handle_me(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let user = require_identity(state, req)?;
    Ok(json_response(StatusCode::OK, &AccountView::build(state, &user)?))
}

fn handle_confirm(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let user = require_identity(state, req)?;
    let body: ConfirmRequest = req.json()?;
    let result = state.accounts.confirm(&user, body.token.trim())?;
    Ok(json_response(StatusCode::OK, &OutcomeResponse { result }))
}

fn handle_resend(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let user = require_identity(state, req)?;
    let result = state.accounts.resend_confirmation(&user)?;
    Ok(json_response(StatusCode::OK, &OutcomeResponse { result }))
}

fn handle_change_password(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let user = require_identity(state, req)?;
    let body: ChangePasswordRequest = req.json()?;
    state
        .accounts
        .change_password(&user, &body.old_password, &body.new_password)?;
    Ok(message_response(StatusCode::OK, "Your password has been updated."))
}

fn handle_reset_request(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let body: ResetRequest = req.json()?;
    state.accounts.request_password_reset(&body.email)?;
    Ok(message_response(
        StatusCode::ACCEPTED,
        "A password reset token has been sent to your email.",
    ))
}

fn handle_reset_password(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let body: ResetPasswordRequest = req.json()?;
    state
        .accounts
        .reset_password(&body.name, body.token.trim(), &body.password)?;
    Ok(message_response(StatusCode::OK, "Your password has been reset."))
}

fn handle_change_email(state: &AppState, req: &ApiRequest) -> Result<JsonResponse, WeblogError> {
    let user = require_identity(state, req)?;
    let body: ChangeEmailRequest = req.json()?;
    let updated = state.accounts.change_email(&user, &body.email, &body.password)?;
    Ok(json_response(StatusCode::OK, &AccountView::build(state, &updated)?))
}
