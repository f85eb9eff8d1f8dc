//! HTTP routes for Weblog
//!
//! The server reads each request body up front and hands the routes an
//! [`ApiRequest`]; everything below is synchronous and answers with a JSON
//! [`JsonResponse`]. Handlers return `Result<JsonResponse, WeblogError>` and
//! [`route`] renders any error as `{ "error": <kind>, "message": <text> }`.

pub mod admin;
pub mod api;
pub mod auth_routes;
pub mod health;
pub mod views;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::extract_token_from_header;
use crate::db::users::UserRow;
use crate::db::{Page, PageRequest};
use crate::server::AppState;
use crate::types::WeblogError;

pub use health::health_check;

pub type JsonResponse = Response<Full<Bytes>>;

/// Largest request body the server will read
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// Request
// =============================================================================

/// A request whose body has already been collected
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: hyper::header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION, &format!("Bearer {}", token))
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.body = Bytes::from(bytes);
        }
        self.with_header(CONTENT_TYPE, "application/json")
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, WeblogError> {
        if self.body.len() > MAX_BODY_BYTES {
            return Err(WeblogError::BadRequest("Request body too large".into()));
        }
        if self.body.is_empty() {
            return Err(WeblogError::BadRequest("Missing JSON body".into()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| WeblogError::BadRequest(format!("Invalid JSON: {}", e)))
    }

    /// Parse the query string; absent parameters fall back to `T`'s defaults
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, WeblogError> {
        serde_urlencoded::from_str(self.query.as_deref().unwrap_or(""))
            .map_err(|e| WeblogError::BadRequest(format!("Invalid query string: {}", e)))
    }

    /// Path segments after `prefix`, e.g. `/api/v1/users/3/blogs` -> `["users", "3", "blogs"]`
    pub fn segments(&self, prefix: &str) -> Vec<&str> {
        self.path
            .strip_prefix(prefix)
            .unwrap_or("")
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// `?page=N`
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,
}

/// A page number that doesn't parse is treated as absent (page 1)
pub fn lenient_page<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

impl PageQuery {
    pub fn request(&self, per_page: u32) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), per_page)
    }
}

/// Path ids that don't parse can't name a row
pub fn parse_id(segment: &str) -> Result<i64, WeblogError> {
    segment
        .parse()
        .map_err(|_| WeblogError::NotFound(format!("no resource with id {:?}", segment)))
}

// =============================================================================
// Dispatch
// =============================================================================

/// Route one request to its handler
pub fn route(state: &AppState, req: &ApiRequest) -> JsonResponse {
    let path = req.path.as_str();
    let result = if req.method == Method::OPTIONS {
        Ok(cors_preflight())
    } else if path == "/health" || path == "/healthz" {
        Ok(health_check(state))
    } else if path.starts_with("/auth/") {
        auth_routes::handle_auth_request(state, req)
    } else if path.starts_with("/api/v1/") {
        api::handle_api_request(state, req)
    } else if path.starts_with("/admin/") {
        admin::handle_admin_request(state, req)
    } else {
        Err(not_found(req))
    };

    match result {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                warn!(method = %req.method, path = %req.path, error = %err, "Request failed");
            } else {
                debug!(method = %req.method, path = %req.path, error = %err, "Request rejected");
            }
            error_response(err)
        }
    }
}

pub(crate) fn not_found(req: &ApiRequest) -> WeblogError {
    WeblogError::NotFound(format!("no route for {} {}", req.method, req.path))
}

// =============================================================================
// Authentication
// =============================================================================

/// Resolve the caller from the Authorization header.
///
/// Accepts `Bearer <api token>` and `Basic base64(login:password)`; a Basic
/// login with an empty password is treated as an API token. Every resolved
/// identity is pinged.
pub fn authenticate(state: &AppState, req: &ApiRequest) -> Result<Option<UserRow>, WeblogError> {
    let header = match req.authorization() {
        Some(h) => h.trim(),
        None => return Ok(None),
    };

    let user = if let Some(encoded) = header.strip_prefix("Basic ") {
        let (login, password) = decode_basic(encoded.trim())?;
        if password.is_empty() {
            identify_token(state, &login)?
        } else {
            state.accounts.authenticate(&login, &password)?
        }
    } else {
        match extract_token_from_header(Some(header)) {
            Some(token) => identify_token(state, token)?,
            None => return Err(WeblogError::Unauthorized("unsupported authorization scheme".into())),
        }
    };

    state.accounts.ping(user.id)?;
    Ok(Some(user))
}

fn identify_token(state: &AppState, token: &str) -> Result<UserRow, WeblogError> {
    state.accounts.identify_api_token(token).map_err(|e| match e {
        WeblogError::TokenInvalid(_) | WeblogError::TokenExpired => {
            WeblogError::Unauthorized("invalid or expired token".into())
        }
        other => other,
    })
}

fn decode_basic(encoded: &str) -> Result<(String, String), WeblogError> {
    let malformed = || WeblogError::Unauthorized("malformed basic credentials".into());
    let decoded = BASE64.decode(encoded).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (login, password) = decoded.split_once(':').ok_or_else(malformed)?;
    if login.is_empty() {
        return Err(WeblogError::Unauthorized("invalid credentials".into()));
    }
    Ok((login.to_string(), password.to_string()))
}

/// Any authenticated identity, confirmed or not
pub fn require_identity(state: &AppState, req: &ApiRequest) -> Result<UserRow, WeblogError> {
    authenticate(state, req)?.ok_or_else(|| WeblogError::Unauthorized("authentication required".into()))
}

/// An authenticated identity that has confirmed its email
pub fn require_confirmed(state: &AppState, req: &ApiRequest) -> Result<UserRow, WeblogError> {
    let user = require_identity(state, req)?;
    if !user.confirmed {
        return Err(WeblogError::AuthorizationDenied("unconfirmed account".into()));
    }
    Ok(user)
}

// =============================================================================
// Responses
// =============================================================================

fn full_body(data: impl Into<Bytes>) -> Full<Bytes> {
    Full::new(data.into())
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> JsonResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Cache-Control", "no-store")
        .body(full_body(json))
        .unwrap()
}

/// 201 with a Location header pointing at the new resource
pub fn created_response<T: Serialize>(location: &str, body: &T) -> JsonResponse {
    let mut response = json_response(StatusCode::CREATED, body);
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(hyper::header::LOCATION, value);
    }
    response
}

pub fn message_response(status: StatusCode, message: &str) -> JsonResponse {
    json_response(status, &serde_json::json!({ "message": message }))
}

pub fn no_content() -> JsonResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(full_body(Bytes::new()))
        .unwrap()
}

pub fn error_response(err: WeblogError) -> JsonResponse {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": err.kind(),
        "message": err.to_string(),
    });
    json_response(status, &body)
}

fn cors_preflight() -> JsonResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(full_body(Bytes::new()))
        .unwrap()
}

/// `{ <key>: [...], "prev": url|null, "next": url|null, "count": total }`
///
/// `extra` query pairs are carried into the prev/next links.
pub fn listing_response<T: Serialize>(
    key: &str,
    page: &Page<T>,
    path: &str,
    extra: &[(&str, String)],
) -> Result<JsonResponse, WeblogError> {
    let link = |n: u32| -> Result<String, WeblogError> {
        let mut pairs: Vec<(&str, String)> = extra.to_vec();
        pairs.push(("page", n.to_string()));
        let query = serde_urlencoded::to_string(&pairs)
            .map_err(|e| WeblogError::Internal(format!("query encoding failed: {}", e)))?;
        Ok(format!("{}?{}", path, query))
    };

    let prev = if page.has_prev { Some(link(page.page - 1)?) } else { None };
    let next = if page.has_next { Some(link(page.page + 1)?) } else { None };

    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), serde_json::to_value(&page.items)?);
    body.insert("prev".into(), serde_json::to_value(prev)?);
    body.insert("next".into(), serde_json::to_value(next)?);
    body.insert("count".into(), page.total.into());

    Ok(json_response(StatusCode::OK, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_splits_query() {
        let req = ApiRequest::new(Method::GET, "/api/v1/search?q=rust&page=2");
        assert_eq!(req.path, "/api/v1/search");
        assert_eq!(req.query.as_deref(), Some("q=rust&page=2"));
        assert_eq!(req.segments("/api/v1"), vec!["search"]);
    }

    #[test]
    fn test_page_query_defaults() {
        let req = ApiRequest::new(Method::GET, "/api/v1/blogs");
        let q: PageQuery = req.query().unwrap();
        assert_eq!(q.request(10), PageRequest::new(1, 10));

        let req = ApiRequest::new(Method::GET, "/api/v1/blogs?page=0");
        let q: PageQuery = req.query().unwrap();
        assert_eq!(q.request(10).page, 1);

        let req = ApiRequest::new(Method::GET, "/api/v1/blogs?page=abc");
        let q: PageQuery = req.query().unwrap();
        assert_eq!(q.request(10).page, 1);

        let req = ApiRequest::new(Method::GET, "/api/v1/blogs?page=-3");
        let q: PageQuery = req.query().unwrap();
        assert_eq!(q.request(10).page, 1);
    }

    #[test]
    fn test_decode_basic() {
        let encoded = BASE64.encode("ann@example.com:secret1");
        let (login, password) = decode_basic(&encoded).unwrap();
        assert_eq!(login, "ann@example.com");
        assert_eq!(password, "secret1");

        let token_only = BASE64.encode("some.jwt.token:");
        assert_eq!(decode_basic(&token_only).unwrap().1, "");

        assert!(decode_basic("!!!").is_err());
        assert!(decode_basic(&BASE64.encode(":pw")).is_err());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("x"), Err(WeblogError::NotFound(_))));
    }

    #[test]
    fn test_error_response_shape() {
        let resp = error_response(WeblogError::AuthorizationDenied("nope".into()));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_json_body_errors() {
        let req = ApiRequest::new(Method::POST, "/auth/login");
        assert!(matches!(
            req.json::<serde_json::Value>(),
            Err(WeblogError::BadRequest(_))
        ));
    }
}
