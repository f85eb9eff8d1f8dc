//! HTTP server implementation
//!
//! hyper http1 with TokioIo. Each request body is read (bounded by
//! [`MAX_BODY_BYTES`]) before routing; the routes themselves run on the
//! blocking pool because they hash passwords and hold the SQLite lock.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::TokenSigner;
use crate::config::Args;
use crate::db::WeblogDb;
use crate::mail::Mailer;
use crate::routes::{self, error_response, ApiRequest, MAX_BODY_BYTES};
use crate::services::{
    AccountService, AccountServiceConfig, ContentService, ContentServiceConfig, SocialService,
};
use crate::types::WeblogError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: Arc<WeblogDb>,
    pub accounts: AccountService,
    pub social: SocialService,
    pub content: ContentService,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services over one database and mailer
    pub fn new(args: Args, db: Arc<WeblogDb>, mailer: Mailer) -> Result<Self, WeblogError> {
        let secret = args.secret_key().ok_or_else(|| {
            WeblogError::Config("SECRET_KEY is required unless DEV_MODE is set".into())
        })?;
        let signer = TokenSigner::new(secret)?;

        let accounts = AccountService::new(
            Arc::clone(&db),
            signer,
            mailer,
            AccountServiceConfig {
                token_ttl: args.token_ttl(),
                session_ttl: args.session_ttl(),
            },
        );
        let social = SocialService::new(Arc::clone(&db));
        let content = ContentService::new(
            Arc::clone(&db),
            ContentServiceConfig {
                search_min_len: args.search_min_len,
            },
        );

        Ok(Self {
            args,
            db,
            accounts,
            social,
            content,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), WeblogError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Weblog listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - using the built-in signing secret");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the body and hand the request to the router
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("[{}] {} {} body rejected: {}", addr, method, path, e);
            return Ok(to_boxed(error_response(WeblogError::BadRequest(format!(
                "Failed to read body: {}",
                e
            )))));
        }
    };

    let api_req = ApiRequest {
        method: parts.method,
        path: path.clone(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };

    let response = match tokio::task::spawn_blocking(move || routes::route(&state, &api_req)).await {
        Ok(response) => response,
        Err(e) => {
            error!("Route task failed for {} {}: {}", method, path, e);
            error_response(WeblogError::Internal("request handler failed".into()))
        }
    };

    info!(
        client = %addr,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
