//! Weblog - multi-user blogging service
//!
//! Identities register, confirm their email through a signed token and are
//! granted permissions through one of three seeded roles. They follow each
//! other, publish Markdown posts (stored alongside a sanitized HTML
//! rendering) and comment on posts; moderators can hide comments.
//!
//! ## Layers
//!
//! - **db**: SQLite schema and row-level queries (rusqlite)
//! - **auth**: permissions, roles, password hashing, signed tokens
//! - **services**: transactional operations with permission checks
//! - **routes / server**: JSON API over hyper

pub mod auth;
pub mod config;
pub mod db;
pub mod mail;
pub mod markup;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, WeblogError};
