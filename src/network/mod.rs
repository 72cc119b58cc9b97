//! Network Module
//!
//! HTTP shim exposing the store.
//!
//! ## Routes
//! - `GET  /db/:key` → `{"key": ..., "value": ...}`, 404 if absent
//! - `POST /db/:key` with `{"value": ...}` → 200
//! - `GET  /health`  → `OK`
//!
//! Store calls are blocking file I/O and run on the blocking thread pool.

mod handlers;
mod server;

pub use handlers::{ApiError, PutRequest, ValueResponse};
pub use server::{router, HttpServer};
