//! HTTP/WS gateway: webhook ingestion, operator REST API, and realtime
//! fanout to inbox viewers.

pub mod error;
pub mod routes;
pub mod server;
pub mod service;
pub mod ws;

pub use {
    error::{Error, Result},
    server::{AppState, build_app, start_gateway},
    service::{ConnectionOverview, InboxService, IngestOutcome},
};
