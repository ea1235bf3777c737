pub mod auth;
pub mod client;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod halls;
pub mod import;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod session;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
