// ABOUTME: Public library API for the JobTrail CLI
// ABOUTME: Re-exports core modules for external use

pub mod api;
pub mod auth;
pub mod capture;
pub mod cdp;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod session;
pub mod store;
pub mod util;

pub use error::{Error, Result};
pub use session::{extract_session_id, SessionManager, StoredSession};
