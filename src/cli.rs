// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines all subcommands and global flags

use crate::output::Format;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobtrail")]
#[command(about = "Rust CLI for the JobTrail job tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Bearer token (overrides session/env/config)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// API base URL
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Identity-provider base URL
    #[arg(long, global = true)]
    pub clerk_base: Option<String>,

    /// Provider web app URL used during capture
    #[arg(long, global = true)]
    pub app_url: Option<String>,

    /// Output format for listing commands
    #[arg(long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Browser remote-debugging port
    #[arg(long, global = true)]
    pub cdp_port: Option<u16>,

    /// Browser profile directory for capture launches
    #[arg(long, global = true)]
    pub profile_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List your boards
    Boards,

    /// List jobs, optionally scoped to one board
    Jobs {
        /// Board ID to filter by
        #[arg(long)]
        board: Option<String>,
    },

    /// List activity log entries
    Activity {
        /// Job ID to filter by
        #[arg(long)]
        job: Option<String>,

        /// Maximum number of entries
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Capture a login session from a debuggable browser
    Capture,

    /// Diagnose what the capture flow can see, without storing anything
    Check,

    /// Store a session cookie manually
    SetSession {
        /// The __session cookie value
        cookie: String,

        /// Session id; derived from the cookie when omitted
        session_id: Option<String>,
    },

    /// Remove the stored session
    ClearSession,
}
