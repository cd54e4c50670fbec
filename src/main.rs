// ABOUTME: CLI entrypoint for jobtrail command
// ABOUTME: Handles error exit codes and command dispatch

use clap::Parser;
use jobtrail::{
    api::ApiClient,
    auth::resolve_provider,
    capture::{capture_session, check_session, CaptureConfig},
    cdp::DebugClient,
    cli::{Cli, Commands},
    config::Config,
    output,
    store::KeyringStore,
    Error, Result, SessionManager, StoredSession,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("jobtrail: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    let clerk_base = cli.clerk_base.clone().or_else(|| config.clerk_base.clone());
    let app_url = cli
        .app_url
        .clone()
        .or_else(|| config.app_url.clone())
        .unwrap_or_else(|| jobtrail::session::DEFAULT_APP_ORIGIN.to_string());
    let app_origin = jobtrail::util::origin_of(&app_url);

    let manager = SessionManager::new(KeyringStore::new(), clerk_base, Some(app_origin))?;
    let api_base = cli.api_base.clone().or_else(|| config.api_base.clone());

    match cli.command.clone() {
        Commands::Boards => {
            let provider = resolve_provider(cli.token, manager, &config)?;
            let client = ApiClient::new(provider, api_base)?;
            let boards = client.list_boards().await?;
            println!("{}", output::render(&boards, cli.format)?);
        }
        Commands::Jobs { board } => {
            let provider = resolve_provider(cli.token, manager, &config)?;
            let client = ApiClient::new(provider, api_base)?;
            let jobs = client.list_jobs(board.as_deref()).await?;
            println!("{}", output::render(&jobs, cli.format)?);
        }
        Commands::Activity { job, limit } => {
            let provider = resolve_provider(cli.token, manager, &config)?;
            let client = ApiClient::new(provider, api_base)?;
            let activities = client.list_activities(job.as_deref(), limit).await?;
            println!("{}", output::render(&activities, cli.format)?);
        }
        Commands::Capture => {
            let cfg = capture_config(&cli, &config, app_url)?;
            let debug = DebugClient::new(cfg.cdp_port)?;
            capture_session(&manager, &debug, &cfg).await?;
        }
        Commands::Check => {
            let cfg = capture_config(&cli, &config, app_url)?;
            let debug = DebugClient::new(cfg.cdp_port)?;
            check_session(&manager, &debug, &cfg).await?;
        }
        Commands::SetSession { cookie, session_id } => {
            let session_id = session_id
                .or_else(|| jobtrail::extract_session_id(&cookie))
                .ok_or_else(|| {
                    Error::Auth(
                        "could not derive a session id from that cookie; pass it explicitly \
                         as the second argument"
                            .into(),
                    )
                })?;

            manager.save_session(&StoredSession::new(cookie, session_id))?;
            println!("Session stored; verifying with a token exchange...");
            manager.fresh_token().await?;
            println!("Session verified.");
        }
        Commands::ClearSession => {
            manager.clear_session()?;
            println!("Session cleared.");
        }
    }

    Ok(())
}

fn capture_config(cli: &Cli, config: &Config, app_url: String) -> Result<CaptureConfig> {
    let port = cli.cdp_port.or(config.cdp_port).unwrap_or(9222);
    let profile_dir = match cli.profile_dir.clone().or_else(|| config.browser_profile.clone()) {
        Some(dir) => dir,
        None => Config::default_profile_dir()?,
    };
    Ok(CaptureConfig::new(port, profile_dir, app_url))
}
