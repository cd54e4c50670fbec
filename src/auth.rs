// ABOUTME: Credential resolution with precedence chain
// ABOUTME: CLI flag → env var → stored session → config file → keyring → prompt

use crate::config::Config;
use crate::session::SessionManager;
use crate::store::{SecretStore, ACCOUNT_API_TOKEN};
use crate::{Error, Result};
use std::env;
use std::io::{BufRead, IsTerminal, Write};

pub const TOKEN_ENV_VAR: &str = "JOBTRAIL_TOKEN";

/// Either a fixed token or a live refresh through the stored session.
/// Consumers call `token()` immediately before every request and never
/// cache the result; freshness is the session manager's job.
pub enum TokenProvider<S: SecretStore> {
    Static(String),
    Session(SessionManager<S>),
}

impl<S: SecretStore> TokenProvider<S> {
    pub async fn token(&self) -> Result<String> {
        match self {
            TokenProvider::Static(token) => Ok(token.clone()),
            TokenProvider::Session(manager) => manager.fresh_token().await,
        }
    }
}

/// Picks the first usable credential source, short-circuiting in
/// priority order. The interactive prompt only fires on a terminal.
pub fn resolve_provider<S: SecretStore>(
    cli_token: Option<String>,
    manager: SessionManager<S>,
    config: &Config,
) -> Result<TokenProvider<S>> {
    // 1. CLI flag
    if let Some(token) = cli_token {
        return Ok(TokenProvider::Static(token));
    }

    // 2. Environment variable
    if let Ok(token) = env::var(TOKEN_ENV_VAR) {
        if !token.is_empty() {
            return Ok(TokenProvider::Static(token));
        }
    }

    // 3. Stored session (dynamic: refreshed before every request)
    if manager.has_session() {
        return Ok(TokenProvider::Session(manager));
    }

    // 4. Plaintext config
    if let Some(token) = &config.token {
        return Ok(TokenProvider::Static(token.clone()));
    }

    // 5. OS secret store
    if let Some(token) = manager.store().get(ACCOUNT_API_TOKEN)? {
        return Ok(TokenProvider::Static(token));
    }

    // 6. Interactive prompt
    if std::io::stdin().is_terminal() {
        if let Some(token) = prompt_for_token(manager.store())? {
            return Ok(TokenProvider::Static(token));
        }
    }

    Err(Error::Auth(format!(
        "no token found. Options: run `jobtrail capture` to grab a browser session, \
         pass --token, set {}, add \"token\" to the config file, or store one in the \
         OS keyring",
        TOKEN_ENV_VAR
    )))
}

fn prompt_for_token<S: SecretStore>(store: &S) -> Result<Option<String>> {
    eprint!("Paste a JobTrail API token (or press Enter to abort): ");
    std::io::stderr().flush()?;

    let mut token = String::new();
    std::io::stdin().lock().read_line(&mut token)?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Ok(None);
    }

    eprint!("Save it to [k]eyring, [c]onfig file, or [n]owhere? [n]: ");
    std::io::stderr().flush()?;
    let mut choice = String::new();
    std::io::stdin().lock().read_line(&mut choice)?;

    match choice.trim().chars().next() {
        Some('k') | Some('K') => {
            store.set(ACCOUNT_API_TOKEN, &token)?;
            eprintln!("Saved to keyring.");
        }
        Some('c') | Some('C') => {
            let mut config = Config::load().unwrap_or_default();
            config.token = Some(token.clone());
            config.save()?;
            eprintln!("Saved to config file.");
        }
        _ => {}
    }

    Ok(Some(token))
}
