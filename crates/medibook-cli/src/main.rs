//! Medibook CLI - sign in to the healthcare appointment API and issue
//! authenticated requests from the terminal.
//!
//! Every run restores the previous session (if the server still honours it)
//! before executing the command.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use medibook_core::api::ApiRequest;
use medibook_core::auth::{check_access, Access, FileIdentityStore, IdentityStore, SessionPhase};
use medibook_core::models::Role;
use medibook_core::{Config, HttpClient, SessionStore};

const USAGE: &str = "\
Usage: medibook <command> [args]

Commands:
  status                          Show who is signed in
  login [email]                   Sign in (prompts for the password)
  logout                          End the session
  get [--role patient|doctor] <path>...
                                  GET one or more API paths concurrently

Environment:
  MEDIBOOK_API_URL                Backend base URL (default http://localhost:8080)
  RUST_LOG                        Log filter, e.g. RUST_LOG=medibook_core=debug";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load config")?;
    let identity: Arc<dyn IdentityStore> = Arc::new(FileIdentityStore::new(Config::data_dir()?));
    let http = HttpClient::connect(&config, Arc::clone(&identity))?;
    let _expired = http.on_session_expired(|failure| {
        eprintln!(
            "Session expired ({}). Run `medibook login` to sign in again.",
            failure.reason()
        );
    });

    let session = SessionStore::new(http, identity);
    info!(base_url = %config.base_url(), "medibook starting");
    session.restore_session().await;

    match command.as_str() {
        "status" => print_status(&session),
        "login" => login(&session, &mut config, args.get(1).map(String::as_str)).await?,
        "logout" => {
            session.logout().await;
            println!("Logged out");
        }
        "get" => get(&session, &mut config, &args[1..]).await?,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    Ok(())
}

fn print_status(session: &SessionStore) {
    match (session.phase(), session.user()) {
        (SessionPhase::Authenticated, Some(user)) => {
            println!("Signed in as {} ({}, id {})", user.email, user.role, user.id);
        }
        (SessionPhase::Initializing, _) => println!("Session restore still in progress"),
        _ => println!("Not signed in"),
    }
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(value) => eprint!("{} [{}]: ", label, value),
        None => eprint!("{}: ", label),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        default
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("{} is required", label))
    } else {
        Ok(line.to_string())
    }
}

async fn login(session: &SessionStore, config: &mut Config, email: Option<&str>) -> Result<()> {
    let email = match email {
        Some(email) => email.to_string(),
        None => prompt("Email", config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ")
        .context("Failed to read password")?;

    let user = session.sign_in(&email, &password).await?;
    println!("Signed in as {} ({})", user.email, user.role);

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

fn parse_get_args(args: &[String]) -> Result<(Option<Role>, Vec<String>)> {
    let mut role = None;
    let mut paths = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--role" {
            let value = iter.next().context("--role needs a value")?;
            role = Some(
                Role::parse(value)
                    .ok_or_else(|| anyhow::anyhow!("Unknown role: {}", value))?,
            );
        } else {
            paths.push(arg.clone());
        }
    }
    if paths.is_empty() {
        bail!("get needs at least one path\n\n{}", USAGE);
    }
    Ok((role, paths))
}

async fn get(session: &SessionStore, config: &mut Config, args: &[String]) -> Result<()> {
    let (role, paths) = parse_get_args(args)?;

    if !session.is_logged_in() {
        eprintln!("Not signed in.");
        login(session, config, None).await?;
    }

    if let Some(role) = role {
        let access = check_access(&session.state(), role);
        if access != Access::Granted {
            bail!(
                "{} access required (redirect to {})",
                role,
                access.redirect_target().unwrap_or("/")
            );
        }
    }

    let http = session.http();
    let results = join_all(
        paths
            .iter()
            .map(|path| http.fetch_raw::<Value>(ApiRequest::get(path.as_str()))),
    )
    .await;

    let mut failed = 0;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(body) => println!("{}\n{}", path, serde_json::to_string_pretty(&body)?),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", path, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} requests failed", failed, paths.len());
    }
    Ok(())
}
