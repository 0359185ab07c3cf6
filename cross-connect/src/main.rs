//! cross-connect - Account linking CLI
//!
//! Drives the OAuth lifecycle for linked accounts: print an authorization
//! URL, exchange the callback code, inspect link status, disconnect.

use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use libcrosscast::providers::{generate_code_verifier, generate_state};
use libcrosscast::{
    build_registry, Config, CrosscastError, Database, LinkedAccount, Platform, Provider,
    ProviderRegistry, Result,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cross-connect")]
#[command(version)]
#[command(about = "Link and manage platform accounts for Crosscast")]
#[command(long_about = "\
cross-connect - Link and manage platform accounts for Crosscast

DESCRIPTION:
    cross-connect drives the OAuth authorization-code flow for each
    supported platform. `url` prints the authorization URL to visit and
    records the anti-forgery state; after the provider redirects back,
    `exchange` trades the callback code for tokens and stores them.

    States are single-use: each `url` invocation must be matched by at most
    one `exchange`.

USAGE:
    # Start linking a Twitter account
    cross-connect url --platform twitter --user alice

    # Finish linking with the state and code from the callback
    cross-connect exchange --state STATE --code CODE

    # Inspect linked accounts, with a live token check
    cross-connect status --user alice

    # Disconnect (the stored row is kept, deactivated)
    cross-connect disconnect --platform twitter --user alice

PLATFORMS:
    twitter, instagram, youtube, google_calendar

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Each platform needs a [twitter] / [instagram] / [google] section with
    client_id, client_secret, and redirect_uri.

EXIT CODES:
    0 - Success
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input

For more information, visit: https://github.com/crosscast/crosscast
")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an authorization URL and record the pending state
    Url {
        /// Platform to link
        #[arg(long)]
        platform: String,

        /// User the account belongs to
        #[arg(long)]
        user: String,
    },

    /// Exchange a callback code for tokens and store the linked account
    Exchange {
        /// State value from the callback query string
        #[arg(long)]
        state: String,

        /// Authorization code from the callback query string
        #[arg(long)]
        code: String,
    },

    /// Show linked accounts with expiry and a live token check
    Status {
        /// Limit to one user
        #[arg(long)]
        user: Option<String>,
    },

    /// Disconnect a linked account (soft-delete)
    Disconnect {
        /// Platform to disconnect
        #[arg(long)]
        platform: String,

        /// User the account belongs to
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let registry = build_registry(&config)?;

    match cli.command {
        Command::Url { platform, user } => cmd_url(&db, &registry, &platform, &user).await,
        Command::Exchange { state, code } => cmd_exchange(&db, &registry, &state, &code).await,
        Command::Status { user } => cmd_status(&db, &registry, user.as_deref()).await,
        Command::Disconnect { platform, user } => cmd_disconnect(&db, &platform, &user).await,
    }
}

fn configured_provider<'a>(
    registry: &'a ProviderRegistry,
    platform: Platform,
) -> Result<&'a dyn Provider> {
    registry.get(platform).ok_or_else(|| {
        CrosscastError::InvalidInput(format!(
            "{} is not configured; add its section to the config file",
            platform
        ))
    })
}

async fn cmd_url(
    db: &Database,
    registry: &ProviderRegistry,
    platform: &str,
    user: &str,
) -> Result<()> {
    let platform: Platform = platform.parse()?;
    let provider = configured_provider(registry, platform)?;

    let state = generate_state();
    let verifier = provider.uses_pkce().then(generate_code_verifier);

    // Persist before printing: the exchange side must find the state
    db.save_auth_state(&state, user, platform, verifier.as_deref())
        .await?;
    info!("recorded pending {} authorization for {}", platform, user);

    let url = provider.authorize_url(&state, verifier.as_deref())?;
    println!("{}", url);
    Ok(())
}

async fn cmd_exchange(
    db: &Database,
    registry: &ProviderRegistry,
    state: &str,
    code: &str,
) -> Result<()> {
    let auth = db.take_auth_state(state).await?.ok_or_else(|| {
        CrosscastError::InvalidInput(
            "Unknown or already used state; run the url command again".to_string(),
        )
    })?;

    let provider = configured_provider(registry, auth.platform)?;
    let tokens = provider
        .exchange_code(code, auth.code_verifier.as_deref())
        .await?;

    let account = LinkedAccount::from_token_set(&auth.user_id, auth.platform, &tokens);
    db.upsert_linked_account(&account).await?;

    println!(
        "Linked {} account {} for user {}",
        auth.platform,
        account.account_username.as_deref().unwrap_or("(unknown)"),
        auth.user_id
    );
    Ok(())
}

async fn cmd_status(db: &Database, registry: &ProviderRegistry, user: Option<&str>) -> Result<()> {
    let accounts = db.list_linked_accounts(user).await?;
    if accounts.is_empty() {
        println!("No linked accounts");
        return Ok(());
    }

    // Live checks run concurrently; disconnected rows are not checked
    let checks = accounts.iter().map(|account| async {
        if !account.is_active {
            return "disconnected".to_string();
        }
        match registry.get(account.platform) {
            None => "provider not configured".to_string(),
            Some(provider) => match provider.verify_token(&account.access_token).await {
                Ok(true) => "valid".to_string(),
                Ok(false) => "rejected by provider".to_string(),
                Err(e) => format!("check failed: {}", e),
            },
        }
    });
    let verdicts = join_all(checks).await;

    let now = Utc::now().timestamp();
    for (account, verdict) in accounts.iter().zip(verdicts) {
        let expiry = match account.token_expires_at {
            None => "no expiry".to_string(),
            Some(at) if at <= now => "expired".to_string(),
            Some(at) => format!("expires in {}m", (at - now) / 60),
        };
        println!(
            "{:<12} {:<16} {:<20} {:<16} {}",
            account.user_id,
            account.platform.to_string(),
            account.account_username.as_deref().unwrap_or("-"),
            expiry,
            verdict
        );
    }
    Ok(())
}

async fn cmd_disconnect(db: &Database, platform: &str, user: &str) -> Result<()> {
    let platform: Platform = platform.parse()?;

    if db.deactivate_linked_account(user, platform).await? {
        println!("Disconnected {} for user {}", platform, user);
        Ok(())
    } else {
        Err(CrosscastError::InvalidInput(format!(
            "No active {} account linked for user {}",
            platform, user
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libcrosscast::providers::MockProvider;

    async fn test_db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_cmd_url_unconfigured_platform() {
        let db = test_db().await;
        let registry = ProviderRegistry::new();

        let err = cmd_url(&db, &registry, "twitter", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_cmd_url_unknown_platform() {
        let db = test_db().await;
        let registry = ProviderRegistry::new();

        let err = cmd_url(&db, &registry, "friendster", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_cmd_exchange_unknown_state() {
        let db = test_db().await;
        let registry = ProviderRegistry::new();

        let err = cmd_exchange(&db, &registry, "never-issued", "code")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[tokio::test]
    async fn test_exchange_links_account_and_state_is_single_use() {
        let db = test_db().await;
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(MockProvider::success(Platform::Twitter)));

        db.save_auth_state("state-1", "alice", Platform::Twitter, Some("verifier"))
            .await
            .unwrap();

        cmd_exchange(&db, &registry, "state-1", "code-1")
            .await
            .unwrap();

        let account = db
            .get_linked_account("alice", Platform::Twitter)
            .await
            .unwrap()
            .unwrap();
        assert!(account.is_active);
        assert_eq!(account.access_token, "mock-access-token");

        // Replay fails
        assert!(cmd_exchange(&db, &registry, "state-1", "code-1")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cmd_disconnect() {
        let db = test_db().await;
        let account = LinkedAccount::from_token_set(
            "alice",
            Platform::Twitter,
            &libcrosscast::TokenSet::new("t"),
        );
        db.upsert_linked_account(&account).await.unwrap();

        cmd_disconnect(&db, "twitter", "alice").await.unwrap();

        // Second disconnect finds nothing active
        let err = cmd_disconnect(&db, "twitter", "alice").await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
