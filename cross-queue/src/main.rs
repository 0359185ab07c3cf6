//! cross-queue - Scheduled post queue CLI
//!
//! Adds, lists, and cancels scheduled posts. The dispatch side never creates
//! rows; this tool is the stand-in for whatever UI feeds the queue.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libcrosscast::{Config, CrosscastError, Database, Platform, Result, ScheduledPost};

#[derive(Parser, Debug)]
#[command(name = "cross-queue")]
#[command(version)]
#[command(about = "Manage the Crosscast scheduled post queue")]
#[command(long_about = "\
cross-queue - Manage the Crosscast scheduled post queue

DESCRIPTION:
    cross-queue adds posts to the dispatch queue, lists what is waiting,
    and cancels posts that have not gone out yet. Published posts cannot
    be cancelled.

USAGE:
    # Schedule a tweet for an absolute time
    cross-queue add --user alice --client acme --platform twitter \\
        --at 2026-09-01T15:00:00Z \"Launch day!\"

    # Schedule an Instagram post (media URL required)
    cross-queue add --user alice --client acme --platform instagram \\
        --at 1756738800 --media-url https://cdn.example.com/launch.jpg \\
        \"Launch day!\"

    # List pending posts
    cross-queue list

    # List everything as JSON
    cross-queue list --all --format json

    # Cancel a pending post
    cross-queue cancel 550e8400-e29b-41d4-a716-446655440000

TIME FORMATS:
    RFC 3339 (2026-09-01T15:00:00Z) or Unix seconds (1756738800)

EXIT CODES:
    0 - Success
    1 - Runtime error
    3 - Invalid input

For more information, visit: https://github.com/crosscast/crosscast
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule a new post
    Add {
        /// User whose linked account will publish the post
        #[arg(long)]
        user: String,

        /// Client the post belongs to
        #[arg(long)]
        client: String,

        /// Target platform
        #[arg(long)]
        platform: String,

        /// When to publish (RFC 3339 or Unix seconds)
        #[arg(long)]
        at: String,

        /// Media URL (required for Instagram)
        #[arg(long)]
        media_url: Option<String>,

        /// Post content
        content: String,
    },

    /// List scheduled posts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Limit to one user
        #[arg(long)]
        user: Option<String>,

        /// Include already published posts
        #[arg(long)]
        all: bool,
    },

    /// Cancel a pending post
    Cancel {
        /// Post id to cancel
        post_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Command::Add {
            user,
            client,
            platform,
            at,
            media_url,
            content,
        } => cmd_add(&db, &user, &client, &platform, &at, media_url, &content).await,
        Command::List { format, user, all } => cmd_list(&db, &format, user.as_deref(), all).await,
        Command::Cancel { post_id } => cmd_cancel(&db, &post_id).await,
    }
}

/// Accepts RFC 3339 or bare Unix seconds
fn parse_at(input: &str) -> Result<i64> {
    if let Ok(timestamp) = input.parse::<i64>() {
        return Ok(timestamp);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp());
    }

    Err(CrosscastError::InvalidInput(format!(
        "Could not parse time '{}'; use RFC 3339 or Unix seconds",
        input
    )))
}

async fn cmd_add(
    db: &Database,
    user: &str,
    client: &str,
    platform: &str,
    at: &str,
    media_url: Option<String>,
    content: &str,
) -> Result<()> {
    let platform: Platform = platform.parse()?;
    let scheduled_for = parse_at(at)?;

    if content.trim().is_empty() && media_url.is_none() {
        return Err(CrosscastError::InvalidInput(
            "Post content cannot be empty".to_string(),
        ));
    }

    let mut post = ScheduledPost::new(user, client, platform, content, scheduled_for);
    if let Some(url) = media_url {
        post = post.with_media_url(&url);
    }

    db.create_scheduled_post(&post).await?;
    println!("Scheduled {} for {} ({})", post.id, platform, format_time_until(scheduled_for));
    Ok(())
}

async fn cmd_list(db: &Database, format: &str, user: Option<&str>, all: bool) -> Result<()> {
    let posts = db.list_scheduled_posts(user, all, 100).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&posts).unwrap_or_default());
        }
        "text" => {
            if posts.is_empty() {
                println!("No scheduled posts");
                return Ok(());
            }
            for post in posts {
                let status = if post.posted { "posted" } else { "pending" };
                println!(
                    "{} {:<15} {:<8} {:<18} {}",
                    post.id,
                    post.platform.to_string(),
                    status,
                    format_time_until(post.scheduled_for),
                    truncate_content(&post.content, 40)
                );
            }
        }
        other => {
            return Err(CrosscastError::InvalidInput(format!(
                "Unknown format '{}'; use text or json",
                other
            )));
        }
    }
    Ok(())
}

async fn cmd_cancel(db: &Database, post_id: &str) -> Result<()> {
    if db.cancel_scheduled_post(post_id).await? {
        println!("Cancelled {}", post_id);
        Ok(())
    } else {
        Err(CrosscastError::InvalidInput(format!(
            "Post {} not found or already published",
            post_id
        )))
    }
}

/// Human-readable offset from now, for list output
fn format_time_until(timestamp: i64) -> String {
    let delta = timestamp - Utc::now().timestamp();
    if delta <= 0 {
        return "due now".to_string();
    }

    if delta < 3600 {
        format!("in {}m", delta / 60)
    } else if delta < 86400 {
        format!("in {}h {}m", delta / 3600, (delta % 3600) / 60)
    } else {
        format!("in {}d {}h", delta / 86400, (delta % 86400) / 3600)
    }
}

fn truncate_content(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let truncated: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated)
}
