//! Corpsnet CLI
//!
//! Command-line client for the Corpsnet API:
//! - Sign up, sign in and out (the session is kept in the config directory)
//! - Read and share posts, manage reminders
//! - Search the PPA directory, read letters and tips
//! - Import PPAs from CSV straight into a data directory

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use corpsnet::integrations::PpaCsvImporter;
use corpsnet::services::DirectoryService;
use corpsnet::storage::{LocalStore, StorageError, StoreConfig};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "corpsnet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Corps member hub: feed, reminders, PPA directory and resources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8082", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account and profile, then sign in
    Signup {
        email: String,
        #[arg(long)]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        confirm_password: Option<String>,
        /// State code, e.g. LA/24A/1234
        #[arg(long)]
        state_code: String,
        /// Batch, e.g. 2024A
        #[arg(long)]
        batch: String,
    },

    /// Sign in with email and password
    Signin {
        email: String,
        #[arg(long)]
        password: String,
    },

    /// End the saved session
    Signout,

    /// Show the saved session
    Whoami,

    /// Show or update your profile
    Profile {
        /// New location (empty string clears it)
        #[arg(long)]
        location: Option<String>,
        /// New LGA (empty string clears it)
        #[arg(long)]
        lga: Option<String>,
    },

    /// Show the community feed
    Feed,

    /// Share a post
    Post {
        /// Post text
        content: String,
    },

    /// Manage reminders
    Reminders {
        #[command(subcommand)]
        action: Option<ReminderAction>,
    },

    /// Search the PPA directory
    Ppas {
        /// Name prefix
        #[arg(short, long, default_value = "")]
        query: String,
        /// Exact state
        #[arg(short, long, default_value = "")]
        state: String,
    },

    /// List selectable states
    States,

    /// List letters and tips
    Resources {
        /// letters or tips (default: both)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show or download one resource
    Resource {
        /// letters or tips
        kind: String,
        id: String,
        /// Save as a text file in this directory
        #[arg(short, long)]
        download: Option<PathBuf>,
    },

    /// Show server status
    Status,

    /// Import PPAs from CSV into a data directory (server stopped)
    ImportPpas {
        /// Path to CSV file
        path: PathBuf,
        /// Data directory of the store
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Keep state names outside the known list
        #[arg(long)]
        allow_unknown_states: bool,
        /// Dry run (don't actually import)
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ReminderAction {
    /// List reminders (default)
    List,
    /// Add a reminder
    Add {
        title: String,
        /// Date and time, e.g. 2025-02-01T09:00
        date: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Delete a reminder by id
    Delete { id: String },
}

/// Session saved between invocations
#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    api_url: String,
    token: String,
    email: String,
}

fn session_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("No config directory on this system")?;
    Ok(dir.join("corpsnet").join("session.json"))
}

fn load_session() -> Result<SavedSession> {
    let path = session_path()?;
    let data = std::fs::read_to_string(&path)
        .with_context(|| "Not signed in. Run `corpsnet signin <email> --password ...` first")?;
    serde_json::from_str(&data).with_context(|| format!("Corrupt session file {:?}", path))
}

fn save_session(session: &SavedSession) -> Result<()> {
    let path = session_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(session)?)?;
    Ok(())
}

fn clear_session() -> Result<()> {
    let path = session_path()?;
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Thin client over the REST API
struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Client using the saved session
    fn authenticated(base_url: &str) -> Result<Self> {
        let session = load_session()?;
        let mut client = Self::new(base_url);
        client.token = Some(session.token);
        Ok(client)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/api/v1{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the JSON reply, turning API errors into messages
    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Cannot connect to Corpsnet API at {}", self.base_url))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            if status == StatusCode::UNAUTHORIZED {
                bail!("{} (sign in again)", message);
            }
            bail!("{} ({})", message, status);
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json_output = cli.format == "json";

    match cli.command {
        Commands::Signup {
            email,
            password,
            confirm_password,
            state_code,
            batch,
        } => {
            let client = ApiClient::new(&cli.api_url);
            let confirm = confirm_password.unwrap_or_else(|| password.clone());
            let body = json!({
                "email": email,
                "password": password,
                "confirmPassword": confirm,
                "stateCode": state_code,
                "batch": batch,
            });

            let data = client
                .send(client.request(Method::POST, "/auth/signup").json(&body))
                .await?;
            remember(&cli.api_url, &data["session"])?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("Welcome, {}", data["session"]["email"].as_str().unwrap_or("-"));
                print_profile(&data["profile"]);
            }
        }

        Commands::Signin { email, password } => {
            let client = ApiClient::new(&cli.api_url);
            let body = json!({ "email": email, "password": password });
            let data = client
                .send(client.request(Method::POST, "/auth/signin").json(&body))
                .await?;
            remember(&cli.api_url, &data)?;
            println!("Signed in as {}", data["email"].as_str().unwrap_or("-"));
        }

        Commands::Signout => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let result = client
                .send(client.request(Method::POST, "/auth/signout"))
                .await;
            clear_session()?;
            match result {
                Ok(_) => println!("Signed out"),
                Err(e) => println!("Session cleared locally ({})", e),
            }
        }

        Commands::Whoami => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let data = client
                .send(client.request(Method::GET, "/auth/session"))
                .await?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{} ({})", data["email"].as_str().unwrap_or("-"), data["uid"].as_str().unwrap_or("-"));
                println!("Session expires {}", data["expiresAt"].as_str().unwrap_or("-"));
            }
        }

        Commands::Profile { location, lga } => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let data = if location.is_none() && lga.is_none() {
                client.send(client.request(Method::GET, "/profile")).await?
            } else {
                let body = json!({ "location": location, "lga": lga });
                client
                    .send(client.request(Method::PATCH, "/profile").json(&body))
                    .await?
            };

            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_profile(&data);
            }
        }

        Commands::Feed => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let data = client.send(client.request(Method::GET, "/posts")).await?;
            output(&data, json_output, print_posts)?;
        }

        Commands::Post { content } => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let body = json!({ "content": content });
            let data = client
                .send(client.request(Method::POST, "/posts").json(&body))
                .await?;
            output(&data, json_output, print_posts)?;
        }

        Commands::Reminders { action } => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            match action.unwrap_or(ReminderAction::List) {
                ReminderAction::List => {
                    let data = client.send(client.request(Method::GET, "/reminders")).await?;
                    output(&data, json_output, print_reminders)?;
                }
                ReminderAction::Add {
                    title,
                    date,
                    description,
                } => {
                    let body = json!({ "title": title, "date": date, "description": description });
                    let data = client
                        .send(client.request(Method::POST, "/reminders").json(&body))
                        .await?;
                    println!(
                        "Added reminder {} for {}",
                        data["id"].as_str().unwrap_or("-"),
                        data["date"].as_str().unwrap_or("-")
                    );
                }
                ReminderAction::Delete { id } => {
                    client
                        .send(client.request(Method::DELETE, &format!("/reminders/{}", id)))
                        .await?;
                    println!("Deleted reminder {}", id);
                }
            }
        }

        Commands::Ppas { query, state } => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let builder = client
                .request(Method::GET, "/ppas")
                .query(&[("q", query.as_str()), ("state", state.as_str())]);
            let data = client.send(builder).await?;
            output(&data, json_output, print_ppas)?;
        }

        Commands::States => {
            let client = ApiClient::authenticated(&cli.api_url)?;
            let data = client.send(client.request(Method::GET, "/ppas/states")).await?;
            output(&data, json_output, |data| {
                for state in data["states"].as_array().into_iter().flatten() {
                    println!("{}", state.as_str().unwrap_or("-"));
                }
            })?;
        }

        Commands::Resources { kind } => {
            let client = ApiClient::new(&cli.api_url);
            let mut builder = client.request(Method::GET, "/resources");
            if let Some(kind) = &kind {
                builder = builder.query(&[("kind", kind.as_str())]);
            }
            let data = client.send(builder).await?;
            output(&data, json_output, |data| {
                println!("{:<8} {:<4} {:<28} {}", "Type", "ID", "Title", "Description");
                println!("{}", "-".repeat(80));
                for r in data["resources"].as_array().into_iter().flatten() {
                    println!(
                        "{:<8} {:<4} {:<28} {}",
                        r["type"].as_str().unwrap_or("-"),
                        r["id"].as_str().unwrap_or("-"),
                        r["title"].as_str().unwrap_or("-"),
                        r["description"].as_str().unwrap_or("-")
                    );
                }
            })?;
        }

        Commands::Resource { kind, id, download } => {
            let client = ApiClient::new(&cli.api_url);
            let data = client
                .send(client.request(Method::GET, &format!("/resources/{}/{}", kind, id)))
                .await?;

            match download {
                Some(dir) => {
                    let title = data["title"].as_str().unwrap_or("resource");
                    let path = dir.join(format!("{}.txt", title));
                    std::fs::create_dir_all(&dir)?;
                    std::fs::write(&path, data["content"].as_str().unwrap_or_default())?;
                    println!("Saved {:?}", path);
                }
                None if json_output => println!("{}", serde_json::to_string_pretty(&data)?),
                None => {
                    println!("{}", data["title"].as_str().unwrap_or("-"));
                    println!();
                    println!("{}", data["content"].as_str().unwrap_or_default());
                }
            }
        }

        Commands::Status => {
            let response = reqwest::get(format!("{}/health", cli.api_url.trim_end_matches('/')))
                .await
                .with_context(|| {
                    format!(
                        "Cannot connect to Corpsnet API at {}. Is `corpsnet` running?",
                        cli.api_url
                    )
                })?;

            if !response.status().is_success() {
                bail!("API returned error: {}", response.status());
            }
            let health: Value = response.json().await?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Corpsnet v{}", health["version"].as_str().unwrap_or("-"));
                println!();
                println!("API Status: {}", health["status"].as_str().unwrap_or("unknown"));
                println!("Storage:    {}", health["storage"].as_str().unwrap_or("unknown"));
                println!("  Documents:   {}", health["documents"].as_u64().unwrap_or(0));
                println!("  Collections: {}", health["collections"].as_u64().unwrap_or(0));
                println!("  WAL entries: {}", health["wal_entries"].as_u64().unwrap_or(0));
                println!("Sessions:   {}", health["active_sessions"].as_u64().unwrap_or(0));
                println!(
                    "WebSockets: {}",
                    health["websocket_connections"].as_u64().unwrap_or(0)
                );
                if let Some(uptime) = health["uptime_seconds"].as_u64() {
                    println!();
                    println!("Uptime: {}", format_duration(uptime));
                }
            }
        }

        Commands::ImportPpas {
            path,
            data_dir,
            allow_unknown_states,
            dry_run,
        } => {
            import_ppas(&path, data_dir, allow_unknown_states, dry_run).await?;
        }

        Commands::Config { output } => {
            let config = corpsnet::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Save the session from a signin/signup reply
fn remember(api_url: &str, session: &Value) -> Result<()> {
    let token = session["token"]
        .as_str()
        .context("Server reply carried no session token")?;
    save_session(&SavedSession {
        api_url: api_url.to_string(),
        token: token.to_string(),
        email: session["email"].as_str().unwrap_or_default().to_string(),
    })
}

async fn import_ppas(
    path: &Path,
    data_dir: Option<PathBuf>,
    allow_unknown_states: bool,
    dry_run: bool,
) -> Result<()> {
    let mut importer = PpaCsvImporter::new();
    if allow_unknown_states {
        importer = importer.allow_unknown_states();
    }

    let result = importer
        .import(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    println!("Import results:");
    println!("  Rows processed: {}", result.rows_processed);
    println!("  Rows failed: {}", result.rows_failed);
    println!("  Records: {}", result.records.len());

    if !result.errors.is_empty() {
        println!();
        println!("Errors (first 10):");
        for error in result.errors.iter().take(10) {
            println!("  {}", error);
        }
    }

    if dry_run {
        println!();
        println!("(Dry run - no data was imported)");
        return Ok(());
    }
    if result.records.is_empty() {
        return Ok(());
    }

    let config = match data_dir {
        Some(dir) => StoreConfig::new(dir),
        None => corpsnet::config::Config::load_default()
            .storage
            .to_store_config()?,
    };
    let Some(dir) = config.data_dir.clone() else {
        bail!("The configured store is in memory; pass --data-dir");
    };

    let store = match LocalStore::open(config).await {
        Ok(store) => Arc::new(store),
        Err(StorageError::Locked(lock)) => {
            bail!("{} is in use ({}); stop the server before importing", dir.display(), lock)
        }
        Err(e) => return Err(e.into()),
    };
    let directory = DirectoryService::new(store.clone());
    let written = directory.import(&result.records).await?;
    store.shutdown().await?;

    println!();
    println!("Imported {} PPAs into {:?}", written, dir);
    Ok(())
}

/// Print JSON or a table
fn output(data: &Value, json: bool, table: impl Fn(&Value)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        table(data);
    }
    Ok(())
}

fn print_profile(profile: &Value) {
    let field = |key: &str| profile[key].as_str().unwrap_or("-").to_string();
    println!("Email:      {}", field("email"));
    println!("State code: {}", field("stateCode"));
    println!("Batch:      {}", field("batch"));
    println!("Location:   {}", field("location"));
    println!("LGA:        {}", field("lga"));
}

fn print_posts(data: &Value) {
    let posts = data["posts"].as_array().cloned().unwrap_or_default();
    if posts.is_empty() {
        println!("No posts yet. Share one with `corpsnet post \"...\"`");
        return;
    }

    for post in posts {
        println!(
            "{} · {} · {}",
            post["userStateCode"].as_str().unwrap_or("-"),
            post["userBatch"].as_str().unwrap_or("-"),
            post["createdAt"].as_str().unwrap_or("-")
        );
        println!("  {}", post["content"].as_str().unwrap_or_default());
        println!();
    }
}

fn print_reminders(data: &Value) {
    let reminders = data["reminders"].as_array().cloned().unwrap_or_default();
    if reminders.is_empty() {
        println!("No reminders.");
        return;
    }

    println!("{:<34} {:<18} {}", "ID", "Date", "Title");
    println!("{}", "-".repeat(80));
    for r in reminders {
        println!(
            "{:<34} {:<18} {}",
            r["id"].as_str().unwrap_or("-"),
            r["date"].as_str().unwrap_or("-"),
            r["title"].as_str().unwrap_or("-")
        );
    }
}

fn print_ppas(data: &Value) {
    let ppas = data["ppas"].as_array().cloned().unwrap_or_default();
    if ppas.is_empty() {
        println!("No PPAs match.");
        return;
    }

    println!("{:<36} {:<12} {:<20} {:>6} {:>8}", "Name", "State", "Location", "Rating", "Reviews");
    println!("{}", "-".repeat(86));
    for p in ppas {
        println!(
            "{:<36} {:<12} {:<20} {:>6.1} {:>8}",
            p["name"].as_str().unwrap_or("-"),
            p["state"].as_str().unwrap_or("-"),
            p["location"].as_str().unwrap_or("-"),
            p["rating"].as_f64().unwrap_or(0.0),
            p["reviews"].as_u64().unwrap_or(0)
        );
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
