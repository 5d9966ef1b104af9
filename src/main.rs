use anyhow::{anyhow, bail, Context};
use clap::Parser;
use firebase_console::explorer::bookmarks::{CollectionBookmarks, FileStore, KeyValueStore};
use firebase_console::explorer::storage_panel::{format_date, format_file_size};
use firebase_console::explorer::{AuthForm, QueryPanel, StorageBrowser, StorageItem};
use firebase_console::{ConsoleSession, Endpoints, ProjectConfig};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{AuthCommands, BookmarkCommands, Cli, Commands, ConfigCommands, StorageCommands};

/// The configuration named on the command line, else the one from the
/// development environment variables.
fn load_config(cli: &Cli) -> anyhow::Result<ProjectConfig> {
    if let Some(path) = &cli.config {
        return ProjectConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    ProjectConfig::from_env()?
        .ok_or_else(|| anyhow!("No configuration loaded; pass --config or set FIREBASE_CONFIG"))
}

/// Connects to the configured project and signs in when credentials are
/// given.
async fn open_session(cli: &Cli) -> anyhow::Result<Arc<ConsoleSession>> {
    let session = ConsoleSession::with_endpoints(Endpoints::from_env());
    session.set_config(load_config(cli)?);
    if !session.is_connected() {
        bail!("Firebase initialization failed");
    }

    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        session
            .try_sign_in(email, password)
            .await
            .with_context(|| format!("sign in as {} failed", email))?;
    }
    Ok(Arc::new(session))
}

fn open_store(cli: &Cli) -> anyhow::Result<FileStore> {
    match &cli.store {
        Some(path) => Ok(FileStore::new(path)),
        None => Ok(FileStore::default_location()?),
    }
}

fn run_config(cli: &Cli, command: &ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Check { file } => {
            let config = match file {
                Some(path) => ProjectConfig::from_file(path)?,
                None => {
                    let mut text = String::new();
                    io::stdin().read_to_string(&mut text)?;
                    ProjectConfig::parse(&text)?
                }
            };
            println!("Configuration is valid (project {})", config.project_id);
        }
        ConfigCommands::Show => {
            println!("{}", load_config(cli)?.to_pretty_json()?);
        }
        ConfigCommands::Export { out } => {
            load_config(cli)?.export_to(out)?;
            println!("Exported configuration to {}", out.display());
        }
    }
    Ok(())
}

async fn run_query(
    cli: &Cli,
    collection: &str,
    conditions: &[firebase_console::explorer::QueryCondition],
    orders: &[firebase_console::explorer::QueryOrder],
    limit: &str,
) -> anyhow::Result<()> {
    let session = open_session(cli).await?;
    let store: Arc<dyn KeyValueStore> = Arc::new(open_store(cli)?);
    let panel = QueryPanel::new(session, store);

    panel.with_builder(|builder| {
        builder.collection = collection.to_string();
        builder.conditions = conditions.to_vec();
        builder.orders = orders.to_vec();
        builder.set_limit(limit);
    });
    debug!(query = ?panel.builder(), "Executing query");

    panel.execute().await?;
    eprintln!("{}", panel.result_count_label());
    println!("{}", panel.results_json());
    Ok(())
}

fn run_bookmarks(cli: &Cli, command: &BookmarkCommands) -> anyhow::Result<()> {
    let store = open_store(cli)?;
    let mut bookmarks = CollectionBookmarks::load(&store);

    match command {
        BookmarkCommands::List => {
            for name in bookmarks.names() {
                println!("{name}");
            }
            return Ok(());
        }
        BookmarkCommands::Add { name } => {
            if !bookmarks.add(name) {
                println!("'{}' is already bookmarked", name);
            }
        }
        BookmarkCommands::Remove { name } => {
            if !bookmarks.remove(name) {
                println!("'{}' is not bookmarked", name);
            }
        }
    }

    bookmarks
        .save(&store)
        .with_context(|| format!("failed to write {}", store.path().display()))
}

fn print_item(item: &StorageItem) {
    match item {
        StorageItem::Folder { name, .. } => println!("{:<40} {:>12}  {}", format!("{name}/"), "", ""),
        StorageItem::File {
            name,
            size,
            updated,
            ..
        } => println!(
            "{:<40} {:>12}  {}",
            name,
            format_file_size(*size),
            format_date(*updated)
        ),
    }
}

async fn run_storage(cli: &Cli, command: &StorageCommands) -> anyhow::Result<()> {
    let session = open_session(cli).await?;

    match command {
        StorageCommands::Ls { path } => {
            let browser = StorageBrowser::new(session);
            browser.navigate_into(path).await?;
            for item in browser.items() {
                print_item(&item);
            }
        }
        StorageCommands::Upload {
            file,
            dest,
            content_type,
        } => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("{} has no file name", file.display()))?;
            let body = tokio::fs::read(file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let browser = StorageBrowser::new(session);
            browser.navigate_into(dest).await?;
            browser
                .upload(name, body, content_type, |progress| {
                    eprint!("\rUploading {}: {:>3.0}%", name, progress);
                    let _ = io::stderr().flush();
                })
                .await?;
            eprintln!();
            info!(file = %file.display(), dest = %dest, "Upload finished");
        }
        StorageCommands::Download { path, out } => {
            let storage = session
                .storage()
                .ok_or_else(|| anyhow!("Storage is not initialized"))?;
            let reference = storage.reference(path);
            let bytes = reference.download().await?;
            let target = match out {
                Some(out) => out.clone(),
                None => Path::new(reference.name()).to_path_buf(),
            };
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("Saved {} ({})", target.display(), format_file_size(Some(bytes.len() as u64)));
        }
    }
    Ok(())
}

async fn run_auth(cli: &Cli, command: &AuthCommands) -> anyhow::Result<()> {
    match command {
        AuthCommands::SignIn => {
            let (Some(email), Some(password)) = (&cli.email, &cli.password) else {
                bail!("--email and --password are required");
            };
            let session = ConsoleSession::with_endpoints(Endpoints::from_env());
            session.set_config(load_config(cli)?);
            AuthForm::new(email.as_str(), password.as_str())
                .submit(&session)
                .await;

            let signed_in = session
                .connection()
                .is_some_and(|c| c.credentials().is_signed_in());
            if !signed_in {
                bail!("sign in as {} failed", email);
            }
            println!("Signed in as {}", email);
        }
        AuthCommands::Whoami => {
            let session = open_session(cli).await?;
            let user = session.current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    match &cli.command {
        Commands::Config { command } => run_config(&cli, command),
        Commands::Query {
            collection,
            conditions,
            orders,
            limit,
        } => run_query(&cli, collection, conditions, orders, limit).await,
        Commands::Collections => {
            let session = open_session(&cli).await?;
            let firestore = session
                .firestore()
                .ok_or_else(|| anyhow!("Firestore is not initialized"))?;
            for id in firestore.list_collection_ids().await? {
                println!("{id}");
            }
            Ok(())
        }
        Commands::Bookmarks { command } => run_bookmarks(&cli, command),
        Commands::Storage { command } => run_storage(&cli, command).await,
        Commands::Auth { command } => run_auth(&cli, command).await,
    }
}
