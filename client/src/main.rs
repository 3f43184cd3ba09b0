//! Taskdeck CLI - drives the sync context and the widget reader from a shell.

use clap::{Parser, Subcommand};
use taskdeck_client::{
    connect, route, telemetry, Config, DeepLink, ErrorBanner, Route, Stores, SyncContext,
    SyncError,
};
use taskdeck_engine::{Collection, DerivedView, Record, Status};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "taskdeck", version, about = "Task lists synced from your workspace")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and publish every configured collection
    Sync,
    /// Show the active collection
    List,
    /// Print what the widget would show, as JSON
    Widget,
    /// Follow a taskdeck:// deep link
    Open { url: String },
    /// Flip a task between done and not done
    Toggle {
        record: String,
        /// Collection remote id (defaults to the active one)
        #[arg(long)]
        collection: Option<String>,
    },
    /// Manage configured collections
    #[command(subcommand)]
    Collections(CollectionsCommand),
}

#[derive(Subcommand)]
enum CollectionsCommand {
    List,
    Add { name: String, remote_id: String },
    Remove { collection: String },
    Rename { collection: String, name: String },
    Activate { collection: String },
    /// Pin a collection for the widget; omit to clear the pin
    Pin { collection: Option<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let cli = Cli::parse();

    let stores = Stores::open(&config)?;

    if let Command::Widget = cli.command {
        let entry = stores.widget_reader().timeline(chrono::Utc::now());
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    let ctx = connect(&config, &stores)?;
    let outcome = run(&ctx, cli.command).await;

    if let Err(e) = &outcome {
        let banner = ErrorBanner::from(e);
        eprintln!("error: {}", banner.message);
        if let Some(details) = banner.details {
            tracing::debug!(%details, "Error details");
        }
    }
    outcome.map_err(Into::into)
}

async fn run(ctx: &SyncContext, command: Command) -> Result<(), SyncError> {
    match command {
        Command::Sync => sync(ctx).await,
        Command::List => {
            sync(ctx).await?;
            match ctx.active_view().await {
                Some((collection, view)) => print_view(&collection, view.as_ref()),
                None => println!("No collections configured. Run `taskdeck collections add`."),
            }
            Ok(())
        }
        Command::Widget => Ok(()),
        Command::Open { url } => {
            let link: DeepLink = url.parse()?;
            sync(ctx).await?;
            match route(ctx, &link).await? {
                Route::Setup => println!("No collections configured."),
                Route::List { collection, view } => print_view(&collection, view.as_ref()),
                Route::Editor { collection, record } => {
                    if let Some(r) = ctx
                        .view(&collection.remote_id)
                        .await
                        .and_then(|v| v.get(&record).cloned())
                    {
                        println!("{}", serde_json::to_string_pretty(&r).unwrap_or_default());
                    }
                }
            }
            Ok(())
        }
        Command::Toggle { record, collection } => {
            let remote_id = match collection {
                Some(id) => id,
                None => ctx
                    .registry()
                    .await
                    .active()
                    .map(|c| c.remote_id.clone())
                    .ok_or_else(|| SyncError::NotFound("Active collection".into()))?,
            };
            ctx.sync_collection(&remote_id).await?;
            ctx.toggle_status(&remote_id, &record).await?;
            if let Some(view) = ctx.view(&remote_id).await {
                if let Some(r) = view.get(&record) {
                    println!("{} -> {}", r.title, r.status);
                }
            }
            Ok(())
        }
        Command::Collections(command) => collections(ctx, command).await,
    }
}

async fn sync(ctx: &SyncContext) -> Result<(), SyncError> {
    let results = ctx.resync_all().await.wait().await;
    let mut first_error = None;
    for (collection, result) in results {
        match result {
            Ok(count) => tracing::info!(%collection, records = count, "Synced"),
            Err(e) => {
                eprintln!("{collection}: {}", e.user_message());
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn collections(ctx: &SyncContext, command: CollectionsCommand) -> Result<(), SyncError> {
    match command {
        CollectionsCommand::List => {
            let registry = ctx.registry().await;
            let pinned = registry.pinned().map(|c| c.local_id);
            for c in registry.collections() {
                let active = if c.is_active { "*" } else { " " };
                let pin = if Some(c.local_id) == pinned { " (pinned)" } else { "" };
                println!("{active} {}  {}  {}{pin}", c.local_id, c.remote_id, c.display_name);
            }
        }
        CollectionsCommand::Add { name, remote_id } => {
            let (collection, resync) = ctx.add_collection(&name, &remote_id).await?;
            println!("Added {} ({})", collection.display_name, collection.local_id);
            resync.wait().await;
        }
        CollectionsCommand::Remove { collection } => {
            let id = find(ctx, &collection).await?.local_id;
            ctx.remove_collection(id).await?.wait().await;
        }
        CollectionsCommand::Rename { collection, name } => {
            let target = find(ctx, &collection).await?;
            ctx.update_collection(target.local_id, &name, &target.remote_id)
                .await?
                .wait()
                .await;
        }
        CollectionsCommand::Activate { collection } => {
            let id = find(ctx, &collection).await?.local_id;
            ctx.set_active(id).await?.wait().await;
        }
        CollectionsCommand::Pin { collection } => {
            let id = match collection {
                Some(c) => Some(find(ctx, &c).await?.local_id),
                None => None,
            };
            ctx.set_pinned(id).await?;
        }
    }
    Ok(())
}

/// Look a collection up by local id or remote id.
async fn find(ctx: &SyncContext, key: &str) -> Result<Collection, SyncError> {
    let registry = ctx.registry().await;
    let found = match Uuid::parse_str(key) {
        Ok(local_id) => registry.get(local_id),
        Err(_) => None,
    }
    .or_else(|| registry.find_by_remote(key));

    found
        .cloned()
        .ok_or_else(|| SyncError::NotFound(format!("Collection {key}")))
}

fn print_view(collection: &Collection, view: Option<&DerivedView>) {
    println!("{}", collection.display_name);
    let Some(view) = view else {
        println!("  (not synced yet)");
        return;
    };
    if view.is_empty() {
        println!("  (nothing to show)");
    }
    for record in &view.records {
        println!("  {}", line(record));
    }
}

fn line(record: &Record) -> String {
    let check = if record.status == Status::Done { "[x]" } else { "[ ]" };
    let mut out = format!("{check} {}", record.title);
    if let Some(priority) = record.priority {
        out.push_str(&format!("  !{priority}"));
    }
    if let Some(due) = &record.due {
        out.push_str(&format!("  due {}", due.to_wire()));
    }
    if record.is_optimistic() {
        out.push_str("  (saving)");
    }
    out
}
