//! `stickyboard` -- command-line client for a `StickyBoard` hub.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/stickyboard/config.toml`).
//!
//! ```bash
//! export STICKYBOARD_HUB_URL=ws://127.0.0.1:9000/ws
//! export STICKYBOARD_EMAIL=ada@example.com STICKYBOARD_PASSWORD=secret
//!
//! stickyboard signup --name Ada
//! stickyboard add "Buy milk" --priority low --at 50,50
//! stickyboard move <id> 5000 5000
//! stickyboard watch
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use stickyboard::backend::remote::RemoteBackend;
use stickyboard::backend::{AuthProvider, Backend, BackendError};
use stickyboard::board::Board;
use stickyboard::canvas::{NoteDrag, OffscreenRecovery};
use stickyboard::config::{CliArgs, ClientConfig, Command, ConfigError};
use stickyboard::realtime::RealtimeIngest;
use stickyboard::tasks::StoreError;
use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::task::{Position, Task, TaskId, TaskPatch};

/// Failures reported to the user before exiting non-zero.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("stickyboard starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so stdout only carries command output. Returns a
/// [`WorkerGuard`] that must be held until shutdown to flush buffered
/// entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("stickyboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(cli: CliArgs) -> Result<(), CliError> {
    let config = ClientConfig::load(&cli)?;
    let command = cli.command.unwrap_or(Command::List { json: false });

    let backend = RemoteBackend::connect(&config.hub_url, config.remote_options()).await?;
    let board = Board::new(Arc::new(backend));

    let Some((email, password)) = config.credentials() else {
        return Err(CliError::Usage(
            "set --email and --password (or STICKYBOARD_EMAIL / STICKYBOARD_PASSWORD)".to_string(),
        ));
    };

    if let Command::Signup { name } = &command {
        let user = board.sign_up(email, password, name.as_deref()).await?;
        println!("registered {} as {}", user.email, user.display_name);
        return Ok(());
    }

    board.sign_in(email, password).await?;
    let store = board.store();
    if let Some(error) = store.error() {
        return Err(CliError::Usage(error));
    }

    match command {
        Command::Signup { .. } => {}
        Command::List { json } => {
            let tasks = store.tasks();
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks, &config.timestamp_format);
            }
        }
        Command::Add { title, priority, at } => {
            let created = match at {
                Some(position) => store.create(&title, position, priority).await,
                None => {
                    store
                        .create_at_random(&title, priority, &config.bounds())
                        .await
                }
            };
            let task = created.ok_or_else(|| store_failure(&board))?;
            println!("{}", task.id);
        }
        Command::Edit {
            id,
            title,
            description,
            clear_description,
            priority,
        } => {
            let patch = TaskPatch {
                title,
                priority,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Err(CliError::Usage("nothing to change".to_string()));
            }
            if !store.update(id, patch).await {
                return Err(store_failure(&board));
            }
        }
        Command::Move { id, x, y } => {
            let task = find(&board, id)?;
            let mut drag = NoteDrag::new(&task, config.bounds(), config.click_guard);
            board.begin_drag(&mut drag, task.position);
            drag.pointer_moved(Position::new(x, y));
            if let Some(position) = board.end_drag(&mut drag).await? {
                println!("{id} moved to {position}");
            }
        }
        Command::Rm { id } => {
            if !store.delete(id).await {
                return Err(store_failure(&board));
            }
        }
        Command::Recover => {
            let report = OffscreenRecovery::new().run(store, &config.bounds()).await;
            for id in &report.corrected {
                println!("recovered {id}");
            }
            for (id, e) in &report.failed {
                eprintln!("could not recover {id}: {e}");
            }
        }
        Command::Watch => watch(&board).await?,
    }

    board.shutdown();
    Ok(())
}

fn store_failure<B: Backend + 'static>(board: &Board<B>) -> CliError {
    CliError::Usage(
        board
            .store()
            .error()
            .unwrap_or_else(|| "operation failed".to_string()),
    )
}

fn find<B: Backend + 'static>(
    board: &Board<B>,
    id: TaskId,
) -> Result<Task, CliError> {
    board
        .store()
        .task(id)
        .ok_or(CliError::Backend(BackendError::NotFound(id)))
}

/// Prints change events until Ctrl-C, keeping the store in step.
async fn watch(board: &Board<RemoteBackend>) -> Result<(), CliError> {
    let mut ingest = RealtimeIngest::new(Arc::clone(board.backend()));
    ingest
        .follow_user(board.backend().current_user().as_ref())
        .await?;
    println!("watching {} notes, Ctrl-C to stop", board.store().len());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = ingest.recv() => {
                let Some(event) = event else {
                    return Err(CliError::Backend(BackendError::ConnectionClosed));
                };
                board.store().apply_change(&event);
                match &event {
                    ChangeEvent::Insert(task) => println!("+ {} {}", task.id, task.title),
                    ChangeEvent::Update(task) => {
                        println!("~ {} {} at {}", task.id, task.title, task.position);
                    }
                    ChangeEvent::Delete { id } => println!("- {id}"),
                }
            }
        }
    }
    ingest.close();
    Ok(())
}

fn print_tasks(tasks: &[Task], timestamp_format: &str) {
    if tasks.is_empty() {
        println!("no notes");
        return;
    }
    for task in tasks {
        println!(
            "{}  {:<6}  {:>12}  {}  {}",
            task.id,
            task.priority,
            task.position.to_string(),
            format_timestamp(task.updated_at, timestamp_format),
            task.title,
        );
    }
}

/// Renders milliseconds since epoch in local time.
fn format_timestamp(ms: u64, format: &str) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(
            || "-".to_string(),
            |utc| utc.with_timezone(&chrono::Local).format(format).to_string(),
        )
}
