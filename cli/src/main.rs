//! tasks - command-line front end for the task manager backend.
//!
//! # Examples
//!
//! ```bash
//! tasks register me@example.com --password hunter2
//! tasks add "Buy milk" -d "2% milk"
//! tasks toggle 1
//! tasks logout
//! ```

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tasks_core::{
    ClientConfig, CredentialSource, FileTokenStore, Identity, Session, SyncError, Task, TaskList,
    TasksClient, UreqTransport,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

type AppSession = Session<UreqTransport, FileTokenStore>;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig::resolve(cli.api_url, cli.data_dir);
    let client = TasksClient::new(&config.base_url);
    let session: Arc<AppSession> = Arc::new(Session::new(
        client.clone(),
        UreqTransport::new(),
        FileTokenStore::new(&config.data_dir),
    ));
    // An unreadable token leaves the session signed out; `logout` must still run.
    if let Err(e) = session.init() {
        warn!(error = %e, "could not read stored token");
    }

    match cli.command {
        Commands::Register { email, password } => {
            let identity = session.register(&email, &password).await?;
            println!("Registered and signed in as {}", describe(&identity));
        }
        Commands::Login { email, password } => {
            let identity = session.login(&email, &password).await?;
            println!("Signed in as {}", describe(&identity));
        }
        Commands::Logout => {
            session.logout().context("removing stored token")?;
            println!("Signed out");
        }
        Commands::Whoami => match session.identity() {
            Some(identity) => println!("{}", describe(&identity)),
            None => println!("Not signed in"),
        },
        Commands::List => run_list_action(&session, client, ListAction::Show).await?,
        Commands::Add { title, description } => {
            run_list_action(&session, client, ListAction::Add { title, description }).await?
        }
        Commands::Toggle { id } => run_list_action(&session, client, ListAction::Toggle(id)).await?,
        Commands::Rm { id } => run_list_action(&session, client, ListAction::Remove(id)).await?,
    }
    Ok(())
}

enum ListAction {
    Show,
    Add { title: String, description: String },
    Toggle(i64),
    Remove(i64),
}

/// Fetch, apply one change, then print the resulting list.
async fn run_list_action(
    session: &Arc<AppSession>,
    client: TasksClient,
    action: ListAction,
) -> anyhow::Result<()> {
    if session.credential().is_none() {
        return Err(anyhow!("not signed in; run `tasks login <email>` first"));
    }
    let list = TaskList::new(client, UreqTransport::new(), Arc::clone(session));
    list.fetch_all().await.map_err(|e| report(&list, e))?;

    match action {
        ListAction::Show => {}
        ListAction::Add { title, description } => {
            let task = list
                .create(&title, &description)
                .await
                .map_err(|e| report(&list, e))?;
            println!("Added task {}", task.id);
        }
        ListAction::Toggle(id) => match list.toggle_done(id).await.map_err(|e| report(&list, e))? {
            Some(true) => println!("Task {id} done"),
            Some(false) => println!("Task {id} reopened"),
            None => return Err(anyhow!("no task with id {id}")),
        },
        ListAction::Remove(id) => {
            list.delete(id).await.map_err(|e| report(&list, e))?;
            println!("Deleted task {id}");
        }
    }

    print_tasks(&list.tasks());
    Ok(())
}

/// Prefer the list's user-facing message; keep the detail as the cause.
fn report<T, C>(list: &TaskList<T, C>, error: SyncError) -> anyhow::Error
where
    T: tasks_core::Transport,
    C: CredentialSource,
{
    match list.error() {
        Some(message) => anyhow::Error::new(error).context(message),
        None => anyhow::Error::new(error),
    }
}

fn describe(identity: &Identity) -> String {
    format!("{} (id {})", identity.email, identity.id)
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks yet. Create your first task!");
        return;
    }
    for task in tasks {
        let mark = if task.done { "x" } else { " " };
        match &task.description {
            Some(description) => println!("[{mark}] {:>4}  {}  ({description})", task.id, task.title),
            None => println!("[{mark}] {:>4}  {}", task.id, task.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter_is_info() {
        let filter = EnvFilter::new(DEFAULT_LOG_FILTER);
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::INFO));
    }
}
