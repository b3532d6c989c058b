use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tasks_core::config::{BASE_URL_ENV, DATA_DIR_ENV};

#[derive(Parser)]
#[command(name = "tasks")]
#[command(about = "Sign in and manage your task list")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Backend URL
    #[arg(long, global = true, env = BASE_URL_ENV)]
    pub(crate) api_url: Option<String>,

    /// Directory holding the persisted token
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    pub(crate) data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account and sign in
    Register {
        email: String,
        #[arg(long, env = "TASKS_PASSWORD")]
        password: String,
    },

    /// Sign in with an existing account
    Login {
        email: String,
        #[arg(long, env = "TASKS_PASSWORD")]
        password: String,
    },

    /// Forget the stored token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List tasks
    List,

    /// Add a task
    Add {
        title: String,
        #[arg(long, short, default_value = "")]
        description: String,
    },

    /// Flip a task between done and not done
    Toggle { id: i64 },

    /// Delete a task
    Rm { id: i64 },
}
