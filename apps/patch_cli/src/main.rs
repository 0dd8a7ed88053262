use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, Attachment, LoginCredentials, PatchClient, PostDraft, Registration,
};
use serde::Serialize;
use shared::{
    domain::{ContentType, ProjectId},
    protocol::NewProject,
};
use storage::FileStore;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Command-line client for the Patch-Project API.
#[derive(Parser, Debug)]
#[command(name = "patch", version)]
struct Args {
    /// Overrides `api_url` from client.toml / environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Directory holding the persisted session token.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PATCH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PATCH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    Logout,
    /// Prints the identity of the restored session.
    Whoami,
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
    Posts {
        #[command(subcommand)]
        command: PostsCommand,
    },
}

impl Command {
    /// Whether the persisted token is checked against the API before running.
    /// Logout is offline.
    fn restores_session(&self) -> bool {
        !matches!(self, Command::Logout)
    }
}

#[derive(Subcommand, Debug)]
enum ProjectsCommand {
    List,
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PostsCommand {
    List {
        #[arg(long)]
        project: i64,
    },
    Create {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long, default_value = "document")]
        content_type: ContentType,
        /// Uploads the file as a multipart attachment.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment.bin")
        .to_string();
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    Ok(Attachment {
        filename,
        mime_type,
        bytes,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = data_dir;
    }

    let store = Arc::new(FileStore::new(settings.data_dir.clone()));
    let client = PatchClient::new(&settings, store)?;
    if args.command.restores_session() {
        if let Err(err) = client.initialize().await {
            warn!(error = %err, "stored session could not be restored");
        }
    }

    match args.command {
        Command::Login { email, password } => {
            let identity = client
                .login(&LoginCredentials::new(email, password))
                .await?;
            print_json(&identity)?;
        }
        Command::Register {
            username,
            email,
            password,
            full_name,
        } => {
            let mut registration = Registration::new(username, email, password);
            if let Some(full_name) = full_name {
                registration = registration.with_full_name(full_name);
            }
            let identity = client.register(&registration).await?;
            print_json(&identity)?;
        }
        Command::Logout => {
            client.logout();
            println!("logged out");
        }
        Command::Whoami => match client.snapshot().identity() {
            Some(identity) => print_json(identity)?,
            None => bail!("not logged in"),
        },
        Command::Projects { command } => match command {
            ProjectsCommand::List => print_json(&client.list_projects().await?)?,
            ProjectsCommand::Show { id } => {
                print_json(&client.fetch_project(ProjectId(id)).await?)?
            }
            ProjectsCommand::Create {
                title,
                description,
                category,
            } => {
                let project = NewProject::new(title, description, category);
                print_json(&client.create_project(&project).await?)?;
            }
        },
        Command::Posts { command } => match command {
            PostsCommand::List { project } => {
                print_json(&client.list_posts(ProjectId(project)).await?)?
            }
            PostsCommand::Create {
                project,
                title,
                content,
                content_type,
                file,
            } => {
                let mut draft = PostDraft::new(ProjectId(project), title, content, content_type);
                if let Some(path) = file {
                    draft = draft.with_attachment(read_attachment(&path).await?);
                }
                print_json(&client.create_post(draft).await?)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
