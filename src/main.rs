use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use taskdeck::auth::credentials::{password_strength, validate_registration};
use taskdeck::auth::gotrue::GoTrueClient;
use taskdeck::auth::{AuthClient, AuthError};
use taskdeck::config::{BackendConfig, ConfigError};
use taskdeck::navigation::{LogNavigator, entry_route};
use taskdeck::session::SessionManager;
use taskdeck::storage::FileCredentialStore;
use taskdeck::tasks::postgrest::PostgrestTaskRepository;
use taskdeck::tasks::types::{short_date, time_ago};
use taskdeck::tasks::{Task, TaskError, TaskStore};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("not signed in; run `taskdeck login <email> <password>` first")]
    NotSignedIn,
    #[error("no task with id {0}")]
    NoSuchTask(Uuid),
}

#[derive(Parser, Debug)]
#[command(name = "taskdeck", about = "Sign in and manage your tasks from the terminal")]
struct Cli {
    /// File holding the persisted session.
    #[arg(long, env = "TASKDECK_CREDENTIALS", default_value = ".taskdeck/credentials.json")]
    credentials: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Signup {
        email: String,
        password: String,
        /// Password confirmation; defaults to `password`.
        #[arg(long)]
        confirm: Option<String>,
    },
    Login {
        email: String,
        password: String,
    },
    Logout,
    Whoami,
    List,
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Edit {
        id: Uuid,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Toggle {
        id: Uuid,
    },
    Rm {
        id: Uuid,
    },
    Stats,
}

/// Everything one command needs, wired the way the app wires it at launch.
struct App {
    config: BackendConfig,
    auth: Arc<GoTrueClient>,
    session: SessionManager,
}

impl App {
    async fn start(credentials: PathBuf) -> Result<Self, CliError> {
        let config = BackendConfig::from_env()?;
        let storage = Arc::new(FileCredentialStore::new(credentials));
        let auth = Arc::new(GoTrueClient::new(config.clone(), storage)?);
        let session = SessionManager::new(auth.clone(), Arc::new(LogNavigator::new()));
        session.initialize().await;
        Ok(Self { config, auth, session })
    }

    /// A task store loaded with the signed-in user's tasks.
    async fn tasks(&self) -> Result<TaskStore, CliError> {
        let user = self.session.user().ok_or(CliError::NotSignedIn)?;
        let repo = PostgrestTaskRepository::new(self.config.clone(), self.auth.clone())?;
        let store = TaskStore::new(Arc::new(repo));
        store.set_user(Some(user));
        store.fetch().await?;
        Ok(store)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let app = App::start(cli.credentials).await?;
    let _refresh = app.config.auto_refresh.then(|| app.auth.spawn_auto_refresh());

    match cli.command {
        Command::Signup { email, password, confirm } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            validate_registration(&email, &password, &confirm)?;
            println!("password strength: {}", password_strength(&password).label());
            app.session.sign_up(&email, &password).await?;
            match app.auth.get_session().await? {
                Some(session) => println!("signed up and signed in as {}", session.user.display_name()),
                None => println!("account created; check your email to confirm it"),
            }
        }
        Command::Login { email, password } => {
            app.session.sign_in(&email, &password).await?;
            let session = app.auth.get_session().await?.ok_or(CliError::NotSignedIn)?;
            println!("signed in as {}", session.user.email.as_deref().unwrap_or("(no email)"));
        }
        Command::Logout => {
            if app.session.user().is_none() {
                println!("already signed out");
                return Ok(());
            }
            app.session.sign_out().await?;
            app.session.settle_redirect().await;
            println!("signed out");
        }
        Command::Whoami => match app.session.user() {
            Some(user) => {
                println!("[{}] {}", user.initial(), user.display_name());
                println!("email: {}", user.email.as_deref().unwrap_or("-"));
                println!("id:    {}", user.id);
            }
            None => println!("not signed in"),
        },
        Command::List => {
            let store = app.tasks().await?;
            print_tasks(&store.tasks());
        }
        Command::Add { title, description } => {
            let store = app.tasks().await?;
            let task = store.create(&title, &description).await?;
            println!("added {}", task.id);
        }
        Command::Edit { id, title, description } => {
            let store = app.tasks().await?;
            let task = store.update(id, &title, &description).await?;
            println!("updated {}: {}", task.id, task.title);
        }
        Command::Toggle { id } => {
            let store = app.tasks().await?;
            let task = find(&store, id)?;
            let task = store.toggle_complete(&task).await?;
            println!("{} is now {}", task.title, if task.completed { "done" } else { "pending" });
        }
        Command::Rm { id } => {
            let store = app.tasks().await?;
            store.delete(id).await?;
            println!("deleted {id}");
        }
        Command::Stats => {
            let store = app.tasks().await?;
            let stats = store.stats();
            println!("total:     {}", stats.total);
            println!("completed: {}", stats.completed);
            println!("pending:   {}", stats.pending);
            println!("rate:      {}%", stats.completion_rate);
        }
    }

    if let Some(route) = entry_route(&app.session.state()) {
        tracing::debug!(%route, "entry route");
    }
    app.session.shutdown();
    Ok(())
}

fn find(store: &TaskStore, id: Uuid) -> Result<Task, CliError> {
    store.tasks().into_iter().find(|t| t.id == id).ok_or(CliError::NoSuchTask(id))
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks yet");
        return;
    }
    let now = OffsetDateTime::now_utc();
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        let age = time_ago(task.created_at, now);
        println!("[{mark}] {}  {}  ({age}, {})", task.id, task.title, short_date(task.created_at));
        if !task.description.is_empty() {
            println!("      {}", task.description);
        }
    }
}
