// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use campus::api::ApiClient;
use campus::channels::{NotificationChannel, QuizChannel, QuizEvent};
use campus::config::Config;
use campus::session::{SessionEvent, SessionStore};
use campus::store::FileStore;
use campusfeed::{FeedClient, SocketState};

#[derive(Parser)]
#[command(name = "campus", version, about = "Command-line client for the campus LMS")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        /// Username to sign in with
        #[arg(long, short = 'u')]
        username: String,

        /// Password; falls back to $CAMPUS_PASSWORD, then a prompt
        #[arg(long)]
        password: Option<String>,

        /// Keep the session in memory only
        #[arg(long)]
        no_remember: bool,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the current session and backend health
    Status,
    /// Stream notifications and quiz events until interrupted
    Watch {
        /// Send a read receipt for every notification printed
        #[arg(long)]
        ack: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli.config);

    std::process::exit(run(cli).await);
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs go to stderr; stdout is reserved for command output.
    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(cli: Cli) -> i32 {
    let store = Arc::new(FileStore::new(cli.config.resolved_state_dir()));
    let (session, events) = SessionStore::new(store);
    session.hydrate();

    match cli.command {
        Command::Login { username, password, no_remember } => {
            login(&cli.config, &session, &username, password, !no_remember).await
        }
        Command::Logout => logout(&cli.config, &session).await,
        Command::Status => status(&cli.config, &session).await,
        Command::Watch { ack } => watch(&cli.config, &session, events, ack).await,
    }
}

async fn login(
    config: &Config,
    session: &Arc<SessionStore>,
    username: &str,
    password: Option<String>,
    remember: bool,
) -> i32 {
    let password = match resolve_password(password) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return 2;
        }
    };

    let api = ApiClient::new(config.api_base(), Arc::clone(session));
    match api.login(username, &password, remember).await {
        Ok(()) => {
            let snapshot = session.snapshot();
            let name = snapshot
                .user
                .as_ref()
                .map_or_else(|| username.to_string(), |u| u.username.clone());
            println!("Signed in as {name}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

/// `--password`, then `$CAMPUS_PASSWORD`, then an interactive prompt.
fn resolve_password(flag: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = flag {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("CAMPUS_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn logout(config: &Config, session: &Arc<SessionStore>) -> i32 {
    let snapshot = session.snapshot();
    if snapshot.user.is_none() && snapshot.token.is_none() {
        println!("Not signed in");
        return 0;
    }

    let api = ApiClient::new(config.api_base(), Arc::clone(session));
    api.logout().await;
    println!("Signed out");
    0
}

async fn status(config: &Config, session: &Arc<SessionStore>) -> i32 {
    let api = ApiClient::new(config.api_base(), Arc::clone(session));
    let backend = match api.health().await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("unreachable ({e})"),
    };

    let snapshot = session.snapshot();
    let code = match &snapshot.user {
        Some(user) if snapshot.is_authenticated() => {
            println!("Signed in as {} (user {})", user.username, user.user_id);
            if let Some(role) = &user.role {
                println!("  role: {}", role.name);
            }
            if let Some(email) = &user.email {
                println!("  email: {email}");
            }
            0
        }
        _ => {
            println!("Not signed in");
            1
        }
    };
    println!("Backend {}: {backend}", config.api_base());
    code
}

async fn watch(
    config: &Config,
    session: &Arc<SessionStore>,
    mut events: broadcast::Receiver<SessionEvent>,
    ack: bool,
) -> i32 {
    if !session.is_authenticated() {
        eprintln!("error: not signed in (run `campus login` first)");
        return 2;
    }

    let feed = FeedClient::new(config.feed_config());
    let mut state_rx = feed.connect();

    let mut notifications = NotificationChannel::subscribe(&feed);
    let mut published = QuizChannel::subscribe_published(&feed);
    let mut updated = QuizChannel::subscribe_updated(&feed);
    let mut closed = QuizChannel::subscribe_closed(&feed);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                feed.close();
                return 0;
            }
            event = events.recv() => {
                if let Ok(SessionEvent::Expired { message }) = event {
                    eprintln!("error: {message}");
                    feed.close();
                    return 1;
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    eprintln!("error: feed connection lost");
                    return 1;
                }
                match *state_rx.borrow() {
                    SocketState::Open => eprintln!("[feed] connected"),
                    SocketState::Connecting => eprintln!("[feed] reconnecting..."),
                    SocketState::Closed => {
                        eprintln!("error: feed connection lost");
                        return 1;
                    }
                }
            }
            note = notifications.next() => match note {
                Some(n) => {
                    let kind = n.kind.as_deref().unwrap_or("info");
                    println!("[notification] ({kind}) {}", n.message);
                    if ack {
                        NotificationChannel::acknowledge(&feed, n.notification_id);
                    }
                }
                None => {
                    eprintln!("error: feed connection lost");
                    return 1;
                }
            },
            quiz = published.next() => match quiz {
                Some(q) => println!("[quiz] published: {}", describe_quiz(&q)),
                None => {
                    eprintln!("error: feed connection lost");
                    return 1;
                }
            },
            quiz = updated.next() => match quiz {
                Some(q) => println!("[quiz] updated: {}", describe_quiz(&q)),
                None => {
                    eprintln!("error: feed connection lost");
                    return 1;
                }
            },
            quiz = closed.next() => match quiz {
                Some(q) => println!("[quiz] closed: {}", describe_quiz(&q)),
                None => {
                    eprintln!("error: feed connection lost");
                    return 1;
                }
            },
        }
    }
}

fn describe_quiz(quiz: &QuizEvent) -> String {
    match &quiz.title {
        Some(title) => format!("{title} (quiz {})", quiz.quiz_id),
        None => format!("quiz {}", quiz.quiz_id),
    }
}
