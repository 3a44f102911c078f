//! `backoffice`: drive the back-office API from a terminal.
//!
//! The session is persisted in a JSON file so consecutive invocations share
//! one login, the same way browser storage outlives a page.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use backoffice_core::{
    ApiClients, ApiError, AuthService, Capability, ClientConfig, FileStorage, OrderService,
    ProductService, SessionEvent, SessionManager, UploadService,
};
use thiserror::Error;
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::EnvFilter;

const DEFAULT_SESSION_FILE: &str = ".backoffice-session.json";

const USAGE: &str = "usage: backoffice <login EMAIL PASSWORD | logout | whoami | products | orders | upload FILE>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { email: String, password: String },
    Logout,
    Whoami,
    Products,
    Orders,
    Upload { file: PathBuf },
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        match args {
            [cmd, email, password] if cmd == "login" => Some(Command::Login {
                email: email.clone(),
                password: password.clone(),
            }),
            [cmd] if cmd == "logout" => Some(Command::Logout),
            [cmd] if cmd == "whoami" => Some(Command::Whoami),
            [cmd] if cmd == "products" => Some(Command::Products),
            [cmd] if cmd == "orders" => Some(Command::Orders),
            [cmd, file] if cmd == "upload" => Some(Command::Upload {
                file: PathBuf::from(file),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] backoffice_core::ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn run(command: Command) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    let session_file = std::env::var("BACKOFFICE_SESSION_FILE")
        .unwrap_or_else(|_| DEFAULT_SESSION_FILE.to_string());
    let session = SessionManager::new(Arc::new(FileStorage::new(session_file)));
    let mut events = session.subscribe();

    let clients = ApiClients::connect(&config, session)?;
    let auth = AuthService::new(&clients, config.bypass.clone());

    let result = execute(command, &clients, &auth).await;

    loop {
        match events.try_recv() {
            Ok(SessionEvent::Expired { redirect_to }) => {
                eprintln!("session expired; sign in again (redirect: {redirect_to})");
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    result
}

async fn execute(command: Command, clients: &ApiClients, auth: &AuthService) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            let session = auth.login(&email, &password).await?;
            println!("logged in as {} ({})", session.user_id, session.role);
        }
        Command::Logout => {
            auth.logout()?;
            println!("logged out");
        }
        Command::Whoami => match auth.current()? {
            Some(session) => {
                println!("user: {}", session.user_id);
                println!("role: {}", session.role);
                for capability in Capability::ALL {
                    let mark = if session.permissions.allows(capability) { "x" } else { " " };
                    println!("[{mark}] {}", capability.as_str());
                }
            }
            None => println!("not logged in"),
        },
        Command::Products => print_all(ProductService::new(clients).list().await?),
        Command::Orders => print_all(OrderService::new(clients).list().await?),
        Command::Upload { file } => {
            let data = tokio::fs::read(&file).await?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.bin".to_string());
            let uploaded = UploadService::new(clients)
                .upload(&name, content_type_for(&name), data)
                .await?;
            println!("{}", uploaded.path);
        }
    }
    Ok(())
}

fn print_all(values: Vec<serde_json::Value>) {
    for value in values {
        println!("{value}");
    }
}

fn content_type_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}
