use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use contract_console::app::StartupError;
use contract_console::config::{ConfigError, ConsoleConfig, normalize_base};
use contract_console::net::gateway::GatewayError;
use contract_console::net::transport::RawResponse;
use contract_console::router::navigator::NavigationError;
use contract_console::state::session::SessionError;
use contract_console::{ConsoleApp, ErrorCode};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(err) => err.error_code(),
            Self::Startup(err) => err.error_code(),
            Self::Session(err) => err.error_code(),
            Self::Navigation(err) => err.error_code(),
            Self::Gateway(err) => err.error_code(),
            Self::InvalidJson(_) => "E_INVALID_JSON",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "console-cli", about = "Contract console session and API CLI")]
struct Cli {
    /// Backend API root; overrides `CONSOLE_API_BASE`.
    #[arg(long)]
    api_base: Option<String>,

    #[arg(long, env = "CONSOLE_SESSION_FILE", default_value = ".console-session.json")]
    session_file: PathBuf,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login(LoginArgs),
    Logout,
    /// Print the signed-in profile, fetching it if it is not cached.
    Whoami,
    /// Print the local session state without touching the network.
    Status,
    /// Run the navigation guard for a route and print where it lands.
    Navigate {
        path: String,
    },
    Api(ApiCommand),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long, env = "CONSOLE_USERNAME")]
    username: String,

    #[arg(long, env = "CONSOLE_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    Get {
        path: String,
    },
    Delete {
        path: String,
    },
    Post {
        path: String,
        #[arg(long)]
        data: String,
    },
    Patch {
        path: String,
        #[arg(long)]
        data: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error [{}]: {err}", err.error_code());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ConsoleConfig::from_env()?;
    if let Some(api_base) = cli.api_base {
        config.api_base = normalize_base(&api_base);
    }
    config.session_file = Some(cli.session_file);
    let app = ConsoleApp::from_config(&config)?;

    match cli.command {
        Command::Login(args) => {
            let profile = app.session().login(&args.username, &args.password).await?;
            print_json(&serde_json::to_value(profile)?)
        }
        Command::Logout => {
            app.session().logout();
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let profile = match app.session().profile() {
                Some(profile) => profile,
                None => app.session().fetch_profile().await?,
            };
            print_json(&serde_json::to_value(profile)?)
        }
        Command::Status => print_json(&status_json(&app)),
        Command::Navigate { path } => {
            let landed = app.navigator().push(&path).await?;
            println!("{landed}");
            Ok(())
        }
        Command::Api(api) => run_api(&app, api).await,
    }
}

async fn run_api(app: &ConsoleApp, api: ApiCommand) -> Result<(), CliError> {
    let gateway = app.gateway();
    let response = match api.command {
        ApiSubcommand::Get { path } => gateway.get(&path).await?,
        ApiSubcommand::Delete { path } => gateway.delete(&path).await?,
        ApiSubcommand::Post { path, data } => gateway.post_json(&path, parse_data(&data)?).await?,
        ApiSubcommand::Patch { path, data } => gateway.patch_json(&path, parse_data(&data)?).await?,
    };
    print_response(&response)
}

fn status_json(app: &ConsoleApp) -> Value {
    let session = app.session();
    json!({
        "phase": format!("{:?}", session.phase()),
        "username": session.username(),
        "role": session.role().map(|r| r.to_string()),
        "level": session.level().map(|l| l.to_string()),
    })
}

fn parse_data(raw: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str(raw)?)
}

fn print_response(response: &RawResponse) -> Result<(), CliError> {
    match response.json_value() {
        Some(value) => print_json(&value),
        None => {
            if !response.body.is_empty() {
                println!("{}", response.body);
            }
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn api_post_requires_data() {
        assert!(Cli::try_parse_from(["console-cli", "api", "post", "/contracts"]).is_err());
        let cli = Cli::try_parse_from(["console-cli", "api", "post", "/contracts", "--data", "{}"]).unwrap();
        assert!(matches!(cli.command, Command::Api(ApiCommand { command: ApiSubcommand::Post { .. } })));
    }

    #[test]
    fn api_base_flag_is_normalized_like_env() {
        let cli = Cli::try_parse_from(["console-cli", "--api-base", " http://api.local/api/ ", "status"]).unwrap();
        assert_eq!(cli.api_base.as_deref().map(normalize_base).as_deref(), Some("http://api.local/api"));
    }

    #[test]
    fn parse_data_rejects_invalid_json() {
        let err = parse_data("{not json").unwrap_err();
        assert_eq!(err.error_code(), "E_INVALID_JSON");
        assert_eq!(parse_data(r#"{"a":1}"#).unwrap(), json!({ "a": 1 }));
    }
}
