//! Command-line interface.

mod doctor;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::auth::handshake::{HandshakeOrchestrator, HandshakeState, LoginRequest};
use crate::auth::popup::{BrowserTabPopup, LoginConfirmation, Viewport};
use crate::auth::probe::{HttpSessionProbe, ProbeOutcome, SessionProbe};
use crate::config::Config;
use crate::host::signal::TracingSink;
use crate::settings::Settings;
use crate::widget::factory::EmbedConfig;

pub use doctor::run_doctor_command;

/// embedgate: single-sign-on handshake and embedded dashboard bridge.
#[derive(Parser, Debug)]
#[command(name = "embedgate", version, about)]
pub struct Cli {
    /// Explicit TOML config file (default: ~/.embedgate/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines (also EMBEDGATE_LOG_JSON=1).
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask the library session endpoint whether we are logged in.
    Probe {
        /// Session token sent as the X-MSTR-AuthToken cookie.
        #[arg(long, env = "EMBEDGATE_AUTH_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Open the login page in the browser and wait for the handshake.
    Login {
        /// Session token the verification step sends as the auth cookie.
        #[arg(long, env = "EMBEDGATE_AUTH_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Check for a session established outside this tool.
    Status {
        #[arg(long, env = "EMBEDGATE_AUTH_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Print the widget embedding configuration.
    EmbedConfig {
        /// Print the dashboard information block instead.
        #[arg(long)]
        summary: bool,
    },

    /// Manage the config file and bootstrap env.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Check configuration and library reachability.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a config file with default settings.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print one setting by dotted path, e.g. `handshake.max_ticks`.
    Get { path: String },
    /// Print the resolved configuration.
    Show,
    /// Persist library coordinates to ~/.embedgate/.env.
    SaveEnv,
}

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing(log_json: bool) {
    let json = log_json
        || crate::config::helpers::parse_bool_env("EMBEDGATE_LOG_JSON")
            .ok()
            .flatten()
            .unwrap_or(false);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("embedgate=info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Probe { token } => {
            let config = Config::load(config_path)?;
            let probe = build_probe(&config, token);
            let outcome = probe.check().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Login { token } => run_login(&Config::load(config_path)?, token).await,
        Command::Status { token } => {
            let config = Config::load(config_path)?;
            let mut orchestrator = HandshakeOrchestrator::new(
                BrowserTabPopup::new(),
                build_probe(&config, token),
                config.handshake.clone(),
                Arc::new(TracingSink),
            );
            match orchestrator.check_existing_session().await? {
                ProbeOutcome::Authenticated => println!("Authenticated."),
                ProbeOutcome::Unauthenticated => {
                    println!("Authentication not complete. Log in first, then check again.")
                }
                ProbeOutcome::Indeterminate { cause } => {
                    println!("Could not determine session state: {cause}")
                }
            }
            Ok(())
        }
        Command::EmbedConfig { summary } => {
            let embed = EmbedConfig::from_config(&Config::load(config_path)?);
            let json = if summary {
                serde_json::to_string_pretty(&embed.summary())?
            } else {
                serde_json::to_string_pretty(&embed)?
            };
            println!("{json}");
            Ok(())
        }
        Command::Config(command) => run_config_command(command, config_path),
        Command::Doctor { strict } => run_doctor_command(config_path, strict).await,
    }
}

fn build_probe(config: &Config, token: Option<String>) -> HttpSessionProbe {
    let probe = HttpSessionProbe::new(&config.probe);
    match token.filter(|t| !t.trim().is_empty()) {
        Some(token) => probe.with_auth_token(SecretString::from(token)),
        None => probe,
    }
}

async fn run_login(config: &Config, token: Option<String>) -> anyhow::Result<()> {
    let popup = BrowserTabPopup::new();
    let confirmation = popup.confirmation();
    let probe = build_probe(config, token);
    let mut orchestrator = HandshakeOrchestrator::new(
        popup,
        probe,
        config.handshake.clone(),
        Arc::new(TracingSink),
    );

    println!("Opening {} in your browser.", config.library.login_url());
    println!("Finish logging in there, then press Enter here.");
    // A blocked stdin read cannot be cancelled; the thread exits with the process.
    std::thread::spawn(move || confirm_on_enter(std::io::stdin().lock(), &confirmation));

    let request = LoginRequest::for_library(&config.library, Viewport::default());
    match orchestrator.run(request).await? {
        HandshakeState::Succeeded => println!("Logged in."),
        HandshakeState::Failed(reason) => {
            println!("{}", reason.user_message());
            if let Some(cause) = reason.cause() {
                println!("  cause: {cause}");
            }
        }
        HandshakeState::TimedOut => println!("Timed out waiting for the login to finish."),
        other => println!("Handshake stopped in state {}", other.as_str()),
    }
    Ok(())
}

/// Confirm once a line is read. End of input leaves the login unconfirmed.
fn confirm_on_enter(mut input: impl BufRead, confirmation: &LoginConfirmation) {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => confirmation.confirm(),
        Ok(_) => tracing::warn!("stdin closed; waiting for the handshake to time out"),
        Err(e) => tracing::warn!(error = %e, "Failed to read confirmation from stdin"),
    }
}

fn run_config_command(
    command: ConfigCommand,
    config_path: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(Settings::default_toml_path);
    match command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Settings::default()
                .save_toml(&path)
                .map_err(anyhow::Error::msg)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Get { path: key } => {
            let settings = Settings::load_toml(&path)
                .map_err(anyhow::Error::msg)?
                .unwrap_or_default();
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => anyhow::bail!("unknown setting '{key}'"),
            }
        }
        ConfigCommand::Show => {
            let config = Config::load(config_path)?;
            println!("{config:#?}");
        }
        ConfigCommand::SaveEnv => {
            let config = Config::load(config_path)?;
            crate::bootstrap::save_bootstrap_env(&[
                ("EMBEDGATE_BASE_URL", config.library.base_url.as_str()),
                ("EMBEDGATE_LIBRARY_URL", config.library.library_url.as_str()),
                ("EMBEDGATE_PROJECT_ID", config.library.project_id.as_str()),
                ("EMBEDGATE_OBJECT_ID", config.library.object_id.as_str()),
            ])?;
            println!("Wrote {}", crate::bootstrap::embedgate_env_path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "embedgate",
            "probe",
            "--token",
            "abc",
            "--config",
            "/tmp/embedgate.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/embedgate.toml")));
        match cli.command {
            Command::Probe { token } => assert_eq!(token.as_deref(), Some("abc")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_config_subcommands() {
        let cli = Cli::try_parse_from(["embedgate", "config", "get", "handshake.max_ticks"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Get { ref path }) if path == "handshake.max_ticks"
        ));
    }

    #[test]
    fn login_accepts_token() {
        let cli = Cli::try_parse_from(["embedgate", "login", "--token", "tok-1"]).unwrap();
        match cli.command {
            Command::Login { token } => assert_eq!(token.as_deref(), Some("tok-1")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn closed_stdin_does_not_confirm_login() {
        let popup = BrowserTabPopup::with_opener(|_| Ok(()));
        let confirmation = popup.confirmation();

        confirm_on_enter(std::io::Cursor::new(Vec::<u8>::new()), &confirmation);
        assert!(!confirmation.is_confirmed());

        confirm_on_enter(std::io::Cursor::new(b"\n".to_vec()), &confirmation);
        assert!(confirmation.is_confirmed());
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        run_config_command(ConfigCommand::Init { force: false }, Some(&path)).unwrap();
        assert!(path.exists());
        assert!(run_config_command(ConfigCommand::Init { force: false }, Some(&path)).is_err());
        run_config_command(ConfigCommand::Init { force: true }, Some(&path)).unwrap();
    }
}
