//! CLI entry point for chatdeck

mod render;
mod repl;

use anyhow::{bail, Result};
use chatdeck_conversation::{ConversationController, IgnoreReason, SendOutcome};
use chatdeck_core::config::{Config, ConfigLoader};
use chatdeck_core::logging::init_logging;
use chatdeck_core::utils::expand_home;
use chatdeck_core::{FileStore, Persistence};
use chatdeck_providers::HttpChatClient;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "chatdeck")]
#[command(about = "A terminal chat client with locally persisted conversations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file to the config directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Start an interactive chat (default)
    Chat,
    /// Send a single message and print the reply
    Send {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Conversation to continue, by list position or id
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Manage stored conversations
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show or change chat settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List conversations, newest first
    List,
    /// Print a conversation
    Show {
        /// List position or id
        target: String,
    },
    /// Delete a conversation
    Delete {
        /// List position or id
        target: String,
    },
    /// Delete every conversation
    Clear,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print current settings
    Show,
    /// Update one or more settings
    Set {
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        web_access: Option<bool>,
        #[arg(long)]
        jailbreak: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new(),
    };
    let command = cli.command.unwrap_or(Commands::Chat);
    if let Commands::Init { force } = command {
        return run_init(&loader, force);
    }

    let config = loader.load()?;
    let _log_guard = init_logging(&config.logging);
    debug!("Using config directory {}", loader.config_dir().display());

    let store = FileStore::new(expand_home(&config.storage.dir));
    info!("Storing conversations in {}", store.dir().display());
    let controller = Arc::new(ConversationController::new(
        Persistence::new(Arc::new(store)),
        Arc::new(HttpChatClient::from_config(&config.api)),
    ));
    info!(
        "Loaded {} conversation(s), endpoint {}",
        controller.sessions().len(),
        config.api.base_url
    );

    match command {
        Commands::Init { .. } => {}
        Commands::Chat => repl::run(controller).await?,
        Commands::Send { message, session } => {
            run_send(&controller, &message, session.as_deref()).await?
        }
        Commands::Sessions { command } => run_sessions(&controller, command)?,
        Commands::Settings { command } => run_settings(&controller, command)?,
    }

    Ok(())
}

fn run_init(loader: &ConfigLoader, force: bool) -> Result<()> {
    let config_path = loader.config_dir().join("config.json");
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    loader.save(&Config::default())?;
    println!(
        "{} wrote {}",
        style("✓").green().bold(),
        config_path.display()
    );
    Ok(())
}

async fn run_send(
    controller: &ConversationController,
    message: &str,
    session: Option<&str>,
) -> Result<()> {
    if let Some(target) = session {
        let Some(id) = repl::resolve_target(controller, target) else {
            bail!("no conversation '{}'", target);
        };
        controller.select_session(id);
    }

    match controller.send(message).await? {
        SendOutcome::Ignored(IgnoreReason::EmptyPrompt) => bail!("message is empty"),
        SendOutcome::Ignored(IgnoreReason::Busy) => bail!("a request is already in flight"),
        SendOutcome::Replied { message, .. } => println!("{}", message.content),
        SendOutcome::Failed { message, .. } => bail!("{}", message.content),
    }
    Ok(())
}

fn run_sessions(controller: &ConversationController, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::List => {
            render::print_sessions(&controller.sessions(), controller.current_id().as_deref());
        }
        SessionCommands::Show { target } => {
            let Some(session) =
                repl::resolve_target(controller, &target).and_then(|id| controller.session(&id))
            else {
                bail!("no conversation '{}'", target);
            };
            render::print_session(&session);
        }
        SessionCommands::Delete { target } => {
            let Some(id) = repl::resolve_target(controller, &target) else {
                bail!("no conversation '{}'", target);
            };
            controller.delete_session(&id)?;
            println!("{} {}", style("Deleted").green(), id);
        }
        SessionCommands::Clear => {
            let count = controller.sessions().len();
            controller.clear_all()?;
            println!("{} {} conversation(s)", style("Cleared").green(), count);
        }
    }
    Ok(())
}

fn run_settings(controller: &ConversationController, command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Show => render::print_settings(&controller.settings()),
        SettingsCommands::Set {
            model,
            theme,
            web_access,
            jailbreak,
        } => {
            if let Some(model) = &model {
                render::warn_unknown_model(model);
            }
            if let Some(theme) = &theme {
                render::warn_unknown_theme(theme);
            }
            let settings = controller.update_settings(|s| {
                if let Some(model) = model {
                    s.model = model;
                }
                if let Some(theme) = theme {
                    s.theme = theme;
                }
                if let Some(on) = web_access {
                    s.web_access = on;
                }
                if let Some(on) = jailbreak {
                    s.jailbreak = on;
                }
            })?;
            render::print_settings(&settings);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_chat() {
        let cli = Cli::try_parse_from(["chatdeck"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config_dir.is_none());
    }

    #[test]
    fn test_parse_send_with_session() {
        let cli = Cli::try_parse_from([
            "chatdeck",
            "send",
            "--message",
            "hello",
            "--session",
            "2",
            "--config-dir",
            "/tmp/chatdeck",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Send { message, session }) => {
                assert_eq!(message, "hello");
                assert_eq!(session.as_deref(), Some("2"));
            }
            _ => panic!("expected send"),
        }
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/chatdeck")));
    }

    #[test]
    fn test_parse_settings_set() {
        let cli = Cli::try_parse_from([
            "chatdeck",
            "settings",
            "set",
            "--model",
            "gpt-4",
            "--web-access",
            "true",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Settings {
                command:
                    SettingsCommands::Set {
                        model,
                        theme,
                        web_access,
                        jailbreak,
                    },
            }) => {
                assert_eq!(model.as_deref(), Some("gpt-4"));
                assert!(theme.is_none());
                assert_eq!(web_access, Some(true));
                assert!(jailbreak.is_none());
            }
            _ => panic!("expected settings set"),
        }
    }

    #[test]
    fn test_init_writes_loadable_default_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());

        run_init(&loader, false).unwrap();
        assert!(temp_dir.path().join("config.json").exists());
        assert_eq!(
            loader.load().unwrap().api.base_url,
            Config::default().api.base_url
        );

        assert!(run_init(&loader, false).is_err());
        run_init(&loader, true).unwrap();
    }

    #[test]
    fn test_parse_init_force() {
        let cli = Cli::try_parse_from(["chatdeck", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }

    #[test]
    fn test_send_requires_message() {
        assert!(Cli::try_parse_from(["chatdeck", "send"]).is_err());
    }
}
