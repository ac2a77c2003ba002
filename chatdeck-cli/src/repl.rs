//! Interactive chat loop

use anyhow::Result;
use chatdeck_conversation::{ConversationController, IgnoreReason, SendOutcome};
use console::style;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::render;

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    New,
    List,
    /// 1-based list position or session id
    Select(String),
    /// Current session when no target is given
    Delete(Option<String>),
    Clear,
    Show,
    Settings,
    Model(String),
    Theme(String),
    WebAccess(bool),
    Jailbreak(bool),
    Help,
    Quit,
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return ReplCommand::Send(line.to_string());
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match (name, arg) {
            ("new", None) => ReplCommand::New,
            ("list" | "ls", None) => ReplCommand::List,
            ("select" | "open", Some(target)) => ReplCommand::Select(target.to_string()),
            ("delete" | "rm", target) => ReplCommand::Delete(target.map(ToString::to_string)),
            ("clear", None) => ReplCommand::Clear,
            ("show", None) => ReplCommand::Show,
            ("settings", None) => ReplCommand::Settings,
            ("model", Some(model)) => ReplCommand::Model(model.to_string()),
            ("theme", Some(theme)) => ReplCommand::Theme(theme.to_string()),
            ("web", Some(flag)) => match parse_flag(flag) {
                Some(on) => ReplCommand::WebAccess(on),
                None => ReplCommand::Invalid(format!("expected on/off, got '{}'", flag)),
            },
            ("jailbreak", Some(flag)) => match parse_flag(flag) {
                Some(on) => ReplCommand::Jailbreak(on),
                None => ReplCommand::Invalid(format!("expected on/off, got '{}'", flag)),
            },
            ("help" | "?", None) => ReplCommand::Help,
            ("quit" | "exit" | "q", None) => ReplCommand::Quit,
            _ => ReplCommand::Invalid(format!("unknown command '/{}'", command)),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Run the interactive loop until `/quit`, end of input or Ctrl-C at the prompt
pub async fn run(controller: Arc<ConversationController>) -> Result<()> {
    println!("{}", style("chatdeck").bold().cyan());
    println!("{}", style("Type a message, or /help for commands.").dim());
    if let Some(session) = controller.current_session() {
        render::print_session(&session);
    }

    let mut repl = Repl::new(controller);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !repl.is_waiting() {
            print!("{} ", style(">").bold());
            std::io::stdout().flush()?;
        }

        tokio::select! {
            outcome = repl.settle() => report(outcome?),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!();
                    break;
                };
                if repl.dispatch(ReplCommand::parse(&line))? == Flow::Quit {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !repl.is_waiting() {
                    println!();
                    break;
                }
                debug!("Interrupt received while sending");
                repl.controller.cancel();
            }
        }
    }

    if repl.is_waiting() {
        repl.controller.cancel();
        report(repl.settle().await?);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Command dispatcher holding at most one background send
struct Repl {
    controller: Arc<ConversationController>,
    in_flight: Option<JoinHandle<chatdeck_core::Result<SendOutcome>>>,
}

impl Repl {
    fn new(controller: Arc<ConversationController>) -> Self {
        Self {
            controller,
            in_flight: None,
        }
    }

    fn is_waiting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Wait for the background send to settle. Pends forever when idle.
    async fn settle(&mut self) -> Result<SendOutcome> {
        let Some(handle) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };
        let joined = handle.await;
        self.in_flight = None;
        Ok(joined??)
    }

    fn dispatch(&mut self, command: ReplCommand) -> Result<Flow> {
        let controller = &self.controller;
        match command {
            ReplCommand::Send(text) => {
                if text.trim().is_empty() {
                    return Ok(Flow::Continue);
                }
                if self.is_waiting() {
                    println!(
                        "{}",
                        style("A request is already in flight; message not sent.").yellow()
                    );
                    return Ok(Flow::Continue);
                }
                let controller = Arc::clone(controller);
                self.in_flight = Some(tokio::spawn(async move { controller.send(&text).await }));
            }
            ReplCommand::New => {
                controller.create_session()?;
                println!("{}", style("Started a new conversation.").green());
            }
            ReplCommand::List => {
                render::print_sessions(&controller.sessions(), controller.current_id().as_deref());
            }
            ReplCommand::Select(target) => match resolve_target(controller, &target) {
                Some(id) => {
                    controller.select_session(id);
                    if let Some(session) = controller.current_session() {
                        render::print_session(&session);
                    }
                }
                None => println!("{} no conversation '{}'", style("error:").red(), target),
            },
            ReplCommand::Delete(target) => {
                let id = match target {
                    Some(target) => resolve_target(controller, &target),
                    None => controller.current_session().map(|s| s.id),
                };
                match id {
                    Some(id) => {
                        controller.delete_session(&id)?;
                        println!("{}", style("Conversation deleted.").green());
                    }
                    None => println!("{} nothing to delete", style("error:").red()),
                }
            }
            ReplCommand::Clear => {
                controller.clear_all()?;
                println!("{}", style("All conversations cleared.").green());
            }
            ReplCommand::Show => match controller.current_session() {
                Some(session) => render::print_session(&session),
                None => println!("{}", style("No conversation selected.").dim()),
            },
            ReplCommand::Settings => render::print_settings(&controller.settings()),
            ReplCommand::Model(model) => {
                render::warn_unknown_model(&model);
                controller.update_settings(|s| s.model = model)?;
            }
            ReplCommand::Theme(theme) => {
                render::warn_unknown_theme(&theme);
                controller.update_settings(|s| s.theme = theme)?;
            }
            ReplCommand::WebAccess(on) => {
                controller.update_settings(|s| s.web_access = on)?;
            }
            ReplCommand::Jailbreak(on) => {
                controller.update_settings(|s| s.jailbreak = on)?;
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Invalid(reason) => println!("{} {}", style("error:").red(), reason),
            ReplCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

fn report(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Ignored(IgnoreReason::EmptyPrompt) => {}
        SendOutcome::Ignored(IgnoreReason::Busy) => {
            println!("{}", style("A request is already in flight.").yellow());
        }
        SendOutcome::Replied { message, .. } | SendOutcome::Failed { message, .. } => {
            render::print_message(&message);
        }
    }
}

/// Map a 1-based list position or a session id to a session id
pub fn resolve_target(controller: &ConversationController, target: &str) -> Option<String> {
    let sessions = controller.sessions();
    if let Ok(position) = target.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|index| sessions.get(index))
            .map(|s| s.id.clone());
    }
    sessions.into_iter().find(|s| s.id == target).map(|s| s.id)
}

fn print_help() {
    let rows = [
        ("/new", "start a new conversation"),
        ("/list", "list conversations"),
        ("/select <n|id>", "switch conversation"),
        ("/show", "print the current conversation"),
        ("/delete [n|id]", "delete a conversation (default: current)"),
        ("/clear", "delete every conversation"),
        ("/settings", "show settings"),
        ("/model <name>", "set the model"),
        ("/theme <name>", "set the theme"),
        ("/web on|off", "toggle web access"),
        ("/jailbreak on|off", "toggle jailbreak"),
        ("/quit", "leave"),
    ];
    for (command, description) in rows {
        println!("  {:<20} {}", style(command).cyan(), description);
    }
    println!(
        "  {}",
        style("Commands keep working while a reply is pending; Ctrl-C cancels it.").dim()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdeck_core::{MemoryStore, Persistence, Role};
    use chatdeck_providers::HttpChatClient;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Controller whose endpoint accepts connections and never answers
    async fn stalled_controller() -> (Arc<ConversationController>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let controller = ConversationController::new(
            Persistence::new(Arc::new(MemoryStore::new())),
            Arc::new(HttpChatClient::new(url, Duration::from_secs(30))),
        );
        (Arc::new(controller), server)
    }

    #[tokio::test]
    async fn test_commands_run_while_reply_is_pending() {
        let (controller, server) = stalled_controller().await;
        let mut repl = Repl::new(controller.clone());

        repl.dispatch(ReplCommand::Send("first".to_string())).unwrap();
        while !controller.is_sending() {
            tokio::task::yield_now().await;
        }
        let asked = controller.current_id().unwrap();

        repl.dispatch(ReplCommand::Model("gpt-4".to_string())).unwrap();
        repl.dispatch(ReplCommand::New).unwrap();
        repl.dispatch(ReplCommand::Send("second".to_string())).unwrap();
        assert_eq!(controller.settings().model, "gpt-4");
        assert_eq!(controller.sessions().len(), 2);
        assert!(controller.current_session().unwrap().messages.is_empty());
        assert!(repl.is_waiting());

        controller.cancel();
        let outcome = repl.settle().await.unwrap();
        assert_eq!(outcome.session_id(), Some(asked.as_str()));
        assert!(!repl.is_waiting());

        let asked = controller.session(&asked).unwrap();
        assert_eq!(asked.messages.len(), 2);
        assert_eq!(asked.messages[1].role, Role::System);
        assert_eq!(asked.messages[1].content, "Request failed: Request cancelled");
        server.abort();
    }

    #[tokio::test]
    async fn test_quit_and_blank_lines() {
        let (controller, server) = stalled_controller().await;
        let mut repl = Repl::new(controller);
        assert_eq!(
            repl.dispatch(ReplCommand::Send("   ".to_string())).unwrap(),
            Flow::Continue
        );
        assert!(!repl.is_waiting());
        assert_eq!(repl.dispatch(ReplCommand::Quit).unwrap(), Flow::Quit);
        server.abort();
    }

    #[test]
    fn test_plain_text_is_sent_verbatim() {
        assert_eq!(
            ReplCommand::parse("  hello there "),
            ReplCommand::Send("  hello there ".to_string())
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ReplCommand::parse("/new"), ReplCommand::New);
        assert_eq!(ReplCommand::parse("/ls"), ReplCommand::List);
        assert_eq!(
            ReplCommand::parse("/select 2"),
            ReplCommand::Select("2".to_string())
        );
        assert_eq!(ReplCommand::parse("/delete"), ReplCommand::Delete(None));
        assert_eq!(
            ReplCommand::parse("/rm abc"),
            ReplCommand::Delete(Some("abc".to_string()))
        );
        assert_eq!(
            ReplCommand::parse("/model gpt-4o-mini"),
            ReplCommand::Model("gpt-4o-mini".to_string())
        );
        assert_eq!(ReplCommand::parse("/web ON"), ReplCommand::WebAccess(true));
        assert_eq!(
            ReplCommand::parse("/jailbreak off"),
            ReplCommand::Jailbreak(false)
        );
        assert_eq!(ReplCommand::parse(" /quit "), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(ReplCommand::parse("/web maybe"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/select"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/frobnicate"), ReplCommand::Invalid(_)));
    }
}
