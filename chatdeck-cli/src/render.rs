//! Terminal rendering of sessions, messages and settings

use chatdeck_core::session::{KNOWN_MODELS, KNOWN_THEMES};
use chatdeck_core::utils::truncate;
use chatdeck_core::{Message, Role, Session, Settings};
use console::style;

const PREVIEW_BYTES: usize = 48;

pub fn print_sessions(sessions: &[Session], current_id: Option<&str>) {
    if sessions.is_empty() {
        println!("{}", style("No conversations yet.").dim());
        return;
    }

    for (index, session) in sessions.iter().enumerate() {
        let marker = if Some(session.id.as_str()) == current_id {
            style("*").green().bold()
        } else {
            style(" ")
        };
        let preview = session
            .last_message()
            .map(|m| truncate(&m.content.replace('\n', " "), PREVIEW_BYTES))
            .unwrap_or_default();
        println!(
            "{} {:>2}. {}  {}  {}",
            marker,
            index + 1,
            style(&session.title).bold(),
            style(session.updated_at.format("%Y-%m-%d %H:%M")).dim(),
            style(preview).dim()
        );
    }
}

pub fn print_session(session: &Session) {
    println!(
        "{} {}",
        style(&session.title).bold().cyan(),
        style(format!("({})", session.id)).dim()
    );
    for message in &session.messages {
        print_message(message);
    }
}

pub fn print_message(message: &Message) {
    let label = match message.role {
        Role::User => style("you").cyan().bold(),
        Role::Assistant => style("assistant").green().bold(),
        Role::System => style("system").red().bold(),
    };
    println!("{} {}", label, message.content);
}

pub fn print_settings(settings: &Settings) {
    println!("{}", style("Settings").bold().cyan());
    println!("  model:      {}", settings.model);
    println!("  theme:      {}", settings.theme);
    println!("  web access: {}", on_off(settings.web_access));
    println!("  jailbreak:  {}", on_off(settings.jailbreak));
}

/// Print a hint when `model` is not one of the stock options
pub fn warn_unknown_model(model: &str) {
    if !KNOWN_MODELS.contains(&model) {
        eprintln!(
            "{} unknown model '{}' (known: {})",
            style("warning:").yellow().bold(),
            model,
            KNOWN_MODELS.join(", ")
        );
    }
}

/// Print a hint when `theme` is not one of the stock options
pub fn warn_unknown_theme(theme: &str) {
    if !KNOWN_THEMES.contains(&theme) {
        eprintln!(
            "{} unknown theme '{}' (known: {})",
            style("warning:").yellow().bold(),
            theme,
            KNOWN_THEMES.join(", ")
        );
    }
}

fn on_off(flag: bool) -> console::StyledObject<&'static str> {
    if flag {
        style("on").green()
    } else {
        style("off").dim()
    }
}
