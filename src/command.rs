//! Terminal intents.
//!
//! A line without a leading `/` is a message to send. Everything else is a
//! slash command mirroring one control of the widget.

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;

use crate::context::ChassisElement;
use crate::reducer::AssistantState;
use crate::types::Message;

pub const HELP: &str = "\
commands:
  <text>                               send a message
  /like N, /dislike N                  toggle feedback on message N
  /search                              open the search form
  /select ID, /mandatory ID            toggle a facet flag
  /count N                             records to return (1-25)
  /submit, /discard                    finish the search form
  /delete                              delete this conversation
  /delete-all                          delete all your conversations
  /goto CHASSIS_NO ORDER_YEAR REI_URL  navigate to a chassis page
  /user NAME                           change the signed-in user
  /refresh                             re-read the page in 5 seconds
  /show, /hide                         open or collapse the widget
  /version                             backend version
  /help, /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Like(usize),
    Dislike(usize),
    Search,
    Select(String),
    Mandatory(String),
    Count(u32),
    Submit,
    Discard,
    Delete,
    DeleteAll,
    Goto(ChassisElement),
    User(String),
    Refresh,
    Show,
    Hide,
    Version,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("/{command} needs {expected}")]
    MissingArgument { command: &'static str, expected: &'static str },

    #[error("not a number: {0}")]
    InvalidNumber(String),
}

/// Parse one input line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns a [`CommandError`] for an unknown command, a missing argument, or
/// a malformed number.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_owned())));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let command = match name {
        "like" => Command::Like(number(args, "like")?),
        "dislike" => Command::Dislike(number(args, "dislike")?),
        "search" => Command::Search,
        "select" => Command::Select(word(args, "select", "a facet id")?),
        "mandatory" => Command::Mandatory(word(args, "mandatory", "a facet id")?),
        "count" => Command::Count(number(args, "count")?),
        "submit" => Command::Submit,
        "discard" => Command::Discard,
        "delete" => Command::Delete,
        "delete-all" => Command::DeleteAll,
        "goto" => Command::Goto(goto(args)?),
        "user" => Command::User(word(args, "user", "a name")?),
        "refresh" => Command::Refresh,
        "show" => Command::Show,
        "hide" => Command::Hide,
        "version" => Command::Version,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(Some(command))
}

fn word(args: &str, command: &'static str, expected: &'static str) -> Result<String, CommandError> {
    if args.is_empty() {
        return Err(CommandError::MissingArgument { command, expected });
    }
    Ok(args.to_owned())
}

fn number<T: std::str::FromStr>(args: &str, command: &'static str) -> Result<T, CommandError> {
    let raw = word(args, command, "a number")?;
    raw.parse().map_err(|_| CommandError::InvalidNumber(raw))
}

fn goto(args: &str) -> Result<ChassisElement, CommandError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let [chassis_no, order_year, rei_url] = parts.as_slice() else {
        return Err(CommandError::MissingArgument { command: "goto", expected: "CHASSIS_NO ORDER_YEAR REI_URL" });
    };
    Ok(ChassisElement {
        chassis_no: Some((*chassis_no).to_owned()),
        order_year: Some((*order_year).to_owned()),
        rei_url: Some((*rei_url).to_owned()),
    })
}

/// Id of the assistant message shown as number `number` (1-based).
#[must_use]
pub fn assistant_message_id(state: &AssistantState, number: usize) -> Option<String> {
    let messages = &state.conversation.as_ref()?.messages;
    match messages.get(number.checked_sub(1)?)? {
        Message::Assistant(m) => Some(m.message_id.clone()),
        _ => None,
    }
}
