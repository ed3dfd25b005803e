//! Plain-text presentation of [`AssistantState`].
//!
//! Rendering is a pure function of the state and the current time, so the
//! terminal host can redraw on every state change. Messages are numbered
//! from 1 in list order; commands that act on a message use that number.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::fmt::Write as _;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::reducer::{AssistantState, SearchComposition, Status};
use crate::types::{
    AssistantMessage, ChassisAiSearchResult, Liked, Message, MessageState, SearchKey, SearchRequestMessage,
    SearchResultsMessage, Timestamp, UserMessage,
};

pub const UNAVAILABLE_TEXT: &str = "PACCAR Copilot is not available on this page. Navigate to a chassis page.";
pub const LOADING_TEXT: &str = "Please wait while we initialize your chat session...";
pub const ERROR_HINT: &str = "Consider refreshing the page. If the error persists, contact PACCAR Assistant team.";
pub const AI_DISCLAIMER: &str = "AI-generated content may be incorrect";

const RESULT_COLUMNS: [&str; 8] =
    ["#", "Chassis no.", "Order Year", "Division", "Schedule Date", "Matching Score", "Number of Defects", "Links"];

/// Render the whole widget.
#[must_use]
pub fn render(state: &AssistantState, now: Timestamp) -> String {
    let Some(chassis_id) = &state.in_context_chassis_id else {
        return format!("[copilot unavailable] {UNAVAILABLE_TEXT}\n");
    };
    if !state.shown {
        return format!("[copilot] PACCAR Copilot for {chassis_id} (/show to open)\n");
    }

    let mut out = format!("== PACCAR Copilot · {chassis_id} ==\n");
    let Some(conversation) = &state.conversation else {
        match (state.status, &state.error) {
            (Status::Error, Some(error)) => render_error(&mut out, error),
            _ => {
                let _ = writeln!(out, "{LOADING_TEXT}");
            }
        }
        return out;
    };

    for (idx, message) in conversation.messages.iter().enumerate() {
        out.push_str(&render_message(idx + 1, message, now));
    }
    if let Some(error) = &state.error {
        let _ = writeln!(out, "! {error}");
    }
    if let Some(composition) = &state.composition {
        out.push_str(&render_composition(composition));
    }
    out
}

fn render_error(out: &mut String, error: &str) {
    let _ = writeln!(out, "✕ {error}");
    let _ = writeln!(out, "{ERROR_HINT}");
}

/// `HH:MM:SS` for today, `HH:MM:SS YYYY-MM-DD` otherwise, in UTC.
#[must_use]
pub fn format_timestamp(timestamp: Timestamp, now: Timestamp) -> String {
    let Ok(at) = OffsetDateTime::from_unix_timestamp(timestamp) else {
        return String::new();
    };
    let time = at.format(format_description!("[hour]:[minute]:[second]")).unwrap_or_default();
    let same_day = OffsetDateTime::from_unix_timestamp(now).is_ok_and(|today| today.date() == at.date());
    if same_day {
        return time;
    }
    let date = at.format(format_description!("[year]-[month]-[day]")).unwrap_or_default();
    format!("{time} {date}")
}

// =============================================================================
// MESSAGES
// =============================================================================

/// One message block, prefixed with its list number.
#[must_use]
pub fn render_message(number: usize, message: &Message, now: Timestamp) -> String {
    let time = format_timestamp(message.timestamp(), now);
    match message {
        Message::User(m) => render_user(number, &time, m),
        Message::Assistant(m) => render_assistant(number, &time, m),
        Message::SearchRequest(m) => render_search_request(number, &time, m),
        Message::SearchResults(m) => render_search_results(number, &time, m),
    }
}

fn render_user(number: usize, time: &str, message: &UserMessage) -> String {
    let sending = if message.message_id.is_empty() { " (sending...)" } else { "" };
    format!("[{number}] {time} You{sending}:\n    {}\n", indent(&message.content))
}

fn render_assistant(number: usize, time: &str, message: &AssistantMessage) -> String {
    if message.state == MessageState::Pending {
        return format!("[{number}] {time} AI Assistant:\n    ...\n");
    }
    let mut out = format!("[{number}] {time} AI Assistant ({AI_DISCLAIMER}):\n    {}\n", indent(&message.content));
    if !message.references.is_empty() {
        let _ = writeln!(out, "    references: {}", message.references.join(", "));
    }
    if !message.followup_prompts.is_empty() {
        let _ = writeln!(out, "    follow-up: {}", message.followup_prompts.join(" | "));
    }
    let _ = writeln!(out, "    {}", like_marker(message.liked));
    out
}

fn like_marker(liked: Liked) -> &'static str {
    match liked {
        Liked::Liked => "[+] liked",
        Liked::Neutral => "[ ] no feedback",
        Liked::Disliked => "[-] disliked",
    }
}

fn render_search_request(number: usize, time: &str, message: &SearchRequestMessage) -> String {
    let marker = if message.is_acknowledged() { "✓" } else { "searching..." };
    let mut out = format!("[{number}] {time} You: search criteria selection ({marker})\n");
    for key in &message.query {
        let _ = writeln!(out, "    {}", facet_row(key));
    }
    out
}

fn render_search_results(number: usize, time: &str, message: &SearchResultsMessage) -> String {
    let mut out = format!("[{number}] {time} AI Assistant:\n    Here's the results matching your current selection.\n");
    if let Some(base) = &message.base_chassis {
        let _ = writeln!(out, "    anchored on chassis {} ({})", base.chassis_number, base.chassis_year);
    }
    let rows: Vec<Vec<String>> =
        message.results.iter().enumerate().map(|(idx, result)| result_row(idx + 1, result)).collect();
    for line in table(&RESULT_COLUMNS, &rows).lines() {
        let _ = writeln!(out, "    {line}");
    }
    out
}

fn result_row(number: usize, result: &ChassisAiSearchResult) -> Vec<String> {
    vec![
        number.to_string(),
        result.chassis_number.clone(),
        result.chassis_year.clone(),
        result.division.clone(),
        result.schedule_date.chars().take(10).collect(),
        format_score(result.score),
        result.defects.to_string(),
        result.links.len().to_string(),
    ]
}

/// Relevance as a percentage with one decimal.
#[must_use]
pub fn format_score(score: Option<f64>) -> String {
    let permille = (score.unwrap_or(0.0) * 1000.0).round();
    format!("{}%", permille / 10.0)
}

// =============================================================================
// SEARCH COMPOSITION
// =============================================================================

fn facet_row(key: &SearchKey) -> String {
    let selected = if key.selected { "x" } else { " " };
    let mandatory = if key.mandatory { "!" } else { " " };
    format!("[{selected}] [{mandatory}] {}", key.display_name())
}

/// The facet form shown while composing a search.
#[must_use]
pub fn render_composition(composition: &SearchComposition) -> String {
    let mut out = String::from("-- Please select your search criteria: --\n");
    let _ = writeln!(out, "    id  sel man filter");
    for key in &composition.keys {
        let _ = writeln!(out, "    {:>3} {}", key.id, facet_row(key));
    }
    let _ = writeln!(out, "    Number of records to return: {}", composition.count_needed);
    let _ = writeln!(out, "    /select ID  /mandatory ID  /count N  /submit  /discard");
    out
}

// =============================================================================
// HELPERS
// =============================================================================

fn indent(text: &str) -> String {
    text.replace('\n', "\n    ")
}

/// Left-aligned columns separated by two spaces.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        padded.join("  ").trim_end().to_owned()
    };

    let mut out = line(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}
