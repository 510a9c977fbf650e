use crate::message::{ChatMessage, MessageLog, Sender};
use crate::protocol::HistoryEntry;
use crate::text;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::collections::HashSet;

/// Parse a server timestamp: RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn map_entry(entry: &HistoryEntry) -> Option<ChatMessage> {
    let body = entry.message.as_deref()?;
    let cleaned = text::clean(body);
    if text::is_blank(&cleaned) {
        return None;
    }
    let raw_ts = entry.timestamp.as_deref().unwrap_or_default();
    let Some(ts) = parse_timestamp(raw_ts) else {
        log::warn!("[history] dropping entry with bad timestamp {:?}", raw_ts);
        return None;
    };
    let sender = match entry.direction.as_deref() {
        Some("sent") => Sender::User,
        _ => Sender::Bot,
    };
    Some(ChatMessage {
        id: ts.timestamp_millis(),
        text: cleaned,
        sender,
        date: ts.with_timezone(&Local).format("%Y-%m-%d").to_string(),
    })
}

/// Fold a replayed history into the log.
///
/// Only entries whose `(sender, text)` is absent from the log as it stood
/// before the merge are appended, in server order. Repeats inside one replay
/// all land, so a user who really sent the same text twice keeps both.
pub fn merge(log: &mut MessageLog, entries: &[HistoryEntry]) -> Vec<ChatMessage> {
    let existing: HashSet<(Sender, String)> = log.pairs();
    let added: Vec<ChatMessage> = entries
        .iter()
        .filter_map(map_entry)
        .filter(|m| !existing.contains(&(m.sender, m.text.clone())))
        .collect();
    log::info!(
        "[history] replay of {} entries, {} new",
        entries.len(),
        added.len()
    );
    log.extend_merged(added.iter().cloned());
    added
}
