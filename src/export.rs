use crate::errors::AppResult;
use crate::models::{ContactMessage, Language, MessageStatus};
use chrono::{DateTime, Utc};
use std::io::Write;

const CSV_HEADER: [&str; 6] = ["name", "email", "subject", "message", "date", "status"];

pub fn export_messages_csv<W: Write>(messages: &[ContactMessage], writer: W) -> AppResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);

    csv_writer.write_record(CSV_HEADER)?;
    for message in messages {
        let body = message.message.replace("\r\n", " ").replace(['\n', '\r'], " ");
        let date = message.date.to_rfc3339();
        csv_writer.write_record([
            message.name.as_str(),
            message.email.as_str(),
            message.subject.as_str(),
            body.as_str(),
            date.as_str(),
            message.status.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("messages_{}.csv", now.format("%Y-%m-%d"))
}

pub fn search_messages<'a>(messages: &'a [ContactMessage], term: &str) -> Vec<&'a ContactMessage> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return messages.iter().collect();
    }
    messages
        .iter()
        .filter(|message| {
            [&message.name, &message.email, &message.subject, &message.message]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn status_label(status: MessageStatus, language: Language) -> &'static str {
    match (status, language) {
        (MessageStatus::New, Language::Pt) => "Nova",
        (MessageStatus::Read, Language::Pt) => "Lida",
        (MessageStatus::Replied, Language::Pt) => "Respondida",
        (MessageStatus::New, Language::En) => "New",
        (MessageStatus::Read, Language::En) => "Read",
        (MessageStatus::Replied, Language::En) => "Replied",
    }
}
