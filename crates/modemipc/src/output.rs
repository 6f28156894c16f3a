use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use modemipc_frame::describe;
use modemipc_mux::{Correlation, Notification, Response};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A response copied out of its callback.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub sequence: u8,
    pub command: u16,
    pub payload: Vec<u8>,
    pub matched_by: Correlation,
    pub elapsed_ms: f64,
}

impl From<&Response<'_>> for ResponseRecord {
    fn from(resp: &Response<'_>) -> Self {
        Self {
            sequence: resp.sequence.get(),
            command: resp.command,
            payload: resp.payload.to_vec(),
            matched_by: resp.matched_by,
            elapsed_ms: (resp.elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    kind: &'a str,
    sequence: u8,
    command: String,
    command_id: u16,
    matched_by: &'a str,
    elapsed_ms: f64,
    payload_size: usize,
    payload_hex: String,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct NotificationOutput<'a> {
    kind: &'a str,
    mseq: u8,
    command: String,
    command_id: u16,
    payload_size: usize,
    payload_hex: String,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct SentOutput {
    kind: &'static str,
    sequence: u8,
    command: String,
    command_id: u16,
    timestamp: String,
}

pub fn print_response(resp: &ResponseRecord, format: OutputFormat) {
    let matched_by = correlation_name(resp.matched_by);
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                kind: "response",
                sequence: resp.sequence,
                command: describe(resp.command),
                command_id: resp.command,
                matched_by,
                elapsed_ms: resp.elapsed_ms,
                payload_size: resp.payload.len(),
                payload_hex: hex(&resp.payload),
                payload: payload_preview(&resp.payload),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "COMMAND", "MATCHED BY", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    resp.sequence.to_string(),
                    describe(resp.command),
                    matched_by.to_string(),
                    resp.payload.len().to_string(),
                    payload_preview(&resp.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "RESP {} seq={} matched_by={} elapsed={}ms size={} payload={}",
                describe(resp.command),
                resp.sequence,
                matched_by,
                resp.elapsed_ms,
                resp.payload.len(),
                payload_preview(&resp.payload)
            );
        }
        OutputFormat::Raw => print_raw(&resp.payload),
    }
}

pub fn print_notification(notification: &Notification<'_>, format: OutputFormat) {
    let kind = notification.class.as_str();
    match format {
        OutputFormat::Json => {
            let out = NotificationOutput {
                kind,
                mseq: notification.mseq,
                command: describe(notification.command),
                command_id: notification.command,
                payload_size: notification.payload.len(),
                payload_hex: hex(notification.payload),
                payload: payload_preview(notification.payload),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CLASS", "COMMAND", "MSEQ", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    kind.to_string(),
                    describe(notification.command),
                    notification.mseq.to_string(),
                    notification.payload.len().to_string(),
                    payload_preview(notification.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} mseq={} size={} payload={}",
                kind.to_uppercase(),
                describe(notification.command),
                notification.mseq,
                notification.payload.len(),
                payload_preview(notification.payload)
            );
        }
        OutputFormat::Raw => print_raw(notification.payload),
    }
}

/// Acknowledge a fire-and-forget request.
pub fn print_sent(sequence: u8, command: u16, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SentOutput {
            kind: "sent",
            sequence,
            command: describe(command),
            command_id: command,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Raw => {}
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("sent {} seq={sequence}", describe(command));
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn correlation_name(correlation: Correlation) -> &'static str {
    match correlation {
        Correlation::Sequence => "sequence",
        Correlation::Command => "command",
    }
}

fn hex(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{b:02x}")).collect()
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
