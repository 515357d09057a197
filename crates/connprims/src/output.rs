use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use connprims::frame::{kinds::kind_name, Message};
use connprims::transport::{Received, Seq};
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

#[derive(Serialize)]
struct ReplyOutput<'a> {
    kind: &'static str,
    seq: Seq,
    payload_size: usize,
    payload: String,
    remote: &'a str,
    round_trip_ms: u128,
    timestamp: String,
}

pub fn print_reply(
    reply: &Received<Message>,
    remote: &str,
    round_trip: Duration,
    format: OutputFormat,
) {
    let payload = reply.item.payload();
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                kind: kind_name(reply.item.kind()),
                seq: reply.seq,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                remote,
                round_trip_ms: round_trip.as_millis(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "KIND", "SIZE", "RTT", "PAYLOAD"])
                .add_row(vec![
                    reply.seq.to_string(),
                    kind_name(reply.item.kind()).to_string(),
                    payload.len().to_string(),
                    format!("{round_trip:?}"),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "seq={} kind={} size={} rtt={:?} remote={} payload={}",
                reply.seq,
                kind_name(reply.item.kind()),
                payload.len(),
                round_trip,
                remote,
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

/// What `probe` learned about a server.
#[derive(Serialize, Debug)]
pub struct ProbeReport {
    pub endpoint: String,
    pub transport: &'static str,
    pub local: String,
    pub remote: String,
    pub info: String,
    pub max_command_size: i64,
    pub handshake_ms: u128,
    pub ping_ms: u128,
    pub peer_uid: Option<u32>,
    pub peer_gid: Option<u32>,
    pub peer_pid: Option<u32>,
}

pub fn print_probe(report: &ProbeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in probe_rows(report) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (field, value) in probe_rows(report) {
                println!("{field}: {value}");
            }
        }
    }
}

fn probe_rows(report: &ProbeReport) -> Vec<(&'static str, String)> {
    let optional = |value: Option<u32>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    let max_command_size = if report.max_command_size <= 0 {
        "unlimited".to_string()
    } else {
        report.max_command_size.to_string()
    };
    vec![
        ("endpoint", report.endpoint.clone()),
        ("transport", report.transport.to_string()),
        ("local", report.local.clone()),
        ("remote", report.remote.clone()),
        ("info", report.info.clone()),
        ("max_command_size", max_command_size),
        ("handshake_ms", report.handshake_ms.to_string()),
        ("ping_ms", report.ping_ms.to_string()),
        ("peer_uid", optional(report.peer_uid)),
        ("peer_gid", optional(report.peer_gid)),
        ("peer_pid", optional(report.peer_pid)),
    ]
}

/// Announce a server lifecycle event. Only JSON output carries events, so
/// scripts can wait for the listener before connecting.
pub fn print_json_event(format: OutputFormat, event: &str, endpoint: &str) {
    if matches!(format, OutputFormat::Json) {
        print_json(&serde_json::json!({ "event": event, "endpoint": endpoint }));
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_hides_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0x00, 0x01]), "<binary 3 bytes>");
    }

    #[test]
    fn probe_rows_render_unlimited_and_missing_credentials() {
        let report = ProbeReport {
            endpoint: "tcp://127.0.0.1:9000".to_string(),
            transport: "tcp",
            local: "tcp:127.0.0.1:50000".to_string(),
            remote: "tcp:127.0.0.1:9000".to_string(),
            info: "svc/1".to_string(),
            max_command_size: 0,
            handshake_ms: 1,
            ping_ms: 0,
            peer_uid: None,
            peer_gid: None,
            peer_pid: None,
        };
        let rows = probe_rows(&report);
        assert!(rows.contains(&("max_command_size", "unlimited".to_string())));
        assert!(rows.contains(&("peer_uid", "-".to_string())));
    }
}
