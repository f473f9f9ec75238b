use std::io::IsTerminal;

use clap::ValueEnum;
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
struct PayloadOutput<'a> {
    schema_id: &'a str,
    channel: u8,
    interface: &'a str,
    payload_size: usize,
    payload: String,
}

/// Print one received payload in the requested format.
pub fn print_payload(channel: u8, interface: &str, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PayloadOutput {
                schema_id: "https://schemas.3leaps.dev/shmux/cli/v1/payload-received.schema.json",
                channel,
                interface,
                payload_size: payload.len(),
                payload: payload_preview(payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "channel={channel} interface={interface} size={} payload={}",
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => {
            use std::io::Write;
            let mut out = std::io::stdout();
            let _ = out.write_all(payload);
            let _ = out.write_all(b"\n");
            let _ = out.flush();
        }
    }
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
