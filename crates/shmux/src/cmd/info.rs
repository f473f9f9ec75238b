use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use shmux_core::{AUTOSUSPEND_DELAY, BUFFER_SIZE, MAX_TX_PAYLOAD, NUM_DESC, WAKEUP_TIMEOUT};
use shmux_frame::{ChannelId, HEADER_SIZE, MAGIC};

use crate::cmd::InfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct ChannelInfo {
    id: u8,
    interface: String,
}

#[derive(Serialize)]
struct InfoOutput {
    schema_id: &'static str,
    magic: String,
    header_size: usize,
    ring_slots: usize,
    buffer_size: usize,
    max_tx_payload: usize,
    autosuspend_delay_ms: u128,
    wakeup_timeout_ms: u128,
    channels: Vec<ChannelInfo>,
}

pub fn run(_args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let out = InfoOutput {
        schema_id: "https://schemas.3leaps.dev/shmux/cli/v1/protocol-info.schema.json",
        magic: format!("{MAGIC:#06x}"),
        header_size: HEADER_SIZE,
        ring_slots: NUM_DESC,
        buffer_size: BUFFER_SIZE,
        max_tx_payload: MAX_TX_PAYLOAD,
        autosuspend_delay_ms: AUTOSUSPEND_DELAY.as_millis(),
        wakeup_timeout_ms: WAKEUP_TIMEOUT.as_millis(),
        channels: ChannelId::all()
            .map(|channel| ChannelInfo {
                id: channel.raw(),
                interface: channel.interface_name(),
            })
            .collect(),
    };

    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PARAMETER", "VALUE"])
                .add_row(vec!["magic".to_string(), out.magic.clone()])
                .add_row(vec!["header_size".to_string(), out.header_size.to_string()])
                .add_row(vec!["ring_slots".to_string(), out.ring_slots.to_string()])
                .add_row(vec!["buffer_size".to_string(), out.buffer_size.to_string()])
                .add_row(vec![
                    "max_tx_payload".to_string(),
                    out.max_tx_payload.to_string(),
                ])
                .add_row(vec![
                    "autosuspend_delay_ms".to_string(),
                    out.autosuspend_delay_ms.to_string(),
                ])
                .add_row(vec![
                    "wakeup_timeout_ms".to_string(),
                    out.wakeup_timeout_ms.to_string(),
                ]);
            println!("{table}");

            let mut channels = Table::new();
            channels
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "INTERFACE"]);
            for channel in &out.channels {
                channels.add_row(vec![channel.id.to_string(), channel.interface.clone()]);
            }
            println!("{channels}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("Protocol:");
            println!("  Magic:            {}", out.magic);
            println!("  Header size:      {} bytes", out.header_size);
            println!("  Ring slots:       {}", out.ring_slots);
            println!("  Buffer size:      {} bytes", out.buffer_size);
            println!("  Max tx payload:   {} bytes", out.max_tx_payload);
            println!("  Autosuspend:      {} ms", out.autosuspend_delay_ms);
            println!("  Wakeup timeout:   {} ms", out.wakeup_timeout_ms);
            let chans = out
                .channels
                .iter()
                .map(|c| format!("{} ({})", c.interface, c.id))
                .collect::<Vec<_>>()
                .join(", ");
            println!("  Channels:         {chans}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_covers_full_channel_table() {
        let channels: Vec<ChannelInfo> = ChannelId::all()
            .map(|channel| ChannelInfo {
                id: channel.raw(),
                interface: channel.interface_name(),
            })
            .collect();

        assert_eq!(channels.len(), 9);
        assert_eq!(channels[0].interface, "mux0");
        assert_eq!(channels[8].interface, "muxalt0");
    }
}
