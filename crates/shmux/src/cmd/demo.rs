//! Self-contained loopback demo.
//!
//! Plays both sides of the link in one process: a background thread scripts
//! the remote co-processor (answers the wakeup vote, opens the channel,
//! echoes every payload), while the main thread drives the host-side
//! multiplexer through a full wake/transmit/suspend cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use shmux_core::{ChannelHandle, Mux, NetAdapter, RegistrationError};
use shmux_frame::{decode_frame, encode_frame, ChannelId, Command};
use shmux_link::{LoopbackLink, RemoteHandle};
use tracing::info;

use crate::cmd::DemoArgs;
use crate::exit::{mux_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{self, OutputFormat};

const DEMO_TIMEOUT: Duration = Duration::from_secs(5);

struct PrintingAdapter {
    format: OutputFormat,
    received: AtomicUsize,
}

impl NetAdapter for PrintingAdapter {
    fn channel_available(&self, handle: &Arc<ChannelHandle>) -> Result<(), RegistrationError> {
        info!(interface = handle.name(), "interface up");
        Ok(())
    }

    fn channel_unavailable(&self, handle: &Arc<ChannelHandle>) {
        info!(interface = handle.name(), "interface down");
    }

    fn deliver(&self, handle: &Arc<ChannelHandle>, payload: Bytes) {
        output::print_payload(
            handle.channel().raw(),
            handle.name(),
            &payload,
            self.format,
        );
        self.received.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Serialize)]
struct DemoOutput {
    schema_id: &'static str,
    channel: u8,
    interface: String,
    sent: usize,
    echoed: usize,
}

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let channel = ChannelId::data(args.channel).ok_or_else(|| {
        CliError::new(USAGE, format!("data channel out of range: {}", args.channel))
    })?;

    let (link, remote) = LoopbackLink::new();
    let adapter = Arc::new(PrintingAdapter {
        format,
        received: AtomicUsize::new(0),
    });
    let mux = Mux::new(link.clone(), adapter.clone());
    link.register_events(mux.clone());
    mux.start();

    let servicer = spawn_remote(remote.clone(), channel, args.count);

    // The wakeup handshake runs here; the scripted remote answers it.
    mux.resume().map_err(|err| mux_error("wakeup", err))?;

    let handle = wait_for_channel(&mux, channel)?;
    for i in 1..=args.count {
        let payload = format!("{} {i}", args.payload);
        handle
            .transmit(payload.as_bytes())
            .map_err(|err| mux_error("transmit", err))?;
    }

    wait_for_echoes(&adapter, args.count)?;

    // Withdraw the vote; the remote acks and drops the power-state line.
    mux.suspend();
    servicer
        .join()
        .map_err(|_| CliError::new(INTERNAL, "remote servicer panicked"))?;
    mux.shutdown();

    print_summary(
        &DemoOutput {
            schema_id: "https://schemas.3leaps.dev/shmux/cli/v1/demo-result.schema.json",
            channel: channel.raw(),
            interface: channel.interface_name(),
            sent: args.count,
            echoed: adapter.received.load(Ordering::SeqCst),
        },
        format,
    );
    Ok(SUCCESS)
}

/// Script the remote co-processor for one demo run.
fn spawn_remote(remote: RemoteHandle, channel: ChannelId, count: usize) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if !remote.wait_vote(true, DEMO_TIMEOUT) {
            return;
        }
        remote.set_power_state(true);
        remote.ack();
        if !deliver_control(&remote, channel, Command::Open) {
            return;
        }

        // Echo every transmitted payload back on the same channel.
        for i in 1..=count {
            if !remote.wait_sent(i, DEMO_TIMEOUT) {
                return;
            }
            let frames = remote.sent_frames();
            let Ok((_, payload)) = decode_frame(&frames[i - 1]) else {
                return;
            };
            let mut echo = BytesMut::new();
            if encode_frame(channel, Command::Data, payload, &mut echo).is_err() {
                return;
            }
            remote.deliver(&echo);
        }

        deliver_control(&remote, channel, Command::Close);
        if remote.wait_vote(false, DEMO_TIMEOUT) {
            remote.ack();
            remote.set_power_state(false);
        }
    })
}

fn deliver_control(remote: &RemoteHandle, channel: ChannelId, command: Command) -> bool {
    let mut frame = BytesMut::new();
    if encode_frame(channel, command, b"", &mut frame).is_err() {
        return false;
    }
    remote.deliver(&frame)
}

fn wait_for_channel(mux: &Arc<Mux>, channel: ChannelId) -> CliResult<Arc<ChannelHandle>> {
    let deadline = Instant::now() + DEMO_TIMEOUT;
    loop {
        if let Some(handle) = mux.channel(channel) {
            if handle.is_attached() {
                return Ok(handle);
            }
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(INTERNAL, "remote never opened the channel"));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn wait_for_echoes(adapter: &PrintingAdapter, count: usize) -> CliResult<()> {
    let deadline = Instant::now() + DEMO_TIMEOUT;
    while adapter.received.load(Ordering::SeqCst) < count {
        if Instant::now() >= deadline {
            return Err(CliError::new(INTERNAL, "remote stopped echoing"));
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

fn print_summary(out: &DemoOutput, format: OutputFormat) {
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
                .set_header(vec!["CHANNEL", "INTERFACE", "SENT", "ECHOED"])
                .add_row(vec![
                    out.channel.to_string(),
                    out.interface.clone(),
                    out.sent.to_string(),
                    out.echoed.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "channel={} interface={} sent={} echoed={}",
                out.channel, out.interface, out.sent, out.echoed
            );
        }
    }
}
