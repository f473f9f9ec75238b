//! Channel open/close lifecycle and receive-path dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use shmux_core::{
    ChannelHandle, Mux, MuxError, NetAdapter, RegistrationError, MAX_TX_PAYLOAD,
};
use shmux_frame::{encode_frame, ChannelId, Command};
use shmux_link::{LoopbackLink, RemoteHandle};

#[derive(Debug, PartialEq)]
enum Event {
    Available(ChannelId),
    Unavailable(ChannelId),
    Data(ChannelId, Vec<u8>),
}

#[derive(Default)]
struct RecordingAdapter {
    events: Mutex<Vec<Event>>,
    reject_next: AtomicBool,
}

impl NetAdapter for RecordingAdapter {
    fn channel_available(&self, handle: &Arc<ChannelHandle>) -> Result<(), RegistrationError> {
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(RegistrationError("no device slot".to_string()));
        }
        self.events
            .lock()
            .unwrap()
            .push(Event::Available(handle.channel()));
        Ok(())
    }

    fn channel_unavailable(&self, handle: &Arc<ChannelHandle>) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Unavailable(handle.channel()));
    }

    fn deliver(&self, handle: &Arc<ChannelHandle>, payload: Bytes) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Data(handle.channel(), payload.to_vec()));
    }
}

fn setup() -> (Arc<Mux>, RemoteHandle, Arc<RecordingAdapter>) {
    let (link, remote) = LoopbackLink::new();
    let adapter = Arc::new(RecordingAdapter::default());
    let mux = Mux::new(link.clone(), adapter.clone());
    link.register_events(mux.clone());
    mux.start();
    remote.set_power_state(true);
    assert!(mux.is_up());
    (mux, remote, adapter)
}

fn frame(channel: ChannelId, command: Command, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_frame(channel, command, payload, &mut buf).unwrap();
    buf
}

fn drain(adapter: &RecordingAdapter) -> Vec<Event> {
    std::mem::take(&mut *adapter.events.lock().unwrap())
}

#[test]
fn open_registers_channel_once() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(3).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    // Duplicate OPEN is a protocol error with no state change.
    assert!(remote.deliver(&frame(channel, Command::Open, b"")));

    assert_eq!(drain(&adapter), vec![Event::Available(channel)]);
    let handle = mux.channel(channel).expect("handle registered");
    assert!(handle.is_attached());
    assert_eq!(handle.name(), "mux3");

    mux.shutdown();
}

#[test]
fn alternate_channel_has_its_own_name() {
    let (mux, remote, adapter) = setup();

    assert!(remote.deliver(&frame(ChannelId::Alternate, Command::Open, b"")));

    assert_eq!(drain(&adapter), vec![Event::Available(ChannelId::Alternate)]);
    assert_eq!(mux.channel(ChannelId::Alternate).unwrap().name(), "muxalt0");

    mux.shutdown();
}

#[test]
fn close_detaches_exactly_once() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(0).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    assert!(remote.deliver(&frame(channel, Command::Close, b"")));
    // Duplicate CLOSE is a protocol error with no further callback.
    assert!(remote.deliver(&frame(channel, Command::Close, b"")));

    assert_eq!(
        drain(&adapter),
        vec![Event::Available(channel), Event::Unavailable(channel)]
    );
    let handle = mux.channel(channel).expect("handle survives close");
    assert!(!handle.is_attached());
    assert!(matches!(
        handle.transmit(b"late"),
        Err(MuxError::NotReady(_))
    ));

    mux.shutdown();
}

#[test]
fn close_without_open_changes_nothing() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(5).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Close, b"")));

    assert!(drain(&adapter).is_empty());
    assert!(mux.channel(channel).is_none());

    mux.shutdown();
}

#[test]
fn reopen_reattaches_the_same_handle() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(2).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    let first = mux.channel(channel).unwrap();
    assert!(remote.deliver(&frame(channel, Command::Close, b"")));
    assert!(remote.deliver(&frame(channel, Command::Open, b"")));

    let second = mux.channel(channel).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.is_attached());
    assert_eq!(
        drain(&adapter),
        vec![
            Event::Available(channel),
            Event::Unavailable(channel),
            Event::Available(channel),
        ]
    );

    mux.shutdown();
}

#[test]
fn data_delivered_with_padding_stripped() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(1).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    // 5 payload bytes travel with 3 pad bytes; the adapter sees 5.
    assert!(remote.deliver(&frame(channel, Command::Data, b"hello")));

    assert_eq!(
        drain(&adapter),
        vec![
            Event::Available(channel),
            Event::Data(channel, b"hello".to_vec()),
        ]
    );

    mux.shutdown();
}

#[test]
fn data_on_closed_channel_silently_dropped() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(4).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    assert!(remote.deliver(&frame(channel, Command::Close, b"")));
    assert!(remote.deliver(&frame(channel, Command::Data, b"stale")));

    let events = drain(&adapter);
    assert!(!events.iter().any(|e| matches!(e, Event::Data(..))));

    mux.shutdown();
}

#[test]
fn data_on_never_opened_channel_silently_dropped() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(6).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Data, b"orphan")));

    assert!(drain(&adapter).is_empty());
    assert!(mux.channel(channel).is_none());

    mux.shutdown();
}

#[test]
fn bad_magic_drops_the_buffer() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(0).unwrap();

    let mut buf = frame(channel, Command::Open, b"");
    buf[0] ^= 0xff;
    assert!(remote.deliver(&buf));

    assert!(drain(&adapter).is_empty());
    assert!(mux.channel(channel).is_none());

    mux.shutdown();
}

#[test]
fn out_of_range_channel_is_ignored() {
    let (mux, remote, adapter) = setup();

    for raw in [9u8, 42, 0xff] {
        let mut buf = frame(ChannelId::data(0).unwrap(), Command::Open, b"");
        buf[5] = raw;
        assert!(remote.deliver(&buf));
    }

    assert!(drain(&adapter).is_empty());

    mux.shutdown();
}

#[test]
fn unknown_command_is_ignored() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(7).unwrap();

    let mut buf = frame(channel, Command::Open, b"");
    buf[3] = 0x77;
    assert!(remote.deliver(&buf));

    assert!(drain(&adapter).is_empty());
    assert!(mux.channel(channel).is_none());

    mux.shutdown();
}

#[test]
fn registration_failure_leaves_slot_empty() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(3).unwrap();

    adapter.reject_next.store(true, Ordering::SeqCst);
    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    assert!(mux.channel(channel).is_none());

    // A later OPEN retries registration from scratch.
    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    assert!(mux.channel(channel).unwrap().is_attached());
    assert_eq!(drain(&adapter), vec![Event::Available(channel)]);

    mux.shutdown();
}

#[test]
fn rejected_reattach_leaves_channel_detached() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(2).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    assert!(remote.deliver(&frame(channel, Command::Close, b"")));

    adapter.reject_next.store(true, Ordering::SeqCst);
    assert!(remote.deliver(&frame(channel, Command::Open, b"")));

    let handle = mux.channel(channel).expect("handle survives");
    assert!(!handle.is_attached());

    mux.shutdown();
}

#[test]
fn oversized_transmit_rejected_up_front() {
    let (mux, remote, adapter) = setup();
    let channel = ChannelId::data(0).unwrap();

    assert!(remote.deliver(&frame(channel, Command::Open, b"")));
    let handle = mux.channel(channel).unwrap();

    let payload = vec![0u8; MAX_TX_PAYLOAD + 1];
    assert!(matches!(
        handle.transmit(&payload),
        Err(MuxError::Frame(_))
    ));
    assert!(remote.sent_frames().is_empty());
    drop(drain(&adapter));

    mux.shutdown();
}

#[test]
fn shutdown_detaches_every_open_channel() {
    let (mux, remote, adapter) = setup();
    let a = ChannelId::data(0).unwrap();
    let b = ChannelId::Alternate;

    assert!(remote.deliver(&frame(a, Command::Open, b"")));
    assert!(remote.deliver(&frame(b, Command::Open, b"")));
    let handle = mux.channel(a).unwrap();

    mux.shutdown();

    let events = drain(&adapter);
    assert!(events.contains(&Event::Unavailable(a)));
    assert!(events.contains(&Event::Unavailable(b)));
    assert!(!handle.is_attached());
    assert!(matches!(handle.transmit(b"x"), Err(MuxError::NotReady(_))));
    assert!(!remote.rx_held());
    assert!(!remote.vote_level());
}
