//! The fixed channel-id space.
//!
//! Channel ids are a small closed set fixed at compile time: eight ordinary
//! data channels plus one alternate-transport channel. The raw byte in the
//! frame header indexes into this set; anything past it is out of range and
//! dropped by the demultiplexer.

/// Number of ordinary data channels.
pub const NUM_DATA_CHANNELS: u8 = 8;

/// Total number of channels (data channels + the alternate-transport channel).
pub const NUM_CHANNELS: u8 = NUM_DATA_CHANNELS + 1;

/// A validated channel id.
///
/// `Data(n)` is only constructed with `n < NUM_DATA_CHANNELS`; use
/// [`ChannelId::from_raw`] or [`ChannelId::data`] rather than building the
/// variant directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Ordinary data channel 0..=7.
    Data(u8),
    /// The alternate-transport data channel.
    Alternate,
}

impl ChannelId {
    /// Parse a raw header byte into a channel id.
    ///
    /// Returns `None` for ids outside the fixed channel space.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            n if n < NUM_DATA_CHANNELS => Some(ChannelId::Data(n)),
            n if n == NUM_DATA_CHANNELS => Some(ChannelId::Alternate),
            _ => None,
        }
    }

    /// Checked constructor for an ordinary data channel.
    pub fn data(n: u8) -> Option<Self> {
        (n < NUM_DATA_CHANNELS).then_some(ChannelId::Data(n))
    }

    /// The raw byte carried in the frame header.
    pub fn raw(self) -> u8 {
        match self {
            ChannelId::Data(n) => n,
            ChannelId::Alternate => NUM_DATA_CHANNELS,
        }
    }

    /// Index into the fixed channel table.
    pub fn index(self) -> usize {
        self.raw() as usize
    }

    /// Interface name for the channel's presentation handle.
    pub fn interface_name(self) -> String {
        match self {
            ChannelId::Data(n) => format!("mux{n}"),
            ChannelId::Alternate => "muxalt0".to_string(),
        }
    }

    /// Iterate over every channel id in table order.
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (0..NUM_CHANNELS).filter_map(ChannelId::from_raw)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_within_range() {
        for raw in 0..NUM_CHANNELS {
            let id = ChannelId::from_raw(raw).expect("id in range");
            assert_eq!(id.raw(), raw);
            assert_eq!(id.index(), raw as usize);
        }
    }

    #[test]
    fn out_of_range_rejected() {
        assert_eq!(ChannelId::from_raw(NUM_CHANNELS), None);
        assert_eq!(ChannelId::from_raw(0xff), None);
        assert_eq!(ChannelId::data(NUM_DATA_CHANNELS), None);
    }

    #[test]
    fn alternate_is_last_slot() {
        assert_eq!(ChannelId::Alternate.index(), NUM_DATA_CHANNELS as usize);
        assert_eq!(
            ChannelId::from_raw(NUM_DATA_CHANNELS),
            Some(ChannelId::Alternate)
        );
    }

    #[test]
    fn interface_names() {
        assert_eq!(ChannelId::Data(0).interface_name(), "mux0");
        assert_eq!(ChannelId::Data(7).interface_name(), "mux7");
        assert_eq!(ChannelId::Alternate.interface_name(), "muxalt0");
    }

    #[test]
    fn all_covers_table() {
        let ids: Vec<_> = ChannelId::all().collect();
        assert_eq!(ids.len(), NUM_CHANNELS as usize);
        assert_eq!(ids.last(), Some(&ChannelId::Alternate));
    }
}
