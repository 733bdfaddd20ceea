use alloc::string::String;
use alloc::vec::Vec;

use core::time::Duration;

/// Number of ticks in one second of a Thread timestamp.
pub const TICKS_PER_SECOND: u64 = 1 << 15;

// Largest number of seconds representable in a Thread timestamp.
const MAX_SECONDS: u64 = (1 << 48) - 1;

/// Types of the dataset TLVs exposed by [`OperationalDataset`].
///
/// Any other TLV is preserved as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    /// Channel page and channel number.
    Channel = 0,
    /// PAN identifier.
    PanId = 1,
    /// Extended PAN identifier.
    ExtendedPanId = 2,
    /// Network name.
    NetworkName = 3,
    /// Pre-shared key for the commissioner.
    Pskc = 4,
    /// Network key.
    NetworkKey = 5,
    /// Mesh-local prefix.
    MeshLocalPrefix = 7,
    /// Security policy.
    SecurityPolicy = 12,
    /// Active timestamp.
    ActiveTimestamp = 14,
    /// Pending timestamp.
    PendingTimestamp = 51,
    /// Delay timer, in milliseconds.
    DelayTimer = 52,
    /// Channel mask.
    ChannelMask = 53,
}

/// Errors produced while parsing or editing an [`OperationalDataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetError {
    /// A TLV header or value is cut at the given offset.
    Truncated(usize),
    /// A TLV of a fixed-size type has the wrong length.
    InvalidLength {
        /// TLV type.
        kind: u8,
        /// Length found in the dataset.
        len: usize,
    },
    /// A TLV value does not fit in a one-byte length.
    ValueTooLong(usize),
    /// The dataset is not a valid hex string.
    InvalidHex,
}

impl core::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated(offset) => write!(f, "dataset truncated at offset {offset}"),
            Self::InvalidLength { kind, len } => {
                write!(f, "TLV of type {kind} has an invalid length of {len} bytes")
            }
            Self::ValueTooLong(len) => write!(f, "TLV value of {len} bytes is too long"),
            Self::InvalidHex => "dataset is not a valid hex string".fmt(f),
        }
    }
}

impl core::error::Error for DatasetError {}

/// A Thread timestamp.
///
/// Timestamps are ordered by seconds first and by ticks then. The
/// authoritative flag does not take part in the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    seconds: u64,
    ticks: u16,
    authoritative: bool,
}

impl Timestamp {
    /// Creates a [`Timestamp`].
    ///
    /// Seconds are clamped to 48 bits and ticks to 15 bits.
    #[must_use]
    pub const fn new(seconds: u64, ticks: u16, authoritative: bool) -> Self {
        Self {
            seconds: if seconds > MAX_SECONDS {
                MAX_SECONDS
            } else {
                seconds
            },
            ticks: if ticks as u64 >= TICKS_PER_SECOND {
                (TICKS_PER_SECOND - 1) as u16
            } else {
                ticks
            },
            authoritative,
        }
    }

    /// Returns the seconds.
    #[must_use]
    pub const fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Returns the ticks, in units of 1/32768 of a second.
    #[must_use]
    pub const fn ticks(&self) -> u16 {
        self.ticks
    }

    /// Whether the timestamp comes from an authoritative time source.
    #[must_use]
    pub const fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    /// Returns the timestamp expressed in ticks.
    #[must_use]
    pub const fn total_ticks(&self) -> u64 {
        self.seconds * TICKS_PER_SECOND + self.ticks as u64
    }

    /// Returns a copy of this timestamp advanced by `delta`.
    ///
    /// The result saturates at the largest representable timestamp.
    #[must_use]
    pub const fn advanced_by(&self, delta: TimestampDelta) -> Self {
        let total = self.total_ticks().saturating_add(delta.0);
        let seconds = total / TICKS_PER_SECOND;
        if seconds > MAX_SECONDS {
            return Self::new(MAX_SECONDS, (TICKS_PER_SECOND - 1) as u16, self.authoritative);
        }
        Self {
            seconds,
            ticks: (total % TICKS_PER_SECOND) as u16,
            authoritative: self.authoritative,
        }
    }

    const fn from_u64(raw: u64) -> Self {
        Self {
            seconds: raw >> 16,
            ticks: ((raw >> 1) & 0x7fff) as u16,
            authoritative: raw & 1 == 1,
        }
    }

    const fn to_u64(self) -> u64 {
        (self.seconds << 16) | ((self.ticks as u64) << 1) | self.authoritative as u64
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}s+{}t", self.seconds, self.ticks)
    }
}

/// A non-negative distance between two [`Timestamp`]s, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampDelta(u64);

impl TimestampDelta {
    /// An empty distance.
    pub const ZERO: Self = Self(0);

    /// Creates a [`TimestampDelta`] from a number of ticks.
    #[must_use]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Creates a [`TimestampDelta`] from a number of seconds.
    #[must_use]
    pub const fn from_secs(seconds: u64) -> Self {
        Self(seconds.saturating_mul(TICKS_PER_SECOND))
    }

    /// Returns the distance from `older` to `newer`, or
    /// [`TimestampDelta::ZERO`] when `older` is not older.
    #[must_use]
    pub const fn between(newer: Timestamp, older: Timestamp) -> Self {
        Self(newer.total_ticks().saturating_sub(older.total_ticks()))
    }

    /// Returns the distance in ticks.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.0
    }

    /// Whether the distance is empty.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the distance as a [`Duration`], rounded down to the
    /// nanosecond.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        let seconds = self.0 / TICKS_PER_SECOND;
        let ticks = self.0 % TICKS_PER_SECOND;
        Duration::new(seconds, ((ticks * 1_000_000_000) / TICKS_PER_SECOND) as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tlv {
    kind: u8,
    value: Vec<u8>,
}

/// A Thread operational dataset.
///
/// The dataset is kept as an ordered list of TLVs, so that rewriting a
/// dataset only changes the TLVs being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationalDataset {
    tlvs: Vec<Tlv>,
}

impl OperationalDataset {
    /// Creates an empty [`OperationalDataset`].
    #[must_use]
    pub const fn new() -> Self {
        Self { tlvs: Vec::new() }
    }

    /// Parses an [`OperationalDataset`] from its TLV encoding.
    ///
    /// # Errors
    ///
    /// Fails if a TLV is cut or if a timestamp or delay timer TLV does not
    /// have its fixed length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut tlvs = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let header = bytes
                .get(offset..offset + 2)
                .ok_or(DatasetError::Truncated(offset))?;
            let (kind, len) = (header[0], usize::from(header[1]));

            let value = bytes
                .get(offset + 2..offset + 2 + len)
                .ok_or(DatasetError::Truncated(offset))?;

            check_length(kind, len)?;

            tlvs.push(Tlv {
                kind,
                value: value.to_vec(),
            });
            offset += 2 + len;
        }

        Ok(Self { tlvs })
    }

    /// Parses an [`OperationalDataset`] from a hex string.
    ///
    /// # Errors
    ///
    /// Fails if the string is not valid hex or if the bytes are not a valid
    /// dataset.
    pub fn from_hex(hex: &str) -> Result<Self, DatasetError> {
        let bytes = hex::decode(hex.trim()).map_err(|_| DatasetError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }

    /// Returns the TLV encoding of the dataset.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.tlvs.iter().map(|t| 2 + t.value.len()).sum());
        for tlv in &self.tlvs {
            bytes.push(tlv.kind);
            // Lengths are checked on insertion.
            bytes.push(tlv.value.len() as u8);
            bytes.extend_from_slice(&tlv.value);
        }
        bytes
    }

    /// Returns the dataset as a lowercase hex string.
    #[must_use]
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Whether the dataset contains no TLVs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tlvs.is_empty()
    }

    /// Returns the value of the TLV with the given type.
    #[must_use]
    pub fn tlv(&self, kind: u8) -> Option<&[u8]> {
        self.tlvs
            .iter()
            .find(|tlv| tlv.kind == kind)
            .map(|tlv| tlv.value.as_slice())
    }

    /// Inserts a TLV, replacing the value of an existing TLV with the same
    /// type.
    ///
    /// # Errors
    ///
    /// Fails if the value is longer than 255 bytes or if it has the wrong
    /// length for a fixed-size type.
    pub fn insert(&mut self, kind: u8, value: &[u8]) -> Result<(), DatasetError> {
        if value.len() > usize::from(u8::MAX) {
            return Err(DatasetError::ValueTooLong(value.len()));
        }
        check_length(kind, value.len())?;

        match self.tlvs.iter_mut().find(|tlv| tlv.kind == kind) {
            Some(tlv) => tlv.value = value.to_vec(),
            None => self.tlvs.push(Tlv {
                kind,
                value: value.to_vec(),
            }),
        }
        Ok(())
    }

    /// Adds a TLV while building a dataset.
    ///
    /// # Errors
    ///
    /// See [`OperationalDataset::insert`].
    pub fn with(mut self, kind: TlvType, value: &[u8]) -> Result<Self, DatasetError> {
        self.insert(kind as u8, value)?;
        Ok(self)
    }

    /// Returns the active timestamp.
    #[must_use]
    pub fn active_timestamp(&self) -> Option<Timestamp> {
        self.timestamp(TlvType::ActiveTimestamp)
    }

    /// Sets the active timestamp.
    pub fn set_active_timestamp(&mut self, timestamp: Timestamp) {
        self.set_fixed(TlvType::ActiveTimestamp, &timestamp.to_u64().to_be_bytes());
    }

    /// Returns the pending timestamp.
    #[must_use]
    pub fn pending_timestamp(&self) -> Option<Timestamp> {
        self.timestamp(TlvType::PendingTimestamp)
    }

    /// Returns the delay timer.
    #[must_use]
    pub fn delay_timer(&self) -> Option<Duration> {
        let value = self.tlv(TlvType::DelayTimer as u8)?;
        let millis = u32::from_be_bytes(value.try_into().ok()?);
        Some(Duration::from_millis(u64::from(millis)))
    }

    /// Sets the delay timer. The delay saturates at `u32::MAX` milliseconds.
    pub fn set_delay_timer(&mut self, delay: Duration) {
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        self.set_fixed(TlvType::DelayTimer, &millis.to_be_bytes());
    }

    /// Returns the network name.
    #[must_use]
    pub fn network_name(&self) -> Option<&str> {
        core::str::from_utf8(self.tlv(TlvType::NetworkName as u8)?).ok()
    }

    /// Returns the network key.
    #[must_use]
    pub fn network_key(&self) -> Option<&[u8]> {
        self.tlv(TlvType::NetworkKey as u8)
    }

    /// Returns the PAN identifier.
    #[must_use]
    pub fn pan_id(&self) -> Option<u16> {
        let value = self.tlv(TlvType::PanId as u8)?;
        Some(u16::from_be_bytes(value.try_into().ok()?))
    }

    /// Returns the extended PAN identifier.
    #[must_use]
    pub fn extended_pan_id(&self) -> Option<[u8; 8]> {
        self.tlv(TlvType::ExtendedPanId as u8)?.try_into().ok()
    }

    /// Returns the channel number.
    #[must_use]
    pub fn channel(&self) -> Option<u16> {
        // One byte of channel page followed by the channel number.
        match self.tlv(TlvType::Channel as u8)? {
            [_page, high, low] => Some(u16::from_be_bytes([*high, *low])),
            _ => None,
        }
    }

    fn timestamp(&self, kind: TlvType) -> Option<Timestamp> {
        let value = self.tlv(kind as u8)?;
        Some(Timestamp::from_u64(u64::from_be_bytes(value.try_into().ok()?)))
    }

    fn set_fixed(&mut self, kind: TlvType, value: &[u8]) {
        match self.tlvs.iter_mut().find(|tlv| tlv.kind == kind as u8) {
            Some(tlv) => tlv.value = value.to_vec(),
            None => self.tlvs.push(Tlv {
                kind: kind as u8,
                value: value.to_vec(),
            }),
        }
    }
}

fn check_length(kind: u8, len: usize) -> Result<(), DatasetError> {
    let expected = match kind {
        k if k == TlvType::ActiveTimestamp as u8 || k == TlvType::PendingTimestamp as u8 => 8,
        k if k == TlvType::DelayTimer as u8 => 4,
        _ => return Ok(()),
    };

    if len == expected {
        Ok(())
    } else {
        Err(DatasetError::InvalidLength { kind, len })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use core::time::Duration;

    use super::{DatasetError, OperationalDataset, Timestamp, TimestampDelta, TlvType};

    pub(crate) fn dataset_with_timestamp(seconds: u64) -> OperationalDataset {
        let mut dataset = OperationalDataset::new()
            .with(TlvType::Channel, &[0, 0, 15])
            .unwrap()
            .with(TlvType::PanId, &[0x12, 0x34])
            .unwrap()
            .with(TlvType::NetworkName, b"home-mesh")
            .unwrap()
            .with(TlvType::NetworkKey, &[0x11; 16])
            .unwrap();
        dataset.set_active_timestamp(Timestamp::new(seconds, 0, false));
        dataset
    }

    #[test]
    fn parse_known_tlvs() {
        let dataset = dataset_with_timestamp(1);
        let parsed = OperationalDataset::from_hex(&dataset.to_hex()).unwrap();

        assert_eq!(parsed, dataset);
        assert_eq!(parsed.channel(), Some(15));
        assert_eq!(parsed.pan_id(), Some(0x1234));
        assert_eq!(parsed.network_name(), Some("home-mesh"));
        assert_eq!(parsed.network_key(), Some([0x11; 16].as_slice()));
        assert_eq!(parsed.active_timestamp(), Some(Timestamp::new(1, 0, false)));
        assert_eq!(parsed.delay_timer(), None);
    }

    #[test]
    fn timestamp_bit_layout() {
        // Seconds in the upper 48 bits, ticks in the next 15, flag in the
        // lowest bit.
        let bytes = [14, 8, 0, 0, 0, 0, 0, 2, 0x00, 0x03];
        let dataset = OperationalDataset::from_bytes(&bytes).unwrap();
        assert_eq!(dataset.active_timestamp(), Some(Timestamp::new(2, 1, true)));

        let mut rewritten = OperationalDataset::new();
        rewritten.set_active_timestamp(Timestamp::new(2, 1, true));
        assert_eq!(rewritten.to_bytes(), bytes);
    }

    #[test]
    fn unknown_tlvs_are_preserved_in_order() {
        let bytes = [0x4a, 2, 0xde, 0xad, 3, 1, b'x'];
        let mut dataset = OperationalDataset::from_bytes(&bytes).unwrap();
        assert_eq!(dataset.tlv(0x4a), Some([0xde, 0xad].as_slice()));
        assert_eq!(dataset.to_bytes(), bytes);

        dataset.set_delay_timer(Duration::from_secs(60));
        assert_eq!(dataset.delay_timer(), Some(Duration::from_secs(60)));
        assert_eq!(
            &dataset.to_bytes()[..7],
            &bytes,
            "existing TLVs must not move"
        );
        assert_eq!(&dataset.to_bytes()[7..], &[52, 4, 0, 0, 0xea, 0x60]);
    }

    #[test]
    fn malformed_datasets() {
        assert_eq!(
            OperationalDataset::from_bytes(&[3]),
            Err(DatasetError::Truncated(0))
        );
        assert_eq!(
            OperationalDataset::from_bytes(&[3, 1, b'a', 5, 16, 0]),
            Err(DatasetError::Truncated(3))
        );
        assert_eq!(
            OperationalDataset::from_bytes(&[14, 4, 0, 0, 0, 1]),
            Err(DatasetError::InvalidLength { kind: 14, len: 4 })
        );
        assert_eq!(
            OperationalDataset::from_hex("0e0"),
            Err(DatasetError::InvalidHex)
        );

        let mut dataset = OperationalDataset::new();
        assert_eq!(
            dataset.insert(0x4a, &[0; 256]),
            Err(DatasetError::ValueTooLong(256))
        );
    }

    #[test]
    fn timestamp_arithmetic() {
        let older = Timestamp::new(10, 32_000, false);
        let newer = Timestamp::new(12, 100, false);

        let delta = TimestampDelta::between(newer, older);
        assert_eq!(delta.ticks(), 2 * 32_768 + 100 - 32_000);
        assert_eq!(older.advanced_by(delta), newer);
        assert_eq!(TimestampDelta::between(older, newer), TimestampDelta::ZERO);

        assert_eq!(
            TimestampDelta::from_secs(3).as_duration(),
            Duration::from_secs(3)
        );
        assert_eq!(
            TimestampDelta::from_ticks(16_384).as_duration(),
            Duration::from_millis(500)
        );
    }
}
