//! Wire formats for the smartgrid protocol.
//!
//! This library provides:
//! - `PowerTier`: the four discrete power allocations clients may hold
//! - Request frame codec (client -> coordinator, fixed 16 bytes)
//! - Grant frame codec (coordinator -> broadcast, variable, <= 1472 bytes)
//!
//! Field-level validation of inbound requests (tick counts, tier values) is
//! the ingestion layer's job; the codec only enforces frame structure.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Wire-level errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Frame length or structure does not match the protocol.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Too many clients to fit in a single grant datagram.
    #[error("cannot encode {clients} clients in one grant frame (max {max})")]
    CapacityExceeded { clients: usize, max: usize },
}

// ============================================================================
// Power tiers
// ============================================================================

/// One of the four discrete power allocations a client may request or hold.
///
/// Tiers are watt quantities: `Both` means both circuits energized at once,
/// so its wattage is the sum of `Low` and `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PowerTier {
    /// No power allocated.
    #[default]
    Off,
    /// Low-power circuit only (40 W).
    Low,
    /// High-power circuit only (60 W).
    High,
    /// Both circuits (100 W).
    Both,
}

impl PowerTier {
    /// Wattage drawn at this tier.
    pub fn watts(self) -> i32 {
        match self {
            PowerTier::Off => 0,
            PowerTier::Low => 40,
            PowerTier::High => 60,
            PowerTier::Both => 100,
        }
    }

    /// Map a wattage back to a tier. Returns `None` for unrecognized values.
    pub fn from_watts(watts: i32) -> Option<Self> {
        match watts {
            0 => Some(PowerTier::Off),
            40 => Some(PowerTier::Low),
            60 => Some(PowerTier::High),
            100 => Some(PowerTier::Both),
            _ => None,
        }
    }
}

impl std::fmt::Display for PowerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PowerTier::Off => "off",
            PowerTier::Low => "low",
            PowerTier::High => "high",
            PowerTier::Both => "both",
        };
        write!(f, "{} ({}W)", name, self.watts())
    }
}

// ============================================================================
// Request frames (client -> coordinator)
// ============================================================================

/// Fixed size of a request datagram in bytes.
pub const REQUEST_FRAME_LEN: usize = 16;

/// A decoded request frame.
///
/// Tier and tick values are carried raw; a request for an unrecognized tier
/// or a non-positive tick count is `InvalidRequest` territory and is decided
/// at ingestion, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    /// Client clock at send time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,

    /// Requested tier in watts.
    pub tier_watts: i32,

    /// Number of future ticks the request asks to be honored for.
    pub ticks_requested: i32,
}

/// Encode a request frame.
pub fn encode_request(frame: &RequestFrame) -> Bytes {
    let mut buf = BytesMut::with_capacity(REQUEST_FRAME_LEN);
    buf.put_i64(frame.timestamp_ms);
    buf.put_i32(frame.tier_watts);
    buf.put_i32(frame.ticks_requested);
    buf.freeze()
}

/// Decode a request frame. Any length other than [`REQUEST_FRAME_LEN`] is
/// rejected as malformed.
pub fn decode_request(data: &[u8]) -> Result<RequestFrame, WireError> {
    if data.len() != REQUEST_FRAME_LEN {
        return Err(WireError::MalformedPacket(format!(
            "request frame is {} bytes, expected {}",
            data.len(),
            REQUEST_FRAME_LEN
        )));
    }
    let mut buf = data;
    Ok(RequestFrame {
        timestamp_ms: buf.get_i64(),
        tier_watts: buf.get_i32(),
        ticks_requested: buf.get_i32(),
    })
}

// ============================================================================
// Grant frames (coordinator -> broadcast)
// ============================================================================

/// Largest grant datagram that avoids IP fragmentation on Ethernet.
pub const GRANT_FRAME_MAX: usize = 1472;

/// Bytes per client segment (IPv4 address + granted watts + ticks remaining).
const GRANT_SEGMENT_LEN: usize = 12;

/// Server timestamp preceding the client segments.
const GRANT_HEADER_LEN: usize = 8;

/// All-0xFF terminator marking the end of real segments.
const GRANT_TERMINATOR_LEN: usize = 4;

/// Filler byte used when padding a grant frame out to [`GRANT_FRAME_MAX`].
pub const GRANT_PAD_BYTE: u8 = 0x55;

/// Maximum number of client segments in one grant frame.
pub const MAX_GRANT_CLIENTS: usize =
    (GRANT_FRAME_MAX - GRANT_HEADER_LEN - GRANT_TERMINATOR_LEN) / GRANT_SEGMENT_LEN;

/// One client's slice of a grant frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantEntry {
    /// Client the grant applies to.
    pub addr: Ipv4Addr,

    /// Tier the client may draw until the next grant frame.
    pub granted: PowerTier,

    /// Ticks of life left on the client's head request (0 when idle).
    pub ticks_remaining: u32,
}

/// A decoded grant frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantFrame {
    /// Coordinator clock at send time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,

    /// Per-client grants, in the coordinator's ledger order.
    pub entries: Vec<GrantEntry>,
}

impl GrantFrame {
    /// Look up the grant addressed to `addr`, if present.
    pub fn entry_for(&self, addr: Ipv4Addr) -> Option<&GrantEntry> {
        self.entries.iter().find(|e| e.addr == addr)
    }
}

/// Encode a grant frame.
///
/// When `pad` is set, the frame is filled out to [`GRANT_FRAME_MAX`] with
/// [`GRANT_PAD_BYTE`] after the terminator, matching the padded protocol
/// variant. Frames that would exceed the datagram bound fail with
/// [`WireError::CapacityExceeded`]; fragmentation is never attempted.
pub fn encode_grant(
    timestamp_ms: i64,
    entries: &[GrantEntry],
    pad: bool,
) -> Result<Bytes, WireError> {
    if entries.len() > MAX_GRANT_CLIENTS {
        return Err(WireError::CapacityExceeded {
            clients: entries.len(),
            max: MAX_GRANT_CLIENTS,
        });
    }
    let mut buf = BytesMut::with_capacity(if pad {
        GRANT_FRAME_MAX
    } else {
        GRANT_HEADER_LEN + entries.len() * GRANT_SEGMENT_LEN + GRANT_TERMINATOR_LEN
    });
    buf.put_i64(timestamp_ms);
    for entry in entries {
        buf.put_slice(&entry.addr.octets());
        buf.put_i32(entry.granted.watts());
        buf.put_i32(entry.ticks_remaining as i32);
    }
    buf.put_bytes(0xFF, GRANT_TERMINATOR_LEN);
    if pad {
        buf.put_bytes(GRANT_PAD_BYTE, GRANT_FRAME_MAX - buf.len());
    }
    Ok(buf.freeze())
}

/// Decode a grant frame, padded or not.
///
/// Segments are read until the 0xFF terminator; anything after it is ignored.
/// A frame with no terminator, a truncated segment, or garbage field values
/// is rejected as malformed.
pub fn decode_grant(data: &[u8]) -> Result<GrantFrame, WireError> {
    if data.len() < GRANT_HEADER_LEN + GRANT_TERMINATOR_LEN {
        return Err(WireError::MalformedPacket(format!(
            "grant frame is {} bytes, too short for header and terminator",
            data.len()
        )));
    }
    if data.len() > GRANT_FRAME_MAX {
        return Err(WireError::MalformedPacket(format!(
            "grant frame is {} bytes, exceeds {}",
            data.len(),
            GRANT_FRAME_MAX
        )));
    }
    let mut buf = data;
    let timestamp_ms = buf.get_i64();
    let mut entries = Vec::new();
    loop {
        if buf.remaining() < GRANT_TERMINATOR_LEN {
            return Err(WireError::MalformedPacket(
                "grant frame has no terminator".to_string(),
            ));
        }
        // A client address can never start with 0xFF (that octet range is
        // broadcast space), so the first terminator byte is unambiguous.
        if buf.chunk()[0] == 0xFF {
            break;
        }
        if buf.remaining() < GRANT_SEGMENT_LEN {
            return Err(WireError::MalformedPacket(
                "grant frame ends mid-segment".to_string(),
            ));
        }
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets);
        let watts = buf.get_i32();
        let ticks = buf.get_i32();
        let granted = PowerTier::from_watts(watts).ok_or_else(|| {
            WireError::MalformedPacket(format!("unrecognized tier value {watts}"))
        })?;
        if ticks < 0 {
            return Err(WireError::MalformedPacket(format!(
                "negative ticks remaining {ticks}"
            )));
        }
        entries.push(GrantEntry {
            addr: Ipv4Addr::from(octets),
            granted,
            ticks_remaining: ticks as u32,
        });
    }
    Ok(GrantFrame {
        timestamp_ms,
        entries,
    })
}
