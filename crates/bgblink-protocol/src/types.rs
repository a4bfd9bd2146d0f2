//! Wire frames and typed packets.
//!
//! Every BGB link message is the same 8 bytes:
//!
//! ```text
//! offset  0    1    2    3    4..8
//!        b0   b1   b2   b3   i0 (i32, little-endian)
//!       cmd  ---- data ----  timestamp / reserved
//! ```
//!
//! [`RawFrame`] is that layout with named fields. Each packet kind is a
//! typed view over the same bytes: decoding reads the kind's fields out
//! of `b1..i0`, encoding writes them back. Encoding also applies the
//! normalizations the wire format mandates (Sync1 marker bits, the Sync2
//! `b2` sentinel), so they hold no matter what the packet was built from.

use crate::{Button, Command, Defines, ProtocolError, StatusFlags};

/// Length of every frame on the wire.
pub const FRAME_LEN: usize = 8;

/// One encoded frame, ready to be queued on a connection.
pub type Frame = [u8; FRAME_LEN];

// ---------------------------------------------------------------------------
// RawFrame
// ---------------------------------------------------------------------------

/// The untyped 8-byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrame {
    /// Command byte.
    pub b0: u8,
    pub b1: u8,
    pub b2: u8,
    pub b3: u8,
    /// Timestamp for Sync1, reserved otherwise.
    pub i0: i32,
}

impl RawFrame {
    /// Builds an all-zero frame carrying `cmd`.
    pub const fn with_command(cmd: Command) -> Self {
        Self {
            b0: cmd.as_byte(),
            b1: 0,
            b2: 0,
            b3: 0,
            i0: 0,
        }
    }

    pub fn to_bytes(self) -> Frame {
        let mut buf = [0u8; FRAME_LEN];
        buf[0] = self.b0;
        buf[1] = self.b1;
        buf[2] = self.b2;
        buf[3] = self.b3;
        buf[4..8].copy_from_slice(&self.i0.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &Frame) -> Self {
        Self {
            b0: buf[0],
            b1: buf[1],
            b2: buf[2],
            b3: buf[3],
            i0: i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

// ---------------------------------------------------------------------------
// Packet kinds
// ---------------------------------------------------------------------------

/// Protocol version announcement. Sent first by both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPacket {
    pub major: u8,
    pub minor: u8,
}

impl VersionPacket {
    /// The version packet for the given constants table.
    pub const fn from_defines(defines: &Defines) -> Self {
        Self {
            major: defines.major,
            minor: defines.minor,
        }
    }

    fn to_raw(self) -> RawFrame {
        RawFrame {
            b1: self.major,
            b2: self.minor,
            ..RawFrame::with_command(Command::Version)
        }
    }

    fn from_raw(raw: &RawFrame) -> Self {
        Self {
            major: raw.b1,
            minor: raw.b2,
        }
    }
}

impl Default for VersionPacket {
    fn default() -> Self {
        Self::from_defines(&Defines::BGB_1_4)
    }
}

/// A button press or release, for remote control of an emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoypadPacket {
    pub button: Button,
    pub pressed: bool,
}

impl JoypadPacket {
    /// Bit 3 of `b1`.
    pub const PRESSED: u8 = 0x08;

    pub const fn new(button: Button, pressed: bool) -> Self {
        Self { button, pressed }
    }

    fn to_raw(self) -> RawFrame {
        let pressed = if self.pressed { Self::PRESSED } else { 0 };
        RawFrame {
            b1: pressed | self.button.bits(),
            ..RawFrame::with_command(Command::Joypad)
        }
    }

    fn from_raw(raw: &RawFrame) -> Self {
        Self {
            button: Button::from_bits(raw.b1),
            pressed: raw.b1 & Self::PRESSED != 0,
        }
    }
}

/// Serial transfer initiated by the clock master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sync1Packet {
    /// The byte shifted out of the serial register.
    pub data: u8,
    pub high_speed: bool,
    pub double_speed: bool,
    pub timestamp: i32,
}

impl Sync1Packet {
    /// Bits of `b2` that are always set on the wire.
    pub const MARKER: u8 = 0x81;
    pub const HIGH_SPEED: u8 = 0x02;
    pub const DOUBLE_SPEED: u8 = 0x04;

    fn to_raw(self) -> RawFrame {
        let mut control = Self::MARKER;
        if self.high_speed {
            control |= Self::HIGH_SPEED;
        }
        if self.double_speed {
            control |= Self::DOUBLE_SPEED;
        }
        RawFrame {
            b1: self.data,
            b2: control,
            i0: self.timestamp,
            ..RawFrame::with_command(Command::Sync1)
        }
    }

    fn from_raw(raw: &RawFrame) -> Self {
        Self {
            data: raw.b1,
            high_speed: raw.b2 & Self::HIGH_SPEED != 0,
            double_speed: raw.b2 & Self::DOUBLE_SPEED != 0,
            timestamp: raw.i0,
        }
    }
}

/// Serial transfer answer from the clock slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sync2Packet {
    pub data: u8,
}

impl Sync2Packet {
    /// Value `b2` is forced to on the wire.
    pub const CONTROL: u8 = 0x80;

    fn to_raw(self) -> RawFrame {
        RawFrame {
            b1: self.data,
            b2: Self::CONTROL,
            ..RawFrame::with_command(Command::Sync2)
        }
    }

    fn from_raw(raw: &RawFrame) -> Self {
        Self { data: raw.b1 }
    }
}

/// Timing synchronization.
///
/// BGB uses `b2` to tell an acknowledgement from a timestamp update and
/// `i0` for the timestamp. The fields are kept as received so a relayed
/// or re-encoded frame carries the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sync3Packet {
    pub b1: u8,
    pub b2: u8,
    pub b3: u8,
    pub i0: i32,
}

impl Sync3Packet {
    fn to_raw(self) -> RawFrame {
        RawFrame {
            b1: self.b1,
            b2: self.b2,
            b3: self.b3,
            i0: self.i0,
            ..RawFrame::with_command(Command::Sync3)
        }
    }

    fn from_raw(raw: &RawFrame) -> Self {
        Self {
            b1: raw.b1,
            b2: raw.b2,
            b3: raw.b3,
            i0: raw.i0,
        }
    }
}

/// Runtime state and capabilities of the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusPacket {
    pub status: StatusFlags,
}

impl StatusPacket {
    pub const fn new(status: StatusFlags) -> Self {
        Self { status }
    }

    fn to_raw(self) -> RawFrame {
        RawFrame {
            b1: self.status.bits(),
            ..RawFrame::with_command(Command::Status)
        }
    }

    fn from_raw(raw: &RawFrame) -> Self {
        Self {
            status: StatusFlags::from_bits(raw.b1),
        }
    }
}

/// The sender is about to close the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WantDisconnectPacket;

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// Any decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Version(VersionPacket),
    Joypad(JoypadPacket),
    Sync1(Sync1Packet),
    Sync2(Sync2Packet),
    Sync3(Sync3Packet),
    Status(StatusPacket),
    WantDisconnect(WantDisconnectPacket),
}

impl Packet {
    /// The command byte this packet is sent with.
    pub fn command(&self) -> Command {
        match self {
            Self::Version(_) => Command::Version,
            Self::Joypad(_) => Command::Joypad,
            Self::Sync1(_) => Command::Sync1,
            Self::Sync2(_) => Command::Sync2,
            Self::Sync3(_) => Command::Sync3,
            Self::Status(_) => Command::Status,
            Self::WantDisconnect(_) => Command::WantDisconnect,
        }
    }

    /// Re-derives the raw bytes from the typed fields.
    pub fn to_raw(&self) -> RawFrame {
        match *self {
            Self::Version(p) => p.to_raw(),
            Self::Joypad(p) => p.to_raw(),
            Self::Sync1(p) => p.to_raw(),
            Self::Sync2(p) => p.to_raw(),
            Self::Sync3(p) => p.to_raw(),
            Self::Status(p) => p.to_raw(),
            Self::WantDisconnect(_) => {
                RawFrame::with_command(Command::WantDisconnect)
            }
        }
    }

    /// Encodes to exactly [`FRAME_LEN`] bytes.
    pub fn encode(&self) -> Frame {
        self.to_raw().to_bytes()
    }

    /// Reads the typed view out of a raw frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownCommand`] if `b0` is not a known
    /// command.
    pub fn from_raw(raw: &RawFrame) -> Result<Self, ProtocolError> {
        let packet = match Command::from_byte(raw.b0)? {
            Command::Version => Self::Version(VersionPacket::from_raw(raw)),
            Command::Joypad => Self::Joypad(JoypadPacket::from_raw(raw)),
            Command::Sync1 => Self::Sync1(Sync1Packet::from_raw(raw)),
            Command::Sync2 => Self::Sync2(Sync2Packet::from_raw(raw)),
            Command::Sync3 => Self::Sync3(Sync3Packet::from_raw(raw)),
            Command::Status => Self::Status(StatusPacket::from_raw(raw)),
            Command::WantDisconnect => {
                Self::WantDisconnect(WantDisconnectPacket)
            }
        };
        Ok(packet)
    }
}

impl From<VersionPacket> for Packet {
    fn from(p: VersionPacket) -> Self {
        Self::Version(p)
    }
}

impl From<JoypadPacket> for Packet {
    fn from(p: JoypadPacket) -> Self {
        Self::Joypad(p)
    }
}

impl From<Sync1Packet> for Packet {
    fn from(p: Sync1Packet) -> Self {
        Self::Sync1(p)
    }
}

impl From<Sync2Packet> for Packet {
    fn from(p: Sync2Packet) -> Self {
        Self::Sync2(p)
    }
}

impl From<Sync3Packet> for Packet {
    fn from(p: Sync3Packet) -> Self {
        Self::Sync3(p)
    }
}

impl From<StatusPacket> for Packet {
    fn from(p: StatusPacket) -> Self {
        Self::Status(p)
    }
}

impl From<WantDisconnectPacket> for Packet {
    fn from(p: WantDisconnectPacket) -> Self {
        Self::WantDisconnect(p)
    }
}
