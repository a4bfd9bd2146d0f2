//! Protocol constants.
//!
//! Command bytes, button numbers and status bits are fixed by the BGB
//! link protocol, so they live in types ([`Command`], [`Button`],
//! [`StatusFlags`]). The values an implementation *chooses* (the
//! protocol version it speaks and the status bits it advertises) live
//! in [`Defines`], an immutable table handed to the codec and the
//! dispatcher when they are built.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// The command byte (`b0`) of a frame.
///
/// `#[repr(u8)]` pins each variant to its wire value, so `cmd as u8`
/// is exactly the byte that goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Version = 0x01,
    Joypad = 0x65,
    Sync1 = 0x68,
    Sync2 = 0x69,
    Sync3 = 0x6A,
    Status = 0x6C,
    WantDisconnect = 0x6D,
}

impl Command {
    /// Every known command, in wire-value order.
    pub const ALL: [Command; 7] = [
        Command::Version,
        Command::Joypad,
        Command::Sync1,
        Command::Sync2,
        Command::Sync3,
        Command::Status,
        Command::WantDisconnect,
    ];

    /// Returns the wire value of this command.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Looks up a command by its wire value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownCommand`] for any byte that is not
    /// a known command.
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0x01 => Ok(Self::Version),
            0x65 => Ok(Self::Joypad),
            0x68 => Ok(Self::Sync1),
            0x69 => Ok(Self::Sync2),
            0x6A => Ok(Self::Sync3),
            0x6C => Ok(Self::Status),
            0x6D => Ok(Self::WantDisconnect),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Version => "Version",
            Self::Joypad => "Joypad",
            Self::Sync1 => "Sync1",
            Self::Sync2 => "Sync2",
            Self::Sync3 => "Sync3",
            Self::Status => "Status",
            Self::WantDisconnect => "WantDisconnect",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Button
// ---------------------------------------------------------------------------

/// A Game Boy button, as carried in bits 0-2 of a joypad frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Button {
    #[default]
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
    A = 4,
    B = 5,
    Select = 6,
    Start = 7,
}

impl Button {
    /// Mask of the button number inside `b1`.
    pub const MASK: u8 = 0x07;

    /// Decodes the low three bits of `bits`. Higher bits are ignored, so
    /// this never fails.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            0 => Self::Right,
            1 => Self::Left,
            2 => Self::Up,
            3 => Self::Down,
            4 => Self::A,
            5 => Self::B,
            6 => Self::Select,
            _ => Self::Start,
        }
    }

    /// Returns the three-bit button number.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// StatusFlags
// ---------------------------------------------------------------------------

/// The status bitfield carried in `b1` of a status frame.
///
/// Bits this crate does not know about are preserved, so a relayed
/// status never loses information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusFlags(u8);

impl StatusFlags {
    /// The emulator is running.
    pub const RUNNING: Self = Self(0x01);
    /// The emulator is paused.
    pub const PAUSED: Self = Self(0x02);
    /// The peer understands `WantDisconnect`.
    pub const SUPPORTS_WANT_DISCONNECT: Self = Self(0x04);

    /// No bits set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wraps raw bits as they came off the wire.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_running(self) -> bool {
        self.contains(Self::RUNNING)
    }

    pub const fn is_paused(self) -> bool {
        self.contains(Self::PAUSED)
    }

    pub const fn supports_want_disconnect(self) -> bool {
        self.contains(Self::SUPPORTS_WANT_DISCONNECT)
    }
}

impl BitOr for StatusFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatusFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for StatusFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Defines
// ---------------------------------------------------------------------------

/// The constants one endpoint speaks with.
///
/// This is a small `Copy` value rather than global state: the codec and
/// the dispatcher each receive their own copy at construction, and two
/// endpoints in one process can use different tables (handy in tests
/// that provoke a version mismatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defines {
    /// Major protocol version sent in the Version frame.
    pub major: u8,
    /// Minor protocol version sent in the Version frame.
    pub minor: u8,
    /// Status bits this endpoint advertises after a successful handshake.
    pub own_status: StatusFlags,
}

impl Defines {
    /// BGB link protocol 1.4, advertising support for `WantDisconnect`.
    pub const BGB_1_4: Self = Self {
        major: 1,
        minor: 4,
        own_status: StatusFlags::SUPPORTS_WANT_DISCONNECT,
    };

    /// Returns `true` if `(major, minor)` is the version this table speaks.
    pub const fn accepts_version(&self, major: u8, minor: u8) -> bool {
        self.major == major && self.minor == minor
    }
}

impl Default for Defines {
    fn default() -> Self {
        Self::BGB_1_4
    }
}
