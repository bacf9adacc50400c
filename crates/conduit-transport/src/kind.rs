//! Transport kinds as a small closed set of flags.
//!
//! A [`TransportKind`] is used both for a single transport (exactly one flag
//! set) and for a set of acceptable transports (any union of flags).

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::str::FromStr;

/// A set of transport mechanisms.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransportKind(u8);

impl TransportKind {
    /// The empty set.
    pub const NONE: Self = Self(0);
    /// Full duplex WebSocket connection.
    pub const WEB_SOCKETS: Self = Self(0b001);
    /// Server-to-client event stream plus HTTP POST for sends.
    pub const SERVER_SENT_EVENTS: Self = Self(0b010);
    /// Repeated HTTP polls plus HTTP POST for sends.
    pub const LONG_POLLING: Self = Self(0b100);
    /// Every defined transport.
    pub const ALL: Self = Self(0b111);

    /// Single flags in fallback-priority order (best first).
    pub const PRIORITY: [Self; 3] = [
        Self::WEB_SOCKETS,
        Self::SERVER_SENT_EVENTS,
        Self::LONG_POLLING,
    ];

    /// Raw bits of the set.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build a set from raw bits, rejecting undefined bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Build a set from raw bits, keeping undefined bits as they are.
    #[must_use]
    pub const fn from_bits_retain(bits: u8) -> Self {
        Self(bits)
    }

    /// Whether no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the set is nonempty and only holds defined flags.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 & !Self::ALL.0 == 0
    }

    /// Whether every flag of `other` is in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `self` and `other` share at least one flag.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Iterate over the defined single flags in this set, best first.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::PRIORITY.into_iter().filter(move |k| self.contains(*k))
    }

    /// Transports this build can instantiate.
    ///
    /// WebSockets is only available when the `websocket` feature is enabled.
    #[must_use]
    pub const fn supported() -> Self {
        if cfg!(feature = "websocket") {
            Self::ALL
        } else {
            Self(Self::SERVER_SENT_EVENTS.0 | Self::LONG_POLLING.0)
        }
    }

    /// Name of a single flag, `None` for anything else.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0b001 => Some("WebSockets"),
            0b010 => Some("ServerSentEvents"),
            0b100 => Some("LongPolling"),
            _ => None,
        }
    }
}

impl BitOr for TransportKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransportKind {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TransportKind {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for TransportKind {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

/// Raw complement: the result may carry undefined bits.
impl Not for TransportKind {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl FromIterator<TransportKind> for TransportKind {
    fn from_iter<I: IntoIterator<Item = TransportKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, |acc, k| acc | k)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }

        let mut first = true;
        for kind in self.iter() {
            if !first {
                f.write_str(" | ")?;
            }
            // Single flags always have a name.
            f.write_str(kind.name().unwrap_or_default())?;
            first = false;
        }

        let undefined = self.0 & !Self::ALL.0;
        if undefined != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{undefined:#04x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportKind({self})")
    }
}

/// Error returned when a transport name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown transport: {0}")]
pub struct ParseTransportKindError(pub String);

impl FromStr for TransportKind {
    type Err = ParseTransportKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websockets" | "websocket" | "ws" => Ok(Self::WEB_SOCKETS),
            "serversentevents" | "sse" => Ok(Self::SERVER_SENT_EVENTS),
            "longpolling" | "long-polling" | "long_polling" => Ok(Self::LONG_POLLING),
            "all" => Ok(Self::ALL),
            _ => Err(ParseTransportKindError(s.to_string())),
        }
    }
}

impl Serialize for TransportKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.iter().count()))?;
        for kind in self.iter() {
            seq.serialize_element(kind.name().unwrap_or_default())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for TransportKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KindVisitor;

        impl<'de> Visitor<'de> for KindVisitor {
            type Value = TransportKind;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a transport name or a list of transport names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut kinds = TransportKind::NONE;
                while let Some(name) = seq.next_element::<String>()? {
                    kinds |= name.parse::<TransportKind>().map_err(de::Error::custom)?;
                }
                Ok(kinds)
            }
        }

        deserializer.deserialize_any(KindVisitor)
    }
}
