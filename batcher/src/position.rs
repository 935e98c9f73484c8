//! Stream positions used to compute the checkpoint watermark.
//!
//! A [`Position`] identifies where a message came from in its source stream:
//! a [`SequenceNumber`] plus a sub-sequence that orders records sharing the
//! same sequence number (e.g. records deaggregated from one stream record).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// An arbitrary-precision, non-negative sequence number.
///
/// Stream sequence numbers are decimal strings that can be wider than any
/// fixed-size integer, so the value is stored as its normalised decimal
/// digits (no leading zeros, `"0"` for zero).
///
/// # Example
///
/// ```
/// use batcher::SequenceNumber;
///
/// let small: SequenceNumber = "49590338271490256608559692538361571095921575989136588898".parse().unwrap();
/// let large: SequenceNumber = "49590338271490256608559692540925702759324208523137515618".parse().unwrap();
/// assert!(small < large);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceNumber(Box<str>);

impl SequenceNumber {
    /// Returns the normalised decimal digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SequenceNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!(
                "sequence number must be a non-empty string of decimal digits, got {:?}",
                s
            )));
        }

        let digits = s.trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        Ok(Self(digits.into()))
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value.to_string().into_boxed_str())
    }
}

impl From<u128> for SequenceNumber {
    fn from(value: u128) -> Self {
        Self(value.to_string().into_boxed_str())
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        // Normalised digits: a longer string is always a larger number.
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message's place in its source stream.
///
/// `Absent` means "no position recorded yet". It is not position zero and is
/// never ordered relative to anything, so `Position` intentionally does not
/// implement `PartialOrd`; use [`is_less_than`](Position::is_less_than).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Position {
    #[default]
    Absent,
    At {
        sequence: SequenceNumber,
        sub_sequence: u64,
    },
}

impl Position {
    /// Creates a present position.
    pub fn new(sequence: impl Into<SequenceNumber>, sub_sequence: u64) -> Self {
        Position::At {
            sequence: sequence.into(),
            sub_sequence,
        }
    }

    /// Builds a position from an optional sequence number.
    ///
    /// A missing sequence number yields [`Position::Absent`] whatever the
    /// sub-sequence value.
    pub fn from_parts(sequence: Option<SequenceNumber>, sub_sequence: u64) -> Self {
        match sequence {
            Some(sequence) => Position::At {
                sequence,
                sub_sequence,
            },
            None => Position::Absent,
        }
    }

    /// Returns true if no position has been recorded.
    pub fn is_empty(&self) -> bool {
        matches!(self, Position::Absent)
    }

    /// Compares sequence numbers first, then sub-sequences.
    ///
    /// Always false when either side is absent, in both directions.
    pub fn is_less_than(&self, other: &Position) -> bool {
        match (self, other) {
            (
                Position::At {
                    sequence: left,
                    sub_sequence: left_sub,
                },
                Position::At {
                    sequence: right,
                    sub_sequence: right_sub,
                },
            ) => (left, left_sub) < (right, right_sub),
            _ => false,
        }
    }

    /// The sequence number, or `None` when absent.
    pub fn sequence(&self) -> Option<&SequenceNumber> {
        match self {
            Position::At { sequence, .. } => Some(sequence),
            Position::Absent => None,
        }
    }

    /// The sub-sequence, or `None` when absent.
    pub fn sub_sequence(&self) -> Option<u64> {
        match self {
            Position::At { sub_sequence, .. } => Some(*sub_sequence),
            Position::Absent => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Absent => f.write_str("<absent>"),
            Position::At {
                sequence,
                sub_sequence,
            } => write!(f, "<{}, {}>", sequence, sub_sequence),
        }
    }
}
