//! Hash functions that place targets and resources on the ring.

use serde::{Deserialize, Serialize};

/// Maps a string into the 32-bit ring space.
///
/// Implementations must be deterministic: the same input always lands on
/// the same position, across processes and machines, or clients sharing a
/// cluster will disagree about key placement.
pub trait RingHasher {
    fn hash(&self, input: &str) -> u32;
}

/// IEEE CRC-32 of the input bytes. The default hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Hasher;

impl RingHasher for Crc32Hasher {
    fn hash(&self, input: &str) -> u32 {
        crc32fast::hash(input.as_bytes())
    }
}

/// First 32 bits of the MD5 digest, read big-endian.
///
/// Equivalent to interpreting the first eight hex digits of the digest as
/// a number, which keeps placements compatible with clients that hash by
/// truncating the hex string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hasher;

impl RingHasher for Md5Hasher {
    fn hash(&self, input: &str) -> u32 {
        let digest = md5::compute(input.as_bytes());
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// Hasher chosen at runtime, e.g. from a config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    #[default]
    Crc32,
    Md5,
}

impl RingHasher for HasherKind {
    fn hash(&self, input: &str) -> u32 {
        match self {
            HasherKind::Crc32 => Crc32Hasher.hash(input),
            HasherKind::Md5 => Md5Hasher.hash(input),
        }
    }
}

impl std::str::FromStr for HasherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crc32" => Ok(HasherKind::Crc32),
            "md5" => Ok(HasherKind::Md5),
            _ => Err(format!(
                "unknown ring hasher '{s}'. valid options: crc32, md5"
            )),
        }
    }
}

impl std::fmt::Display for HasherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HasherKind::Crc32 => write!(f, "crc32"),
            HasherKind::Md5 => write!(f, "md5"),
        }
    }
}
