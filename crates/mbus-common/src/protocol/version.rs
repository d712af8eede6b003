//! Wire protocol versions.
//!
//! Peers advertise a version during the connection handshake, and the network
//! layer picks the newest wire encoding whose minimum version does not exceed
//! the peer's. Versions order lexicographically on (major, minor, micro).

use std::fmt;
use std::str::FromStr;

use super::error::NetError;

/// A `major.minor.micro` protocol version.
///
/// Parsing accepts one to three dot-separated non-negative components;
/// missing components default to zero, so `"2"` equals `"2.0.0"`. Anything
/// else is rejected, which a handshake treats as a failed negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl Version {
    /// The wire version this build speaks and advertises.
    ///
    /// This is a protocol constant, not the package version: it only moves
    /// when the wire contract does. 2.0.0 introduced the enveloped binary
    /// encoding; 1.0.0 is the typed-parameter encoding.
    pub const CURRENT: Version = Version::new(2, 0, 0);

    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Version { major, minor, micro }
    }
}

impl FromStr for Version {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NetError::Version("empty version string".to_string()));
        }
        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in s.split('.') {
            if count == 3 {
                return Err(NetError::Version(format!("too many components in '{}'", s)));
            }
            parts[count] = piece
                .parse::<u32>()
                .map_err(|_| NetError::Version(format!("bad component '{}' in '{}'", piece, s)))?;
            count += 1;
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}
