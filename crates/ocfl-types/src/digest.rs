use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// A digest algorithm an OCFL inventory may reference.
///
/// sha-256 and sha-512 are *primary* algorithms: one of them anchors an
/// object's manifest and sidecar. The rest may only appear in fixity blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake2b512,
}

impl DigestAlgorithm {
    /// All algorithms this engine understands.
    pub const ALL: [Self; 5] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Blake2b512,
    ];

    /// The OCFL name of the algorithm, as written in inventories.
    pub fn ocfl_name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake2b512 => "blake2b-512",
        }
    }

    /// Resolve an OCFL algorithm name.
    pub fn from_ocfl_name(name: &str) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|algo| algo.ocfl_name() == name)
            .ok_or_else(|| TypeError::UnknownDigestAlgorithm(name.into()))
    }

    /// Length in characters of a hex digest under this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 | Self::Blake2b512 => 128,
        }
    }

    /// Whether the algorithm may anchor an inventory's manifest.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Sha256 | Self::Sha512)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ocfl_name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_ocfl_name(s)
    }
}

impl Serialize for DigestAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.ocfl_name())
    }
}

impl<'de> Deserialize<'de> for DigestAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AlgoVisitor;

        impl Visitor<'_> for AlgoVisitor {
            type Value = DigestAlgorithm;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an OCFL digest algorithm name")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<DigestAlgorithm, E> {
                DigestAlgorithm::from_ocfl_name(value).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(AlgoVisitor)
    }
}

/// A hex-encoded digest value, normalized to lowercase at construction.
///
/// OCFL digest comparison is case-insensitive; normalizing here means plain
/// `==` is the correct comparison everywhere else.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexDigest(String);

impl HexDigest {
    /// Wrap a hex string, lowercasing it.
    pub fn new(value: impl Into<String>) -> Self {
        let mut value = value.into();
        if value.bytes().any(|b| b.is_ascii_uppercase()) {
            value.make_ascii_lowercase();
        }
        Self(value)
    }

    /// Encode raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// The lowercase hex value.
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Whether the value is well-formed hex of the right length for `algorithm`.
    pub fn is_valid_for(&self, algorithm: DigestAlgorithm) -> bool {
        self.0.len() == algorithm.hex_len()
            && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Validate against `algorithm`, consuming nothing.
    pub fn validate_for(&self, algorithm: DigestAlgorithm) -> Result<(), TypeError> {
        if self.is_valid_for(algorithm) {
            Ok(())
        } else {
            Err(TypeError::InvalidDigest {
                algorithm: algorithm.ocfl_name().into(),
                value: self.0.clone(),
            })
        }
    }
}

impl fmt::Display for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = &self.0[..self.0.len().min(12)];
        write!(f, "HexDigest({short}…)")
    }
}

impl From<&str> for HexDigest {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for HexDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for HexDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DigestVisitor;

        impl Visitor<'_> for DigestVisitor {
            type Value = HexDigest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex digest string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<HexDigest, E> {
                Ok(HexDigest::new(value))
            }
        }

        deserializer.deserialize_str(DigestVisitor)
    }
}
