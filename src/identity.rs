//! Byte-exact PSK identities.
//!
//! RFC 4279 defines PSK identities to be UTF-8 encoded, but some peers send
//! identities that are not. The raw bytes stay authoritative here and the
//! UTF-8 compliance is tracked, so keys configured for non-compliant peers
//! can still be matched during the handshake.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::Error;

/// Max length of a PSK identity in bytes.
pub const MAX_PSK_IDENTITY_LEN: usize = 65535;

/// A PSK identity (or hint).
///
/// Equality, ordering and hashing are defined over the raw bytes only. The
/// public info string is derived from the bytes for UTF-8 compliant
/// identities. For non-compliant identities it can be replaced with the
/// label configured in the store, see [`PskIdentity::normalize`].
#[derive(Debug, Clone)]
pub struct PskIdentity {
    bytes: Vec<u8>,
    public_info: String,
    utf8_compliant: bool,
}

impl PskIdentity {
    /// Create a PSK identity from raw bytes.
    ///
    /// The public info is the lossy UTF-8 decoding of the bytes. The
    /// identity is compliant when re-encoding that string yields the
    /// original bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        check_len(bytes)?;
        let public_info = String::from_utf8_lossy(bytes).into_owned();
        let utf8_compliant = public_info.as_bytes() == bytes;
        Ok(PskIdentity {
            bytes: bytes.to_vec(),
            public_info,
            utf8_compliant,
        })
    }

    /// Create a PSK identity from a string. Always UTF-8 compliant.
    pub fn from_string(identity: &str) -> Result<Self, Error> {
        check_len(identity.as_bytes())?;
        Ok(PskIdentity {
            bytes: identity.as_bytes().to_vec(),
            public_info: identity.to_string(),
            utf8_compliant: true,
        })
    }

    /// Create a PSK identity from an explicit label and raw bytes.
    ///
    /// Used to configure a readable name for a peer whose identity bytes are
    /// not valid UTF-8.
    pub fn from_string_and_bytes(identity: &str, bytes: &[u8]) -> Result<Self, Error> {
        check_len(bytes)?;
        let utf8_compliant = identity.as_bytes() == bytes;
        Ok(PskIdentity {
            bytes: bytes.to_vec(),
            public_info: identity.to_string(),
            utf8_compliant,
        })
    }

    /// Replace the public info of a non-compliant identity.
    ///
    /// A compliant identity's public info is defined by its bytes and must
    /// not be overridden.
    pub fn normalize(&mut self, public_info: impl Into<String>) -> Result<(), Error> {
        if self.utf8_compliant {
            return Err(Error::NormalizationNotAllowed);
        }
        self.set_public_info(public_info.into());
        Ok(())
    }

    // The store checks compliance itself before normalizing a looked up
    // identity.
    pub(crate) fn set_public_info(&mut self, public_info: String) {
        self.public_info = public_info;
    }

    /// Test whether the identity bytes start with the UTF-8 encoding of
    /// `prefix`. A byte level test, since the identity itself may not decode.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.bytes.starts_with(prefix.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn public_info(&self) -> &str {
        &self.public_info
    }

    pub fn is_utf8_compliant(&self) -> bool {
        self.utf8_compliant
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn check_len(bytes: &[u8]) -> Result<(), Error> {
    if bytes.len() > MAX_PSK_IDENTITY_LEN {
        return Err(Error::IdentityTooLong(bytes.len()));
    }
    Ok(())
}

impl PartialEq for PskIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PskIdentity {}

impl Hash for PskIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl PartialOrd for PskIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PskIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl fmt::Display for PskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.utf8_compliant {
            write!(f, "{}", self.public_info)
        } else {
            // Keep the raw bytes visible in logs for non-compliant peers.
            write!(f, "{}/", self.public_info)?;
            for byte in &self.bytes {
                write!(f, "{:02x}", byte)?;
            }
            Ok(())
        }
    }
}
