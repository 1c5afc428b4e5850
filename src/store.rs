//! PSK identity and key storage.
//!
//! [`InMemoryPskStore`] keeps identity/key pairs scoped by server name, plus
//! a per-peer directory of identities to present when this endpoint
//! initiates the handshake. [`MappedPskStore`] adapts a legacy string-keyed
//! store to the byte-exact interface.
//!
//! Keys are kept in memory only. Store production keys in a secure way.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::identity::PskIdentity;
use crate::types::ServerName;
use crate::Error;

/// An owned PSK secret.
///
/// Cloning yields an independent copy. The bytes are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(key: &[u8]) -> Self {
        SecretKey(key.to_vec())
    }

    /// Convert the key into the underlying `Vec<u8>`.
    ///
    /// The returned bytes are no longer wiped on drop.
    pub fn into_vec(mut self) -> Vec<u8> {
        mem::take(&mut self.0)
    }
}

impl AsRef<[u8]> for SecretKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Store of PSK identities and keys, keyed by raw identity bytes.
///
/// Lookups return independent copies of the stored key. A key lookup that
/// hits with a non UTF-8 identity normalizes the caller's identity with the
/// public info known to the store.
pub trait BytesPskStore: Send + Sync {
    /// Identity to present to a known peer in the global scope.
    fn get_identity(&self, peer: SocketAddr) -> Option<PskIdentity>;

    /// Identity to present to a known peer, trying `server_names` in order.
    fn get_scoped_identity(
        &self,
        peer: SocketAddr,
        server_names: &[ServerName],
    ) -> Option<PskIdentity>;

    /// Key for an identity in the global scope.
    fn get_key(&self, identity: &mut PskIdentity) -> Option<SecretKey>;

    /// Key for an identity scoped to a server name.
    fn get_scoped_key(
        &self,
        server_names: &[ServerName],
        identity: &mut PskIdentity,
    ) -> Option<SecretKey>;
}

/// Legacy store keyed by UTF-8 identity strings.
pub trait StringPskStore: Send + Sync {
    fn get_identity(&self, peer: SocketAddr) -> Option<String>;

    fn get_scoped_identity(&self, peer: SocketAddr, server_names: &[ServerName]) -> Option<String>;

    fn get_key(&self, identity: &str) -> Option<SecretKey>;

    fn get_scoped_key(&self, server_names: &[ServerName], identity: &str) -> Option<SecretKey>;
}

struct Psk {
    identity: PskIdentity,
    key: SecretKey,
}

#[derive(Default)]
struct StoreInner {
    scoped_keys: HashMap<ServerName, HashMap<PskIdentity, Psk>>,
    scoped_identities: HashMap<SocketAddr, HashMap<ServerName, PskIdentity>>,
}

impl StoreInner {
    fn set_key(&mut self, identity: PskIdentity, key: &[u8], server_name: ServerName) {
        let keys = self.scoped_keys.entry(server_name).or_default();
        let psk = Psk {
            identity: identity.clone(),
            key: SecretKey::new(key),
        };
        keys.insert(identity, psk);
    }

    fn key_for(&self, server_name: &ServerName, identity: &mut PskIdentity) -> Option<SecretKey> {
        let psk = self.scoped_keys.get(server_name)?.get(identity)?;
        if !identity.is_utf8_compliant() {
            // Carry the label configured in the store back to the caller.
            identity.set_public_info(psk.identity.public_info().to_string());
        }
        Some(psk.key.clone())
    }

    fn identity_for(&self, peer: &SocketAddr, server_name: &ServerName) -> Option<PskIdentity> {
        self.scoped_identities.get(peer)?.get(server_name).cloned()
    }
}

/// An in-memory pre-shared key storage.
///
/// If this endpoint only answers handshakes, registering identity/key pairs
/// with [`InMemoryPskStore::set_key`] is enough. To initiate handshakes, add
/// peers with [`InMemoryPskStore::add_known_peer`] so the identity to present
/// is remembered per peer address.
///
/// Both maps live behind a single mutex. Compound updates such as
/// `add_known_peer` are observed atomically by concurrent lookups.
#[derive(Default)]
pub struct InMemoryPskStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryPskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Map operations can not panic mid-update, poisoned state is still
        // consistent.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `key` for `identity` in the global scope.
    ///
    /// An existing key for the identity is replaced.
    pub fn set_key(&self, identity: PskIdentity, key: &[u8]) -> Result<(), Error> {
        self.set_scoped_key(identity, key, ServerName::Undefined)
    }

    /// Register `key` for `identity` scoped to a server name.
    ///
    /// An existing key for the same scope and identity is replaced.
    pub fn set_scoped_key(
        &self,
        identity: PskIdentity,
        key: &[u8],
        server_name: ServerName,
    ) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key"));
        }
        debug!("PSK key set for {} under {}", identity, server_name);
        self.lock().set_key(identity, key, server_name);
        Ok(())
    }

    /// Remember the identity to present to `peer` under `server_name`, and
    /// register its key in the same scope.
    ///
    /// Both updates happen under one lock acquisition, no lookup can observe
    /// one without the other.
    pub fn add_known_peer(
        &self,
        peer: SocketAddr,
        server_name: ServerName,
        identity: PskIdentity,
        key: &[u8],
    ) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key"));
        }
        debug!("Known peer {} added under {}", peer, server_name);
        let mut inner = self.lock();
        inner
            .scoped_identities
            .entry(peer)
            .or_default()
            .insert(server_name.clone(), identity.clone());
        inner.set_key(identity, key, server_name);
        Ok(())
    }

    /// [`InMemoryPskStore::add_known_peer`] in the global scope.
    pub fn add_known_global_peer(
        &self,
        peer: SocketAddr,
        identity: PskIdentity,
        key: &[u8],
    ) -> Result<(), Error> {
        self.add_known_peer(peer, ServerName::Undefined, identity, key)
    }
}

impl BytesPskStore for InMemoryPskStore {
    fn get_identity(&self, peer: SocketAddr) -> Option<PskIdentity> {
        self.lock().identity_for(&peer, &ServerName::Undefined)
    }

    fn get_scoped_identity(
        &self,
        peer: SocketAddr,
        server_names: &[ServerName],
    ) -> Option<PskIdentity> {
        let inner = self.lock();
        server_names
            .iter()
            .find_map(|name| inner.identity_for(&peer, name))
    }

    fn get_key(&self, identity: &mut PskIdentity) -> Option<SecretKey> {
        self.lock().key_for(&ServerName::Undefined, identity)
    }

    fn get_scoped_key(
        &self,
        server_names: &[ServerName],
        identity: &mut PskIdentity,
    ) -> Option<SecretKey> {
        // Only the first requested name is consulted. A miss there is not
        // retried against later names.
        let name = server_names.first()?;
        self.lock().key_for(name, identity)
    }
}

/// Adapts a string-keyed store to the byte-exact interface.
///
/// Legacy stores have no representation for non UTF-8 identities. Key
/// lookups for such identities fail closed instead of converting lossily.
pub struct MappedPskStore<S> {
    store: S,
}

impl<S: StringPskStore> MappedPskStore<S> {
    pub fn new(store: S) -> Self {
        MappedPskStore { store }
    }

    fn wrap(identity: String) -> Option<PskIdentity> {
        match PskIdentity::from_string(&identity) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Discarding identity from string store: {}", e);
                None
            }
        }
    }
}

impl<S: StringPskStore> BytesPskStore for MappedPskStore<S> {
    fn get_identity(&self, peer: SocketAddr) -> Option<PskIdentity> {
        self.store.get_identity(peer).and_then(Self::wrap)
    }

    fn get_scoped_identity(
        &self,
        peer: SocketAddr,
        server_names: &[ServerName],
    ) -> Option<PskIdentity> {
        self.store
            .get_scoped_identity(peer, server_names)
            .and_then(Self::wrap)
    }

    fn get_key(&self, identity: &mut PskIdentity) -> Option<SecretKey> {
        if !identity.is_utf8_compliant() {
            return None;
        }
        self.store.get_key(identity.public_info())
    }

    fn get_scoped_key(
        &self,
        server_names: &[ServerName],
        identity: &mut PskIdentity,
    ) -> Option<SecretKey> {
        if !identity.is_utf8_compliant() {
            return None;
        }
        self.store.get_scoped_key(server_names, identity.public_info())
    }
}
