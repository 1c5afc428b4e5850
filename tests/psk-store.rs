use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use dpsk::{
    BytesPskStore, DpskError, InMemoryPskStore, MappedPskStore, PskIdentity, SecretKey,
    ServerName, StringPskStore,
};

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

#[test]
fn keys_are_scoped() {
    let _ = env_logger::try_init();

    let store = InMemoryPskStore::new();
    let identity = PskIdentity::from_string("alice").unwrap();
    let scope_a = ServerName::from_host_name("a.example.org");
    let scope_b = ServerName::from_host_name("b.example.org");

    store
        .set_scoped_key(identity.clone(), b"secret-a", scope_a.clone())
        .unwrap();

    let mut lookup = identity.clone();
    assert!(store
        .get_scoped_key(&[scope_b.clone()], &mut lookup)
        .is_none());
    assert!(store.get_key(&mut lookup).is_none());

    let key = store
        .get_scoped_key(&[scope_a.clone()], &mut lookup)
        .unwrap();
    assert_eq!(key.as_ref(), b"secret-a");

    // Mutating the returned copy does not touch the stored key.
    let mut bytes = key.into_vec();
    bytes[0] = b'!';
    let key = store.get_scoped_key(&[scope_a], &mut lookup).unwrap();
    assert_eq!(key.as_ref(), b"secret-a");
}

#[test]
fn only_first_scope_is_consulted() {
    let store = InMemoryPskStore::new();
    let identity = PskIdentity::from_string("alice").unwrap();
    let scope_a = ServerName::from_host_name("a.example.org");
    let scope_b = ServerName::from_host_name("b.example.org");

    store
        .set_scoped_key(identity.clone(), b"secret-b", scope_b.clone())
        .unwrap();

    let mut lookup = identity;
    assert!(store
        .get_scoped_key(&[scope_a, scope_b.clone()], &mut lookup)
        .is_none());
    assert!(store.get_scoped_key(&[scope_b], &mut lookup).is_some());
    assert!(store.get_scoped_key(&[], &mut lookup).is_none());
}

#[test]
fn lookup_normalizes_non_compliant_identity() {
    let raw = [0x61, 0xff, 0x01];

    let store = InMemoryPskStore::new();
    let configured = PskIdentity::from_string_and_bytes("alice", &raw).unwrap();
    store.set_key(configured, b"secret").unwrap();

    let mut lookup = PskIdentity::from_bytes(&raw).unwrap();
    assert!(!lookup.is_utf8_compliant());
    assert_ne!(lookup.public_info(), "alice");

    let key = store.get_key(&mut lookup).unwrap();
    assert_eq!(key.as_ref(), b"secret");
    assert_eq!(lookup.public_info(), "alice");
}

#[test]
fn known_peer_has_identity_and_key() {
    let store = InMemoryPskStore::new();
    let identity = PskIdentity::from_string("alice").unwrap();
    let scope = ServerName::from_host_name("a.example.org");
    let peer = addr(40001);

    store
        .add_known_peer(peer, scope.clone(), identity.clone(), b"secret")
        .unwrap();

    let other = ServerName::from_host_name("b.example.org");
    let found = store
        .get_scoped_identity(peer, &[other, scope.clone()])
        .unwrap();
    assert_eq!(found, identity);

    let mut lookup = found;
    let key = store.get_scoped_key(&[scope], &mut lookup).unwrap();
    assert_eq!(key.as_ref(), b"secret");

    // Nothing was registered in the global scope.
    assert!(store.get_identity(peer).is_none());
}

#[test]
fn known_global_peer() {
    let store = InMemoryPskStore::new();
    let identity = PskIdentity::from_string("alice").unwrap();
    let peer = addr(40002);

    store
        .add_known_global_peer(peer, identity.clone(), b"secret")
        .unwrap();

    assert_eq!(store.get_identity(peer).unwrap(), identity);
    let mut lookup = identity;
    assert!(store.get_key(&mut lookup).is_some());
}

#[test]
fn empty_key_is_invalid() {
    let store = InMemoryPskStore::new();
    let identity = PskIdentity::from_string("alice").unwrap();

    assert_eq!(
        store.add_known_global_peer(addr(40003), identity, b""),
        Err(DpskError::InvalidArgument("key"))
    );
}

#[test]
fn known_peer_updates_are_atomic() {
    let store = Arc::new(InMemoryPskStore::new());
    let scope = ServerName::from_host_name("a.example.org");

    let writer = {
        let store = store.clone();
        let scope = scope.clone();
        thread::spawn(move || {
            for port in 0..500u16 {
                let identity = PskIdentity::from_string(&format!("peer-{}", port)).unwrap();
                store
                    .add_known_peer(addr(41000 + port), scope.clone(), identity, b"secret")
                    .unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        thread::spawn(move || {
            for port in 0..500u16 {
                let scopes = [ServerName::from_host_name("a.example.org")];
                if let Some(identity) = store.get_scoped_identity(addr(41000 + port), &scopes) {
                    // A visible identity implies a visible key.
                    let mut lookup = identity;
                    assert!(store.get_scoped_key(&scopes, &mut lookup).is_some());
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[derive(Default)]
struct StringStore {
    identities: HashMap<SocketAddr, String>,
    keys: HashMap<String, Vec<u8>>,
}

impl StringPskStore for StringStore {
    fn get_identity(&self, peer: SocketAddr) -> Option<String> {
        self.identities.get(&peer).cloned()
    }

    fn get_scoped_identity(&self, peer: SocketAddr, _server_names: &[ServerName]) -> Option<String> {
        self.get_identity(peer)
    }

    fn get_key(&self, identity: &str) -> Option<SecretKey> {
        self.keys.get(identity).map(|key| SecretKey::new(key))
    }

    fn get_scoped_key(&self, _server_names: &[ServerName], identity: &str) -> Option<SecretKey> {
        self.get_key(identity)
    }
}

#[test]
fn mapped_store_wraps_identities() {
    let mut legacy = StringStore::default();
    legacy.identities.insert(addr(40004), "alice".to_string());
    legacy.keys.insert("alice".to_string(), b"secret".to_vec());

    let mapped = MappedPskStore::new(legacy);

    let identity = mapped.get_identity(addr(40004)).unwrap();
    assert!(identity.is_utf8_compliant());
    assert_eq!(identity.as_bytes(), b"alice");

    assert!(mapped.get_identity(addr(40005)).is_none());

    let mut lookup = identity;
    let key = mapped.get_key(&mut lookup).unwrap();
    assert_eq!(key.as_ref(), b"secret");
}

#[test]
fn mapped_store_fails_closed_for_non_utf8() {
    let mut legacy = StringStore::default();
    // The lossy decoding of the raw identity is present in the legacy store,
    // but must never be used for a non-compliant lookup.
    let raw = [0xff, 0xfe];
    let lossy = String::from_utf8_lossy(&raw).into_owned();
    legacy.keys.insert(lossy, b"secret".to_vec());

    let mapped = MappedPskStore::new(legacy);

    let mut lookup = PskIdentity::from_bytes(&raw).unwrap();
    assert!(mapped.get_key(&mut lookup).is_none());
    assert!(mapped
        .get_scoped_key(&[ServerName::Undefined], &mut lookup)
        .is_none());
}
