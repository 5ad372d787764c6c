//! Hash-addressed code blobs and their distribution between systems.
//!
//! A blob is known by the [SourceHash](SourceHash) of its original bytes. It only becomes
//! usable after a source authority validated it, and it can be fetched from a peer
//! together with a [fletcher32](fletcher32) checksum.

use crate::actors::UniquePath;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, hash::Hasher};
use twox_hash::XxHash64;

/// The content hash of a source blob
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceHash(String);

impl SourceHash {
    /// Hash `bytes`
    pub fn of(bytes: &[u8]) -> SourceHash {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(bytes);
        SourceHash(format!("{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fletcher-32 over little-endian 16-bit words, an odd trailing byte is zero-padded
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [lo, hi] => u32::from(*lo) | (u32::from(*hi) << 8),
            [lo] => u32::from(*lo),
            _ => 0,
        };
        sum1 = (sum1 + word) % 0xffff;
        sum2 = (sum2 + sum1) % 0xffff;
    }
    (sum2 << 16) | sum1
}

/// Checks source blobs before they may be used
pub trait SourceAuthority: Send {
    /// Accept the blob, returning the bytes to install, or reject it with a reason
    fn validate(&mut self, hash: &SourceHash, bytes: &Bytes, info: Option<&str>) -> Result<Bytes, String>;
}

/// Where a hash stands in this system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Unknown,
    /// Waiting for the authority.
    Validating,
    /// Waiting for a peer to send the bytes.
    Transferring,
    Loaded,
}

/// A validated blob
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedSource {
    /// The bytes as they were loaded.
    pub original: Bytes,
    /// The bytes the authority approved.
    pub validated: Bytes,
    pub info: Option<String>,
    /// Validated by this system's own authority rather than received from a peer.
    pub authority_local: bool,
}

enum SourceEntry<W> {
    Validating {
        original: Bytes,
        info: Option<String>,
        waiters: Vec<W>,
    },
    Transferring {
        from: UniquePath,
        waiters: Vec<W>,
    },
    Loaded(LoadedSource),
}

/// The sources known to one system
///
/// `W` is whatever waits for a source to become available, usually a creation request.
pub struct SourceTable<W> {
    entries: FxHashMap<SourceHash, SourceEntry<W>>,
    instances: FxHashMap<SourceHash, BTreeSet<UniquePath>>,
}

impl<W> SourceTable<W> {
    pub fn new() -> Self {
        SourceTable {
            entries: FxHashMap::default(),
            instances: FxHashMap::default(),
        }
    }

    pub fn status(&self, hash: &SourceHash) -> SourceState {
        match self.entries.get(hash) {
            None => SourceState::Unknown,
            Some(SourceEntry::Validating { .. }) => SourceState::Validating,
            Some(SourceEntry::Transferring { .. }) => SourceState::Transferring,
            Some(SourceEntry::Loaded(_)) => SourceState::Loaded,
        }
    }

    /// The loaded source for `hash`, only once validated
    pub fn loaded(&self, hash: &SourceHash) -> Option<&LoadedSource> {
        match self.entries.get(hash) {
            Some(SourceEntry::Loaded(source)) => Some(source),
            _ => None,
        }
    }

    /// Start validating a newly loaded blob
    ///
    /// Returns the hash, and `false` if the blob is already loaded or being validated.
    pub fn begin_load(&mut self, bytes: Bytes, info: Option<String>) -> (SourceHash, bool) {
        let hash = SourceHash::of(&bytes);
        match self.status(&hash) {
            SourceState::Loaded | SourceState::Validating => (hash, false),
            SourceState::Transferring | SourceState::Unknown => {
                let waiters = match self.entries.remove(&hash) {
                    Some(SourceEntry::Transferring { waiters, .. }) => waiters,
                    _ => Vec::new(),
                };
                self.entries.insert(
                    hash.clone(),
                    SourceEntry::Validating {
                        original: bytes,
                        info,
                        waiters,
                    },
                );
                (hash, true)
            }
        }
    }

    /// The authority approved `hash`, returns whatever waited for it
    pub fn validated(&mut self, hash: &SourceHash, bytes: Bytes, info: Option<String>) -> Vec<W> {
        let (original, info, waiters) = match self.entries.remove(hash) {
            Some(SourceEntry::Validating {
                original,
                info: loaded_info,
                waiters,
            }) => (original, info.or(loaded_info), waiters),
            Some(SourceEntry::Transferring { waiters, .. }) => (bytes.clone(), info, waiters),
            Some(SourceEntry::Loaded(source)) => (source.original, info.or(source.info), Vec::new()),
            None => (bytes.clone(), info, Vec::new()),
        };
        self.entries.insert(
            hash.clone(),
            SourceEntry::Loaded(LoadedSource {
                original,
                validated: bytes,
                info,
                authority_local: true,
            }),
        );
        waiters
    }

    /// The authority rejected `hash`, returns whatever waited for it
    pub fn rejected(&mut self, hash: &SourceHash) -> Vec<W> {
        match self.entries.get(hash) {
            Some(SourceEntry::Validating { .. }) => (),
            _ => return Vec::new(),
        }
        match self.entries.remove(hash) {
            Some(SourceEntry::Validating { waiters, .. }) => waiters,
            _ => Vec::new(),
        }
    }

    /// Queue `waiter` behind a pending hash
    ///
    /// Gives the waiter back if the hash is not pending.
    pub fn add_waiter(&mut self, hash: &SourceHash, waiter: W) -> Result<(), W> {
        match self.entries.get_mut(hash) {
            Some(SourceEntry::Validating { waiters, .. })
            | Some(SourceEntry::Transferring { waiters, .. }) => {
                waiters.push(waiter);
                Ok(())
            }
            _ => Err(waiter),
        }
    }

    /// Ask for `hash` to be fetched from `from` on behalf of `waiter`
    ///
    /// Returns `true` if a transfer request has to be sent, `false` if the waiter
    /// was queued behind a transfer or validation already under way.
    pub fn begin_transfer(&mut self, hash: &SourceHash, from: UniquePath, waiter: W) -> bool {
        match self.add_waiter(hash, waiter) {
            Ok(()) => false,
            Err(waiter) => {
                if self.loaded(hash).is_some() {
                    return false;
                }
                self.entries.insert(
                    hash.clone(),
                    SourceEntry::Transferring {
                        from,
                        waiters: vec![waiter],
                    },
                );
                true
            }
        }
    }

    /// The peer `from` is fetching for us, if a transfer is under way
    pub fn transfer_source(&self, hash: &SourceHash) -> Option<&UniquePath> {
        match self.entries.get(hash) {
            Some(SourceEntry::Transferring { from, .. }) => Some(from),
            _ => None,
        }
    }

    /// A peer answered a transfer request
    ///
    /// Empty or corrupted replies fail every waiter, which are returned as the error.
    pub fn transfer_reply(
        &mut self,
        hash: &SourceHash,
        bytes: Option<Bytes>,
        info: Option<String>,
        checksum: Option<u32>,
    ) -> Result<Vec<W>, Vec<W>> {
        let waiters = match self.entries.get(hash) {
            Some(SourceEntry::Transferring { .. }) => match self.entries.remove(hash) {
                Some(SourceEntry::Transferring { waiters, .. }) => waiters,
                _ => Vec::new(),
            },
            _ => return Ok(Vec::new()),
        };
        let bytes = match (bytes, checksum) {
            (Some(bytes), Some(sum)) if !bytes.is_empty() && fletcher32(&bytes) == sum => bytes,
            _ => return Err(waiters),
        };
        self.entries.insert(
            hash.clone(),
            SourceEntry::Loaded(LoadedSource {
                original: bytes.clone(),
                validated: bytes,
                info,
                authority_local: false,
            }),
        );
        Ok(waiters)
    }

    /// Forget `hash`
    ///
    /// Returns whether it was validated by the local authority, and every actor created
    /// from it. Returns `None` if the hash was not loaded here.
    pub fn unload(&mut self, hash: &SourceHash) -> Option<(bool, BTreeSet<UniquePath>)> {
        let authority_local = match self.entries.get(hash) {
            Some(SourceEntry::Loaded(source)) => source.authority_local,
            _ => return None,
        };
        self.entries.remove(hash);
        let instances = self.instances.remove(hash).unwrap_or_default();
        Some((authority_local, instances))
    }

    /// Remember that `actor` was created from `hash`
    pub fn note_instance(&mut self, hash: &SourceHash, actor: UniquePath) {
        self.instances.entry(hash.clone()).or_default().insert(actor);
    }

    pub fn forget_instance(&mut self, hash: &SourceHash, actor: &UniquePath) {
        if let Some(set) = self.instances.get_mut(hash) {
            set.remove(actor);
            if set.is_empty() {
                self.instances.remove(hash);
            }
        }
    }

    /// The bytes to send to a peer asking for `hash`
    pub fn bytes_for_transfer(&self, hash: &SourceHash, prefer_original: bool) -> Option<(Bytes, Option<String>)> {
        self.loaded(hash).map(|source| {
            let bytes = if prefer_original && !source.original.is_empty() {
                source.original.clone()
            } else {
                source.validated.clone()
            };
            (bytes, source.info.clone())
        })
    }
}

impl<W> Default for SourceTable<W> {
    fn default() -> Self {
        SourceTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn peer() -> UniquePath {
        "tcp://10.0.0.2:1900"
            .parse::<crate::actors::SystemPath>()
            .expect("system")
            .admin()
    }

    #[test]
    fn hash_is_stable_hex() {
        let hash = SourceHash::of(b"print('hi')");
        assert_eq!(16, hash.as_str().len());
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, SourceHash::of(b"print('hi')"));
        assert_ne!(hash, SourceHash::of(b"print('ho')"));
    }

    #[test]
    fn fletcher_known_values() {
        assert_eq!(0xF04FC729, fletcher32(b"abcde"));
        assert_eq!(0x56502D2A, fletcher32(b"abcdef"));
        assert_eq!(0xEBE19591, fletcher32(b"abcdefgh"));
    }

    #[test]
    fn loads_wait_for_validation() {
        let mut table: SourceTable<u32> = SourceTable::new();
        let (hash, started) = table.begin_load(Bytes::from_static(b"code"), None);
        assert!(started);
        assert_eq!(SourceState::Validating, table.status(&hash));
        assert!(table.loaded(&hash).is_none());
        assert_eq!(Ok(()), table.add_waiter(&hash, 1));
        let (_, again) = table.begin_load(Bytes::from_static(b"code"), None);
        assert!(!again);
        let waiters = table.validated(&hash, Bytes::from_static(b"CODE"), Some("v1".into()));
        assert_eq!(vec![1], waiters);
        let source = table.loaded(&hash).expect("loaded");
        assert!(source.authority_local);
        assert_eq!(
            Some((Bytes::from_static(b"code"), Some("v1".to_string()))),
            table.bytes_for_transfer(&hash, true)
        );
        assert_eq!(
            Some(Bytes::from_static(b"CODE")),
            table.bytes_for_transfer(&hash, false).map(|(b, _)| b)
        );
    }

    #[test]
    fn rejection_fails_waiters() {
        let mut table: SourceTable<u32> = SourceTable::new();
        let (hash, _) = table.begin_load(Bytes::from_static(b"bad"), None);
        assert_eq!(Ok(()), table.add_waiter(&hash, 7));
        assert_eq!(vec![7], table.rejected(&hash));
        assert_eq!(SourceState::Unknown, table.status(&hash));
        assert_eq!(Err(8), table.add_waiter(&hash, 8));
    }

    #[test]
    fn transfers_check_integrity() {
        let mut table: SourceTable<u32> = SourceTable::new();
        let bytes = Bytes::from_static(b"remote code");
        let hash = SourceHash::of(&bytes);
        assert!(table.begin_transfer(&hash, peer(), 1));
        assert!(!table.begin_transfer(&hash, peer(), 2));
        assert_eq!(Some(&peer()), table.transfer_source(&hash));
        let bad = table.transfer_reply(&hash, Some(bytes.clone()), None, Some(fletcher32(&bytes) ^ 1));
        assert_eq!(Err(vec![1, 2]), bad);
        assert!(table.begin_transfer(&hash, peer(), 3));
        let good = table.transfer_reply(&hash, Some(bytes.clone()), None, Some(fletcher32(&bytes)));
        assert_eq!(Ok(vec![3]), good);
        assert!(!table.loaded(&hash).expect("loaded").authority_local);
    }

    #[test]
    fn empty_transfer_fails() {
        let mut table: SourceTable<u32> = SourceTable::new();
        let hash = SourceHash::of(b"x");
        table.begin_transfer(&hash, peer(), 1);
        assert_eq!(Err(vec![1]), table.transfer_reply(&hash, None, None, None));
    }

    #[test]
    fn unload_returns_instances() {
        let mut table: SourceTable<u32> = SourceTable::new();
        let (hash, _) = table.begin_load(Bytes::from_static(b"code"), None);
        assert_eq!(None, table.unload(&hash));
        table.validated(&hash, Bytes::from_static(b"code"), None);
        let actor = UniquePath::new(peer().system().clone(), Uuid::new_v4());
        table.note_instance(&hash, actor.clone());
        let (local, instances) = table.unload(&hash).expect("loaded");
        assert!(local);
        assert!(instances.contains(&actor));
        assert_eq!(None, table.unload(&hash));
    }
}
