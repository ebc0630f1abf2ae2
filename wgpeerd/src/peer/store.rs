/*
 * SPDX-FileCopyrightText: 2022 Empo Inc.
 *
 * SPDX-License-Identifier: GPL-3.0-or-later
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::keygen::{self, Keypair};
use super::{Caller, NewPeer, PeerRecord};
use crate::error::PeerError;

#[derive(Deserialize, Serialize)]
struct ServerSection {
    private_key: String,
    public_key: String,
}

/// On-disk layout of the store file.
#[derive(Deserialize, Serialize)]
struct StoreFile {
    server: ServerSection,
    next_id: u64,
    peers: Vec<PeerRecord>,
}

#[derive(Clone)]
struct StoreState {
    server: Keypair,
    next_id: u64,
    peers: BTreeMap<u64, PeerRecord>,
}

impl StoreState {
    fn fresh(server: Keypair) -> Self {
        StoreState {
            server,
            next_id: 1,
            peers: BTreeMap::new(),
        }
    }

    fn from_file(doc: StoreFile) -> Result<Self, PeerError> {
        let server = match Keypair::from_private(&doc.server.private_key) {
            Ok(x) => x,
            Err(e) => return Err(PeerError::Corrupt { msg: e.to_string() }),
        };
        if server.public_key() != doc.server.public_key {
            return Err(PeerError::Corrupt {
                msg: "server public key does not match its private key".to_string(),
            });
        }

        let mut state = StoreState::fresh(server);
        for record in doc.peers {
            if keygen::derive_public(&record.private_key).ok().as_deref() != Some(record.public_key.as_str()) {
                return Err(PeerError::Corrupt {
                    msg: format!("peer {} public key does not match its private key", record.id),
                });
            }
            if record.id >= doc.next_id {
                return Err(PeerError::Corrupt {
                    msg: format!("peer {} is not below next_id {}", record.id, doc.next_id),
                });
            }
            if let Some(other) = state.clash(record.address, &record.public_key) {
                return Err(PeerError::Corrupt {
                    msg: format!("peer {} collides with peer {}", record.id, other),
                });
            }
            if state.peers.insert(record.id, record).is_some() {
                return Err(PeerError::Corrupt {
                    msg: "duplicated peer id".to_string(),
                });
            }
        }
        state.next_id = doc.next_id;

        Ok(state)
    }

    fn to_file(&self) -> StoreFile {
        StoreFile {
            server: ServerSection {
                private_key: self.server.private_key().to_string(),
                public_key: self.server.public_key().to_string(),
            },
            next_id: self.next_id,
            peers: self.peers.values().cloned().collect(),
        }
    }

    /// Id of a record already holding `address` or `public_key`.
    fn clash(&self, address: Ipv4Addr, public_key: &str) -> Option<u64> {
        self.peers
            .values()
            .find(|x| x.address == address || x.public_key == public_key)
            .map(|x| x.id)
    }
}

/// Durable peer registry backed by a single JSON file.
///
/// Every mutation writes the complete next state to a temporary file,
/// syncs it and renames it over the live file before the in-memory copy is
/// replaced, so the file always holds either the old or the new state.
pub struct PeerStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

fn open_private(path: &Path) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let dir = match dir.as_os_str().is_empty() {
            true => Path::new("."),
            false => dir,
        };
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

impl PeerStore {
    /// Loads the store at `path`, creating it with a new server keypair
    /// when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, PeerError> {
        if !path.exists() {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    fs::create_dir_all(dir)?;
                }
            }

            let store = PeerStore {
                path: Some(path.to_path_buf()),
                state: RwLock::new(StoreState::fresh(keygen::generate_keypair()?)),
            };
            store.persist(&store.state.read())?;
            info!("Created peer store {}", path.display());
            return Ok(store);
        }

        let doc: StoreFile = match serde_json::from_slice(&fs::read(path)?) {
            Ok(x) => x,
            Err(e) => return Err(PeerError::Corrupt { msg: e.to_string() }),
        };
        let state = StoreState::from_file(doc)?;
        info!(
            "Loaded {} peers from {}",
            state.peers.len(),
            path.display()
        );

        Ok(PeerStore {
            path: Some(path.to_path_buf()),
            state: RwLock::new(state),
        })
    }

    /// Store that lives only as long as the process.
    #[cfg(test)]
    pub fn ephemeral(server: Keypair) -> Self {
        PeerStore {
            path: None,
            state: RwLock::new(StoreState::fresh(server)),
        }
    }

    fn persist(&self, state: &StoreState) -> Result<(), PeerError> {
        let path = match &self.path {
            Some(x) => x,
            None => return Ok(()),
        };

        let body = match serde_json::to_vec_pretty(&state.to_file()) {
            Ok(x) => x,
            Err(e) => return Err(PeerError::Corrupt { msg: e.to_string() }),
        };

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = open_private(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;
        sync_dir(path.parent().unwrap_or_else(|| Path::new(".")))?;
        Ok(())
    }

    pub fn server_keys(&self) -> Keypair {
        self.state.read().server.clone()
    }

    /// Records visible to `caller`, ordered by id.
    pub fn list(&self, caller: &Caller) -> Vec<PeerRecord> {
        self.state
            .read()
            .peers
            .values()
            .filter(|x| caller.admin || caller.owns(x))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<PeerRecord> {
        self.state.read().peers.values().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Result<PeerRecord, PeerError> {
        match self.state.read().peers.get(&id) {
            Some(x) => Ok(x.clone()),
            None => Err(PeerError::NotFound { id }),
        }
    }

    pub fn addresses(&self) -> HashSet<Ipv4Addr> {
        self.state.read().peers.values().map(|x| x.address).collect()
    }

    pub fn count_owned(&self, owner: &str) -> usize {
        self.state
            .read()
            .peers
            .values()
            .filter(|x| x.owner == owner)
            .count()
    }

    /// Assigns the next id to `peer` and persists it.
    pub fn insert(&self, peer: NewPeer) -> Result<PeerRecord, PeerError> {
        let mut state = self.state.write();

        if let Some(other) = state.clash(peer.address(), peer.public_key()) {
            return Err(PeerError::Conflict {
                msg: format!(
                    "address {} or public key already used by peer {}",
                    peer.address(),
                    other
                ),
            });
        }

        let record = peer.into_record(state.next_id);
        let mut next = state.clone();
        next.next_id += 1;
        next.peers.insert(record.id, record.clone());

        self.persist(&next)?;
        *state = next;
        Ok(record)
    }

    /// Removes record `id` when `caller` owns it or is an administrator.
    pub fn delete(&self, id: u64, caller: &Caller) -> Result<PeerRecord, PeerError> {
        let mut state = self.state.write();

        let record = match state.peers.get(&id) {
            Some(x) if caller.can_manage(x) => x.clone(),
            Some(_) => return Err(PeerError::Forbidden),
            None => return Err(PeerError::NotFound { id }),
        };

        let mut next = state.clone();
        next.peers.remove(&id);

        self.persist(&next)?;
        *state = next;
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) fn scratch_path(tag: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SEQ: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir()
        .join(format!(
            "wgpeerd-{}-{}-{}",
            std::process::id(),
            tag,
            SEQ.fetch_add(1, Ordering::SeqCst)
        ))
        .join("wg.json")
}

/// Scratch store location that is removed again when dropped.
#[cfg(test)]
pub(crate) struct ScratchDir {
    path: PathBuf,
}

#[cfg(test)]
impl ScratchDir {
    pub(crate) fn new(tag: &str) -> Self {
        ScratchDir {
            path: scratch_path(tag),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::net::Ipv4Addr;

    use super::{scratch_path, PeerStore};
    use crate::error::PeerError;
    use crate::peer::keygen::{generate_keypair, generate_preshared_key};
    use crate::peer::{Caller, NewPeer};

    fn new_peer(owner: &str, last_octet: u8) -> NewPeer {
        NewPeer::new(
            owner,
            &format!("{}-{}", owner, last_octet),
            generate_keypair().unwrap(),
            generate_preshared_key().unwrap(),
            Ipv4Addr::new(10, 0, 0, last_octet),
        )
    }

    fn ephemeral() -> PeerStore {
        PeerStore::ephemeral(generate_keypair().unwrap())
    }

    #[test]
    fn test_ids_are_sequential_and_never_reused() {
        let store = ephemeral();
        let a = store.insert(new_peer("alice", 2)).unwrap();
        let b = store.insert(new_peer("alice", 3)).unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        store.delete(b.id, &Caller::user("alice")).unwrap();
        let c = store.insert(new_peer("alice", 3)).unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn test_insert_conflicts() {
        let store = ephemeral();
        store.insert(new_peer("alice", 2)).unwrap();

        assert!(matches!(
            store.insert(new_peer("bob", 2)),
            Err(PeerError::Conflict { .. })
        ));

        let kp = generate_keypair().unwrap();
        let psk = generate_preshared_key().unwrap();
        store
            .insert(NewPeer::new("bob", "x", kp.clone(), psk.clone(), Ipv4Addr::new(10, 0, 0, 3)))
            .unwrap();
        assert!(matches!(
            store.insert(NewPeer::new("bob", "y", kp, psk, Ipv4Addr::new(10, 0, 0, 4))),
            Err(PeerError::Conflict { .. })
        ));
        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn test_list_visibility_and_order() {
        let store = ephemeral();
        store.insert(new_peer("bob", 5)).unwrap();
        store.insert(new_peer("alice", 3)).unwrap();
        store.insert(new_peer("bob", 2)).unwrap();

        let bobs: Vec<u64> = store.list(&Caller::user("bob")).iter().map(|x| x.id).collect();
        assert_eq!(bobs, vec![1, 3]);

        let all: Vec<u64> = store.list(&Caller::admin("root")).iter().map(|x| x.id).collect();
        assert_eq!(all, vec![1, 2, 3]);

        assert!(store.list(&Caller::user("carol")).is_empty());
        assert_eq!(store.count_owned("bob"), 2);
    }

    #[test]
    fn test_delete_authorization() {
        let store = ephemeral();
        let rec = store.insert(new_peer("alice", 2)).unwrap();

        assert!(matches!(
            store.delete(rec.id, &Caller::user("bob")),
            Err(PeerError::Forbidden)
        ));
        assert!(matches!(
            store.delete(99, &Caller::user("alice")),
            Err(PeerError::NotFound { id: 99 })
        ));
        assert_eq!(store.get(rec.id).unwrap(), rec);

        store.delete(rec.id, &Caller::admin("root")).unwrap();
        assert!(matches!(store.get(rec.id), Err(PeerError::NotFound { .. })));
        assert!(store.addresses().is_empty());
    }

    #[test]
    fn test_reopen_restores_state() {
        let path = scratch_path("reopen");
        let (server, rec) = {
            let store = PeerStore::open(&path).unwrap();
            store.insert(new_peer("alice", 2)).unwrap();
            let rec = store.insert(new_peer("bob", 3)).unwrap();
            store.delete(1, &Caller::user("alice")).unwrap();
            (store.server_keys().public_key().to_string(), rec)
        };

        let store = PeerStore::open(&path).unwrap();
        assert_eq!(store.server_keys().public_key(), server);
        assert_eq!(store.all(), vec![rec]);
        assert_eq!(store.insert(new_peer("carol", 4)).unwrap().id, 3);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_tampered_file_is_rejected() {
        let path = scratch_path("tampered");
        {
            let store = PeerStore::open(&path).unwrap();
            store.insert(new_peer("alice", 2)).unwrap();
        }

        let body = fs::read_to_string(&path).unwrap();
        let other = generate_keypair().unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        doc["peers"][0]["public_key"] = serde_json::Value::String(other.public_key().to_string());
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert!(matches!(PeerStore::open(&path), Err(PeerError::Corrupt { .. })));

        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(PeerStore::open(&path), Err(PeerError::Corrupt { .. })));
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_failed_write_keeps_old_state() {
        let path = scratch_path("readonly");
        let store = PeerStore::open(&path).unwrap();
        store.insert(new_peer("alice", 2)).unwrap();

        // A directory where the temp file should go makes the write fail
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        fs::create_dir(&tmp).unwrap();

        assert!(matches!(
            store.insert(new_peer("alice", 3)),
            Err(PeerError::Store { .. })
        ));
        assert_eq!(store.all().len(), 1);
        assert!(matches!(
            store.delete(1, &Caller::user("alice")),
            Err(PeerError::Store { .. })
        ));
        assert_eq!(store.all().len(), 1);

        drop(store);
        assert_eq!(PeerStore::open(&path).unwrap().all().len(), 1);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
