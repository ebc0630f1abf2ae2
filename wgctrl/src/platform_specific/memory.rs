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

use std::collections::BTreeMap;
use std::sync::Arc;

use ipnet::Ipv4Net;
use parking_lot::Mutex;

use super::common::{PlatformInterface, WgIfCfg, WgPeerCfg};
use crate::error::WgctrlError;

#[derive(Default)]
struct MemoryState {
    privkey: Option<String>,
    listen_port: Option<u16>,
    addr: Option<Ipv4Net>,
    mtu: Option<u32>,
    peers: BTreeMap<String, WgPeerCfg>,
    // Peer mutations fail with Internal while set
    failing: bool,
    // Bumped on every successful mutation
    revision: u64,
}

/// Interface that keeps its peer table in process memory.
///
/// Clones share the same table, so a test can keep one handle while the
/// other one is owned by whatever drives the interface.
#[derive(Clone)]
pub struct MemoryInterface {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryInterface {
    pub fn new(name: &str) -> Self {
        MemoryInterface {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn is_up(&self) -> bool {
        self.state.lock().mtu.is_some()
    }

    pub fn address(&self) -> Option<Ipv4Net> {
        self.state.lock().addr
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.state.lock().listen_port
    }

    pub fn has_private_key(&self) -> bool {
        self.state.lock().privkey.is_some()
    }

    /// Makes `add_peer` and `remove_peer` fail until switched back off.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

fn check_failing(state: &MemoryState) -> Result<(), WgctrlError> {
    match state.failing {
        true => Err(WgctrlError::Internal {
            msg: "Interface refused the update".to_string(),
        }),
        false => Ok(()),
    }
}

impl PlatformInterface for MemoryInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_config(&mut self, cfg: WgIfCfg) -> Result<(), WgctrlError> {
        match base64::decode(&cfg.privkey) {
            Ok(x) if x.len() == 32 => {}
            _ => {
                return Err(WgctrlError::BadParameter {
                    msg: "Invalid privkey format".to_string(),
                })
            }
        }

        let mut state = self.state.lock();
        state.privkey = Some(cfg.privkey);
        state.listen_port = cfg.listen_port;
        state.revision += 1;
        Ok(())
    }

    fn add_peer(&mut self, peer: WgPeerCfg) -> Result<(), WgctrlError> {
        let mut state = self.state.lock();
        check_failing(&state)?;
        if state.peers.contains_key(&peer.pubkey) {
            return Err(WgctrlError::DuplicatedEntry {
                msg: "Duplicated peer".to_string(),
            });
        }

        state.peers.insert(peer.pubkey.clone(), peer);
        state.revision += 1;
        Ok(())
    }

    fn get_peers(&self) -> Result<Vec<WgPeerCfg>, WgctrlError> {
        Ok(self.state.lock().peers.values().cloned().collect())
    }

    fn get_peer(&self, pubkey: &str) -> Result<WgPeerCfg, WgctrlError> {
        match self.state.lock().peers.get(pubkey) {
            Some(x) => Ok(x.clone()),
            None => Err(WgctrlError::EntryNotFound {
                msg: "Entry not found".to_string(),
            }),
        }
    }

    fn remove_peer(&mut self, pubkey: &str) -> Result<(), WgctrlError> {
        let mut state = self.state.lock();
        check_failing(&state)?;
        match state.peers.remove(pubkey) {
            Some(_) => {
                state.revision += 1;
                Ok(())
            }
            None => Err(WgctrlError::EntryNotFound {
                msg: "Entry not found".to_string(),
            }),
        }
    }

    fn set_ip(&mut self, addr: Ipv4Net) -> Result<(), WgctrlError> {
        let mut state = self.state.lock();
        state.addr = Some(addr);
        state.revision += 1;
        Ok(())
    }

    fn up(&mut self, mtu: u32) -> Result<(), WgctrlError> {
        let mut state = self.state.lock();
        state.mtu = Some(mtu);
        state.revision += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::MemoryInterface;
    use crate::error::WgctrlError;
    use crate::platform_specific::common::{PlatformInterface, WgPeerCfg};

    fn peer(pubkey: &str) -> WgPeerCfg {
        WgPeerCfg {
            pubkey: pubkey.to_string(),
            psk: None,
            allowed_ips: vec!["10.0.0.2/32".to_string()],
            keep_alive: None,
        }
    }

    #[test]
    fn test_clones_share_peer_table() {
        let observer = MemoryInterface::new("wg-test");
        let mut iface = observer.clone();

        iface.add_peer(peer("a")).unwrap();
        assert_eq!(observer.get_peers().unwrap().len(), 1);
        assert_eq!(observer.revision(), 1);
    }

    #[test]
    fn test_duplicate_and_missing_peers() {
        let mut iface = MemoryInterface::new("wg-test");
        iface.add_peer(peer("a")).unwrap();

        assert!(matches!(
            iface.add_peer(peer("a")),
            Err(WgctrlError::DuplicatedEntry { .. })
        ));
        iface.remove_peer("a").unwrap();
        assert!(matches!(
            iface.remove_peer("a"),
            Err(WgctrlError::EntryNotFound { .. })
        ));
        assert!(matches!(
            iface.get_peer("a"),
            Err(WgctrlError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_failing_switch() {
        let mut iface = MemoryInterface::new("wg-test");
        iface.add_peer(peer("a")).unwrap();
        iface.set_failing(true);

        assert!(matches!(
            iface.add_peer(peer("b")),
            Err(WgctrlError::Internal { .. })
        ));
        assert!(matches!(
            iface.remove_peer("a"),
            Err(WgctrlError::Internal { .. })
        ));
        assert_eq!(iface.get_peers().unwrap().len(), 1);
        assert_eq!(iface.revision(), 1);

        iface.set_failing(false);
        iface.remove_peer("a").unwrap();
    }
}
