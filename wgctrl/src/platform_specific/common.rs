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

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::WgctrlError;

/// Which WireGuard implementation backs an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WgBackend {
    Kernel,
    /// A userspace implementation (boringtun, wireguard-go) listening on
    /// `/var/run/wireguard/<name>.sock`. It must already be running.
    Userspace,
    /// In-process peer table. Touches no network state.
    Memory,
}

#[derive(Clone)]
pub struct WgIfCfg {
    pub listen_port: Option<u16>,
    pub privkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WgPeerCfg {
    pub pubkey: String,
    pub psk: Option<String>,
    pub allowed_ips: Vec<String>,
    pub keep_alive: Option<u16>,
}

impl WgPeerCfg {
    /// Compares what the device would actually enforce. Allowed IP order is
    /// irrelevant and a zero keepalive means "off".
    pub fn same_as(&self, other: &WgPeerCfg) -> bool {
        let mut mine = self.allowed_ips.clone();
        let mut theirs = other.allowed_ips.clone();
        mine.sort();
        theirs.sort();

        self.pubkey == other.pubkey
            && self.psk == other.psk
            && mine == theirs
            && self.keep_alive.filter(|x| *x != 0) == other.keep_alive.filter(|x| *x != 0)
    }
}

pub trait PlatformInterface {
    fn name(&self) -> &str;
    fn set_config(&mut self, cfg: WgIfCfg) -> Result<(), WgctrlError>;
    /// Fails with `DuplicatedEntry` when the public key is already present.
    fn add_peer(&mut self, peer: WgPeerCfg) -> Result<(), WgctrlError>;
    /// Reads the live peer set, not a cached copy.
    fn get_peers(&self) -> Result<Vec<WgPeerCfg>, WgctrlError>;
    fn get_peer(&self, pubkey: &str) -> Result<WgPeerCfg, WgctrlError>;
    /// Fails with `EntryNotFound` when the public key is not present.
    fn remove_peer(&mut self, pubkey: &str) -> Result<(), WgctrlError>;
    fn set_ip(&mut self, addr: Ipv4Net) -> Result<(), WgctrlError>;
    fn up(&mut self, mtu: u32) -> Result<(), WgctrlError>;
}

#[cfg(test)]
mod test {
    use super::WgPeerCfg;

    fn peer(allowed_ips: &[&str], keep_alive: Option<u16>) -> WgPeerCfg {
        WgPeerCfg {
            pubkey: "LCBsla9u/BT2i9yYKqCi6yHh2nKvvdgyMPVYCkLh/3Y=".to_string(),
            psk: None,
            allowed_ips: allowed_ips.iter().map(|x| x.to_string()).collect(),
            keep_alive,
        }
    }

    #[test]
    fn test_same_as_ignores_order_and_zero_keepalive() {
        let a = peer(&["10.0.0.2/32", "fd00::2/128"], Some(0));
        let b = peer(&["fd00::2/128", "10.0.0.2/32"], None);
        assert!(a.same_as(&b));
    }

    #[test]
    fn test_same_as_detects_drift() {
        let a = peer(&["10.0.0.2/32"], Some(25));
        assert!(!a.same_as(&peer(&["10.0.0.3/32"], Some(25))));
        assert!(!a.same_as(&peer(&["10.0.0.2/32"], None)));
    }
}
