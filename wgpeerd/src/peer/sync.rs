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

use std::collections::{HashMap, HashSet};

use ipnet::Ipv4Net;
use log::{debug, info, warn};
use wgctrl::error::WgctrlError;
use wgctrl::platform_specific::common::{PlatformInterface, WgIfCfg, WgPeerCfg};

use super::keygen::Keypair;
use super::PeerRecord;
use crate::error::PeerError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn changes(&self) -> usize {
        self.added + self.updated + self.removed
    }
}

/// Pushes store changes onto the live interface.
///
/// Holds no peer state of its own; every decision is made against what the
/// interface reports right now.
pub struct InterfaceSynchronizer {
    iface: Box<dyn PlatformInterface + Send>,
    keep_alive: Option<u16>,
}

impl InterfaceSynchronizer {
    pub fn new(iface: Box<dyn PlatformInterface + Send>, keep_alive: Option<u16>) -> Self {
        InterfaceSynchronizer { iface, keep_alive }
    }

    /// Server key, listen port, address and link state.
    pub fn bring_up(
        &mut self,
        server: &Keypair,
        listen_port: u16,
        address: Ipv4Net,
        mtu: u32,
    ) -> Result<(), PeerError> {
        self.iface.set_config(WgIfCfg {
            listen_port: Some(listen_port),
            privkey: server.private_key().to_string(),
        })?;
        self.iface.set_ip(address)?;
        self.iface.up(mtu)?;

        info!(
            "Interface {} up at {} (port {}, mtu {})",
            self.iface.name(),
            address,
            listen_port,
            mtu
        );
        Ok(())
    }

    fn peer_cfg(&self, record: &PeerRecord) -> WgPeerCfg {
        WgPeerCfg {
            pubkey: record.public_key.clone(),
            psk: Some(record.preshared_key.clone()),
            allowed_ips: vec![format!("{}/32", record.address)],
            keep_alive: self.keep_alive,
        }
    }

    fn replace(&mut self, want: WgPeerCfg) -> Result<(), PeerError> {
        self.iface.remove_peer(&want.pubkey)?;
        self.iface.add_peer(want)?;
        Ok(())
    }

    /// Installs `record` on the interface. Returns whether anything changed.
    pub fn apply_add(&mut self, record: &PeerRecord) -> Result<bool, PeerError> {
        let want = self.peer_cfg(record);

        match self.iface.get_peer(&want.pubkey) {
            Ok(live) if live.same_as(&want) => Ok(false),
            Ok(_) => {
                debug!("Peer {} differs on the interface, replacing", record.id);
                self.replace(want)?;
                Ok(true)
            }
            Err(WgctrlError::EntryNotFound { .. }) => {
                self.iface.add_peer(want)?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the peer with `public_key`. Returns whether it was present.
    pub fn apply_remove(&mut self, public_key: &str) -> Result<bool, PeerError> {
        match self.iface.remove_peer(public_key) {
            Ok(_) => Ok(true),
            Err(WgctrlError::EntryNotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Makes the interface peer set equal to `records`.
    pub fn reconcile(&mut self, records: &[PeerRecord]) -> Result<ReconcileReport, PeerError> {
        let live: HashMap<String, WgPeerCfg> = self
            .iface
            .get_peers()?
            .into_iter()
            .map(|x| (x.pubkey.clone(), x))
            .collect();
        let wanted: HashSet<&str> = records.iter().map(|x| x.public_key.as_str()).collect();
        let mut report = ReconcileReport::default();

        // Strays go first so their allowed IPs cannot shadow a stored peer
        for pubkey in live.keys().filter(|x| !wanted.contains(x.as_str())) {
            warn!("Removing peer {} that is not in the store", pubkey);
            self.apply_remove(pubkey)?;
            report.removed += 1;
        }

        for record in records {
            let want = self.peer_cfg(record);
            match live.get(&record.public_key) {
                Some(x) if x.same_as(&want) => {}
                Some(_) => {
                    warn!("Peer {} drifted on the interface, reapplying", record.id);
                    self.replace(want)?;
                    report.updated += 1;
                }
                None => {
                    info!("Peer {} missing from the interface, adding", record.id);
                    self.iface.add_peer(want)?;
                    report.added += 1;
                }
            }
        }

        Ok(report)
    }
}
