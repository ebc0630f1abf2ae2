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

use log::{error, info, warn};
use parking_lot::Mutex;
use regex::Regex;
use wgctrl::platform_specific::common::PlatformInterface;

use super::alloc::AddressAllocator;
use super::keygen::{generate_keypair, generate_preshared_key};
use super::render::ConfigRenderer;
use super::store::PeerStore;
use super::sync::{InterfaceSynchronizer, ReconcileReport};
use super::{Caller, NewPeer, PeerRecord};
use crate::config::WireguardConfig;
use crate::error::PeerError;
use crate::metrics::PeerMetrics;

lazy_static! {
    static ref PEER_NAME_RE: Regex = Regex::new(r"^[\w .-]{1,64}$").unwrap();
}

fn check_name(name: Option<&str>) -> Result<Option<String>, PeerError> {
    // Blank counts as not given
    let name = match name.map(str::trim) {
        Some(x) if !x.is_empty() => x,
        _ => return Ok(None),
    };

    match PEER_NAME_RE.is_match(name) {
        true => Ok(Some(name.to_string())),
        false => Err(PeerError::BadParameter {
            msg: "name must be 1 to 64 letters, digits, spaces, '_', '.' or '-'".to_string(),
        }),
    }
}

/// A rendered client config ready to hand out.
pub struct Download {
    pub filename: String,
    pub body: Vec<u8>,
}

/// Peer lifecycle on top of the store and the live interface.
///
/// `add`, `remove` and `reconcile` run under one lock that spans
/// allocation, persistence and the interface update. Reads go to the store
/// directly.
pub struct PeerService {
    store: PeerStore,
    allocator: AddressAllocator,
    sync: Mutex<InterfaceSynchronizer>,
    renderer: ConfigRenderer,
    metrics: PeerMetrics,
    max_peers_per_user: Option<usize>,
}

impl PeerService {
    /// Brings the interface up and makes it match `store` before returning.
    pub fn start(
        cfg: &WireguardConfig,
        store: PeerStore,
        iface: Box<dyn PlatformInterface + Send>,
        metrics: PeerMetrics,
    ) -> Result<Self, PeerError> {
        let allocator = AddressAllocator::new(cfg.address)?;
        let server = store.server_keys();

        let mut sync = InterfaceSynchronizer::new(iface, cfg.persistent_keepalive.filter(|x| *x != 0));
        sync.bring_up(&server, cfg.listen_port(), cfg.address, cfg.mtu())?;

        let svc = PeerService {
            renderer: ConfigRenderer::new(server.public_key(), cfg),
            store,
            allocator,
            sync: Mutex::new(sync),
            metrics,
            max_peers_per_user: cfg.max_peers_per_user,
        };

        for x in svc.store.all() {
            if !svc.allocator.contains(x.address) {
                warn!(
                    "Peer {} has address {} outside of {}",
                    x.id,
                    x.address,
                    svc.allocator.subnet()
                );
            }
        }

        let report = svc.reconcile()?;
        info!(
            "Reconciled interface: {} added, {} updated, {} removed",
            report.added, report.updated, report.removed
        );
        Ok(svc)
    }

    pub fn list(&self, caller: &Caller) -> Vec<PeerRecord> {
        self.store.list(caller)
    }

    pub fn add(&self, caller: &Caller, name: Option<&str>) -> Result<PeerRecord, PeerError> {
        let name = check_name(name)?;
        let mut sync = self.sync.lock();

        if let Some(limit) = self.max_peers_per_user {
            if self.store.count_owned(&caller.user) >= limit {
                return Err(PeerError::QuotaExceeded { limit });
            }
        }

        let keypair = generate_keypair()?;
        let preshared_key = generate_preshared_key()?;
        let address = self.allocator.allocate(&self.store.addresses())?;
        let name = name.unwrap_or_else(|| format!("peer-{}", address));

        let record = self
            .store
            .insert(NewPeer::new(&caller.user, &name, keypair, preshared_key, address))?;
        self.metrics.peers_active.inc();

        // The record is durable now; a failed apply is repaired on next reconcile
        if let Err(e) = sync.apply_add(&record) {
            error!("Peer {} stored but not applied: {}", record.id, e);
            return Err(e);
        }

        self.metrics.peer_added.inc();
        info!(
            "Added peer {} ({}) for {} at {}",
            record.id, record.name, record.owner, record.address
        );
        Ok(record)
    }

    pub fn remove(&self, caller: &Caller, id: u64) -> Result<PeerRecord, PeerError> {
        let mut sync = self.sync.lock();

        let record = self.store.get(id)?;
        if !caller.can_manage(&record) {
            return Err(PeerError::Forbidden);
        }

        // Off the interface before the address becomes allocatable again
        sync.apply_remove(&record.public_key)?;
        let record = self.store.delete(id, caller)?;

        self.metrics.peers_active.dec();
        self.metrics.peer_removed.inc();
        info!("Removed peer {} ({}) of {}", record.id, record.name, record.owner);
        Ok(record)
    }

    /// Client config of peer `id`. Only the owner may fetch it.
    pub fn download(&self, caller: &Caller, id: u64) -> Result<Download, PeerError> {
        let record = self.store.get(id)?;
        if !caller.owns(&record) {
            return Err(PeerError::Forbidden);
        }

        Ok(Download {
            filename: ConfigRenderer::filename(&record),
            body: self.renderer.render(&record),
        })
    }

    pub fn reconcile(&self) -> Result<ReconcileReport, PeerError> {
        let mut sync = self.sync.lock();
        let records = self.store.all();

        let report = sync.reconcile(&records)?;
        self.metrics.peers_active.set(records.len() as i64);
        self.metrics.reconcile_changes.inc_by(report.changes() as u64);
        Ok(report)
    }
}
