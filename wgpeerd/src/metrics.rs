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

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Counters exported on `/api/prometheus`.
#[derive(Clone)]
pub struct PeerMetrics {
    pub peers_active: IntGauge,
    pub peer_added: IntCounter,
    pub peer_removed: IntCounter,
    pub reconcile_changes: IntCounter,
}

impl PeerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(PeerMetrics {
            peers_active: IntGauge::with_opts(Opts::new(
                "wg_peers_active",
                "Peers currently stored and configured",
            ))?,
            peer_added: IntCounter::with_opts(Opts::new(
                "wg_peer_added_total",
                "Peers created since start",
            ))?,
            peer_removed: IntCounter::with_opts(Opts::new(
                "wg_peer_removed_total",
                "Peers removed since start",
            ))?,
            reconcile_changes: IntCounter::with_opts(Opts::new(
                "wg_reconcile_changes_total",
                "Interface corrections made while reconciling",
            ))?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.peers_active.clone()))?;
        registry.register(Box::new(self.peer_added.clone()))?;
        registry.register(Box::new(self.peer_removed.clone()))?;
        registry.register(Box::new(self.reconcile_changes.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use prometheus::{Encoder, Registry, TextEncoder};

    use super::PeerMetrics;

    #[test]
    fn test_register_and_encode() {
        let registry = Registry::new();
        let metrics = PeerMetrics::new().unwrap();
        metrics.register(&registry).unwrap();
        metrics.peer_added.inc();
        metrics.peers_active.set(3);

        let mut buffer = Vec::<u8>::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let out = String::from_utf8(buffer).unwrap();

        assert!(out.contains("wg_peer_added_total 1"));
        assert!(out.contains("wg_peers_active 3"));
        assert!(out.contains("wg_reconcile_changes_total 0"));

        // Same names twice is a registration error
        assert!(metrics.register(&registry).is_err());
    }
}
