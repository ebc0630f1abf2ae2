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

use super::keygen::Keypair;
use super::PeerRecord;
use crate::config::WireguardConfig;

/// Builds wg-quick files out of stored peers.
pub struct ConfigRenderer {
    server_public_key: String,
    endpoint: String,
    subnet: Ipv4Net,
    dns: Option<String>,
    allowed_ips: Vec<String>,
    keep_alive: Option<u16>,
}

fn keep_alive(cfg: &WireguardConfig) -> Option<u16> {
    cfg.persistent_keepalive.filter(|x| *x != 0)
}

impl ConfigRenderer {
    pub fn new(server_public_key: &str, cfg: &WireguardConfig) -> Self {
        ConfigRenderer {
            server_public_key: server_public_key.to_string(),
            endpoint: cfg.endpoint(),
            subnet: cfg.address.trunc(),
            dns: cfg.dns.clone().filter(|x| !x.trim().is_empty()),
            allowed_ips: cfg.allowed_ips.clone().unwrap_or_default(),
            keep_alive: keep_alive(cfg),
        }
    }

    /// Client side config for `record`. Same input, same bytes.
    pub fn render(&self, record: &PeerRecord) -> Vec<u8> {
        let mut lines = vec![
            "[Interface]".to_string(),
            format!("PrivateKey = {}", record.private_key),
            format!("Address = {}/32", record.address),
        ];
        if let Some(dns) = &self.dns {
            lines.push(format!("DNS = {}", dns));
        }

        let mut allowed_ips = vec![self.subnet.to_string()];
        allowed_ips.extend(self.allowed_ips.iter().cloned());

        lines.push(String::new());
        lines.push("[Peer]".to_string());
        lines.push(format!("PublicKey = {}", self.server_public_key));
        lines.push(format!("PresharedKey = {}", record.preshared_key));
        lines.push(format!("AllowedIPs = {}", allowed_ips.join(", ")));
        lines.push(format!("Endpoint = {}", self.endpoint));
        if let Some(x) = self.keep_alive {
            lines.push(format!("PersistentKeepalive = {}", x));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out.into_bytes()
    }

    pub fn filename(record: &PeerRecord) -> String {
        format!("{}.conf", record.name)
    }
}

/// Server side wg-quick file equivalent to what the daemon programs.
pub fn render_interface(server: &Keypair, cfg: &WireguardConfig, records: &[PeerRecord]) -> String {
    let mut lines = vec![
        "[Interface]".to_string(),
        format!("PrivateKey = {}", server.private_key()),
        format!("Address = {}", cfg.address),
        format!("ListenPort = {}", cfg.listen_port()),
        format!("MTU = {}", cfg.mtu()),
    ];

    for record in records {
        lines.push(String::new());
        lines.push(format!("# {} ({})", record.name, record.owner));
        lines.push("[Peer]".to_string());
        lines.push(format!("PublicKey = {}", record.public_key));
        lines.push(format!("PresharedKey = {}", record.preshared_key));
        lines.push(format!("AllowedIPs = {}/32", record.address));
        if let Some(x) = keep_alive(cfg) {
            lines.push(format!("PersistentKeepalive = {}", x));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
