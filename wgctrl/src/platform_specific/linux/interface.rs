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

use std::str::FromStr;

use ipnet::Ipv4Net;
use wireguard_control::{
    AllowedIp, Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfig, PeerConfigBuilder,
};

use super::super::common::{PlatformInterface, WgBackend, WgIfCfg, WgPeerCfg};
use crate::error::WgctrlError;

use super::super::super::netlink;

pub struct Interface {
    name: String,
    ifname: InterfaceName,
    backend: Backend,
}

fn parse_key(b64: &str, what: &str) -> Result<Key, WgctrlError> {
    match Key::from_base64(b64) {
        Ok(x) => Ok(x),
        Err(_) => Err(WgctrlError::BadParameter {
            msg: format!("Invalid {} format", what),
        }),
    }
}

fn to_peer_cfg(cfg: &PeerConfig) -> WgPeerCfg {
    WgPeerCfg {
        pubkey: cfg.public_key.to_base64(),
        psk: cfg.preshared_key.as_ref().map(|x| x.to_base64()),
        allowed_ips: cfg
            .allowed_ips
            .iter()
            .map(|x| format!("{}/{}", x.address, x.cidr))
            .collect(),
        keep_alive: cfg.persistent_keepalive_interval,
    }
}

impl Interface {
    pub fn new(name: &str, backend: WgBackend) -> Result<Self, WgctrlError> {
        let ifname: InterfaceName = match name.parse() {
            Ok(ifname) => ifname,
            Err(_) => {
                return Err(WgctrlError::BadParameter {
                    msg: "Invalid interface name".to_string(),
                });
            }
        };

        let backend = match backend {
            WgBackend::Kernel => Backend::Kernel,
            WgBackend::Userspace => Backend::Userspace,
            WgBackend::Memory => {
                return Err(WgctrlError::BadParameter {
                    msg: "Memory backend is not a platform interface".to_string(),
                })
            }
        };

        // An empty update creates the kernel link when it is missing
        if matches!(backend, Backend::Kernel) {
            if let Err(e) = DeviceUpdate::new().apply(&ifname, backend) {
                return Err(WgctrlError::Internal { msg: e.to_string() });
            }
        }

        Ok(Interface {
            name: name.to_string(),
            ifname,
            backend,
        })
    }

    fn device(&self) -> Result<Device, WgctrlError> {
        match Device::get(&self.ifname, self.backend) {
            Ok(x) => Ok(x),
            Err(e) => Err(WgctrlError::Internal {
                msg: format!("Failed to read interface {}: {}", self.name, e),
            }),
        }
    }

    fn apply(&self, update: DeviceUpdate) -> Result<(), WgctrlError> {
        match update.apply(&self.ifname, self.backend) {
            Ok(_) => Ok(()),
            Err(e) => Err(WgctrlError::Internal {
                msg: format!("Failed to update interface {}: {}", self.name, e),
            }),
        }
    }
}

impl PlatformInterface for Interface {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_config(&mut self, cfg: WgIfCfg) -> Result<(), WgctrlError> {
        let privkey = parse_key(&cfg.privkey, "privkey")?;

        let mut update = DeviceUpdate::new().set_private_key(privkey);
        update = match cfg.listen_port {
            Some(x) => update.set_listen_port(x),
            None => update,
        };

        self.apply(update)
    }

    fn add_peer(&mut self, peer: WgPeerCfg) -> Result<(), WgctrlError> {
        let pubkey = parse_key(&peer.pubkey, "pubkey")?;
        let psk = match peer.psk {
            Some(ref x) => Some(parse_key(x, "psk")?),
            None => None,
        };

        if self
            .device()?
            .peers
            .iter()
            .any(|x| x.config.public_key == pubkey)
        {
            return Err(WgctrlError::DuplicatedEntry {
                msg: "Duplicated peer".to_string(),
            });
        }

        let mut allowed_ips: Vec<AllowedIp> = Vec::with_capacity(peer.allowed_ips.len());
        for x in peer.allowed_ips.iter() {
            match AllowedIp::from_str(x) {
                Ok(ip) => allowed_ips.push(ip),
                Err(_) => {
                    return Err(WgctrlError::BadParameter {
                        msg: format!("Invalid allowed ip {}", x),
                    })
                }
            }
        }

        let mut peercfg = PeerConfigBuilder::new(&pubkey)
            .replace_allowed_ips()
            .add_allowed_ips(allowed_ips.as_slice());
        peercfg = match psk {
            Some(x) => peercfg.set_preshared_key(x),
            None => peercfg,
        };
        peercfg = match peer.keep_alive {
            Some(x) => peercfg.set_persistent_keepalive_interval(x),
            None => peercfg,
        };

        self.apply(DeviceUpdate::new().add_peer(peercfg))
    }

    fn get_peers(&self) -> Result<Vec<WgPeerCfg>, WgctrlError> {
        Ok(self
            .device()?
            .peers
            .iter()
            .map(|x| to_peer_cfg(&x.config))
            .collect())
    }

    fn get_peer(&self, pubkey: &str) -> Result<WgPeerCfg, WgctrlError> {
        let pk = parse_key(pubkey, "pubkey")?;

        match self
            .device()?
            .peers
            .iter()
            .find(|x| x.config.public_key == pk)
        {
            Some(x) => Ok(to_peer_cfg(&x.config)),
            None => Err(WgctrlError::EntryNotFound {
                msg: "Entry not found".to_string(),
            }),
        }
    }

    fn remove_peer(&mut self, pubkey: &str) -> Result<(), WgctrlError> {
        let pk = parse_key(pubkey, "pubkey")?;

        if !self
            .device()?
            .peers
            .iter()
            .any(|x| x.config.public_key == pk)
        {
            return Err(WgctrlError::EntryNotFound {
                msg: "Entry not found".to_string(),
            });
        }

        self.apply(DeviceUpdate::new().remove_peer_by_key(&pk))
    }

    fn set_ip(&mut self, addr: Ipv4Net) -> Result<(), WgctrlError> {
        match netlink::set_addr(&self.ifname, addr) {
            Ok(_) => Ok(()),
            Err(e) => Err(WgctrlError::Internal {
                msg: format!("Failed to set address: {}", e),
            }),
        }
    }

    fn up(&mut self, mtu: u32) -> Result<(), WgctrlError> {
        match netlink::set_up(&self.ifname, mtu) {
            Ok(_) => Ok(()),
            Err(e) => Err(WgctrlError::Internal {
                msg: format!("Failed to bring interface up: {}", e),
            }),
        }
    }
}
