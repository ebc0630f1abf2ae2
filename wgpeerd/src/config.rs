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

use std::fs;

use ipnet::Ipv4Net;
use serde::Deserialize;
use wgctrl::platform_specific::common::WgBackend;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgpeerd/config.toml";

#[derive(Deserialize)]
pub struct Config {
    pub api: Api,
    pub wireguard: WireguardConfig,
    pub store: Option<StoreConfig>,
}

#[derive(Deserialize)]
pub struct Api {
    pub listen: Option<String>,
    pub port: Option<u16>,
    /// argon2 PHC string, see `wgpeerd-configgen`
    pub apikey: String,
    pub user_header: Option<String>,
    pub admins: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct WireguardConfig {
    pub interface: Option<String>,
    /// Interface address with the prefix of the managed pool, e.g. `10.0.0.1/24`
    pub address: Ipv4Net,
    pub listen_port: Option<u16>,
    /// Host clients connect to. `listen_port` is appended when no port is given.
    pub endpoint: String,
    pub dns: Option<String>,
    pub allowed_ips: Option<Vec<String>>,
    pub persistent_keepalive: Option<u16>,
    pub mtu: Option<u32>,
    pub backend: Option<WgBackend>,
    pub max_peers_per_user: Option<usize>,
}

#[derive(Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

const DEFAULT_INTERFACE: &str = "wg0";
const DEFAULT_LISTEN_PORT: u16 = 51820;
const DEFAULT_MTU: u32 = 1450;
const DEFAULT_USER_HEADER: &str = "X-Remote-User";
const DEFAULT_STORE_PATH: &str = "data/wg.json";

fn platform_default_backend() -> WgBackend {
    #[cfg(target_os = "linux")]
    return WgBackend::Kernel;
    // Kernel implementation is not exist in this platform
    #[allow(unreachable_code)]
    WgBackend::Userspace
}

impl WireguardConfig {
    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_INTERFACE)
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT)
    }

    pub fn mtu(&self) -> u32 {
        self.mtu.unwrap_or(DEFAULT_MTU)
    }

    pub fn backend(&self) -> WgBackend {
        self.backend.unwrap_or_else(platform_default_backend)
    }

    /// `host:port` as written into client configs.
    pub fn endpoint(&self) -> String {
        let has_port = match self.endpoint.rsplit_once(':') {
            // Bare IPv6 literals contain colons but no brackets
            Some((host, port)) => {
                (!host.contains(':') || host.ends_with(']')) && port.parse::<u16>().is_ok()
            }
            None => false,
        };

        match has_port {
            true => self.endpoint.clone(),
            false => format!("{}:{}", self.endpoint, self.listen_port()),
        }
    }
}

impl Api {
    pub fn user_header(&self) -> &str {
        self.user_header.as_deref().unwrap_or(DEFAULT_USER_HEADER)
    }
}

impl Config {
    pub fn store_path(&self) -> &str {
        match &self.store {
            Some(x) => &x.path,
            None => DEFAULT_STORE_PATH,
        }
    }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let addr = cfg.wireguard.address;
    if addr.prefix_len() > 30 {
        return Err(ConfigError::Invalid {
            msg: "wireguard.address prefix must be /30 or shorter".to_string(),
        });
    }
    if addr.addr() == addr.network() || addr.addr() == addr.broadcast() {
        return Err(ConfigError::Invalid {
            msg: "wireguard.address must be a host address of its subnet".to_string(),
        });
    }
    if cfg.wireguard.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid {
            msg: "wireguard.endpoint is empty".to_string(),
        });
    }
    if cfg.wireguard.max_peers_per_user == Some(0) {
        return Err(ConfigError::Invalid {
            msg: "wireguard.max_peers_per_user must be at least 1".to_string(),
        });
    }
    for x in cfg.wireguard.allowed_ips.iter().flatten() {
        if x.parse::<ipnet::IpNet>().is_err() {
            return Err(ConfigError::Invalid {
                msg: format!("wireguard.allowed_ips entry {} is not a CIDR", x),
            });
        }
    }

    Ok(())
}

pub(crate) fn parse_toml(tomlstr: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(tomlstr)?;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn read_config(cfgpath: &str) -> Result<Config, ConfigError> {
    parse_toml(&fs::read_to_string(cfgpath)?)
}
