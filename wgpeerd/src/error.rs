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

use custom_error::custom_error;
use wgctrl::error::WgctrlError;

custom_error! {pub PeerError
    Entropy{msg: String} = "Random source unavailable: {msg}",
    PoolExhausted = "No addresses available",
    Conflict{msg: String} = "Conflict: {msg}",
    NotFound{id: u64} = "Peer {id} not found",
    Forbidden = "Forbidden",
    QuotaExceeded{limit: usize} = "Peer limit of {limit} reached",
    BadParameter{msg: String} = "Bad parameter: {msg}",
    Store{source: std::io::Error} = "Peer store I/O failed: {source}",
    Corrupt{msg: String} = "Peer store is unreadable: {msg}",
    Interface{source: WgctrlError} = "Interface update failed: {source}",
}

custom_error! {pub ConfigError
    Io{source: std::io::Error} = "Cannot read config file: {source}",
    Parse{source: toml::de::Error} = "Invalid config file: {source}",
    Invalid{msg: String} = "Invalid config: {msg}",
}
