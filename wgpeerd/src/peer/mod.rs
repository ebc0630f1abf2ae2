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

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use self::keygen::Keypair;

pub(crate) mod alloc;
pub(crate) mod keygen;
pub(crate) mod render;
pub(crate) mod service;
pub(crate) mod store;
pub(crate) mod sync;

/// Durable peer entry. Only `PeerStore::insert` creates one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeerRecord {
    pub id: u64,
    pub owner: String,
    pub name: String,
    pub private_key: String,
    pub public_key: String,
    pub preshared_key: String,
    pub address: Ipv4Addr,
}

/// A peer that has not been assigned an id yet.
pub struct NewPeer {
    owner: String,
    name: String,
    keypair: Keypair,
    preshared_key: String,
    address: Ipv4Addr,
}

impl NewPeer {
    pub fn new(
        owner: &str,
        name: &str,
        keypair: Keypair,
        preshared_key: String,
        address: Ipv4Addr,
    ) -> Self {
        NewPeer {
            owner: owner.to_string(),
            name: name.to_string(),
            keypair,
            preshared_key,
            address,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn public_key(&self) -> &str {
        self.keypair.public_key()
    }

    pub(crate) fn into_record(self, id: u64) -> PeerRecord {
        PeerRecord {
            id,
            owner: self.owner,
            name: self.name,
            private_key: self.keypair.private_key().to_string(),
            public_key: self.keypair.public_key().to_string(),
            preshared_key: self.preshared_key,
            address: self.address,
        }
    }
}

/// Whoever a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user: String,
    pub admin: bool,
}

impl Caller {
    pub fn user(user: &str) -> Self {
        Caller {
            user: user.to_string(),
            admin: false,
        }
    }

    pub fn admin(user: &str) -> Self {
        Caller {
            user: user.to_string(),
            admin: true,
        }
    }

    pub fn owns(&self, record: &PeerRecord) -> bool {
        self.user == record.owner
    }

    pub fn can_manage(&self, record: &PeerRecord) -> bool {
        self.admin || self.owns(record)
    }
}

/// What the API hands out for a peer. Field names follow the web client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeerView {
    pub id: u64,
    pub user: String,
    pub name: String,
    pub public_key: String,
    pub ip: String,
}

impl From<&PeerRecord> for PeerView {
    // Secrets stay out; they only leave through the rendered config
    fn from(record: &PeerRecord) -> Self {
        PeerView {
            id: record.id,
            user: record.owner.clone(),
            name: record.name.clone(),
            public_key: record.public_key.clone(),
            ip: record.address.to_string(),
        }
    }
}
