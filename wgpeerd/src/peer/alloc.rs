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

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::PeerError;

/// Hands out peer addresses from the interface subnet.
///
/// Keeps no record of what it handed out. Callers pass the addresses that
/// are currently stored, so a deleted peer frees its address immediately.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    subnet: Ipv4Net,
    reserved: Ipv4Addr,
}

impl AddressAllocator {
    /// `interface` is the interface's own address with the pool prefix,
    /// e.g. `10.0.0.1/24`.
    pub fn new(interface: Ipv4Net) -> Result<Self, PeerError> {
        if interface.prefix_len() > 30 {
            return Err(PeerError::BadParameter {
                msg: format!("{} leaves no room for peers", interface),
            });
        }

        let subnet = interface.trunc();
        if !subnet.hosts().any(|x| x == interface.addr()) {
            return Err(PeerError::BadParameter {
                msg: format!("{} is not a host address", interface),
            });
        }

        Ok(AddressAllocator {
            subnet,
            reserved: interface.addr(),
        })
    }

    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.subnet.contains(&addr) && addr != self.subnet.network() && addr != self.subnet.broadcast()
    }

    /// Lowest free host address of the subnet.
    pub fn allocate(&self, existing: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr, PeerError> {
        // hosts() already skips the network and broadcast addresses
        match self
            .subnet
            .hosts()
            .find(|x| *x != self.reserved && !existing.contains(x))
        {
            Some(x) => Ok(x),
            None => Err(PeerError::PoolExhausted),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    use super::AddressAllocator;
    use crate::error::PeerError;

    fn alloc(cidr: &str) -> AddressAllocator {
        AddressAllocator::new(cidr.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_lowest_free_address() {
        let pool = alloc("10.0.0.1/24");
        let mut used = HashSet::new();

        assert_eq!(pool.allocate(&used).unwrap(), Ipv4Addr::new(10, 0, 0, 2));
        used.insert(Ipv4Addr::new(10, 0, 0, 2));
        used.insert(Ipv4Addr::new(10, 0, 0, 4));
        assert_eq!(pool.allocate(&used).unwrap(), Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn test_server_in_the_middle() {
        let pool = alloc("10.0.0.3/29");
        let used: HashSet<Ipv4Addr> = [1, 2].iter().map(|x| Ipv4Addr::new(10, 0, 0, *x)).collect();

        assert_eq!(pool.allocate(&used).unwrap(), Ipv4Addr::new(10, 0, 0, 4));
    }

    #[test]
    fn test_small_pool_exhaustion() {
        let pool = alloc("10.0.0.1/29");
        let mut used = HashSet::new();

        for expect in 2..=6 {
            let ip = pool.allocate(&used).unwrap();
            assert_eq!(ip, Ipv4Addr::new(10, 0, 0, expect));
            used.insert(ip);
        }
        assert!(matches!(pool.allocate(&used), Err(PeerError::PoolExhausted)));

        used.remove(&Ipv4Addr::new(10, 0, 0, 4));
        assert_eq!(pool.allocate(&used).unwrap(), Ipv4Addr::new(10, 0, 0, 4));
    }

    #[test]
    fn test_rejects_bad_interface_address() {
        assert!(AddressAllocator::new("10.0.0.0/24".parse().unwrap()).is_err());
        assert!(AddressAllocator::new("10.0.0.255/24".parse().unwrap()).is_err());
        assert!(AddressAllocator::new("10.0.0.1/31".parse().unwrap()).is_err());
    }

    #[test]
    fn test_contains() {
        let pool = alloc("10.0.0.1/29");
        assert!(pool.contains(Ipv4Addr::new(10, 0, 0, 6)));
        assert!(!pool.contains(Ipv4Addr::new(10, 0, 0, 7)));
        assert!(!pool.contains(Ipv4Addr::new(10, 0, 0, 0)));
        assert!(!pool.contains(Ipv4Addr::new(10, 0, 1, 2)));
    }
}
