/*
 * SPDX-FileCopyrightText: 2022 Empo Inc.
 * SPDX-FileCopyrightText: 2022 Tonari, Inc.
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

/*
 * Based on Innernet project.
 * https://github.com/tonarino/innernet/
 */

use ipnet::Ipv4Net;
use netlink_packet_core::{
    NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_REQUEST,
};
use netlink_packet_route::address;
use netlink_packet_route::constants::*;
use netlink_packet_route::link;
use netlink_packet_route::{AddressHeader, AddressMessage, LinkHeader, LinkMessage, RtnlMessage};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
use std::io;
use wireguard_control::InterfaceName;

fn if_nametoindex(interface: &InterfaceName) -> Result<u32, io::Error> {
    match unsafe { libc::if_nametoindex(interface.as_ptr()) } {
        0 => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("couldn't find interface '{}'.", interface),
        )),
        index => Ok(index),
    }
}

/// Sends one rtnetlink request and collects replies until the kernel acks.
fn netlink_call(message: RtnlMessage, flags: u16) -> Result<(), io::Error> {
    let mut req = NetlinkMessage::from(message);
    req.header.flags = flags;
    req.finalize();
    let mut buf = [0; 4096];
    req.serialize(&mut buf);
    let len = req.buffer_len();

    log::trace!("netlink request: {:?}", req);
    let socket = Socket::new(NETLINK_ROUTE)?;
    socket.connect(&SocketAddr::new(0, 0))?;
    if socket.send(&buf[..len], 0)? != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "failed to send netlink request",
        ));
    }

    loop {
        let n_received = socket.recv(&mut &mut buf[..], 0)?;
        let mut offset = 0;
        while offset < n_received {
            let response = NetlinkMessage::<RtnlMessage>::deserialize(&buf[offset..])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            log::trace!("netlink response: {:?}", response);
            match response.payload {
                NetlinkPayload::Ack(_) | NetlinkPayload::Done => return Ok(()),
                NetlinkPayload::Error(e) => return Err(e.into()),
                _ => {}
            }
            if response.header.length == 0 {
                break;
            }
            offset += response.header.length as usize;
        }
    }
}

pub fn set_up(interface: &InterfaceName, mtu: u32) -> Result<(), io::Error> {
    let index = if_nametoindex(interface)?;
    let message = LinkMessage {
        header: LinkHeader {
            index,
            flags: IFF_UP,
            change_mask: IFF_UP,
            ..Default::default()
        },
        nlas: vec![link::nlas::Nla::Mtu(mtu)],
    };
    netlink_call(RtnlMessage::SetLink(message), NLM_F_REQUEST | NLM_F_ACK)
}

/// Assigns `addr` to the interface, replacing an identical assignment.
pub fn set_addr(interface: &InterfaceName, addr: Ipv4Net) -> Result<(), io::Error> {
    let index = if_nametoindex(interface)?;
    let addr_bytes = addr.addr().octets().to_vec();
    let message = AddressMessage {
        header: AddressHeader {
            index,
            family: AF_INET as u8,
            prefix_len: addr.prefix_len(),
            scope: RT_SCOPE_UNIVERSE,
            ..Default::default()
        },
        nlas: vec![
            address::Nla::Local(addr_bytes.clone()),
            address::Nla::Address(addr_bytes),
        ],
    };
    netlink_call(
        RtnlMessage::NewAddress(message),
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_REPLACE | NLM_F_CREATE,
    )
}
