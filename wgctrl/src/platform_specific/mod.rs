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

// Platform common
pub mod common;
pub mod memory;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::*;

use self::common::{PlatformInterface, WgBackend};
use self::memory::MemoryInterface;
use crate::error::WgctrlError;

pub struct PlatformSpecificFactory;

impl PlatformSpecificFactory {
    pub fn get_interface(
        name: &str,
        backend: WgBackend,
    ) -> Result<Box<dyn PlatformInterface + Send>, WgctrlError> {
        match backend {
            WgBackend::Memory => Ok(Box::new(MemoryInterface::new(name))),
            #[cfg(target_os = "linux")]
            WgBackend::Kernel | WgBackend::Userspace => {
                Ok(Box::new(Interface::new(name, backend)?))
            }
            #[cfg(not(target_os = "linux"))]
            WgBackend::Kernel | WgBackend::Userspace => Err(WgctrlError::BadParameter {
                msg: "Only the memory backend is available on this platform".to_string(),
            }),
        }
    }
}
