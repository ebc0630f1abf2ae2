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

use std::convert::TryInto;

// Raw crypto primitives
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::scalar::Scalar;
use rand_core::{OsRng, RngCore};

use crate::error::PeerError;

/// Curve25519 keypair in WireGuard's base64 encoding.
///
/// There is no way to build one from two unrelated keys: the public half is
/// always computed from the private half.
#[derive(Clone)]
pub struct Keypair {
    private_key: String,
    public_key: String,
}

impl Keypair {
    pub fn from_private(private_key: &str) -> Result<Self, PeerError> {
        Ok(Keypair {
            public_key: derive_public(private_key)?,
            private_key: private_key.to_string(),
        })
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

fn clamp(mut x: [u8; 32]) -> [u8; 32] {
    x[0] &= 248;
    x[31] &= 127;
    x[31] |= 64;
    x
}

fn random_bytes<R: RngCore>(rng: &mut R) -> Result<[u8; 32], PeerError> {
    let mut buf = [0u8; 32];
    match rng.try_fill_bytes(&mut buf) {
        Ok(_) => Ok(buf),
        Err(e) => Err(PeerError::Entropy { msg: e.to_string() }),
    }
}

/// base64 private key -> base64 public key, as `wg pubkey` does.
pub fn derive_public(private_key: &str) -> Result<String, PeerError> {
    let pk_bytes: [u8; 32] = match base64::decode(private_key) {
        Ok(x) => match (x.as_slice().try_into()) as Result<[u8; 32], _> {
            Ok(x) => clamp(x),
            Err(_) => {
                return Err(PeerError::BadParameter {
                    msg: "Bad private key: wrong size".to_string(),
                })
            }
        },
        Err(_) => {
            return Err(PeerError::BadParameter {
                msg: "Bad private key: not in b64 format!".to_string(),
            })
        }
    };

    let point = (&ED25519_BASEPOINT_TABLE * &Scalar::from_bits(pk_bytes)).to_montgomery();
    Ok(base64::encode(point.to_bytes()))
}

pub(crate) fn generate_keypair_with<R: RngCore>(rng: &mut R) -> Result<Keypair, PeerError> {
    let private_key = base64::encode(clamp(random_bytes(rng)?));
    Keypair::from_private(&private_key)
}

pub(crate) fn generate_preshared_key_with<R: RngCore>(rng: &mut R) -> Result<String, PeerError> {
    Ok(base64::encode(random_bytes(rng)?))
}

pub fn generate_keypair() -> Result<Keypair, PeerError> {
    generate_keypair_with(&mut OsRng)
}

pub fn generate_preshared_key() -> Result<String, PeerError> {
    generate_preshared_key_with(&mut OsRng)
}
