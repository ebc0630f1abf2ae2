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

use std::error::Error;
use std::fs::File;
use std::io::Write;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use clap::Parser;
use serde::Serialize;

#[macro_use]
extern crate lazy_static;

lazy_static! {
    static ref ARGS: Args = Args::parse();
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Args {
    #[clap(long, short = 'c', value_name = "CONFIG")]
    config: String,

    /// Random key printed once when not given
    #[clap(long, short = 't', value_name = "password")]
    token: Option<String>,

    #[clap(long, short = 'p', value_name = "port")]
    port: Option<u16>,

    /// Host clients use to reach the server
    #[clap(long, short = 'e', value_name = "host[:port]")]
    endpoint: String,

    #[clap(long, short = 'a', value_name = "CIDR", default_value = "10.0.0.1/24")]
    address: String,

    /// May be given more than once
    #[clap(long, value_name = "user")]
    admin: Vec<String>,
}

#[derive(Serialize)]
struct Config {
    pub api: Api,
    pub wireguard: Wireguard,
}

#[derive(Serialize)]
struct Api {
    pub listen: String,
    pub port: Option<u16>,
    pub apikey: String,
    pub admins: Vec<String>,
}

#[derive(Serialize)]
struct Wireguard {
    pub address: String,
    pub endpoint: String,
}

fn random_token() -> Result<String, Box<dyn Error>> {
    let mut buf = [0u8; 32];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| e.to_string())?;
    Ok(base64::encode(buf))
}

fn main() -> Result<(), Box<dyn Error>> {
    if ARGS.address.parse::<ipnet::Ipv4Net>().is_err() {
        return Err(format!("{} is not an IPv4 CIDR", ARGS.address).into());
    }

    // Generate salt
    let salt = SaltString::generate(&mut OsRng);
    let (token, generated) = match &ARGS.token {
        Some(x) => (x.clone(), false),
        None => (random_token()?, true),
    };
    if token.is_empty() {
        return Err("API key must not be empty".into());
    }

    let argon2 = Argon2::default();
    let token_hash = argon2
        .hash_password(token.as_bytes(), &salt)
        .map_err(|e| e.to_string())?
        .to_string();

    let cfg = Config {
        api: Api {
            listen: "127.0.0.1".to_string(),
            port: ARGS.port,
            apikey: token_hash,
            admins: ARGS.admin.clone(),
        },
        wireguard: Wireguard {
            address: ARGS.address.clone(),
            endpoint: ARGS.endpoint.clone(),
        },
    };

    let cfgstr = toml::to_string(&cfg)?;

    let mut cfgfile = File::create(&ARGS.config)?;
    cfgfile.write_all(cfgstr.as_bytes())?;

    // Only the hash is kept, this is the one chance to see the key
    if generated {
        println!("Generated API key: {}", token);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::random_token;

    #[test]
    fn test_random_token() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();

        assert_eq!(base64::decode(&a).unwrap().len(), 32);
        assert_ne!(a, b);
        assert_ne!(a, "crowbar");
    }
}
