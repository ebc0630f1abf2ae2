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

use std::net::IpAddr;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use prometheus::Registry;

use crate::config::{read_config, Config, DEFAULT_CONFIG_PATH};
use crate::error::PeerError;
use crate::peer::render::render_interface;
use crate::peer::store::PeerStore;

#[macro_use]
extern crate rocket;
#[macro_use]
extern crate lazy_static;

mod api;
mod config;
mod error;
mod metrics;
mod peer;

lazy_static! {
    static ref ARGS: Args = Args::parse();
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Args {
    #[clap(long, short = 'c', value_name = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Print the equivalent wg-quick file for the server and exit
    #[clap(long)]
    print_server_config: bool,
}

const DEFAULT_LISTEN: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

fn print_server_config(cfg: &Config) -> Result<(), PeerError> {
    let store = PeerStore::open(Path::new(cfg.store_path()))?;
    print!(
        "{}",
        render_interface(&store.server_keys(), &cfg.wireguard, &store.all())
    );
    Ok(())
}

fn registry() -> Registry {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    if let Err(e) = registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    )) {
        eprintln!("Process metrics unavailable: {}", e);
    }

    registry
}

#[rocket::main]
async fn main() -> ExitCode {
    let cfg = match read_config(&ARGS.config) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}: {}", ARGS.config, e);
            return ExitCode::FAILURE;
        }
    };

    if ARGS.print_server_config {
        return match print_server_config(&cfg) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let mut rocket_cfg = rocket::Config::default();
    rocket_cfg.address = match cfg.api.listen.as_deref().unwrap_or(DEFAULT_LISTEN).parse::<IpAddr>() {
        Ok(x) => x,
        Err(e) => {
            eprintln!("api.listen: {}", e);
            return ExitCode::FAILURE;
        }
    };
    rocket_cfg.port = cfg.api.port.unwrap_or(DEFAULT_PORT);

    match rocket::custom(rocket_cfg)
        .attach(api::stage(cfg, registry()))
        .launch()
        .await
    {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
