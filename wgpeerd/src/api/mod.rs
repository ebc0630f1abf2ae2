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
use std::path::Path;
use std::sync::Arc;

use ::prometheus::{Encoder, Registry, TextEncoder};
use argon2::password_hash::PasswordHash;
use log::error;
use rocket::fairing::AdHoc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Request, State};
use wgctrl::platform_specific::PlatformSpecificFactory;

use self::common::{ApiError, PrometheusStore};
use self::tokenauth::ApiKey;
use crate::config::Config;
use crate::metrics::PeerMetrics;
use crate::peer::service::PeerService;
use crate::peer::store::PeerStore;

pub(crate) mod common;
pub(crate) mod tokenauth;
mod wg;

pub(crate) struct AuthKeyProvider {
    auth_key: String,
    user_header: String,
    admins: HashSet<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
struct HeartbeatMessage {
    pub(crate) version: String,
}

#[get("/heartbeat")]
async fn heartbeat() -> (Status, Json<HeartbeatMessage>) {
    (
        Status::Ok,
        Json(HeartbeatMessage {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[get("/prometheus")]
async fn prometheus(_apikey: ApiKey, prom_store: &State<PrometheusStore>) -> (Status, String) {
    let mut buffer = Vec::<u8>::new();
    let encoder = TextEncoder::new();
    let metric_families = prom_store.registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (Status::InternalServerError, e.to_string());
    }
    match String::from_utf8(buffer) {
        Ok(x) => (Status::Ok, x),
        Err(e) => (Status::InternalServerError, e.to_string()),
    }
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ApiError>) {
    (status, ApiError::new(-1, status.reason().unwrap_or("Error")))
}

fn build_service(
    cfg: &Config,
    registry: &Registry,
) -> Result<PeerService, Box<dyn std::error::Error>> {
    let metrics = PeerMetrics::new()?;
    metrics.register(registry)?;

    let store = PeerStore::open(Path::new(cfg.store_path()))?;
    let iface = PlatformSpecificFactory::get_interface(
        cfg.wireguard.interface(),
        cfg.wireguard.backend(),
    )?;

    Ok(PeerService::start(&cfg.wireguard, store, iface, metrics)?)
}

/// Opens the store, syncs the interface and mounts `/api`. Launch is
/// aborted when any of it fails.
pub(crate) fn stage(cfg: Config, registry: Registry) -> AdHoc {
    AdHoc::try_on_ignite("API", move |rocket| async move {
        if PasswordHash::new(&cfg.api.apikey).is_err() {
            error!("api.apikey is not an argon2 hash, generate one with wgpeerd-configgen");
            return Err(rocket);
        }

        let svc = match build_service(&cfg, &registry) {
            Ok(x) => x,
            Err(e) => {
                error!("Cannot start peer service: {}", e);
                return Err(rocket);
            }
        };

        let auth = AuthKeyProvider {
            auth_key: cfg.api.apikey.clone(),
            user_header: cfg.api.user_header().to_string(),
            admins: cfg.api.admins.clone().unwrap_or_default().into_iter().collect(),
        };

        Ok(rocket
            .mount(
                "/api",
                routes![heartbeat, prometheus, wg::list, wg::add, wg::remove, wg::download],
            )
            .register("/api", catchers![default_catcher])
            .manage(Arc::new(svc))
            .manage(auth)
            .manage(PrometheusStore { registry }))
    })
}

#[cfg(test)]
mod test {
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::{Algorithm, Argon2, Params, Version};
    use prometheus::Registry;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::blocking::{Client, LocalResponse};

    use super::common::{ApiError, ApiResponse};
    use crate::config::parse_toml;
    use crate::peer::store::ScratchDir;
    use crate::peer::PeerView;

    const KEY: &str = "crowbar";

    fn key_hash() -> String {
        // Cheap parameters keep the per-request verification fast in tests
        let params = Params::new(8, 1, 1, None).unwrap();
        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(KEY.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn client(tag: &str, extra: &str) -> (Client, ScratchDir) {
        let dir = ScratchDir::new(tag);
        let cfg = parse_toml(&format!(
            r##"
            [api]
            apikey = "{}"
            admins = ["root"]
            [wireguard]
            address = "10.0.0.1/29"
            endpoint = "vpn.example.com"
            backend = "memory"
            {}
            [store]
            path = "{}"
            "##,
            key_hash(),
            extra,
            dir.path().display()
        ))
        .unwrap();

        let client =
            Client::tracked(rocket::build().attach(super::stage(cfg, Registry::new()))).unwrap();
        (client, dir)
    }

    fn get<'c>(client: &'c Client, uri: &str, user: &str) -> LocalResponse<'c> {
        client
            .get(uri.to_string())
            .header(Header::new("Authorization", format!("Bearer {}", KEY)))
            .header(Header::new("X-Remote-User", user.to_string()))
            .dispatch()
    }

    fn post<'c>(client: &'c Client, uri: &str, user: &str, body: &str) -> LocalResponse<'c> {
        client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .header(Header::new("Authorization", KEY))
            .header(Header::new("X-Remote-User", user.to_string()))
            .body(body.to_string())
            .dispatch()
    }

    fn add(client: &Client, user: &str, body: &str) -> (Status, Option<PeerView>) {
        let res = post(client, "/api/wg/add", user, body);
        let status = res.status();
        if status != Status::Ok {
            return (status, None);
        }
        (status, res.into_json::<ApiResponse<PeerView>>().unwrap().data)
    }

    fn list(client: &Client, user: &str) -> Vec<PeerView> {
        let res = get(client, "/api/wg/list", user);
        assert_eq!(res.status(), Status::Ok);
        res.into_json::<ApiResponse<Vec<PeerView>>>()
            .unwrap()
            .data
            .unwrap()
    }

    #[test]
    fn test_auth() {
        let (client, _dir) = client("api-auth", "");

        let res = client.get("/api/wg/list").dispatch();
        assert_eq!(res.status(), Status::Unauthorized);
        let err = res.into_json::<ApiError>().unwrap();
        assert_eq!((err.status.as_str(), err.code), ("error", -1));

        let res = client
            .get("/api/wg/list")
            .header(Header::new("Authorization", "Bearer nope"))
            .header(Header::new("X-Remote-User", "alice"))
            .dispatch();
        assert_eq!(res.status(), Status::Unauthorized);

        let res = client
            .get("/api/wg/list")
            .header(Header::new("Authorization", KEY))
            .dispatch();
        assert_eq!(res.status(), Status::Unauthorized);

        let res = client.get("/api/heartbeat").dispatch();
        assert_eq!(res.status(), Status::Ok);
        assert!(res.into_string().unwrap().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_add_list_download() {
        let (client, _dir) = client("api-flow", "");

        let (status, peer) = add(&client, "alice", r#"{"name": "my laptop"}"#);
        assert_eq!(status, Status::Ok);
        let peer = peer.unwrap();
        assert_eq!(peer.ip, "10.0.0.2");
        assert_eq!(peer.user, "alice");
        assert_eq!(peer.name, "my laptop");

        assert_eq!(list(&client, "alice"), vec![peer.clone()]);
        assert!(list(&client, "bob").is_empty());
        assert_eq!(list(&client, "root").len(), 1);

        let raw = get(&client, "/api/wg/list", "alice").into_string().unwrap();
        assert!(!raw.contains("private_key"));
        assert!(!raw.contains("preshared_key"));

        let res = get(&client, &format!("/api/wg/download?id={}", peer.id), "alice");
        assert_eq!(res.status(), Status::Ok);
        assert_eq!(res.content_type(), Some(ContentType::Plain));
        assert_eq!(
            res.headers().get_one("Content-Disposition"),
            Some("attachment; filename*=UTF-8''my%20laptop.conf")
        );
        let body = res.into_string().unwrap();
        assert!(body.starts_with("[Interface]\n"));
        assert!(body.contains("Address = 10.0.0.2/32\n"));
        assert!(body.contains("AllowedIPs = 10.0.0.0/29\n"));

        let res = get(&client, &format!("/api/wg/download?id={}", peer.id), "bob");
        assert_eq!(res.status(), Status::Forbidden);
        let err = res.into_json::<ApiError>().unwrap();
        assert_eq!(err.status, "error");
        assert_eq!(err.code, -1);

        let res = get(&client, "/api/wg/download?id=99", "alice");
        assert_eq!(res.status(), Status::NotFound);

        for uri in ["/api/wg/download", "/api/wg/download?id=abc"] {
            let res = get(&client, uri, "alice");
            assert_eq!(res.status(), Status::UnprocessableEntity);
            assert_eq!(res.into_json::<ApiError>().unwrap().code, -1);
        }
    }

    #[test]
    fn test_pool_and_remove() {
        let (client, _dir) = client("api-pool", "");

        let mut ids = Vec::new();
        for _ in 0..5 {
            let (status, peer) = add(&client, "alice", "{}");
            assert_eq!(status, Status::Ok);
            ids.push(peer.unwrap().id);
        }
        assert_eq!(add(&client, "alice", "{}").0, Status::NotAcceptable);

        let body = format!(r#"{{"id": {}}}"#, ids[0]);
        assert_eq!(post(&client, "/api/wg/remove", "bob", &body).status(), Status::Forbidden);
        assert_eq!(post(&client, "/api/wg/remove", "root", &body).status(), Status::Ok);
        assert_eq!(post(&client, "/api/wg/remove", "alice", &body).status(), Status::NotFound);

        let (status, peer) = add(&client, "alice", "{}");
        assert_eq!(status, Status::Ok);
        assert_eq!(peer.unwrap().ip, "10.0.0.2");
    }

    #[test]
    fn test_rejections() {
        let (client, _dir) = client("api-reject", "max_peers_per_user = 1");

        assert_eq!(
            add(&client, "alice", r#"{"name": "../etc/passwd"}"#).0,
            Status::UnprocessableEntity
        );
        assert_eq!(add(&client, "alice", "{}").0, Status::Ok);
        assert_eq!(add(&client, "alice", "{}").0, Status::Conflict);
    }

    #[test]
    fn test_prometheus() {
        let (client, _dir) = client("api-prom", "");
        add(&client, "alice", "{}");

        let res = client.get("/api/prometheus").dispatch();
        assert_eq!(res.status(), Status::Unauthorized);

        let res = get(&client, "/api/prometheus", "alice");
        assert_eq!(res.status(), Status::Ok);
        let body = res.into_string().unwrap();
        assert!(body.contains("wg_peers_active 1"));
        assert!(body.contains("wg_peer_added_total 1"));
    }
}
