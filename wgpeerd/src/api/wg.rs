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

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rocket::http::{Header, Status};
use rocket::serde::json::Json;
use rocket::serde::Deserialize;
use rocket::State;

use super::common::{error_status, peer_err, ApiError, ApiResponse, ApiResponseType};
use crate::peer::service::PeerService;
use crate::peer::{Caller, PeerView};

// RFC 5987 attr-char, everything else is percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub(crate) struct AddRequest {
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub(crate) struct RemoveRequest {
    pub(crate) id: u64,
}

#[derive(Responder)]
#[response(status = 200, content_type = "plain")]
pub(crate) struct ConfigFile {
    body: Vec<u8>,
    disposition: Header<'static>,
}

fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(filename, ATTR_CHAR)
    )
}

#[get("/wg/list")]
pub(crate) async fn list(caller: Caller, svc: &State<Arc<PeerService>>) -> ApiResponseType<Vec<PeerView>> {
    let peers = svc.list(&caller).iter().map(PeerView::from).collect();
    (Status::Ok, ApiResponse::ok(peers))
}

#[post("/wg/add", format = "json", data = "<req>")]
pub(crate) async fn add(
    caller: Caller,
    svc: &State<Arc<PeerService>>,
    req: Json<AddRequest>,
) -> ApiResponseType<PeerView> {
    let svc = svc.inner().clone();
    let name = req.into_inner().name;

    // Holds the peer lock across fsync and interface syscalls
    match rocket::tokio::task::spawn_blocking(move || svc.add(&caller, name.as_deref())).await {
        Ok(Ok(x)) => (Status::Ok, ApiResponse::ok(PeerView::from(&x))),
        Ok(Err(e)) => peer_err(e),
        Err(e) => (
            Status::InternalServerError,
            ApiResponse::err(-1, &e.to_string()),
        ),
    }
}

#[post("/wg/remove", format = "json", data = "<req>")]
pub(crate) async fn remove(
    caller: Caller,
    svc: &State<Arc<PeerService>>,
    req: Json<RemoveRequest>,
) -> ApiResponseType<PeerView> {
    let svc = svc.inner().clone();
    let id = req.id;

    match rocket::tokio::task::spawn_blocking(move || svc.remove(&caller, id)).await {
        Ok(Ok(x)) => (Status::Ok, ApiResponse::ok(PeerView::from(&x))),
        Ok(Err(e)) => peer_err(e),
        Err(e) => (
            Status::InternalServerError,
            ApiResponse::err(-1, &e.to_string()),
        ),
    }
}

#[get("/wg/download?<id>")]
pub(crate) async fn download(
    caller: Caller,
    svc: &State<Arc<PeerService>>,
    id: Option<u64>,
) -> Result<ConfigFile, (Status, Json<ApiError>)> {
    let id = match id {
        Some(x) => x,
        None => {
            return Err((
                Status::UnprocessableEntity,
                ApiError::new(-1, "id must be a peer id"),
            ))
        }
    };

    match svc.download(&caller, id) {
        Ok(x) => Ok(ConfigFile {
            body: x.body,
            disposition: Header::new("Content-Disposition", content_disposition(&x.filename)),
        }),
        Err(e) => {
            let (status, msg) = error_status(&e);
            Err((status, ApiError::new(-1, &msg)))
        }
    }
}

#[cfg(test)]
mod test {
    use super::content_disposition;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("my laptop_2-old.conf"),
            "attachment; filename*=UTF-8''my%20laptop_2-old.conf"
        );
        assert_eq!(
            content_disposition("Büro.conf"),
            "attachment; filename*=UTF-8''B%C3%BCro.conf"
        );
        assert_eq!(
            content_disposition("a\"b;c.conf"),
            "attachment; filename*=UTF-8''a%22b%3Bc.conf"
        );
    }
}
