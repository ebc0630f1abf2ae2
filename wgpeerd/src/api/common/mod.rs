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

use log::error;
use prometheus::Registry;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};

use crate::error::PeerError;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub(crate) struct ApiResponse<T> {
    pub(crate) status: String,
    pub(crate) data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub(crate) struct ApiError {
    pub(crate) status: String,
    pub(crate) code: i64,
    pub(crate) message: String,
}

impl ApiError {
    pub fn new(code: i64, message: &str) -> Json<Self> {
        Json(ApiError {
            status: "error".to_string(),
            message: message.to_string(),
            code,
        })
    }
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Result<Json<Self>, Json<ApiError>> {
        Ok(Json(Self {
            status: "ok".to_string(),
            data: Some(data),
        }))
    }

    pub fn err(code: i64, message: &str) -> Result<Json<ApiResponse<T>>, Json<ApiError>> {
        Err(ApiError::new(code, message))
    }
}

pub(crate) struct PrometheusStore {
    pub(crate) registry: Registry,
}

pub(crate) type ApiResponseType<T> = (Status, Result<Json<ApiResponse<T>>, Json<ApiError>>);

/// HTTP status and client message for a failed peer operation.
pub(crate) fn error_status(e: &PeerError) -> (Status, String) {
    let status = match e {
        PeerError::NotFound { .. } => Status::NotFound,
        PeerError::Forbidden => Status::Forbidden,
        PeerError::PoolExhausted => Status::NotAcceptable,
        PeerError::QuotaExceeded { .. } => Status::Conflict,
        PeerError::BadParameter { .. } => Status::UnprocessableEntity,
        PeerError::Entropy { .. } => Status::ServiceUnavailable,
        PeerError::Conflict { .. }
        | PeerError::Store { .. }
        | PeerError::Corrupt { .. }
        | PeerError::Interface { .. } => {
            error!("{}", e);
            return (Status::InternalServerError, "Internal server error".to_string());
        }
    };

    (status, e.to_string())
}

pub(crate) fn peer_err<T>(e: PeerError) -> ApiResponseType<T> {
    let (status, msg) = error_status(&e);
    (status, ApiResponse::err(-1, &msg))
}

#[cfg(test)]
mod test {
    use rocket::http::Status;

    use super::error_status;
    use crate::error::PeerError;

    #[test]
    fn test_error_status() {
        let cases = vec![
            (PeerError::NotFound { id: 7 }, Status::NotFound),
            (PeerError::Forbidden, Status::Forbidden),
            (PeerError::PoolExhausted, Status::NotAcceptable),
            (PeerError::QuotaExceeded { limit: 1 }, Status::Conflict),
            (
                PeerError::BadParameter {
                    msg: "name".to_string(),
                },
                Status::UnprocessableEntity,
            ),
            (
                PeerError::Entropy {
                    msg: "gone".to_string(),
                },
                Status::ServiceUnavailable,
            ),
            (
                PeerError::Conflict {
                    msg: "address".to_string(),
                },
                Status::InternalServerError,
            ),
        ];

        for (e, status) in cases {
            assert_eq!(error_status(&e).0, status);
        }

        let (_, msg) = error_status(&PeerError::Corrupt {
            msg: "/var/lib/secret".to_string(),
        });
        assert!(!msg.contains("/var/lib"));
    }
}
