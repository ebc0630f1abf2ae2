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

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use super::AuthKeyProvider;
use crate::peer::Caller;

pub struct ApiKey;

fn key_matches(hash: &str, presented: &str) -> Result<bool, Status> {
    let parsed = match PasswordHash::new(hash) {
        Ok(x) => x,
        Err(_) => return Err(Status::InternalServerError),
    };

    let key = presented.strip_prefix("Bearer ").unwrap_or(presented);
    Ok(Argon2::default()
        .verify_password(key.as_bytes(), &parsed)
        .is_ok())
}

async fn check_key(req: &Request<'_>) -> Result<(), Status> {
    let provider = match req.rocket().state::<AuthKeyProvider>() {
        Some(x) => x,
        None => return Err(Status::InternalServerError),
    };

    let keys: Vec<&str> = req.headers().get("Authorization").collect();
    if keys.len() != 1 {
        return Err(Status::Unauthorized);
    }

    // Verification takes milliseconds of CPU
    let hash = provider.auth_key.clone();
    let presented = keys[0].to_string();
    match rocket::tokio::task::spawn_blocking(move || key_matches(&hash, &presented)).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(Status::Unauthorized),
        Ok(Err(status)) => Err(status),
        Err(_) => Err(Status::InternalServerError),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiKey {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match check_key(req).await {
            Ok(_) => Outcome::Success(Self),
            Err(status) => Outcome::Error((status, ())),
        }
    }
}

/// Authenticated API key plus the user named by the identity header.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Err(status) = check_key(req).await {
            return Outcome::Error((status, ()));
        }

        let provider = match req.rocket().state::<AuthKeyProvider>() {
            Some(x) => x,
            None => return Outcome::Error((Status::InternalServerError, ())),
        };

        match req.headers().get_one(&provider.user_header).map(str::trim) {
            Some(user) if !user.is_empty() => match provider.admins.contains(user) {
                true => Outcome::Success(Caller::admin(user)),
                false => Outcome::Success(Caller::user(user)),
            },
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}
