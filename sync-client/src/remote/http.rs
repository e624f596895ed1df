//! HTTP remote source.
//!
//! Routes:
//! - `GET /runs` lists the user's runs
//! - `POST /run` creates a run, multipart with `RUN_DATA` (JSON) and
//!   `MAP_PICTURE` (JPEG bytes)
//! - `DELETE /run?id=` deletes a run
//! - `GET /logout` ends the session server-side
//!
//! Every request carries the session's access token as a bearer token.

use super::RemoteRunSource;
use crate::session::SessionStorage;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stride_sync_types::{AuthInfo, Location, NetworkError, Run, RunId, UserId};

/// Remote run service over HTTP.
pub struct HttpRemoteSource {
    http: reqwest::Client,
    base_url: String,
    /// Read on every request, so a new login takes effect immediately.
    session: Arc<dyn SessionStorage>,
}

impl HttpRemoteSource {
    /// Build a client for the service at `base_url`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Arc<dyn SessionStorage>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Base URL of the service.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn construct_route(&self, route: &str) -> String {
        if route.starts_with(&self.base_url) {
            route.to_string()
        } else if route.starts_with('/') {
            format!("{}{}", self.base_url, route)
        } else {
            format!("{}/{}", self.base_url, route)
        }
    }

    fn auth(&self) -> Result<AuthInfo, NetworkError> {
        self.session.get().ok_or(NetworkError::Unauthorized)
    }

    async fn send(&self, auth: &AuthInfo, request: RequestBuilder) -> Result<Response, NetworkError> {
        let response = request
            .bearer_auth(&auth.access_token)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        tracing::debug!("Run service answered {}", status);
        Err(status_to_error(status))
    }
}

#[async_trait]
impl RemoteRunSource for HttpRemoteSource {
    async fn fetch_runs(&self) -> Result<Vec<Run>, NetworkError> {
        // Token and owner come from the same session read
        let auth = self.auth()?;
        let response = self
            .send(&auth, self.http.get(self.construct_route("/runs")))
            .await?;
        let dtos: Vec<RunDto> = response.json().await.map_err(map_request_error)?;
        Ok(dtos
            .into_iter()
            .map(|dto| dto.into_run(auth.user_id.clone()))
            .collect())
    }

    async fn create_run(&self, run: &Run, map_picture: &[u8]) -> Result<Run, NetworkError> {
        let run_data =
            serde_json::to_string(&RunDto::from(run)).map_err(|_| NetworkError::Serialization)?;

        let form = Form::new()
            .part(
                "RUN_DATA",
                Part::text(run_data)
                    .mime_str("application/json")
                    .map_err(|_| NetworkError::Unknown)?,
            )
            .part(
                "MAP_PICTURE",
                Part::bytes(map_picture.to_vec())
                    .file_name("mappicture.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|_| NetworkError::Unknown)?,
            );

        let response = self
            .send(
                &self.auth()?,
                self.http.post(self.construct_route("/run")).multipart(form),
            )
            .await?;
        let dto: RunDto = response.json().await.map_err(map_request_error)?;
        Ok(dto.into_run(run.owner_id.clone()))
    }

    async fn delete_run(&self, id: &RunId) -> Result<(), NetworkError> {
        self.send(
            &self.auth()?,
            self.http
                .delete(self.construct_route("/run"))
                .query(&[("id", id.as_str())]),
        )
        .await?;
        Ok(())
    }

    async fn logout(&self) -> Result<(), NetworkError> {
        self.send(&self.auth()?, self.http.get(self.construct_route("/logout")))
            .await?;
        Ok(())
    }

    fn clear_token(&self) {
        // Nothing held: credentials come from session storage per request
    }
}

/// Map a non-success HTTP status to a network error.
pub(crate) fn status_to_error(status: StatusCode) -> NetworkError {
    match status.as_u16() {
        401 => NetworkError::Unauthorized,
        408 => NetworkError::RequestTimeout,
        409 => NetworkError::Conflict,
        413 => NetworkError::PayloadTooLarge,
        429 => NetworkError::TooManyRequests,
        500..=599 => NetworkError::ServerError,
        _ => NetworkError::Unknown,
    }
}

fn map_request_error(error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::RequestTimeout
    } else if error.is_connect() {
        NetworkError::NoInternet
    } else if error.is_decode() {
        NetworkError::Serialization
    } else {
        tracing::debug!("Unclassified request error: {}", error);
        NetworkError::Unknown
    }
}

/// Wire format of a run.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunDto {
    id: String,
    duration_millis: u64,
    distance_meters: u32,
    epoch_millis: i64,
    lat: f64,
    long: f64,
    #[serde(default)]
    avg_speed_kmh: f64,
    max_speed_kmh: f64,
    total_elevation_meters: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    map_picture_url: Option<String>,
}

impl From<&Run> for RunDto {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id.as_str().to_string(),
            duration_millis: run.duration_ms,
            distance_meters: run.distance_meters,
            epoch_millis: run.started_at,
            lat: run.location.lat,
            long: run.location.long,
            avg_speed_kmh: run.avg_speed_kmh(),
            max_speed_kmh: run.max_speed_kmh,
            total_elevation_meters: run.total_elevation_meters,
            map_picture_url: run.map_picture_url.clone(),
        }
    }
}

impl RunDto {
    fn into_run(self, owner_id: UserId) -> Run {
        Run {
            id: RunId::from_string(self.id),
            owner_id,
            started_at: self.epoch_millis,
            duration_ms: self.duration_millis,
            distance_meters: self.distance_meters,
            location: Location::new(self.lat, self.long),
            max_speed_kmh: self.max_speed_kmh,
            total_elevation_meters: self.total_elevation_meters,
            map_picture_url: self.map_picture_url,
        }
    }
}
