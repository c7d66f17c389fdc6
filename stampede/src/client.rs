//! Typed access to the remote scheduling API.
//!
//! The client only transports: it returns statuses and decoded bodies and leaves every
//! classification to the flows.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Error};

/// Appointment modality. Each schedule picks one uniformly at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Virtual,
    InPerson,
}

impl Modality {
    pub fn random() -> Self {
        if rand::random_bool(0.5) {
            Modality::Virtual
        } else {
            Modality::InPerson
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub organization_id: i64,
    pub clinic_id: i64,
    pub patient_id: i64,
    pub modality: Modality,
}

/// The part of the created appointment the flows care about. Queued (202) responses
/// carry no body at all.
#[derive(Debug, Clone, Deserialize)]
struct CreatedAppointment {
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub status: u16,
    pub appointment_id: Option<i64>,
}

/// Body of the stats endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub appointment_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsResponse {
    pub status: u16,
    /// Present only for a 200 with a decodable body.
    pub stats: Option<AppointmentStats>,
}

/// A streaming connection that has been closed.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSession {
    pub status: u16,
    /// Time until response headers arrived.
    pub connect_latency: Duration,
    /// Time the connection stayed open in total.
    pub held_for: Duration,
    pub bytes: usize,
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client whose calls give up after `request_timeout`.
    ///
    /// [`ApiClient::open_stream`] overrides it with its own per-connection timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(concat!("stampede/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(Error::Client)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/appointments`
    pub async fn create_appointment(&self, request: &ScheduleRequest) -> Result<Scheduled, ApiError> {
        let res = self
            .http
            .post(format!("{}/api/appointments", self.base_url))
            .json(request)
            .send()
            .await?;
        let status = res.status();
        let appointment_id = if status == StatusCode::OK {
            res.json::<CreatedAppointment>().await.ok().and_then(|c| c.id)
        } else {
            None
        };
        Ok(Scheduled {
            status: status.as_u16(),
            appointment_id,
        })
    }

    /// `PATCH /api/appointments/{id}` with an empty JSON object.
    pub async fn complete_appointment(&self, id: i64) -> Result<u16, ApiError> {
        let res = self
            .http
            .patch(format!("{}/api/appointments/{id}", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Ok(res.status().as_u16())
    }

    /// `GET /api/appointments/stats/by-scheduled-at` for appointments scheduled since `from`.
    pub async fn appointment_stats(
        &self,
        organization_id: i64,
        clinic_id: i64,
        from: DateTime<Utc>,
    ) -> Result<StatsResponse, ApiError> {
        let from = from.to_rfc3339_opts(SecondsFormat::Millis, true);
        let res = self
            .http
            .get(format!(
                "{}/api/appointments/stats/by-scheduled-at",
                self.base_url
            ))
            .query(&[
                ("organizationId", organization_id.to_string()),
                ("clinicId", clinic_id.to_string()),
                ("fromScheduledAtIso", from),
            ])
            .send()
            .await?;
        let status = res.status();
        let stats = if status == StatusCode::OK {
            res.json::<AppointmentStats>().await.ok()
        } else {
            None
        };
        Ok(StatsResponse {
            status: status.as_u16(),
            stats,
        })
    }

    /// `GET /api/analytics/stream`, held open until the server closes it or `timeout`
    /// elapses. Only a failure to establish the connection is an error.
    pub async fn open_stream(
        &self,
        organization_id: i64,
        clinic_id: i64,
        timeout: Duration,
    ) -> Result<StreamSession, ApiError> {
        let started = tokio::time::Instant::now();
        let mut res = self
            .http
            .get(format!("{}/api/analytics/stream", self.base_url))
            .query(&[
                ("organizationId", organization_id.to_string()),
                ("clinicId", clinic_id.to_string()),
            ])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(timeout)
            .send()
            .await?;
        let connect_latency = started.elapsed();
        let status = res.status().as_u16();

        let mut bytes = 0;
        loop {
            match res.chunk().await {
                Ok(Some(chunk)) => bytes += chunk.len(),
                Ok(None) => break,
                Err(e) if e.is_timeout() => break,
                Err(e) => {
                    tracing::debug!("Stream interrupted after {bytes} bytes: {e}");
                    break;
                }
            }
        }

        Ok(StreamSession {
            status,
            connect_latency,
            held_for: started.elapsed(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn schedule_request_wire_format() {
        let body = serde_json::to_value(ScheduleRequest {
            organization_id: 1,
            clinic_id: 2,
            patient_id: 3,
            modality: Modality::InPerson,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "organizationId": 1,
                "clinicId": 2,
                "patientId": 3,
                "modality": "IN_PERSON",
            })
        );
    }

    #[tokio::test]
    async fn create_reads_id_only_from_sync_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/appointments"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 42, "status": "SCHEDULED"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/appointments"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let request = ScheduleRequest {
            organization_id: 1,
            clinic_id: 1,
            patient_id: 1,
            modality: Modality::Virtual,
        };
        let first = client.create_appointment(&request).await.unwrap();
        assert_eq!(first, Scheduled { status: 200, appointment_id: Some(42) });
        let second = client.create_appointment(&request).await.unwrap();
        assert_eq!(second, Scheduled { status: 202, appointment_id: None });
    }

    #[tokio::test]
    async fn complete_sends_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/appointments/9"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(format!("{}/", server.uri())).unwrap();
        assert_eq!(client.complete_appointment(9).await.unwrap(), 404);
    }

    #[tokio::test]
    async fn stats_scopes_query_to_tenant_and_boundary() {
        let server = MockServer::start().await;
        let from = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        Mock::given(method("GET"))
            .and(path("/api/appointments/stats/by-scheduled-at"))
            .and(query_param("organizationId", "3"))
            .and(query_param("clinicId", "4"))
            .and(query_param("fromScheduledAtIso", "2026-01-02T03:04:05.678Z"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"count": 2, "appointmentIds": [5, 6]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let res = client.appointment_stats(3, 4, from).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(
            res.stats,
            Some(AppointmentStats {
                count: 2,
                appointment_ids: vec![5, 6]
            })
        );
    }

    #[tokio::test]
    async fn stream_reads_until_server_closes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/analytics/stream"))
            .and(query_param("organizationId", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: {}\n\n"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let session = client
            .open_stream(1, 1, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(session.status, 200);
        assert_eq!(session.bytes, "data: {}\n\n".len());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1").unwrap();
        let err = client.complete_appointment(1).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
