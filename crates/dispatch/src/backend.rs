//! Gate backend client
//!
//! [`Backend`] is the seam between the controller and the network. The
//! production implementation posts to the check-vehicle endpoint either
//! as a JSON body or as query parameters with a multipart image.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use plate_tracker::{Panel, PlateText};

use crate::DispatchError;

/// One check-vehicle call
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub request_id: Uuid,
    pub plate: PlateText,
    pub panel: Panel,
    /// JPEG snapshot, already downscaled
    pub image_jpeg: Option<Vec<u8>>,
}

/// Raw HTTP answer before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub status: u16,
    pub body: String,
}

/// Anything that can answer a check-vehicle call
pub trait Backend: Send + Sync + 'static {
    fn check_vehicle(
        &self,
        request: &CheckRequest,
    ) -> impl Future<Output = Result<BackendReply, DispatchError>> + Send;
}

/// How the plate and image are carried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// JSON body with a base64 image
    #[default]
    Json,
    /// Plate and panel as query parameters, image as multipart file
    QueryMultipart,
}

/// Backend endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub request_mode: RequestMode,
    pub use_cookies: bool,
    pub cookies: BTreeMap<String, String>,
    /// Longest side of the uploaded snapshot
    pub image_max_side: u32,
    /// JPEG quality of the uploaded snapshot (1-100)
    pub image_quality: u8,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            endpoint: "/api/entry-exit/check-vehicle".to_string(),
            timeout_secs: 10,
            request_mode: RequestMode::Json,
            use_cookies: false,
            cookies: BTreeMap::new(),
            image_max_side: 120,
            image_quality: 5,
        }
    }
}

impl BackendConfig {
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `Cookie` header value, when cookies are enabled and configured
    pub fn cookie_header(&self) -> Option<String> {
        if !self.use_cookies || self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckVehiclePayload<'a> {
    #[serde(rename = "type")]
    panel_type: &'a str,
    license_plate_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

/// reqwest-backed [`Backend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    mode: RequestMode,
    timeout: Duration,
    cookie_header: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url(),
            mode: config.request_mode,
            timeout: config.timeout(),
            cookie_header: config.cookie_header(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> DispatchError {
        if err.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else {
            DispatchError::Transport(err.to_string())
        }
    }

    fn build(&self, request: &CheckRequest) -> Result<reqwest::RequestBuilder, DispatchError> {
        let builder = match self.mode {
            RequestMode::Json => {
                let payload = CheckVehiclePayload {
                    panel_type: request.panel.as_str(),
                    license_plate_number: request.plate.as_str(),
                    image: request.image_jpeg.as_ref().map(|jpeg| STANDARD.encode(jpeg)),
                };
                self.client.post(&self.url).json(&payload)
            }
            RequestMode::QueryMultipart => {
                let mut builder = self.client.post(&self.url).query(&[
                    ("licensePlateNumber", request.plate.as_str()),
                    ("type", request.panel.as_str()),
                ]);
                if let Some(jpeg) = &request.image_jpeg {
                    let part = Part::bytes(jpeg.clone())
                        .file_name(format!("{}.jpg", request.plate))
                        .mime_str("image/jpeg")
                        .map_err(|e| DispatchError::Client(e.to_string()))?;
                    builder = builder.multipart(Form::new().part("image", part));
                }
                builder
            }
        };

        let builder = builder.header(ACCEPT, "*/*");
        Ok(match &self.cookie_header {
            Some(cookie) => builder.header(COOKIE, cookie.as_str()),
            None => builder,
        })
    }
}

impl Backend for HttpBackend {
    async fn check_vehicle(&self, request: &CheckRequest) -> Result<BackendReply, DispatchError> {
        debug!(
            "[{}] POST {} plate={} panel={} mode={:?}",
            request.request_id, self.url, request.plate, request.panel, self.mode
        );

        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        Ok(BackendReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = BackendConfig {
            base_url: "http://gate.local:8000/".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(config.url(), "http://gate.local:8000/api/entry-exit/check-vehicle");
    }

    #[test]
    fn test_cookie_header_requires_flag() {
        let mut config = BackendConfig::default();
        config.cookies.insert("session".into(), "abc".into());
        config.cookies.insert("csrftoken".into(), "xyz".into());
        assert_eq!(config.cookie_header(), None);

        config.use_cookies = true;
        assert_eq!(config.cookie_header().as_deref(), Some("csrftoken=xyz; session=abc"));
    }

    #[test]
    fn test_json_payload_shape() {
        let payload = CheckVehiclePayload {
            panel_type: Panel::Exit.as_str(),
            license_plate_number: "51A-12345",
            image: Some(STANDARD.encode([0xFFu8, 0xD8])),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "exit");
        assert_eq!(json["licensePlateNumber"], "51A-12345");
        assert_eq!(json["image"], "/9g=");
    }

    #[test]
    fn test_request_mode_from_config_value() {
        let mode: RequestMode = serde_json::from_str("\"query_multipart\"").unwrap();
        assert_eq!(mode, RequestMode::QueryMultipart);
    }

    #[tokio::test]
    async fn test_request_failure_is_transport_error() {
        // Rejected while building the request, before any connection
        let backend = HttpBackend::new(&BackendConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 2,
            ..BackendConfig::default()
        })
        .unwrap();
        let request = CheckRequest {
            request_id: Uuid::new_v4(),
            plate: PlateText::parse("51A-12345").unwrap(),
            panel: Panel::Entry,
            image_jpeg: None,
        };

        let err = backend.check_vehicle(&request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
