use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::food::api::traits::DetectorService;
use crate::food::api::wire::{parse_detect_response, DetectResponse};
use crate::food::config::DetectorConfig;
use crate::food::error::ServiceError;

/// Detection service reached over HTTP with a multipart image upload.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    http: reqwest::Client,
    url: String,
}

impl HttpDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl DetectorService for HttpDetector {
    fn name(&self) -> &'static str {
        "http-detector"
    }

    async fn detect(&self, image: &[u8], image_name: &str) -> Result<DetectResponse, ServiceError> {
        let part = Part::bytes(image.to_vec()).file_name(image_name.to_string());
        let form = Form::new().part("img_file", part);

        let response = self.http.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: snippet(&body),
            });
        }

        parse_detect_response(&body)
    }
}

/// First line of an error body, bounded so logs stay readable.
pub(crate) fn snippet(body: &str) -> String {
    body.lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect()
}
