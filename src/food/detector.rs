use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;

use crate::food::api::retry::RetryPolicy;
use crate::food::api::traits::DetectorService;
use crate::food::api::wire::DetectResponse;
use crate::food::config::DetectorConfig;
use crate::food::error::{DetectionError, ServiceError};
use crate::food::labels::LabelTable;
use crate::food::types::{Detection, DetectionBatch, ImageUpload};

/// Turns images into decoded detection batches.
///
/// Unreachable or slow detectors yield an `Unavailable` batch so the rest of a
/// submission can proceed. Responses that do not fit the label table are errors.
#[derive(Clone)]
pub struct DetectorClient {
    service: Arc<dyn DetectorService>,
    labels: LabelTable,
    min_confidence: f32,
    policy: RetryPolicy,
}

impl DetectorClient {
    pub fn new(service: Arc<dyn DetectorService>, config: &DetectorConfig, max_attempts: u32) -> Self {
        Self {
            service,
            labels: config.labels,
            min_confidence: config.min_confidence,
            policy: RetryPolicy::new(max_attempts, config.timeout),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn detect(&self, index: usize, image: &ImageUpload) -> Result<DetectionBatch, DetectionError> {
        let service = &self.service;
        let bytes = image.bytes.as_slice();
        let name = image.name.as_str();

        let response = match self
            .policy
            .run(service.name(), move || service.detect(bytes, name))
            .await
        {
            Ok(response) => response,
            Err(ServiceError::Malformed(reason)) => {
                return Err(DetectionError::Malformed {
                    image: name.to_string(),
                    reason,
                })
            }
            Err(ServiceError::Status { status, message }) if (400..500).contains(&status) && status != 429 => {
                warn!("Detector rejected {} with status {}: {}", name, status, message);
                return Ok(DetectionBatch::rejected(
                    index,
                    name,
                    format!("status {}: {}", status, message),
                ));
            }
            Err(e) => {
                warn!("Detector unavailable for {}: {}", name, e);
                return Ok(DetectionBatch::unavailable(index, name, e.to_string()));
            }
        };

        let batch = self.decode(index, name, response)?;
        info!("Detected {} ingredient(s) on {}", batch.detections.len(), name);
        Ok(batch)
    }

    /// Detect every image concurrently. Batches come back in submission order.
    pub async fn detect_all(&self, images: &[ImageUpload]) -> Result<Vec<DetectionBatch>, DetectionError> {
        join_all(
            images
                .iter()
                .enumerate()
                .map(|(index, image)| self.detect(index, image)),
        )
        .await
        .into_iter()
        .collect()
    }

    pub fn decode(
        &self,
        index: usize,
        image_name: &str,
        response: DetectResponse,
    ) -> Result<DetectionBatch, DetectionError> {
        if let Some(version) = response.label_version {
            if version != self.labels.version() {
                return Err(DetectionError::LabelVersionMismatch {
                    expected: self.labels.version().to_string(),
                    actual: version,
                });
            }
        }

        let mut detections = Vec::with_capacity(response.predictions.len());
        for raw in response.predictions {
            let label = self.labels.label(raw.class).ok_or_else(|| DetectionError::UnknownLabel {
                index: raw.class,
                version: self.labels.version().to_string(),
                size: self.labels.len(),
            })?;
            if !(0.0..=1.0).contains(&raw.confidence) {
                return Err(DetectionError::Malformed {
                    image: image_name.to_string(),
                    reason: format!("confidence {} outside 0..=1", raw.confidence),
                });
            }
            if raw.confidence < self.min_confidence {
                debug!("Dropping {} on {} at confidence {:.2}", label, image_name, raw.confidence);
                continue;
            }
            detections.push(Detection {
                label: label.to_string(),
                confidence: raw.confidence,
            });
        }

        let annotated_image = match (&response.predictions_image, detections.is_empty()) {
            (Some(encoded), false) => Some(STANDARD.decode(encoded.trim()).map_err(|e| {
                DetectionError::Malformed {
                    image: image_name.to_string(),
                    reason: format!("annotated image is not base64: {}", e),
                }
            })?),
            _ => None,
        };

        Ok(DetectionBatch {
            detections,
            annotated_image,
            ..DetectionBatch::empty(index, image_name)
        })
    }
}
