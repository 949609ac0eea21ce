//! Record types for what crosses the service boundaries.
//!
//! Every field a downstream step relies on is required here, so a response with
//! the wrong shape fails at deserialization instead of being mistaken for an
//! empty result.

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::food::error::ServiceError;
use crate::food::types::RecipeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Index into the detector's label table.
    pub class: u32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub label_version: Option<String>,
    pub predictions: Vec<RawDetection>,
    /// Base64 of the annotated image. Only meaningful when there are predictions.
    #[serde(default)]
    pub predictions_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogIngredient {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRow {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    pub used_ingredients: Vec<CatalogIngredient>,
    pub missed_ingredients: Vec<CatalogIngredient>,
    pub unused_ingredients: Vec<CatalogIngredient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub title: String,
    /// HTML fragment as served by the catalog.
    pub summary: String,
}

impl RecipeSummary {
    /// The summary with markup removed and whitespace collapsed.
    pub fn plain_text(&self) -> String {
        let fragment = Html::parse_fragment(&self.summary);
        fragment
            .root_element()
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn parse_detect_response(body: &str) -> Result<DetectResponse, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::Malformed(format!("detector: {}", e)))
}

pub fn parse_find_response(body: &str) -> Result<Vec<CatalogRow>, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::Malformed(format!("findByIngredients: {}", e)))
}

pub fn parse_summary_response(body: &str) -> Result<RecipeSummary, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::Malformed(format!("summary: {}", e)))
}
