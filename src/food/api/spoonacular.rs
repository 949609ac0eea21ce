use async_trait::async_trait;

use crate::food::api::detector::snippet;
use crate::food::api::traits::RecipeCatalog;
use crate::food::api::wire::{parse_find_response, parse_summary_response, CatalogRow, RecipeSummary};
use crate::food::config::CatalogConfig;
use crate::food::error::ServiceError;
use crate::food::types::RecipeId;

#[derive(Debug, Clone)]
pub struct SpoonacularClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    ranking: u8,
    ignore_pantry: bool,
}

impl SpoonacularClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            ranking: config.ranking,
            ignore_pantry: config.ignore_pantry,
        })
    }

    fn find_params(&self, ingredients: &[String], number: usize) -> Vec<(&'static str, String)> {
        vec![
            ("ingredients", ingredients.join(",")),
            ("number", number.to_string()),
            ("ranking", self.ranking.to_string()),
            ("ignorePantry", self.ignore_pantry.to_string()),
            ("apiKey", self.api_key.clone()),
        ]
    }

    async fn get_text(&self, url: &str, params: &[(&'static str, String)]) -> Result<String, ServiceError> {
        let response = self.http.get(url).query(params).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: snippet(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl RecipeCatalog for SpoonacularClient {
    fn name(&self) -> &'static str {
        "spoonacular"
    }

    async fn find_by_ingredients(
        &self,
        ingredients: &[String],
        number: usize,
    ) -> Result<Vec<CatalogRow>, ServiceError> {
        let url = format!("{}/recipes/findByIngredients", self.base_url);
        let body = self.get_text(&url, &self.find_params(ingredients, number)).await?;
        parse_find_response(&body)
    }

    async fn summary(&self, id: RecipeId) -> Result<RecipeSummary, ServiceError> {
        let url = format!("{}/recipes/{}/summary", self.base_url, id);
        let body = self.get_text(&url, &[("apiKey", self.api_key.clone())]).await?;
        parse_summary_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> SpoonacularClient {
        SpoonacularClient::new(&CatalogConfig {
            api_key: "secret".into(),
            base_url: "https://api.spoonacular.com".into(),
            timeout: Duration::from_secs(5),
            ranking: 2,
            ignore_pantry: false,
        })
        .unwrap()
    }

    #[test]
    fn test_find_params_join_ingredients() {
        let params = client().find_params(&["apple".into(), "bell pepper".into()], 3);
        assert_eq!(
            params,
            vec![
                ("ingredients", "apple,bell pepper".to_string()),
                ("number", "3".to_string()),
                ("ranking", "2".to_string()),
                ("ignorePantry", "false".to_string()),
                ("apiKey", "secret".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_transport_error() {
        let client = SpoonacularClient::new(&CatalogConfig {
            api_key: "k".into(),
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ranking: 1,
            ignore_pantry: true,
        })
        .unwrap();
        let err = client.find_by_ingredients(&["apple".into()], 1).await.unwrap_err();
        assert!(err.is_retryable(), "expected a retryable error, got {err:?}");
    }
}
