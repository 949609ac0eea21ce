use async_trait::async_trait;

use crate::food::api::wire::{CatalogRow, DetectResponse, RecipeSummary};
use crate::food::error::ServiceError;
use crate::food::types::RecipeId;

/// Remote object detector that turns one image into class-index predictions.
#[async_trait]
pub trait DetectorService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, image: &[u8], image_name: &str) -> Result<DetectResponse, ServiceError>;
}

/// Remote recipe catalog searched by owned ingredients.
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    fn name(&self) -> &'static str;

    /// Up to `number` rows, best first.
    async fn find_by_ingredients(
        &self,
        ingredients: &[String],
        number: usize,
    ) -> Result<Vec<CatalogRow>, ServiceError>;

    async fn summary(&self, id: RecipeId) -> Result<RecipeSummary, ServiceError>;
}
