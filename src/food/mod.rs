//! Ingredient aggregation and recipe matching.
//!
//! Images go through the detector, free text is split and normalized, and the
//! resulting ingredient set is matched against the recipe catalog. See
//! [`pipeline::Pipeline`] for the entry point.

pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod ingredients;
pub mod labels;
pub mod leftovers;
pub mod matcher;
pub mod pipeline;
pub mod types;

pub use config::FoodConfig;
pub use error::{DetectionError, MatchError, PipelineError, ServiceError};
pub use ingredients::IngredientSet;
pub use pipeline::{Pipeline, RefreshOutcome, RunOutcome, SelectionPolicy, Session};
pub use types::{
    Availability, DetectionBatch, ImageUpload, Ingredient, LeftoverSuggestion, PipelineResult,
    RecipeCandidate, RecipeId,
};
