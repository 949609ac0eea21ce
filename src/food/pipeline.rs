//! Pipeline orchestration.
//!
//! A [`Session`] is the whole per-user state and is passed in explicitly; the
//! [`Pipeline`] itself holds only the service clients and is shared freely.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::food::api::detector::HttpDetector;
use crate::food::api::spoonacular::SpoonacularClient;
use crate::food::api::traits::{DetectorService, RecipeCatalog};
use crate::food::api::wire::RecipeSummary;
use crate::food::config::FoodConfig;
use crate::food::detector::DetectorClient;
use crate::food::error::{PipelineError, ServiceError};
use crate::food::ingredients::{detection_entries, split_free_text, IngredientSet};
use crate::food::leftovers::LeftoverResolver;
use crate::food::matcher::RecipeMatcher;
use crate::food::types::{
    Availability, DetectionBatch, ImageUpload, PipelineResult, RecipeCandidate, RecipeId,
    RecipeSelection,
};

/// Per-user pipeline state.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    ingredients: IngredientSet,
    /// Ingredient set of the last successful catalog match.
    matched: Option<IngredientSet>,
    candidates: Vec<RecipeCandidate>,
    selection: Option<RecipeSelection>,
    last_batches: Vec<DetectionBatch>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active: now,
            ingredients: IngredientSet::new(),
            matched: None,
            candidates: Vec::new(),
            selection: None,
            last_batches: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// True once the session has gone `idle` without activity.
    pub fn is_idle(&self, idle: Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.last_active)
            .to_std()
            .map_or(false, |elapsed| elapsed >= idle)
    }

    pub fn ingredients(&self) -> &IngredientSet {
        &self.ingredients
    }

    pub fn candidates(&self) -> &[RecipeCandidate] {
        &self.candidates
    }

    pub fn selection(&self) -> Option<&RecipeSelection> {
        self.selection.as_ref()
    }

    pub fn last_batches(&self) -> &[DetectionBatch] {
        &self.last_batches
    }

    /// Drop candidates and selection; the next refresh queries the catalog again.
    fn reset_recipes(&mut self) {
        self.matched = None;
        self.candidates.clear();
        self.selection = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// How the caller picks one candidate out of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// The catalog's best-ranked candidate.
    Top,
    /// Alphabetically first title.
    FirstByTitle,
    Id(RecipeId),
    /// Case-insensitive title match.
    Title(String),
}

impl SelectionPolicy {
    fn pick<'a>(&self, candidates: &'a [RecipeCandidate]) -> Result<&'a RecipeCandidate, PipelineError> {
        if candidates.is_empty() {
            return Err(PipelineError::NoCandidates);
        }
        let picked = match self {
            SelectionPolicy::Top => candidates.first(),
            SelectionPolicy::FirstByTitle => candidates.iter().min_by(|a, b| a.title.cmp(&b.title)),
            SelectionPolicy::Id(id) => candidates.iter().find(|c| c.id == *id),
            SelectionPolicy::Title(title) => candidates
                .iter()
                .find(|c| c.title.eq_ignore_ascii_case(title.trim())),
        };
        picked.ok_or_else(|| PipelineError::UnknownRecipe(self.describe()))
    }

    fn describe(&self) -> String {
        match self {
            SelectionPolicy::Top => "the top recipe".to_string(),
            SelectionPolicy::FirstByTitle => "the first title".to_string(),
            SelectionPolicy::Id(id) => format!("recipe id {}", id),
            SelectionPolicy::Title(title) => format!("title {:?}", title),
        }
    }
}

/// What a refresh of the candidate list did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The ingredient set is unchanged since the last match; nothing was queried.
    Unchanged { candidates: usize },
    /// No ingredients: the recipe context was reset.
    NoIngredients,
    NoRecipe,
    Matched { candidates: usize },
    CatalogUnavailable { reason: String },
}

/// Outcome of a full run: refresh, then select.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Unchanged,
    NoIngredients,
    NoRecipe,
    CatalogUnavailable(String),
    Ready(PipelineResult),
}

/// Detector, matcher and leftover resolver wired together.
#[derive(Clone)]
pub struct Pipeline {
    detector: DetectorClient,
    matcher: RecipeMatcher,
    leftovers: LeftoverResolver,
    max_results: usize,
}

impl Pipeline {
    pub fn new(detector: DetectorClient, matcher: RecipeMatcher, max_results: usize) -> Self {
        Self {
            detector,
            leftovers: LeftoverResolver::new(matcher.clone()),
            matcher,
            max_results,
        }
    }

    pub fn from_config(
        config: &FoodConfig,
        detector: Arc<dyn DetectorService>,
        catalog: Arc<dyn RecipeCatalog>,
    ) -> Self {
        Self::new(
            DetectorClient::new(detector, &config.detector, config.max_attempts),
            RecipeMatcher::new(catalog, config.catalog.timeout, config.max_attempts),
            config.max_results,
        )
    }

    /// Pipeline backed by the HTTP detector and the Spoonacular catalog.
    pub fn connect(config: &FoodConfig) -> Result<Self, ServiceError> {
        let detector = HttpDetector::new(&config.detector)?;
        let catalog = SpoonacularClient::new(&config.catalog)?;
        info!(
            "Pipeline using detector at {} and catalog at {}",
            config.detector.url, config.catalog.base_url
        );
        Ok(Self::from_config(config, Arc::new(detector), Arc::new(catalog)))
    }

    /// Detect all images concurrently and merge their labels into the session.
    ///
    /// A protocol error on any image fails the whole submission and leaves the
    /// ingredient set untouched.
    pub async fn submit_images(
        &self,
        session: &mut Session,
        images: &[ImageUpload],
    ) -> Result<Vec<DetectionBatch>, PipelineError> {
        let batches = self.detector.detect_all(images).await?;
        let added = session.ingredients.merge(detection_entries(&batches));
        info!(
            "{} image(s) added {} new ingredient(s) to session {}",
            images.len(),
            added,
            session.id
        );
        session.last_batches = batches.clone();
        session.touch();
        Ok(batches)
    }

    /// Merge comma-separated free text into the session. Returns how many entries were new.
    pub fn submit_text(&self, session: &mut Session, text: &str) -> usize {
        let added = session.ingredients.merge(split_free_text(text));
        session.touch();
        added
    }

    pub fn clear(&self, session: &mut Session) {
        session.ingredients.clear();
        session.last_batches.clear();
        session.reset_recipes();
        session.touch();
    }

    /// Query the catalog if, and only if, the ingredient set changed since the last match.
    pub async fn refresh(&self, session: &mut Session) -> Result<RefreshOutcome, PipelineError> {
        session.touch();
        if session.ingredients.is_empty() {
            session.reset_recipes();
            return Ok(RefreshOutcome::NoIngredients);
        }
        if session.matched.as_ref() == Some(&session.ingredients) {
            debug!("Ingredient set unchanged for session {}, skipping catalog", session.id);
            return Ok(RefreshOutcome::Unchanged {
                candidates: session.candidates.len(),
            });
        }

        match self.matcher.find(&session.ingredients, self.max_results).await? {
            Availability::Available(candidates) => {
                session.matched = Some(session.ingredients.clone());
                session.candidates = candidates;
                session.selection = None;
                if session.candidates.is_empty() {
                    Ok(RefreshOutcome::NoRecipe)
                } else {
                    Ok(RefreshOutcome::Matched {
                        candidates: session.candidates.len(),
                    })
                }
            }
            Availability::Unavailable(reason) => {
                // candidates matched against an older set must not outlive it
                session.reset_recipes();
                Ok(RefreshOutcome::CatalogUnavailable { reason })
            }
        }
    }

    /// Pick a candidate from the current list and resolve its leftovers.
    ///
    /// The candidates must have been matched against the session's current
    /// ingredient set.
    pub async fn select(
        &self,
        session: &mut Session,
        policy: &SelectionPolicy,
    ) -> Result<PipelineResult, PipelineError> {
        if session.candidates.is_empty() {
            return Err(PipelineError::NoCandidates);
        }
        if session.matched.as_ref() != Some(&session.ingredients) {
            return Err(PipelineError::StaleCandidates);
        }
        let recipe = policy.pick(&session.candidates)?.clone();
        let leftover = self.leftovers.resolve(&recipe).await?;
        let selection = RecipeSelection { recipe, leftover };

        session.selection = Some(selection.clone());
        session.touch();
        Ok(PipelineResult {
            ingredients: session.ingredients.clone(),
            candidates: session.candidates.clone(),
            selection,
        })
    }

    /// Refresh and, when there is something new to show, select with `policy`.
    ///
    /// A run only counts as successful once a selection is made. If selecting
    /// fails, the recipe context is dropped so the next run matches again.
    pub async fn run(
        &self,
        session: &mut Session,
        policy: &SelectionPolicy,
    ) -> Result<RunOutcome, PipelineError> {
        match self.refresh(session).await? {
            RefreshOutcome::Unchanged { candidates } if candidates > 0 && session.selection.is_none() => {
                self.select_or_reset(session, policy).await
            }
            RefreshOutcome::Unchanged { .. } => Ok(RunOutcome::Unchanged),
            RefreshOutcome::NoIngredients => Ok(RunOutcome::NoIngredients),
            RefreshOutcome::NoRecipe => Ok(RunOutcome::NoRecipe),
            RefreshOutcome::CatalogUnavailable { reason } => Ok(RunOutcome::CatalogUnavailable(reason)),
            RefreshOutcome::Matched { .. } => self.select_or_reset(session, policy).await,
        }
    }

    async fn select_or_reset(
        &self,
        session: &mut Session,
        policy: &SelectionPolicy,
    ) -> Result<RunOutcome, PipelineError> {
        match self.select(session, policy).await {
            Ok(result) => Ok(RunOutcome::Ready(result)),
            Err(e) => {
                debug!("Selection failed for session {}, dropping recipe context: {}", session.id, e);
                session.reset_recipes();
                Err(e)
            }
        }
    }

    pub async fn instructions(&self, id: RecipeId) -> Result<Availability<RecipeSummary>, PipelineError> {
        Ok(self.matcher.summary(id).await?)
    }
}
