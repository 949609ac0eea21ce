use log::info;

use crate::food::error::MatchError;
use crate::food::matcher::RecipeMatcher;
use crate::food::types::{Availability, LeftoverSuggestion, RecipeCandidate};

/// Always exactly one follow-up recipe is proposed.
pub const LEFTOVER_RESULTS: usize = 1;

/// Proposes a second recipe for what the selected one leaves unused.
///
/// The lookup is one level deep: the suggestion's own leftovers are never
/// fed back into another lookup.
#[derive(Clone)]
pub struct LeftoverResolver {
    matcher: RecipeMatcher,
}

impl LeftoverResolver {
    pub fn new(matcher: RecipeMatcher) -> Self {
        Self { matcher }
    }

    pub async fn resolve(&self, selected: &RecipeCandidate) -> Result<LeftoverSuggestion, MatchError> {
        if selected.unused.is_empty() {
            return Ok(LeftoverSuggestion::NoLeftovers);
        }

        info!(
            "Looking for a leftover recipe using {} after {}",
            selected.unused.join(", "),
            selected.title
        );
        let suggestion = match self.matcher.find(&selected.unused, LEFTOVER_RESULTS).await? {
            Availability::Available(candidates) => match candidates.into_iter().next() {
                Some(candidate) => LeftoverSuggestion::Recipe(candidate),
                None => LeftoverSuggestion::NotFound,
            },
            Availability::Unavailable(reason) => LeftoverSuggestion::CatalogUnavailable(reason),
        };
        Ok(suggestion)
    }
}
