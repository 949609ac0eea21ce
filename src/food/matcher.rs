use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::food::api::retry::RetryPolicy;
use crate::food::api::traits::RecipeCatalog;
use crate::food::api::wire::{CatalogIngredient, CatalogRow, RecipeSummary};
use crate::food::error::{MatchError, ServiceError};
use crate::food::ingredients::IngredientSet;
use crate::food::types::{Availability, Ingredient, RecipeCandidate, RecipeId};

/// Queries the recipe catalog and flattens its rows into candidates.
#[derive(Clone)]
pub struct RecipeMatcher {
    catalog: Arc<dyn RecipeCatalog>,
    policy: RetryPolicy,
}

impl RecipeMatcher {
    pub fn new(catalog: Arc<dyn RecipeCatalog>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            catalog,
            policy: RetryPolicy::new(max_attempts, timeout),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Candidates for `ingredients`, best first, at most `max_results` of them.
    ///
    /// An empty list means the catalog knows no recipe for these ingredients.
    /// Empty input and a zero limit are rejected without contacting the catalog.
    pub async fn find(
        &self,
        ingredients: &IngredientSet,
        max_results: usize,
    ) -> Result<Availability<Vec<RecipeCandidate>>, MatchError> {
        if ingredients.is_empty() {
            return Err(MatchError::EmptyIngredients);
        }
        if max_results == 0 {
            return Err(MatchError::InvalidLimit);
        }

        let names = ingredients.sorted_names();
        let catalog = &self.catalog;
        let query = names.as_slice();
        let rows = match self
            .policy
            .run(catalog.name(), move || catalog.find_by_ingredients(query, max_results))
            .await
        {
            Ok(rows) => rows,
            Err(ServiceError::Malformed(reason)) => return Err(MatchError::Malformed(reason)),
            Err(e) => {
                warn!("Recipe catalog unavailable: {}", e);
                return Ok(Availability::Unavailable(e.to_string()));
            }
        };

        let candidates: Vec<RecipeCandidate> = rows
            .into_iter()
            .take(max_results)
            .map(|row| flatten_row(row, ingredients))
            .collect();
        info!(
            "Catalog matched {} recipe(s) for {} ingredient(s)",
            candidates.len(),
            ingredients.len()
        );
        Ok(Availability::Available(candidates))
    }

    pub async fn summary(&self, id: RecipeId) -> Result<Availability<RecipeSummary>, MatchError> {
        let catalog = &self.catalog;
        match self.policy.run("recipe summary", move || catalog.summary(id)).await {
            Ok(summary) => Ok(Availability::Available(summary)),
            Err(ServiceError::Malformed(reason)) => Err(MatchError::Malformed(reason)),
            Err(e) => {
                warn!("Recipe summary for {} unavailable: {}", id, e);
                Ok(Availability::Unavailable(e.to_string()))
            }
        }
    }
}

/// Flatten one catalog row against the ingredient set it was queried with.
///
/// Used names are mapped back onto the query spelling; `unused` is recomputed as
/// the query set minus `used`, never derived from the missed list.
pub fn flatten_row(row: CatalogRow, query: &IngredientSet) -> RecipeCandidate {
    let used: IngredientSet = names(&row.used_ingredients)
        .filter_map(|name| match query.find_same(&name) {
            Some(owned) => Some(owned.clone()),
            None => {
                debug!("Catalog used ingredient {} is not in the query set, dropping it", name);
                None
            }
        })
        .collect();

    let missed: IngredientSet = names(&row.missed_ingredients)
        .filter(|name| used.find_same(name).is_none())
        .collect();

    let unused = query.difference(&used);
    let reported_unused: IngredientSet = names(&row.unused_ingredients).collect();
    if reported_unused != unused {
        debug!(
            "Catalog unused list for recipe {} differs from the computed complement: {:?} vs {:?}",
            row.id,
            reported_unused.sorted_names(),
            unused.sorted_names()
        );
    }

    RecipeCandidate {
        id: RecipeId(row.id),
        title: row.title,
        image_ref: row.image,
        used,
        missed,
        unused,
    }
}

fn names(list: &[CatalogIngredient]) -> impl Iterator<Item = Ingredient> + '_ {
    list.iter().filter_map(|item| Ingredient::parse(&item.name))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Catalog fake that answers from a script and records every query.
    pub(crate) struct FakeCatalog {
        pub find: Mutex<Vec<Result<Vec<CatalogRow>, ServiceError>>>,
        pub queries: Mutex<Vec<(Vec<String>, usize)>>,
        pub calls: AtomicUsize,
    }

    impl FakeCatalog {
        /// Answers are consumed in order; the last one repeats.
        pub fn new(answers: Vec<Result<Vec<CatalogRow>, ServiceError>>) -> Self {
            Self {
                find: Mutex::new(answers),
                queries: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecipeCatalog for FakeCatalog {
        fn name(&self) -> &'static str {
            "fake-catalog"
        }

        async fn find_by_ingredients(
            &self,
            ingredients: &[String],
            number: usize,
        ) -> Result<Vec<CatalogRow>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push((ingredients.to_vec(), number));
            let mut answers = self.find.lock().unwrap();
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers.first().cloned().unwrap_or_else(|| Ok(Vec::new()))
            }
        }

        async fn summary(&self, id: RecipeId) -> Result<RecipeSummary, ServiceError> {
            Ok(RecipeSummary {
                id,
                title: format!("Recipe {}", id),
                summary: "<p>Bake it.</p>".into(),
            })
        }
    }

    pub(crate) fn row(id: i64, title: &str, used: &[&str], missed: &[&str], unused: &[&str]) -> CatalogRow {
        let list = |names: &[&str]| {
            names
                .iter()
                .map(|n| CatalogIngredient { name: n.to_string() })
                .collect::<Vec<_>>()
        };
        CatalogRow {
            id,
            title: title.to_string(),
            image: Some(format!("https://img.spoonacular.com/recipes/{}-312x231.jpg", id)),
            used_ingredients: list(used),
            missed_ingredients: list(missed),
            unused_ingredients: list(unused),
        }
    }

    pub(crate) fn matcher(catalog: Arc<FakeCatalog>) -> RecipeMatcher {
        RecipeMatcher::new(catalog, Duration::from_millis(100), 2)
            .with_policy(RetryPolicy::new(2, Duration::from_millis(100)).with_delay(Duration::ZERO))
    }

    fn set(names: &[&str]) -> IngredientSet {
        IngredientSet::from_entries(names)
    }

    fn assert_invariants(candidate: &RecipeCandidate, query: &IngredientSet) {
        assert!(candidate.used.is_disjoint(&candidate.missed));
        assert!(candidate.used.is_subset(query));
        assert_eq!(candidate.unused, query.difference(&candidate.used));
    }

    #[tokio::test]
    async fn test_flattens_used_missed_unused() {
        let catalog = Arc::new(FakeCatalog::new(vec![Ok(vec![row(
            1,
            "Apple Cake",
            &["apple"],
            &["flour"],
            &["banana"],
        )])]));
        let query = set(&["apple", "banana"]);
        let result = matcher(catalog.clone()).find(&query, 3).await.unwrap();
        let Availability::Available(candidates) = result else {
            panic!("catalog should be available");
        };
        assert_eq!(candidates.len(), 1);
        let cake = &candidates[0];
        assert_eq!(cake.missed.sorted_names(), vec!["flour"]);
        assert_eq!(cake.unused.sorted_names(), vec!["banana"]);
        assert_invariants(cake, &query);
        assert_eq!(
            catalog.queries.lock().unwrap()[0],
            (vec!["apple".to_string(), "banana".to_string()], 3)
        );
    }

    #[tokio::test]
    async fn test_empty_set_rejected_without_call() {
        let catalog = Arc::new(FakeCatalog::new(vec![]));
        let err = matcher(catalog.clone()).find(&IngredientSet::new(), 3).await.unwrap_err();
        assert_eq!(err, MatchError::EmptyIngredients);
        let err = matcher(catalog.clone()).find(&set(&["apple"]), 0).await.unwrap_err();
        assert_eq!(err, MatchError::InvalidLimit);
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_results_is_empty_list() {
        let catalog = Arc::new(FakeCatalog::new(vec![Ok(vec![])]));
        let result = matcher(catalog).find(&set(&["radish"]), 3).await.unwrap();
        assert_eq!(result, Availability::Available(vec![]));
    }

    #[tokio::test]
    async fn test_malformed_is_distinct_from_no_results() {
        let catalog = Arc::new(FakeCatalog::new(vec![Err(ServiceError::Malformed(
            "missing field `usedIngredients`".into(),
        ))]));
        let err = matcher(catalog.clone()).find(&set(&["radish"]), 3).await.unwrap_err();
        assert!(matches!(err, MatchError::Malformed(_)));
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_catalog_is_in_band() {
        let catalog = Arc::new(FakeCatalog::new(vec![Err(ServiceError::Timeout(
            Duration::from_millis(100),
        ))]));
        let result = matcher(catalog.clone()).find(&set(&["pear"]), 3).await.unwrap();
        assert!(matches!(result, Availability::Unavailable(_)));
        assert_eq!(catalog.calls(), 2);
    }

    #[tokio::test]
    async fn test_results_truncated_to_limit() {
        let rows: Vec<CatalogRow> = (1..=5).map(|i| row(i, "Dish", &["pear"], &[], &[])).collect();
        let catalog = Arc::new(FakeCatalog::new(vec![Ok(rows)]));
        let Availability::Available(candidates) = matcher(catalog).find(&set(&["pear"]), 2).await.unwrap() else {
            panic!("catalog should be available");
        };
        assert_eq!(candidates.iter().map(|c| c.id).collect::<Vec<_>>(), vec![RecipeId(1), RecipeId(2)]);
    }

    #[test]
    fn test_plural_catalog_names_map_to_query_spelling() {
        let query = set(&["Apple", "tomatoes", "cheese"]);
        let candidate = flatten_row(
            row(7, "Salad", &["Apples", "tomato", "olive oil"], &["tomato", "Lettuce"], &["cheese"]),
            &query,
        );
        assert_eq!(candidate.used.sorted_names(), vec!["apple", "tomatoes"]);
        assert_eq!(candidate.missed.sorted_names(), vec!["lettuce"]);
        assert_eq!(candidate.unused.sorted_names(), vec!["cheese"]);
        assert_invariants(&candidate, &query);
    }

    #[test]
    fn test_unused_is_complement_not_catalog_list() {
        let query = set(&["apple", "banana", "kiwi"]);
        let candidate = flatten_row(row(9, "Smoothie", &["banana"], &["milk"], &["apple"]), &query);
        assert_eq!(candidate.unused.sorted_names(), vec!["apple", "kiwi"]);
        assert_invariants(&candidate, &query);
    }

    #[test]
    fn test_rows_from_json_flatten() {
        let rows: Vec<CatalogRow> = serde_json::from_value(json!([{
            "id": 641803,
            "title": "Easy & Delish! ~ Apple Crumble ~",
            "image": "https://img.spoonacular.com/recipes/641803-312x231.jpg",
            "usedIngredients": [{"name": "apples"}],
            "missedIngredients": [{"name": "flour"}, {"name": "butter"}],
            "unusedIngredients": []
        }]))
        .unwrap();
        let query = set(&["apple"]);
        let candidate = flatten_row(rows.into_iter().next().unwrap(), &query);
        assert_eq!(candidate.used.sorted_names(), vec!["apple"]);
        assert_eq!(candidate.missed.sorted_names(), vec!["butter", "flour"]);
        assert!(candidate.unused.is_empty());
    }

    #[tokio::test]
    async fn test_summary_lookup() {
        let catalog = Arc::new(FakeCatalog::new(vec![]));
        let result = matcher(catalog).summary(RecipeId(5)).await.unwrap();
        let Availability::Available(summary) = result else {
            panic!("summary should be available");
        };
        assert_eq!(summary.plain_text(), "Bake it.");
    }
}
