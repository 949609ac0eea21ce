use serde::{Deserialize, Serialize};
use std::fmt;

use crate::food::ingredients::IngredientSet;

/// A normalized ingredient name: trimmed, inner whitespace collapsed, lower-cased.
///
/// Equality is plain string equality on the normalized form, so two entries
/// that differ only in case or surrounding whitespace are the same ingredient.
/// Plural and singular forms are *not* folded together here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Ingredient(String);

impl Ingredient {
    /// Returns `None` for entries that are empty after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when both names are equal or one is the other with a plural suffix.
    pub fn same_as(&self, other: &Ingredient) -> bool {
        let (a, b) = (self.as_str(), other.as_str());
        a == b || is_plural_of(a, b) || is_plural_of(b, a)
    }
}

fn is_plural_of(plural: &str, singular: &str) -> bool {
    match plural.strip_prefix(singular) {
        Some(suffix) => suffix == "s" || suffix == "es",
        None => false,
    }
}

impl TryFrom<String> for Ingredient {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| "ingredient name is empty".to_string())
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ingredient {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One recognized object in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Name from the label vocabulary, in vocabulary casing.
    pub label: String,
    pub confidence: f32,
}

/// Outcome of reaching the detector for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DetectorStatus {
    Ok,
    /// Unreachable, timed out or failing on its side.
    Unavailable(String),
    /// Reached, but refused this image with a client error (too large, unreadable).
    Rejected(String),
}

/// Detections for a single submitted image, in backend order.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBatch {
    /// Position of the image in its submission, zero based.
    pub index: usize,
    pub image_name: String,
    pub status: DetectorStatus,
    pub detections: Vec<Detection>,
    /// Raw bytes of the annotated image. Always `None` when nothing was detected.
    pub annotated_image: Option<Vec<u8>>,
}

impl DetectionBatch {
    pub fn empty(index: usize, image_name: impl Into<String>) -> Self {
        Self {
            index,
            image_name: image_name.into(),
            status: DetectorStatus::Ok,
            detections: Vec::new(),
            annotated_image: None,
        }
    }

    pub fn unavailable(index: usize, image_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: DetectorStatus::Unavailable(reason.into()),
            ..Self::empty(index, image_name)
        }
    }

    pub fn rejected(index: usize, image_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: DetectorStatus::Rejected(reason.into()),
            ..Self::empty(index, image_name)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn is_available(&self) -> bool {
        self.status == DetectorStatus::Ok
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.detections.iter().map(|d| d.label.as_str())
    }

    /// Sniffed format of the annotated image, if there is one and it is recognizable.
    pub fn annotated_format(&self) -> Option<image::ImageFormat> {
        self.annotated_image
            .as_deref()
            .and_then(|bytes| image::guess_format(bytes).ok())
    }
}

/// An image handed to the pipeline for detection.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Opaque catalog key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(pub i64);

impl fmt::Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recipe option annotated against the ingredient set it was matched with.
///
/// `used` is always a subset of the query set, `used` and `missed` never
/// overlap, and `unused` is exactly the query set minus `used`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeCandidate {
    pub id: RecipeId,
    pub title: String,
    pub image_ref: Option<String>,
    pub used: IngredientSet,
    pub missed: IngredientSet,
    pub unused: IngredientSet,
}

/// A secondary recipe proposed from the ingredients the selection leaves over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LeftoverSuggestion {
    /// The selection uses every owned ingredient; no lookup was made.
    NoLeftovers,
    /// The catalog found nothing for the leftovers.
    NotFound,
    Recipe(RecipeCandidate),
    CatalogUnavailable(String),
}

impl LeftoverSuggestion {
    pub fn recipe(&self) -> Option<&RecipeCandidate> {
        match self {
            LeftoverSuggestion::Recipe(candidate) => Some(candidate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSelection {
    pub recipe: RecipeCandidate,
    pub leftover: LeftoverSuggestion,
}

/// Everything a presentation layer needs to render one cooking proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub ingredients: IngredientSet,
    pub candidates: Vec<RecipeCandidate>,
    pub selection: RecipeSelection,
}

/// Result of a call that degrades to an in-band state when the remote side is unreachable.
#[derive(Debug, Clone, PartialEq)]
pub enum Availability<T> {
    Available(T),
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingredient_parse_normalizes() {
        let ingredient = Ingredient::parse("  Bell   PEPPER ").unwrap();
        assert_eq!(ingredient.as_str(), "bell pepper");
        assert!(Ingredient::parse("   ").is_none());
        assert!(Ingredient::parse("").is_none());
    }

    #[test]
    fn test_deserialize_goes_through_parse() {
        let ingredient: Ingredient = serde_json::from_str("\"  Bell   PEPPER \"").unwrap();
        assert_eq!(ingredient.as_str(), "bell pepper");
        assert!(serde_json::from_str::<Ingredient>("\"   \"").is_err());

        let set: IngredientSet = serde_json::from_str(r#"["Apple", "apple ", " Pear"]"#).unwrap();
        assert_eq!(set.sorted_names(), vec!["apple", "pear"]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["apple","pear"]"#);
    }

    #[test]
    fn test_same_as_folds_simple_plurals() {
        let apple = Ingredient::parse("apple").unwrap();
        let tomato = Ingredient::parse("tomato").unwrap();
        assert!(apple.same_as(&Ingredient::parse("Apples").unwrap()));
        assert!(tomato.same_as(&Ingredient::parse("tomatoes").unwrap()));
        assert!(!apple.same_as(&Ingredient::parse("applesauce").unwrap()));
        assert!(!apple.same_as(&Ingredient::parse("pineapple").unwrap()));
    }

    #[test]
    fn test_unavailable_batch_is_empty() {
        let batch = DetectionBatch::unavailable(2, "fridge.jpg", "connection refused");
        assert!(batch.is_empty());
        assert!(!batch.is_available());
        assert!(batch.annotated_image.is_none());
        assert_eq!(batch.index, 2);
    }

    #[test]
    fn test_annotated_format_sniffs_png() {
        let mut batch = DetectionBatch::empty(0, "a.png");
        batch.annotated_image = Some(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]);
        assert_eq!(batch.annotated_format(), Some(image::ImageFormat::Png));
    }
}
