pub mod detector;
pub mod retry;
pub mod spoonacular;
pub mod traits;
pub mod wire;

// Re-export common types
pub use detector::HttpDetector;
pub use spoonacular::SpoonacularClient;
pub use traits::{DetectorService, RecipeCatalog};
