use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::food::pipeline::{Pipeline, RunOutcome, SelectionPolicy, Session};
use crate::food::types::{
    Availability, DetectionBatch, DetectorStatus, ImageUpload, LeftoverSuggestion, PipelineResult,
    RecipeSelection,
};

const NO_RECIPE: &str =
    "Hmm, no recipe found for this ingredients list... Are you sure they're real ingredients ?";

pub fn handle_add(pipeline: &Pipeline, session: &mut Session, text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Usage: add <ingredient>, <ingredient>, ...".to_string());
    }
    let added = pipeline.submit_text(session, text);
    println!("➕ {} new ingredient(s)", added.to_string().cyan());
    println!("{}", render_pantry(session));
    Ok(())
}

pub async fn handle_photo(
    pipeline: &Pipeline,
    session: &mut Session,
    args: &str,
    annotated_dir: Option<&Path>,
) -> Result<(), String> {
    let paths: Vec<&str> = args.split_whitespace().collect();
    if paths.is_empty() {
        return Err("Usage: photo <image> [<image> ...]".to_string());
    }

    let mut uploads = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path, e))?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        uploads.push(ImageUpload::new(name, bytes));
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Looking at {} image(s)...", uploads.len()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = pipeline.submit_images(session, &uploads).await;
    spinner.finish_and_clear();

    let batches = result.map_err(|e| format!("Detection failed: {}", e))?;
    for batch in &batches {
        println!("{}", render_batch(batch));
        if let Some(dir) = annotated_dir {
            if let Some(path) = save_annotated(dir, batch).await? {
                println!("   🖼️  Annotated image saved to {}", path.display());
            }
        }
    }
    println!("{}", render_pantry(session));
    Ok(())
}

pub fn handle_list(session: &Session) -> Result<(), String> {
    println!("{}", render_pantry(session));
    Ok(())
}

pub fn handle_clear(pipeline: &Pipeline, session: &mut Session) -> Result<(), String> {
    pipeline.clear(session);
    println!("🧹 Ingredient list cleared");
    Ok(())
}

pub async fn handle_cook(pipeline: &Pipeline, session: &mut Session) -> Result<(), String> {
    let outcome = pipeline
        .run(session, &SelectionPolicy::FirstByTitle)
        .await
        .map_err(|e| format!("Recipe search failed: {}", e))?;

    match outcome {
        RunOutcome::Ready(result) => {
            println!("{}", "Here you are!".green());
            println!("{}", render_result(&result));
        }
        RunOutcome::Unchanged => match session.selection() {
            Some(selection) => println!("{}", render_selection(selection)),
            None => println!("{}", NO_RECIPE),
        },
        RunOutcome::NoIngredients => {
            println!("Add some ingredients first with 'add' or 'photo'.");
        }
        RunOutcome::NoRecipe => println!("{}", NO_RECIPE),
        RunOutcome::CatalogUnavailable(reason) => {
            println!("{} {}", "Recipe catalog unavailable:".yellow(), reason);
        }
    }
    Ok(())
}

pub async fn handle_pick(pipeline: &Pipeline, session: &mut Session, choice: &str) -> Result<(), String> {
    let policy = parse_pick(session, choice)?;
    let result = pipeline
        .select(session, &policy)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", render_selection(&result.selection));
    Ok(())
}

pub async fn handle_instructions(pipeline: &Pipeline, session: &Session) -> Result<(), String> {
    let selection = session
        .selection()
        .ok_or_else(|| "No recipe selected yet. Use 'cook' first.".to_string())?;
    match pipeline
        .instructions(selection.recipe.id)
        .await
        .map_err(|e| e.to_string())?
    {
        Availability::Available(summary) => {
            println!("{}", "Here are the instructions for your recipe :".bold());
            println!("{}", summary.plain_text().truecolor(255, 236, 179));
        }
        Availability::Unavailable(reason) => {
            println!("{} {}", "Instructions unavailable:".yellow(), reason);
        }
    }
    Ok(())
}

/// `pick 2` selects by position in the last listing, anything else by title.
fn parse_pick(session: &Session, choice: &str) -> Result<SelectionPolicy, String> {
    let choice = choice.trim();
    if choice.is_empty() {
        return Err("Usage: pick <number|title>".to_string());
    }
    match choice.parse::<usize>() {
        Ok(position) => session
            .candidates()
            .get(position.wrapping_sub(1))
            .map(|candidate| SelectionPolicy::Id(candidate.id))
            .ok_or_else(|| format!("No recipe number {}", position)),
        Err(_) => Ok(SelectionPolicy::Title(choice.to_string())),
    }
}

async fn save_annotated(dir: &Path, batch: &DetectionBatch) -> Result<Option<PathBuf>, String> {
    let Some(bytes) = batch.annotated_image.as_deref() else {
        return Ok(None);
    };
    let extension = batch
        .annotated_format()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("img");
    let stem = Path::new(&batch.image_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("image-{}", batch.index + 1));
    let path = dir.join(format!("{}.annotated.{}", stem, extension));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    Ok(Some(path))
}

pub(crate) fn render_batch(batch: &DetectionBatch) -> String {
    let number = batch.index + 1;
    match &batch.status {
        DetectorStatus::Unavailable(reason) => format!(
            "⚠️  Failed to connect to the ingredients detection API for image {} ({})",
            number, reason
        ),
        DetectorStatus::Rejected(reason) => format!(
            "⚠️  The ingredients detection API could not process image {} ({})",
            number, reason
        ),
        DetectorStatus::Ok if batch.is_empty() => format!("No ingredients detected on image {}.", number),
        DetectorStatus::Ok => {
            let mut labels: Vec<&str> = batch.labels().collect();
            labels.sort_unstable();
            labels.dedup();
            format!("✅ Ingredients detected on image {} : {}", number, enumeration_phrase(&labels))
        }
    }
}

pub(crate) fn render_pantry(session: &Session) -> String {
    let ingredients = session.ingredients();
    if ingredients.is_empty() {
        return "🧺 You have: nothing yet".to_string();
    }
    let names: Vec<String> = ingredients.iter().map(|i| capitalize(i.as_str())).collect();
    format!("🧺 You have: {}", names.join(", "))
}

fn render_result(result: &PipelineResult) -> String {
    let mut lines = vec!["📖 Recipes for your ingredients:".to_string()];
    for (position, candidate) in result.candidates.iter().enumerate() {
        let marker = if candidate.id == result.selection.recipe.id { "▶" } else { " " };
        lines.push(format!("  {} {}. {}", marker, position + 1, candidate.title));
    }
    lines.push(String::new());
    lines.push(render_selection(&result.selection));
    lines.join("\n")
}

pub(crate) fn render_selection(selection: &RecipeSelection) -> String {
    let recipe = &selection.recipe;
    let mut lines = vec![format!("1️⃣  Our chef suggests: {}", recipe.title.bold())];
    if let Some(image) = &recipe.image_ref {
        lines.push(format!("   {}", image.dimmed()));
    }

    lines.push("2️⃣  The Ingredients to make it:".to_string());
    if !recipe.used.is_empty() {
        lines.push(format!("🥗 You already have {}.", enumeration_phrase(&recipe.used.sorted_names())));
    }
    if recipe.missed.is_empty() {
        lines.push("...and you need nothing more !! 🙌".to_string());
    } else {
        lines.push(format!("🛒 You need to buy {}.", enumeration_phrase(&recipe.missed.sorted_names())));
    }

    let leftovers = enumeration_phrase(&recipe.unused.sorted_names());
    match &selection.leftover {
        LeftoverSuggestion::NoLeftovers => {}
        LeftoverSuggestion::Recipe(other) => {
            lines.push(format!(
                "Oh wait! And after that, you could use {} in another recipe such as: {}",
                leftovers,
                other.title.bold()
            ));
        }
        LeftoverSuggestion::NotFound => {
            lines.push(format!("No other recipe found for {}.", leftovers));
        }
        LeftoverSuggestion::CatalogUnavailable(reason) => {
            lines.push(format!("Could not look for a recipe using {}: {}", leftovers, reason));
        }
    }
    lines.join("\n")
}

/// "Apple", "Apple and Banana", "Apple, Banana and Tomato".
pub fn enumeration_phrase<S: AsRef<str>>(items: &[S]) -> String {
    let capitalized: Vec<String> = items.iter().map(|s| capitalize(s.as_ref())).collect();
    match capitalized.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
