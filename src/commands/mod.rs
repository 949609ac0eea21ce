use std::path::PathBuf;

use crate::food::pipeline::{Pipeline, Session};

pub mod food_cmd;
mod system;

/// Whether the input loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Terminal front end: one session, driven line by line.
pub struct CommandHandler {
    pipeline: Pipeline,
    session: Session,
    annotated_dir: Option<PathBuf>,
}

impl CommandHandler {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            session: Session::new(),
            annotated_dir: None,
        }
    }

    /// Write annotated detector images into `dir`.
    pub fn with_annotated_dir(mut self, dir: PathBuf) -> Self {
        self.annotated_dir = Some(dir);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<Flow, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Flow::Continue);
        }

        let (command, args) = match input.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (input, ""),
        };

        match command.to_lowercase().as_str() {
            "help" | "exit" | "quit" => return system::handle_command(command),
            "add" => food_cmd::handle_add(&self.pipeline, &mut self.session, args)?,
            "photo" => {
                food_cmd::handle_photo(
                    &self.pipeline,
                    &mut self.session,
                    args,
                    self.annotated_dir.as_deref(),
                )
                .await?
            }
            "list" => food_cmd::handle_list(&self.session)?,
            "clear" => food_cmd::handle_clear(&self.pipeline, &mut self.session)?,
            "cook" => food_cmd::handle_cook(&self.pipeline, &mut self.session).await?,
            "pick" => food_cmd::handle_pick(&self.pipeline, &mut self.session, args).await?,
            "instructions" => food_cmd::handle_instructions(&self.pipeline, &self.session).await?,
            // Bare text is treated as an ingredient list, like the text box of a form.
            _ => food_cmd::handle_add(&self.pipeline, &mut self.session, input)?,
        }
        Ok(Flow::Continue)
    }
}
