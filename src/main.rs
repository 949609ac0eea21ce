use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use deepchef::api::{self, AppState};
use deepchef::commands::{CommandHandler, Flow};
use deepchef::config::ServerConfig;
use deepchef::food::{FoodConfig, Pipeline};
use dotenv::dotenv;
use log::info;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serve the HTTP session API instead of the interactive prompt
    #[arg(long)]
    api: bool,

    /// Port for the HTTP API, overrides DEEPCHEF_BIND's port
    #[arg(long)]
    port: Option<u16>,

    /// Number of recipe candidates to request, overrides RECIPE_MAX_RESULTS
    #[arg(long)]
    max_results: Option<usize>,

    /// Directory where annotated detector images are written
    #[arg(long)]
    annotated_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize colored output
    colored::control::set_override(true);

    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut food_config = FoodConfig::from_env().context("Invalid recipe pipeline configuration")?;
    if let Some(max_results) = args.max_results {
        if !(1..=100).contains(&max_results) {
            bail!("--max-results must be within 1..=100, got {}", max_results);
        }
        food_config.max_results = max_results;
    }
    let pipeline = Pipeline::connect(&food_config).context("Failed to set up service clients")?;

    if args.api {
        run_api_server(&args, pipeline).await
    } else {
        run_cli_mode(&args, pipeline).await
    }
}

async fn run_cli_mode(args: &Args, pipeline: Pipeline) -> Result<()> {
    let mut command_handler = CommandHandler::new(pipeline);
    if let Some(dir) = &args.annotated_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        command_handler = command_handler.with_annotated_dir(dir.clone());
    }

    // Show initial help menu
    command_handler.handle_command("help").await.map_err(anyhow::Error::msg)?;

    let mut rl = Editor::<(), DefaultHistory>::new()?;

    loop {
        match rl.readline("🥬 ") {
            Ok(line) => {
                let input = line.trim();
                let _ = rl.add_history_entry(input);

                match command_handler.handle_command(input).await {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_api_server(args: &Args, pipeline: Pipeline) -> Result<()> {
    let mut server_config = ServerConfig::from_env().context("Invalid server configuration")?;
    if let Some(port) = args.port {
        server_config = server_config.with_port(port);
    }

    let state = AppState::new(pipeline, server_config.session_idle);
    api::spawn_session_reaper(state.clone());
    let app = api::create_api(state, &server_config);

    let listener = TcpListener::bind(server_config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", server_config.bind))?;
    info!("Server listening on {}", server_config.bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
