pub mod commands;

use std::io::{self, Write};
use std::path::Path;

use crate::api::AppState;
use crate::cli::commands::Commands;
use crate::config::AppConfig;

/// Runs the terminal-only commands. `serve` is handled by the binary.
pub async fn run_cli(command: Commands, config_path: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(&config_path)?;
    let state = AppState::from_config(&config).await?;

    match command {
        Commands::Serve => Err("serve is started by the binary, not the CLI runner".into()),
        Commands::Diagnose { image, symptoms } => {
            let result = state.composer.diagnose(&image, symptoms.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Chat { image, symptoms } => run_repl(&state, &image, symptoms.as_deref()).await,
    }
}

async fn run_repl(
    state: &AppState,
    image: &Path,
    symptoms: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Analyzing {} ...", image.display());
    let start = match state.composer.open_session(&state.store, image, symptoms).await {
        Ok(start) => start,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Ok(());
        }
    };

    println!("--- Plant Doctor ---");
    println!("Session: {}", start.session_id);
    println!("{}", start.response);
    println!("Ask a follow-up question, or type /exit to quit.");
    println!("--------------------");

    let stdin = io::stdin();
    loop {
        print!("\nYou> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let text = input.trim();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }

        match state.responder.respond(&start.session_id, text).await {
            Ok(reply) => println!("Doctor> {}", reply),
            Err(e) => eprintln!("Doctor> {}", e.user_message()),
        }
    }
    Ok(())
}
