use colored::Colorize;

use super::Flow;

pub fn handle_command(input: &str) -> Result<Flow, String> {
    match input.to_lowercase().as_str() {
        "help" => {
            println!("\n🥬 {}", "DeepChef, your favorite kitchen help".bold());
            println!("  All you needed was a pinch of inspiration!");
            println!();

            println!("🧺 Ingredient Commands:");
            println!("  add <a>, <b>, ...      - Add ingredients by name");
            println!("  photo <img> [<img>...] - Detect ingredients on photos");
            println!("  list                   - Show what you have");
            println!("  clear                  - Start over with an empty list");
            println!("  Example: add tomato, Bell pepper, eggs");
            println!();

            println!("👨‍🍳 Recipe Commands:");
            println!("  cook                   - Find recipes for your ingredients");
            println!("  pick <number|title>    - Choose another suggested recipe");
            println!("  instructions           - Show the chosen recipe's summary");
            println!();

            println!("⚙️ System Commands:");
            println!("  help  - Show this help menu");
            println!("  exit  - Exit the program");
            Ok(Flow::Continue)
        }
        "exit" | "quit" => {
            println!("👋 Goodbye!");
            Ok(Flow::Exit)
        }
        _ => Err("Unknown system command. Type 'help' for available commands.".to_string()),
    }
}
