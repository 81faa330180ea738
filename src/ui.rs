use colored::*;
use terminal_size::{Width, Height, terminal_size};

use crate::agent::AgentStep;

pub fn print_header(model: &str, mode: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = width.0 as usize;

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let logo = "🖥";
    let name = "VoicePC".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();

    println!("  {} {} {}", logo, name, version);

    // Model + Mode Info
    let info = format!("  {}  •  {}", model, mode).cyan();
    println!("{}", info);

    if let Ok(path) = std::env::current_dir() {
        let path_str = path.to_string_lossy().black().bold();
        println!("  {}", path_str);
    }

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

/// One line per executed tool call.
pub fn print_tool_step(step: &AgentStep) {
    let text = step.result.message.as_str();
    if step.result.success {
        println!("  {} {} {}", "⚙".cyan(), step.tool.bold(), text.dimmed());
    } else {
        println!("  {} {} {}", "⚙".red(), step.tool.bold(), text.red());
    }
}
