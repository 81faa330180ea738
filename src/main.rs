//! VoicePC CLI entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voicepc::adapters::cli::CliChannel;
use voicepc::adapters::desktop::SystemDesktop;
use voicepc::adapters::ChannelRegistry;
use voicepc::agent::{AgentLoop, ProviderRegistry};
use voicepc::assistant::Assistant;
use voicepc::config::Config;
use voicepc::intent::IntentClassifier;
use voicepc::session::{ContextStore, FilePersistence};
use voicepc::tools::{SceneCatalog, ToolRegistry};
use voicepc::ui;

#[derive(Parser)]
#[command(name = "voicepc")]
#[command(about = "🖥 VoicePC - control your desktop in natural language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize VoicePC configuration and workspace
    Onboard,

    /// Give the assistant commands
    Agent {
        /// Single command to run, e.g. "打开微信"
        #[arg(short, long)]
        message: Option<String>,

        /// Session ID
        #[arg(short, long, default_value = "cli:default")]
        session: String,
    },

    /// Show how a sentence is classified
    Classify {
        /// Text to classify
        text: String,
    },

    /// List registered tools
    Tools {
        /// Only this tool
        name: Option<String>,

        /// Print parameter schemas as JSON
        #[arg(long)]
        schema: bool,
    },

    /// Run one tool directly, e.g. run app_control '{"action":"open","app_name":"记事本"}'
    Run {
        /// Tool name
        tool: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Show a session's conversation history
    History {
        /// Session ID
        #[arg(short, long, default_value = "cli:default")]
        session: String,

        /// Number of messages to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// List available scenes
    Scenes,

    /// Show VoicePC status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Setup Global Ctrl+C handler
    let exit_flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let r = exit_flag.clone();

    ctrlc::set_handler(move || {
        if r.load(std::sync::atomic::Ordering::SeqCst) {
            println!("\n👋 Bye!");
            std::process::exit(0);
        } else {
            println!("\n⚠️  Press Ctrl+C again to exit");
            r.store(true, std::sync::atomic::Ordering::SeqCst);

            // Reset flag after 3 seconds
            let r2 = r.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(3));
                r2.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
    }).ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            voicepc::config::onboard()?;
            let config = voicepc::config::load()?;
            println!("\nNext steps:");
            println!("  1. Try it: voicepc agent -m \"打开记事本\"");
            println!("  2. Add your own scenes to {}", config.workspace.join("scenes.json").display());
        }

        Commands::Agent { message, session } => {
            let config = voicepc::config::load()?;
            let assistant = build_assistant(&config)?;
            let channel = CliChannel::new(assistant.clone(), session);

            if let Some(msg) = message {
                // Single message mode
                let outcome = channel.run_once(&msg).await?;
                CliChannel::print_outcome(&outcome);
            } else {
                ui::print_header(&config.model, assistant.mode().as_str());
                println!("  Interactive mode (type 'exit' to quit)");
                channel.run_interactive().await?;
            }
        }

        Commands::Classify { text } => {
            let config = voicepc::config::load()?;
            let llm = ProviderRegistry::create(&config)?;
            let classifier = IntentClassifier::new(llm, Duration::from_secs(config.llm_timeout_secs));
            let intent = classifier.classify(&text).await;
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }

        Commands::Tools { name, schema } => {
            let config = voicepc::config::load()?;
            let registry = build_registry(&config);
            let definitions = match name {
                Some(name) => match registry.definition(&name) {
                    Some(def) => vec![def],
                    None => anyhow::bail!("Tool not found: {name}"),
                },
                None => registry.definitions(),
            };

            if schema {
                println!("{}", serde_json::to_string_pretty(&definitions)?);
            } else {
                for def in definitions {
                    ui::print_step(&format!("{}: {}", def.name, def.description));
                }
            }
        }

        Commands::Run { tool, params } => {
            let config = voicepc::config::load()?;
            let params: serde_json::Value = serde_json::from_str(&params)
                .map_err(|e| anyhow::anyhow!("Parameters must be JSON: {e}"))?;
            let registry = build_registry(&config);
            let report = registry.run_task(&tool, params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::History { session, limit } => {
            let config = voicepc::config::load()?;
            let sessions = ContextStore::new(Arc::new(FilePersistence::new(&config.workspace)));
            let history = sessions.recent_history(&session, limit).await?;
            if history.is_empty() {
                ui::print_step(&format!("No messages in session {session}"));
            }
            for entry in history {
                println!(
                    "[{}] {}: {}",
                    entry.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                    entry.role.as_str(),
                    entry.content
                );
            }
        }

        Commands::Scenes => {
            let config = voicepc::config::load()?;
            let catalog = SceneCatalog::load(&config.workspace);
            for scene in catalog.list() {
                ui::print_step(&format!("{} ({}): {}", scene.id, scene.name, scene.description));
                for step in &scene.steps {
                    println!("      - {} {}", step.tool, step.params);
                }
            }
        }

        Commands::Status => {
            let config = voicepc::config::load()?;
            println!("🖥 VoicePC Status\n");
            println!("Config: {}", voicepc::config::config_path().display());
            println!("Workspace: {}", config.workspace.display());
            println!("Provider: {}", config.provider);
            println!("Model: {}", config.model);
            println!("API key: {}", if config.has_llm() { "✓" } else { "not set (keyword rules only)" });
            println!("Max iterations: {}", config.max_iterations);
            println!("Search engine: {}", config.search_engine);
            println!("Channels:");
            for name in ChannelRegistry::available() {
                println!("  {} - {}", name, ChannelRegistry::description(name));
            }
        }
    }

    Ok(())
}

fn build_registry(config: &Config) -> Arc<ToolRegistry> {
    let scenes = SceneCatalog::load(&config.workspace);
    ToolRegistry::new_with_defaults(config, Arc::new(SystemDesktop::new()), scenes)
}

fn build_assistant(config: &Config) -> Result<Arc<Assistant>> {
    let registry = build_registry(config);
    let llm = ProviderRegistry::create(config)?;
    if llm.is_none() {
        tracing::info!("No API key configured, using keyword rules");
    }

    let agent = AgentLoop::new(
        llm,
        registry,
        config.max_iterations,
        Duration::from_secs(config.llm_timeout_secs),
    )
    .with_history_window(config.history_window);

    let sessions = ContextStore::new(Arc::new(FilePersistence::new(&config.workspace)));
    Ok(Arc::new(Assistant::new(agent, Arc::new(sessions), config.history_window)))
}
