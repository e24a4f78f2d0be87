//! Headless demo driver for the keeper engine.
//!
//! Runs a game offline with deterministic rule-based capabilities:
//!
//! ```bash
//! cargo run -p keeper -- --players 3 --turns 20 --data-dir ./games
//! ```

mod local;

use keeper_core::{
    Capabilities, CharacterSpec, EngineConfig, GameEngine, GameId, GameStore,
};
use local::{LocalDecider, LocalNarrator, LocalResolver, LocalSummarizer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const NAMES: &[&str] = &["Ava", "Brin", "Cole", "Dara", "Edda", "Finn"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let players: usize = arg_value(&args, "--players")
        .and_then(|v| v.parse().ok())
        .unwrap_or(2)
        .clamp(1, NAMES.len());
    let turns: usize = arg_value(&args, "--turns")
        .and_then(|v| v.parse().ok())
        .unwrap_or(12);
    let data_dir = arg_value(&args, "--data-dir");
    let resume = arg_value(&args, "--resume");

    let capabilities = Capabilities {
        decision: Arc::new(LocalDecider),
        resolution: Arc::new(LocalResolver),
        narration: Arc::new(LocalNarrator),
        summarize: Arc::new(LocalSummarizer),
    };
    let config = EngineConfig::from_env()
        .with_opening_scene("A storm has washed out the bridge at the crossroads.");

    let mut engine = GameEngine::new(capabilities, config);
    if let Some(dir) = data_dir {
        engine = engine.with_store(GameStore::open(dir).await?);
    }

    let game_id = match resume {
        Some(raw) => {
            let game_id = GameId(Uuid::parse_str(raw)?);
            engine.load_game(game_id).await?;
            println!("Resumed game {game_id}");
            game_id
        }
        None => {
            let specs = NAMES
                .iter()
                .take(players)
                .map(|name| CharacterSpec::new(*name))
                .collect();
            let game_id = engine.create_game(specs);
            println!("Created game {game_id} with {players} players");
            game_id
        }
    };

    let records = engine.run_turns(game_id, turns).await?;
    let state = engine.get_state(game_id)?;

    println!();
    for record in &records {
        let name = state
            .character(record.actor)
            .map(|c| c.name.as_str())
            .unwrap_or("?");
        println!("[{:>3}] {name}: {}", record.sequence, record.action);
        println!("      {}", record.narrative);
    }

    println!();
    println!("=== Final state ===");
    for character in &state.characters {
        println!(
            "{} - hp {}/{} at {}{}",
            character.name,
            character.health,
            character.max_health,
            character.location,
            if character.incapacitated { " (down)" } else { "" }
        );
        let facts = engine.known_facts(game_id, character.id)?;
        for fact in facts {
            println!("    knows: {} {}", fact.subject, fact.predicate);
        }
    }

    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn print_help() {
    println!("keeper - narrative game engine demo");
    println!();
    println!("USAGE:");
    println!("  keeper [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help           Show this help message");
    println!("  --players <N>        Number of characters (default: 2, max: 6)");
    println!("  --turns <N>          Turns to run (default: 12)");
    println!("  --data-dir <PATH>    Persist games under this directory");
    println!("  --resume <GAME_ID>   Resume a saved game (requires --data-dir)");
    println!();
    println!("ENVIRONMENT:");
    println!("  KEEPER_WINDOW_SIZE               Verbatim turn window (default: 10)");
    println!("  KEEPER_CONSOLIDATION_THRESHOLD   Consolidation trigger (default: 20)");
    println!("  KEEPER_MAX_CONTEXT_ITEMS         Context cap per call (default: 30)");
    println!("  KEEPER_CAPABILITY_RETRIES        Attempts per capability (default: 3)");
    println!("  KEEPER_CAPABILITY_TIMEOUT_MS     Per-attempt timeout (default: 30000)");
    println!("  RUST_LOG                         Log filter (default: info)");
}
