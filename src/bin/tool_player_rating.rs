/// Player Rating Lookup Tool
///
/// Fetches competitive ratings for one or more players. A single --player
/// goes through the per-player endpoint; several go through the batch
/// path, which stops early when the provider rate-limits and reports how
/// many lookups were skipped.
///
/// Usage: cargo run --bin tool_player_rating -- --player "TenZ#sen" --player "aspas#rb"

use clap::{ Arg, ArgAction, Command };
use colored::Colorize;
use lootdex::apis::ladder::types::PlayerKey;
use lootdex::config::{ Config, DEFAULT_CONFIG_PATH };
use lootdex::service::DataService;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = Command::new("Player Rating Lookup")
        .version("1.0")
        .about("Look up competitive ratings by player name and tag")
        .arg(
            Arg::new("player")
                .short('p')
                .long("player")
                .value_name("NAME#TAG")
                .help("Player to look up, repeat for a batch")
                .action(ArgAction::Append)
                .required(true)
        )
        .arg(
            Arg::new("region")
                .short('r')
                .long("region")
                .value_name("REGION")
                .help("Shard region (defaults to the configured one)")
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Path to the config file")
                .default_value(DEFAULT_CONFIG_PATH)
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .help("Bypass cached data and refetch from the API")
                .action(ArgAction::SetTrue)
        )
        .get_matches();

    let raw_players: Vec<&String> = matches.get_many::<String>("player").unwrap().collect();
    let region = matches.get_one::<String>("region").map(String::as_str);
    let config_path = matches.get_one::<String>("config").unwrap();
    let force = matches.get_flag("force");

    let mut players = Vec::with_capacity(raw_players.len());
    for raw in raw_players {
        match raw.split_once('#') {
            Some((name, tag)) if !name.trim().is_empty() && !tag.trim().is_empty() => {
                players.push(PlayerKey::new(name, tag));
            }
            _ => {
                eprintln!("❌ Invalid player '{}', expected NAME#TAG", raw);
                process::exit(1);
            }
        }
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config from {}: {}", config_path, e);
            process::exit(1);
        }
    };

    let service = match DataService::new(config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("❌ Failed to start data service: {}", e);
            process::exit(1);
        }
    };
    let ladder = service.ladder();

    if players.len() == 1 {
        let player = &players[0];
        match ladder.player_rating(player, region, force).await {
            Ok(rating) => {
                println!("\n{}", "=== PLAYER RATING ===".bold());
                println!("Player: {}", player.to_string().bold());
                if rating.is_unrated() {
                    println!(
                        "{}",
                        format!(
                            "Unrated, {} more placement games needed",
                            rating.games_needed
                        ).yellow()
                    );
                } else {
                    println!("Rank: {} ({} RR)", rating.rank.green(), rating.elo);
                }
            }
            Err(e) => {
                eprintln!("❌ Lookup failed for {}: {}", player, e);
                process::exit(1);
            }
        }
        return;
    }

    let outcome = match ladder.batch_ratings(&players, region, force).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("❌ Batch lookup failed: {}", e);
            process::exit(1);
        }
    };

    println!("\n{}", "=== PLAYER RATINGS ===".bold());
    for (player, result) in &outcome.ratings {
        match result {
            Ok(rating) if rating.is_unrated() => {
                println!(
                    "{:<28} {}",
                    player.to_string(),
                    format!("Unrated ({} placements left)", rating.games_needed).yellow()
                );
            }
            Ok(rating) => {
                println!(
                    "{:<28} {} ({} RR)",
                    player.to_string(),
                    rating.rank.green(),
                    rating.elo
                );
            }
            Err(e) => {
                println!("{:<28} {}", player.to_string(), e.to_string().red());
            }
        }
    }

    if let Some(reason) = &outcome.aborted {
        let skipped = players.len().saturating_sub(outcome.ratings.len());
        let hint = reason
            .retry_after()
            .map(|secs| format!(", retry after {}s", secs))
            .unwrap_or_default();
        println!(
            "\n{}",
            format!("⚠️  Rate limited{}: {} lookups skipped", hint, skipped).yellow()
        );
        process::exit(1);
    }
}
