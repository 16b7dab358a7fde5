/// Item Price Lookup Tool
///
/// Resolves a Grand Exchange item by name or numeric id, then prints the
/// latest buy/sell quote, a per-timestep history summary and the daily
/// trade volume. Results come through the shared cache, so repeated runs
/// within the TTL window do not hit the wiki API again.
///
/// Usage: cargo run --bin tool_item_price -- --item "Abyssal whip"

use clap::{ Arg, Command };
use colored::Colorize;
use lootdex::apis::exchange::types::Timestep;
use lootdex::config::{ Config, DEFAULT_CONFIG_PATH };
use lootdex::service::DataService;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = Command::new("Item Price Lookup")
        .version("1.0")
        .about("Look up Grand Exchange prices for a single item")
        .arg(
            Arg::new("item")
                .short('i')
                .long("item")
                .value_name("NAME_OR_ID")
                .help("Item name or numeric item id")
                .required(true)
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
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("stats")
                .short('s')
                .long("stats")
                .help("Print cache statistics after the lookup")
                .action(clap::ArgAction::SetTrue)
        )
        .get_matches();

    let item_arg = matches.get_one::<String>("item").unwrap();
    let config_path = matches.get_one::<String>("config").unwrap();
    let force = matches.get_flag("force");
    let show_stats = matches.get_flag("stats");

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

    match service.initialize().await {
        Ok(count) => println!("ℹ️  Catalog loaded: {} items", count),
        Err(e) => {
            eprintln!("❌ Failed to load the item catalog: {}", e);
            process::exit(1);
        }
    }

    // Numeric input is treated as an item id, anything else as a name.
    let resolved = match item_arg.parse::<i64>() {
        Ok(id) => service.item_by_id(id),
        Err(_) => service.item_by_name(item_arg),
    };

    let item = match resolved {
        Some(item) => item,
        None => {
            eprintln!("❌ No catalog item matches '{}'", item_arg);
            let suggestions = service.search_items(item_arg, Some(5));
            if !suggestions.is_empty() {
                eprintln!("Did you mean:");
                for candidate in &suggestions {
                    eprintln!("  {} (id {})", candidate.name, candidate.id);
                }
            }
            process::exit(1);
        }
    };

    let overview = match service.exchange().item_overview(item.id, force).await {
        Ok(overview) => overview,
        Err(e) => {
            eprintln!("❌ Failed to fetch price data: {}", e);
            process::exit(1);
        }
    };

    println!("\n{}", "=== ITEM ===".bold());
    println!("Name: {}", item.name.bold());
    println!("Id: {}", item.id);
    if item.members {
        println!("Members: yes");
    }
    if let Some(buy_limit) = item.buy_limit {
        println!("Buy limit: {} / 4h", buy_limit);
    }
    if let Some(highalch) = item.highalch {
        println!("High alch: {} gp", format_gp(highalch));
    }
    if let Some(examine) = &item.examine {
        println!("Examine: {}", examine.dimmed());
    }

    println!("\n{}", "=== LATEST QUOTE ===".bold());
    match &overview.latest {
        Some(quote) => {
            match quote.high {
                Some(high) => println!("Insta-buy:  {} gp", format_gp(high).green()),
                None => println!("Insta-buy:  {}", "no data".dimmed()),
            }
            match quote.low {
                Some(low) => println!("Insta-sell: {} gp", format_gp(low).green()),
                None => println!("Insta-sell: {}", "no data".dimmed()),
            }
            if let (Some(high), Some(low)) = (quote.high, quote.low) {
                println!("Margin:     {} gp", format_gp(high - low));
            }
        }
        None => println!("{}", "⚠️  No live quote available".yellow()),
    }

    println!("\n{}", "=== HISTORY ===".bold());
    for step in Timestep::ALL {
        match overview.history.get(step.as_str()) {
            Some(points) if !points.is_empty() => {
                let high = points.iter().filter_map(|p| p.avg_high_price).max();
                let low = points.iter().filter_map(|p| p.avg_low_price).min();
                println!(
                    "{:>4}: {} points, high {} / low {}",
                    step.as_str(),
                    points.len(),
                    high.map(format_gp).unwrap_or_else(|| "-".to_string()),
                    low.map(format_gp).unwrap_or_else(|| "-".to_string())
                );
            }
            _ => println!("{:>4}: {}", step.as_str(), "no data".dimmed()),
        }
    }

    match service.exchange().trade_volumes(&[item.name.clone()], force).await {
        Ok(volumes) => {
            if let Some(point) = volumes.get(&item.name) {
                println!("\n{}", "=== DAILY VOLUME ===".bold());
                if let Some(volume) = point.volume {
                    println!("Traded: {:.0} units", volume);
                }
                if let Some(price) = point.price {
                    println!("Guide price: {} gp", format_gp(price));
                }
            }
        }
        Err(e) => eprintln!("⚠️  Volume lookup failed: {}", e),
    }

    if show_stats {
        println!("\n{}", "=== CACHE STATS ===".bold());
        let stats = service.stats().await;
        match serde_json::to_string_pretty(&stats) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => eprintln!("⚠️  Could not render stats: {}", e),
        }
    }
}

/// 1234567 -> "1,234,567"
fn format_gp(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
