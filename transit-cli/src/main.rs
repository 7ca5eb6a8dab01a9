//! transit: decode, identify and export transit card dumps.
//!
//! Dumps are JSON documents deserialized into `transit_core::Card`. Output is
//! either human tables or the decoded `TransitInfo` as JSON.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing_subscriber::EnvFilter;

use transit_core::config::{self, Config, OutputFormat};
use transit_core::registry::DECODERS;
use transit_core::{
    Card, CardOutcome, ObfuscationContext, ObfuscationOptions, Registry, TransitError, TransitInfo,
};

#[derive(Parser)]
#[command(name = "transit", version, about = "Transit card dump decoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a card dump and print balances, trips and subscriptions
    Decode {
        /// Path to a JSON card dump
        dump: PathBuf,

        /// Print the decoded info as JSON
        #[arg(long)]
        json: bool,

        /// Include scheme-specific extra info
        #[arg(long)]
        extra: bool,
    },

    /// Identify one or more card dumps without a full decode
    Identify {
        /// Paths to JSON card dumps
        #[arg(required = true)]
        dumps: Vec<PathBuf>,
    },

    /// Export the decoded info as JSON, optionally obfuscated
    Export {
        /// Path to a JSON card dump
        dump: PathBuf,

        /// Obfuscate trips before export
        #[arg(long)]
        obfuscate: bool,

        /// RNG seed for reproducible obfuscation
        #[arg(long, env = "TRANSIT_SEED")]
        seed: Option<u64>,

        /// Shift dates (selecting any of --dates/--times/--fares overrides the config)
        #[arg(long)]
        dates: bool,

        /// Jitter times of day
        #[arg(long)]
        times: bool,

        /// Add noise to fares
        #[arg(long)]
        fares: bool,
    },

    /// List registered decoders in dispatch order
    Schemes,

    /// Manage the configuration file ($TRANSIT_CONFIG or ~/.transit-decode/config.yaml)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init,
    /// Print the effective configuration
    Show,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = config::load_config();

    match cli.command {
        Commands::Decode { dump, json, extra } => cmd_decode(&dump, json, extra, &config),
        Commands::Identify { dumps } => cmd_identify(&dumps),
        Commands::Export {
            dump,
            obfuscate,
            seed,
            dates,
            times,
            fares,
        } => {
            let options = export_options(obfuscate, dates, times, fares, &config);
            cmd_export(&dump, options, seed.or(config.obfuscation.seed));
        }
        Commands::Schemes => cmd_schemes(),
        Commands::Config { action } => cmd_config(action, &config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TRANSIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_card(path: &Path) -> transit_core::Result<Card> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| TransitError::InvalidDump(e.to_string()))
}

fn load_card_or_exit(path: &Path) -> Card {
    load_card(path).unwrap_or_else(|e| {
        eprintln!("Error: {}: {e}", path.display());
        std::process::exit(1);
    })
}

/// Decode or exit with the outcome summary on stderr.
fn decode_or_exit(registry: &Registry, card: &Card) -> TransitInfo {
    match registry.decode(card) {
        CardOutcome::Decoded(info) => info,
        other => {
            eprintln!("Error: {}", other.summary());
            std::process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_decode(dump: &Path, json: bool, extra: bool, config: &Config) {
    let card = load_card_or_exit(dump);
    let info = decode_or_exit(&Registry::default(), &card);

    if json || config.output.format == OutputFormat::Json {
        print_json(&info);
    } else {
        print_info(&info, extra || config.output.show_extra);
    }
}

fn cmd_identify(dumps: &[PathBuf]) {
    let registry = Registry::default();
    let mut table = Table::new();
    table.set_header(vec!["File", "Family", "Card", "Serial"]);

    let mut failures = 0;
    for path in dumps {
        let card = match load_card(path) {
            Ok(card) => card,
            Err(e) => {
                eprintln!("Error: {}: {e}", path.display());
                failures += 1;
                continue;
            }
        };
        let identity = registry.identify(&card);
        table.add_row(vec![
            Cell::new(path.display()),
            Cell::new(card.family()),
            Cell::new(identity.as_ref().map_or("unsupported", |id| id.name.as_str())),
            Cell::new(
                identity
                    .and_then(|id| id.serial)
                    .unwrap_or("-".into()),
            ),
        ]);
    }

    println!("{table}");
    if failures > 0 {
        std::process::exit(1);
    }
}

fn export_options(
    obfuscate: bool,
    dates: bool,
    times: bool,
    fares: bool,
    config: &Config,
) -> ObfuscationOptions {
    if !obfuscate {
        ObfuscationOptions::none()
    } else if dates || times || fares {
        ObfuscationOptions { dates, times, fares }
    } else {
        config.obfuscation.options()
    }
}

fn cmd_export(dump: &Path, options: ObfuscationOptions, seed: Option<u64>) {
    let card = load_card_or_exit(dump);
    let info = decode_or_exit(&Registry::default(), &card);
    tracing::debug!(?options, seeded = seed.is_some(), "exporting {}", info.card_name);

    let mut ctx = match seed {
        Some(seed) => ObfuscationContext::new(options, seed, chrono::Local::now().naive_local()),
        None => ObfuscationContext::from_entropy(options),
    };
    print_json(&ctx.obfuscate_info(&info));
}

fn cmd_schemes() {
    let mut table = Table::new();
    table.set_header(vec!["#", "Scheme", "Family"]);
    for (i, decoder) in DECODERS.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(decoder.name()),
            Cell::new(decoder.family()),
        ]);
    }
    println!("{table}");
}

fn cmd_config(action: ConfigAction, config: &Config) {
    match action {
        ConfigAction::Init => {
            let path = config::config_file();
            if path.exists() {
                eprintln!("Config already exists: {}", path.display());
                std::process::exit(1);
            }
            match config::save_config(&Config::default()) {
                Ok(path) => println!("Wrote {}", path.display()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Show => {
            println!("# {}", config::config_file().display());
            print!("{}", config::serialize_config(config));
        }
    }
}

// ---------------------------------------------------------------------------
// Table output
// ---------------------------------------------------------------------------

fn print_info(info: &TransitInfo, extra: bool) {
    println!();
    println!(
        "{} {}",
        info.card_name,
        info.serial_number.as_deref().unwrap_or("(no serial)")
    );

    for balance in &info.balances {
        let mut line = format!("  Balance: {}", balance.balance);
        if let Some(name) = &balance.name {
            line.push_str(&format!(" ({name})"));
        }
        if let Some(to) = balance.valid_to {
            line.push_str(&format!(", valid to {to}"));
        }
        println!("{line}");
    }
    println!();

    if let Some(trips) = info.trips.as_ref().filter(|t| !t.is_empty()) {
        let mut table = Table::new();
        table.set_header(vec!["Start", "End", "Mode", "Agency", "From", "To", "Fare"]);
        for trip in trips {
            table.add_row(vec![
                Cell::new(fmt_opt(trip.start_timestamp())),
                Cell::new(fmt_opt(trip.end_timestamp())),
                Cell::new(trip.mode()),
                Cell::new(trip.agency().unwrap_or("-")),
                Cell::new(fmt_opt(trip.start_station())),
                Cell::new(fmt_opt(trip.end_station())),
                Cell::new(trip.fare().map_or("-".into(), |f| f.format_signed())),
            ]);
        }
        println!("{table}");
    }

    if let Some(subs) = info.subscriptions.as_ref().filter(|s| !s.is_empty()) {
        let mut table = Table::new();
        table.set_header(vec!["Subscription", "Valid from", "Valid to", "Trips left"]);
        for sub in subs {
            table.add_row(vec![
                Cell::new(sub.name.as_deref().unwrap_or("-")),
                Cell::new(fmt_opt(sub.valid_from)),
                Cell::new(fmt_opt(sub.valid_to)),
                Cell::new(fmt_opt(sub.remaining_trips)),
            ]);
        }
        println!("{table}");
    }

    if extra && !info.extra_info.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Field", "Value"]);
        for item in &info.extra_info {
            table.add_row(vec![Cell::new(&item.label), Cell::new(&item.value)]);
        }
        println!("{table}");
    }
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or("-".into())
}
