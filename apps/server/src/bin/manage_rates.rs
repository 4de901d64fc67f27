//! CLI tool to manage operator commission rates.
//!
//! Usage:
//!   cargo run --bin manage-rates -- list
//!   cargo run --bin manage-rates -- set --operator <operator-id> --amount <amount>
//!
//! Changing a rate only affects sign-ups submitted afterwards.

use std::env;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use signup_intake_lib::config::Config;
use signup_intake_lib::db::DbPool;
use signup_intake_lib::models::{cents_to_decimal, decimal_to_cents};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = &args[1];

    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match DbPool::new(&config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pool.run_migrations().await {
        eprintln!("Error running migrations: {}", e);
        std::process::exit(1);
    }

    match command.as_str() {
        "list" | "ls" => list_rates(&pool).await,
        "set" => {
            let operator_id = match Uuid::parse_str(&required_arg(&args, "--operator", "-o")) {
                Ok(id) => id,
                Err(_) => {
                    eprintln!("Error: --operator must be a UUID");
                    std::process::exit(1);
                }
            };
            let amount = match Decimal::from_str(&required_arg(&args, "--amount", "-a")) {
                Ok(amount) if !amount.is_sign_negative() => amount,
                _ => {
                    eprintln!("Error: --amount must be a non-negative decimal, e.g. 25.00");
                    std::process::exit(1);
                }
            };
            set_rate(&pool, operator_id, amount).await;
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn required_arg(args: &[String], long: &str, short: &str) -> String {
    let mut i = 2;
    while i < args.len() {
        if (args[i] == long || args[i] == short) && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        i += 1;
    }
    eprintln!("Error: {} is required", long);
    std::process::exit(1);
}

async fn list_rates(pool: &DbPool) {
    let rates = match pool.list_operator_rates().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error listing rates: {}", e);
            std::process::exit(1);
        }
    };

    if rates.is_empty() {
        println!("No operator rates configured.");
        return;
    }

    println!();
    println!("{:<36} {:>12} {:<25}", "OPERATOR", "CPA", "UPDATED");
    println!("{}", "-".repeat(75));

    for rate in rates {
        println!(
            "{:<36} {:>12} {:<25}",
            rate.operator_id,
            cents_to_decimal(rate.cpa_amount_cents),
            rate.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();
}

async fn set_rate(pool: &DbPool, operator_id: Uuid, amount: Decimal) {
    let Some(cents) = decimal_to_cents(amount) else {
        eprintln!("Error: amount {} is out of range", amount);
        std::process::exit(1);
    };

    match pool.upsert_operator_rate(operator_id, cents, Utc::now()).await {
        Ok(()) => println!(
            "Operator {} rate set to {}.",
            operator_id,
            cents_to_decimal(cents)
        ),
        Err(e) => {
            eprintln!("Error setting rate: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: manage-rates <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list, ls                                  List operator commission rates");
    eprintln!("  set --operator <id> --amount <amount>     Set an operator's CPA amount");
    eprintln!("  help                                      Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  manage-rates list");
    eprintln!("  manage-rates set --operator 550e8400-e29b-41d4-a716-446655440000 --amount 25.00");
    eprintln!();
}
