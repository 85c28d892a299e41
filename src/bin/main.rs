// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use vending_ledger::{
    AccountSummary, Coin, CoinSet, Context, Deposit, Engine, Ledger, LedgerConfig, LedgerError,
    ProductName, ProductRequest, ProductUpdate, Role, Username,
};

/// Vending Ledger - Replay ledger operations from a CSV file
///
/// Reads operations from a CSV file and writes one JSON account summary per
/// buyer to stdout. Logs go to stderr; set RUST_LOG to adjust verbosity.
#[derive(Parser, Debug)]
#[command(name = "vending-ledger")]
#[command(about = "Replays vending ledger operations and prints buyer summaries", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,user,target,amount,price
    /// Example: cargo run -- operations.csv > summaries.jsonl
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Accepted coin denominations, comma separated
    #[arg(long, env = "LEDGER_COINS", default_value = "5,10,20,50,100")]
    coins: CoinSet,

    /// Upper bound on each ledger operation, in milliseconds
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value_t = LedgerConfig::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,
}

#[derive(Debug, Error)]
enum ReplayError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let config = LedgerConfig::new(args.coins, Duration::from_millis(args.timeout_ms));
    let engine = match process_operations(BufReader::new(file), config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_summaries(&engine, io::stdout().lock()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, target, amount, price`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op: String,
    user: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price: Option<u64>,
}

/// One ledger call decoded from a CSV row.
#[derive(Debug, PartialEq)]
enum Operation {
    Register(Role),
    Deposit(Deposit),
    Reset,
    Create(ProductName, ProductUpdate),
    Update(ProductName, ProductUpdate),
    Delete(ProductName),
    Buy(ProductRequest),
}

impl CsvRecord {
    /// Converts the record into a user and operation.
    ///
    /// Returns `None` for unknown types or missing required fields.
    fn into_operation(self) -> Option<(Username, Operation)> {
        let user = Username(self.user);
        let target = self.target.filter(|t| !t.is_empty());

        let operation = match self.op.to_lowercase().as_str() {
            "register" => Operation::Register(target?.parse().ok()?),
            "deposit" => {
                let coin = Coin(target?.parse().ok()?);
                Operation::Deposit([(coin, u64::from(self.amount?))].into_iter().collect())
            }
            "reset" => Operation::Reset,
            "create" => Operation::Create(
                ProductName(target?),
                ProductUpdate {
                    price: self.price?,
                    amount: self.amount?,
                },
            ),
            "update" => Operation::Update(
                ProductName(target?),
                ProductUpdate {
                    price: self.price?,
                    amount: self.amount?,
                },
            ),
            "delete" => Operation::Delete(ProductName(target?)),
            "buy" => Operation::Buy(ProductRequest {
                name: ProductName(target?),
                amount: self.amount.unwrap_or(1),
            }),
            _ => return None,
        };
        Some((user, operation))
    }
}

fn apply(engine: &Engine, ctx: &Context, user: &Username, operation: Operation) -> Result<(), LedgerError> {
    match operation {
        Operation::Register(role) => engine.register_user(ctx, user, role),
        Operation::Deposit(coins) => engine.deposit_coins(ctx, user, &coins).map(|_| ()),
        Operation::Reset => engine.reset_deposit(ctx, user),
        Operation::Create(name, listing) => engine.create_product(ctx, user, &name, listing).map(|_| ()),
        Operation::Update(name, update) => engine.update_product(ctx, user, &name, update),
        Operation::Delete(name) => engine.delete_product(ctx, user, &name),
        Operation::Buy(request) => engine.buy_product(ctx, user, &request).map(|_| ()),
    }
}

/// Replays operations from a CSV reader.
///
/// Rows are streamed, not loaded up front. Malformed rows and operations the
/// ledger rejects are logged and skipped.
///
/// # CSV Format
///
/// Expected columns: `type, user, target, amount, price`
/// - `register`: `target` is the role (buyer, seller)
/// - `deposit`: `target` is the coin, `amount` the number of coins
/// - `reset`: no extra fields
/// - `create` / `update`: `target` is the product, `amount` the stock, `price` the unit price
/// - `delete`: `target` is the product
/// - `buy`: `target` is the product, `amount` the units (default 1)
///
/// # Example
///
/// ```csv
/// type,user,target,amount,price
/// register,sam,seller,,
/// register,mike,buyer,,
/// create,sam,cola,10,100
/// deposit,mike,100,2,
/// buy,mike,cola,1,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn process_operations<R: Read>(reader: R, config: LedgerConfig) -> Result<Engine, csv::Error> {
    let engine = Engine::with_config(config);
    let ctx = Context::background();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line, "Skipping malformed row: {}", e);
                continue;
            }
        };
        let Some((user, operation)) = record.into_operation() else {
            tracing::warn!(line, "Skipping invalid operation record");
            continue;
        };
        if let Err(e) = apply(&engine, &ctx, &user, operation) {
            tracing::warn!(line, %user, "Skipping rejected operation: {}", e);
        }
    }

    Ok(engine)
}

#[derive(Debug, Serialize)]
struct SummaryLine<'a> {
    username: &'a Username,
    summary: AccountSummary,
}

/// Writes one JSON summary line per buyer, sorted by username.
fn write_summaries<W: Write>(engine: &Engine, mut writer: W) -> Result<(), ReplayError> {
    let ctx = Context::background();
    for username in engine.store().usernames() {
        let user = match engine.user(&ctx, &username) {
            Ok(user) => user,
            // Deleted between listing and reading.
            Err(LedgerError::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        if user.role != Role::Buyer {
            continue;
        }
        let summary = engine.account_summary(&ctx, &username)?;
        serde_json::to_writer(&mut writer, &SummaryLine {
            username: &username,
            summary,
        })?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}
