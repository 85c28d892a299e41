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

//! # Vending Ledger
//!
//! This library provides the account ledger behind a vending machine: buyers
//! deposit coins and buy products against that balance, sellers list and
//! price products, and every purchase moves money and stock in one atomic step.
//!
//! ## Core Components
//!
//! - [`Engine`]: Ledger operations over a [`LedgerStore`]
//! - [`MemoryStore`]: Thread-safe in-process store with row-level locking
//! - [`Deposit`]: Denomination to count breakdown, with greedy [`decompose`] and [`recompose`]
//! - [`AccountSummary`]: Balance as coins, purchases by product, total spent
//! - [`LedgerError`]: Not found, duplicate, invalid, and transient failures
//!
//! ## Example
//!
//! ```
//! use vending_ledger::{Context, Engine, Ledger, ProductRequest, ProductUpdate, Role, Username};
//!
//! let engine = Engine::new();
//! let ctx = Context::background();
//! let buyer = Username::from("mike");
//! let seller = Username::from("sam");
//!
//! engine.register_user(&ctx, &buyer, Role::Buyer).unwrap();
//! engine.register_user(&ctx, &seller, Role::Seller).unwrap();
//! engine
//!     .create_product(&ctx, &seller, &"cola".into(), ProductUpdate { price: 100, amount: 10 })
//!     .unwrap();
//!
//! engine.increment_deposit(&ctx, &buyer, 210).unwrap();
//! engine.buy_product(&ctx, &buyer, &ProductRequest::new("cola", 2)).unwrap();
//!
//! let summary = engine.account_summary(&ctx, &buyer).unwrap();
//! assert_eq!(summary.spent, 200);
//! assert_eq!(serde_json::to_string(&summary.deposit).unwrap(), r#"{"10":1}"#);
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Sync`. Operations on different accounts run in parallel;
//! operations on the same account serialize on its row lock.

mod base;
pub mod change;
mod coin;
mod config;
mod context;
mod engine;
pub mod error;
mod memory;
mod product;
mod purchase;
pub mod store;
mod summary;
mod user;

pub use base::{ProductName, Role, Username};
pub use change::{Deposit, decompose, recompose};
pub use coin::{Coin, CoinSet};
pub use config::LedgerConfig;
pub use context::Context;
pub use engine::{Engine, Ledger};
pub use error::{ErrorKind, LedgerError};
pub use memory::MemoryStore;
pub use product::{Product, ProductRequest, ProductUpdate};
pub use purchase::PurchaseRecord;
pub use store::{AccountSnapshot, LedgerStore};
pub use summary::{AccountSummary, PurchasedProduct};
pub use user::{User, UserProfile};
