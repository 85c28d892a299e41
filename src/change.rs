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

//! Change decomposition.
//!
//! Converts a balance into a denomination breakdown and back.
//!
//! # Example
//!
//! ```
//! use vending_ledger::{Coin, CoinSet, Deposit};
//!
//! let coins = CoinSet::default();
//! let deposit = Deposit::from_amount(&coins, 210);
//! assert_eq!(deposit.count(Coin(100)), 2);
//! assert_eq!(deposit.count(Coin(5)), 2);
//! assert_eq!(deposit.amount(), Ok(210));
//! ```

use crate::LedgerError;
use crate::coin::{Coin, CoinSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A denomination to count breakdown.
///
/// Zero counts are never stored, so an empty balance is an empty map. On the
/// wire this is a JSON object keyed by denomination, e.g. `{"5": 2, "100": 1}`;
/// zero-count keys in submitted JSON are accepted and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Coin, u64>", into = "BTreeMap<Coin, u64>")]
pub struct Deposit(BTreeMap<Coin, u64>);

impl Deposit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Greedy decomposition of `amount`, see [`decompose`].
    pub fn from_amount(coins: &CoinSet, amount: u64) -> Self {
        decompose(coins, amount)
    }

    /// Adds `count` coins of `coin`. Zero counts are ignored.
    pub fn add(&mut self, coin: Coin, count: u64) {
        if count == 0 {
            return;
        }
        let entry = self.0.entry(coin).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    pub fn count(&self, coin: Coin) -> u64 {
        self.0.get(&coin).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries in ascending denomination order.
    pub fn iter(&self) -> impl Iterator<Item = (Coin, u64)> + '_ {
        self.0.iter().map(|(coin, count)| (*coin, *count))
    }

    /// Total value of the coins, see [`recompose`].
    pub fn amount(&self) -> Result<u64, LedgerError> {
        recompose(self)
    }
}

impl From<BTreeMap<Coin, u64>> for Deposit {
    fn from(mut map: BTreeMap<Coin, u64>) -> Self {
        map.retain(|_, count| *count > 0);
        Deposit(map)
    }
}

impl From<Deposit> for BTreeMap<Coin, u64> {
    fn from(deposit: Deposit) -> Self {
        deposit.0
    }
}

impl FromIterator<(Coin, u64)> for Deposit {
    fn from_iter<I: IntoIterator<Item = (Coin, u64)>>(iter: I) -> Self {
        let mut deposit = Deposit::new();
        for (coin, count) in iter {
            deposit.add(coin, count);
        }
        deposit
    }
}

/// Breaks `amount` into coins, largest denomination first.
///
/// Each denomination takes as many coins as fit into what remains. This is
/// greedy, not minimal-count: callers rely on its exact output. When the set
/// has no coin of value 1, a remainder smaller than the smallest coin is
/// dropped.
pub fn decompose(coins: &CoinSet, amount: u64) -> Deposit {
    let mut deposit = Deposit::new();
    let mut remaining = amount;
    for coin in coins.iter() {
        let count = remaining / coin.value();
        if count > 0 {
            deposit.add(coin, count);
            remaining %= coin.value();
        }
    }
    deposit
}

/// Sums `coin * count` over every entry. An empty deposit is worth 0.
///
/// # Errors
///
/// [`LedgerError::Invalid`] if the total does not fit in a `u64`.
pub fn recompose(deposit: &Deposit) -> Result<u64, LedgerError> {
    deposit.iter().try_fold(0u64, |total, (coin, count)| {
        coin.value()
            .checked_mul(count)
            .and_then(|value| total.checked_add(value))
            .ok_or_else(|| LedgerError::invalid("deposit amount out of range"))
    })
}
