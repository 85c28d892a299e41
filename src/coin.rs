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

//! Accepted coin denominations.

use crate::LedgerError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single coin denomination, in the smallest currency unit.
///
/// Serialized as a bare integer; as a JSON map key it becomes a string
/// (`"5"`, `"10"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Coin(pub u32);

impl Coin {
    pub fn value(self) -> u64 {
        u64::from(self.0)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed vocabulary of accepted denominations.
///
/// Always non-empty, distinct, strictly positive, and sorted descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CoinSet(Vec<Coin>);

impl CoinSet {
    /// Builds a coin set from raw denominations, in any order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Invalid`] if the list is empty or contains a zero.
    pub fn new(values: impl IntoIterator<Item = u32>) -> Result<Self, LedgerError> {
        let mut coins: Vec<Coin> = values.into_iter().map(Coin).collect();
        if coins.is_empty() {
            return Err(LedgerError::invalid("coin set must not be empty"));
        }
        if coins.contains(&Coin(0)) {
            return Err(LedgerError::invalid("coin denomination must be positive"));
        }
        coins.sort_unstable_by(|a, b| b.cmp(a));
        coins.dedup();
        Ok(CoinSet(coins))
    }

    /// Denominations from largest to smallest.
    pub fn iter(&self) -> impl Iterator<Item = Coin> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, coin: Coin) -> bool {
        self.0.binary_search_by(|c| coin.cmp(c)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CoinSet {
    fn default() -> Self {
        CoinSet(vec![Coin(100), Coin(50), Coin(20), Coin(10), Coin(5)])
    }
}

impl FromStr for CoinSet {
    type Err = LedgerError;

    /// Parses a comma-separated list such as `5,10,20,50,100`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| LedgerError::Invalid(format!("invalid coin '{part}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        CoinSet::new(values)
    }
}

impl<'de> Deserialize<'de> for CoinSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<u32>::deserialize(deserializer)?;
        CoinSet::new(values).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for CoinSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for coin in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{coin}")?;
            first = false;
        }
        Ok(())
    }
}
