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

//! Ledger configuration.

use crate::coin::CoinSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide ledger settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Accepted denominations.
    pub coins: CoinSet,
    /// Upper bound on any single operation whose context has no deadline.
    pub timeout_ms: u64,
}

impl LedgerConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

    pub fn new(coins: CoinSet, timeout: Duration) -> Self {
        Self {
            coins,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            coins: CoinSet::default(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}
