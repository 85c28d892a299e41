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

//! Purchase records.

use crate::base::{ProductName, Username};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable, append-only purchase fact.
///
/// `price` is the unit price at the time of purchase, so later price changes
/// never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub buyer: Username,
    pub product: ProductName,
    pub amount: u32,
    pub price: u64,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseRecord {
    /// `price * amount`, saturating.
    pub fn cost(&self) -> u64 {
        self.price.saturating_mul(u64::from(self.amount))
    }
}
