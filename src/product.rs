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

//! Product catalog types.

use crate::base::{ProductName, Username};
use serde::{Deserialize, Serialize};

/// A listed product.
///
/// `amount` is the stock on hand. Only `seller_id` may update or delete it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: ProductName,
    #[serde(rename = "sellerId")]
    pub seller_id: Username,
    pub price: u64,
    pub amount: u32,
}

/// New price and stock for an existing product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub price: u64,
    pub amount: u32,
}

/// A buyer's request for `amount` units of `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRequest {
    pub name: ProductName,
    pub amount: u32,
}

impl ProductRequest {
    pub fn new(name: impl Into<String>, amount: u32) -> Self {
        Self {
            name: ProductName(name.into()),
            amount,
        }
    }
}
