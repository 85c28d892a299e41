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

//! Account summary: balance as coins, purchases by product, total spent.

use crate::base::ProductName;
use crate::change::Deposit;
use crate::coin::CoinSet;
use crate::purchase::PurchaseRecord;
use crate::store::AccountSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Units bought of one product at one historical price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedProduct {
    pub name: ProductName,
    pub amount: u64,
    /// Unit price the units were bought at. Not part of the wire shape.
    #[serde(skip)]
    pub price: u64,
}

/// Derived view of an account, recomputed on every read.
///
/// `products` serializes as an array even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub deposit: Deposit,
    pub products: Vec<PurchasedProduct>,
    pub spent: u64,
}

impl AccountSummary {
    /// Builds the summary from one consistent snapshot.
    ///
    /// Purchases are grouped by product name and unit price, in the order
    /// each group was first bought; the same product bought at two prices
    /// stays two entries.
    pub fn build(coins: &CoinSet, snapshot: &AccountSnapshot) -> Self {
        let (products, spent) = aggregate(&snapshot.purchases);
        Self {
            deposit: Deposit::from_amount(coins, snapshot.balance),
            products,
            spent,
        }
    }
}

fn aggregate(purchases: &[PurchaseRecord]) -> (Vec<PurchasedProduct>, u64) {
    let mut products: Vec<PurchasedProduct> = Vec::new();
    let mut index: HashMap<(&ProductName, u64), usize> = HashMap::new();
    let mut spent = 0u64;

    for record in purchases {
        spent = spent.saturating_add(record.cost());
        match index.get(&(&record.product, record.price)) {
            Some(&i) => products[i].amount += u64::from(record.amount),
            None => {
                index.insert((&record.product, record.price), products.len());
                products.push(PurchasedProduct {
                    name: record.product.clone(),
                    amount: u64::from(record.amount),
                    price: record.price,
                });
            }
        }
    }

    (products, spent)
}
