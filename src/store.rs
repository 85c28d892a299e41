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

//! Storage interface for accounts, products, and purchase records.
//!
//! Every method runs as one transaction: it either applies all of its
//! effects or none, and reports failures only as [`LedgerError`].

use crate::LedgerError;
use crate::base::{ProductName, Role, Username};
use crate::context::Context;
use crate::product::{Product, ProductRequest, ProductUpdate};
use crate::purchase::PurchaseRecord;
use crate::user::User;

/// An account's balance and purchase history read at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balance: u64,
    pub purchases: Vec<PurchaseRecord>,
}

/// Durable, transactional ledger storage.
pub trait LedgerStore: Send + Sync {
    /// Creates an account with a zero balance.
    fn insert_user(&self, ctx: &Context, username: &Username, role: Role)
    -> Result<(), LedgerError>;

    fn get_user(&self, ctx: &Context, username: &Username) -> Result<User, LedgerError>;

    fn update_role(&self, ctx: &Context, username: &Username, role: Role)
    -> Result<(), LedgerError>;

    /// Removes an account and its purchase history.
    fn delete_user(&self, ctx: &Context, username: &Username) -> Result<(), LedgerError>;

    fn insert_product(&self, ctx: &Context, product: Product) -> Result<(), LedgerError>;

    fn get_product(&self, ctx: &Context, name: &ProductName) -> Result<Product, LedgerError>;

    /// Updates price and stock where `seller_id == owner`.
    fn update_product(
        &self,
        ctx: &Context,
        owner: &Username,
        name: &ProductName,
        update: ProductUpdate,
    ) -> Result<(), LedgerError>;

    /// Deletes the product where `seller_id == owner`.
    fn delete_product(
        &self,
        ctx: &Context,
        owner: &Username,
        name: &ProductName,
    ) -> Result<(), LedgerError>;

    /// Adds `delta` to the balance. Negative deltas reverse earlier credits.
    fn increment_deposit(
        &self,
        ctx: &Context,
        username: &Username,
        delta: i64,
    ) -> Result<(), LedgerError>;

    /// Overwrites the balance.
    fn set_deposit(&self, ctx: &Context, username: &Username, amount: u64)
    -> Result<(), LedgerError>;

    /// Charges the buyer, takes stock, and appends the purchase record.
    fn buy_product(
        &self,
        ctx: &Context,
        username: &Username,
        request: &ProductRequest,
    ) -> Result<PurchaseRecord, LedgerError>;

    /// Reads balance and purchase history together.
    fn account_snapshot(
        &self,
        ctx: &Context,
        username: &Username,
    ) -> Result<AccountSnapshot, LedgerError>;
}
