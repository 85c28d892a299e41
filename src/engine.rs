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

//! Ledger engine: deposits, resets, purchases, and account summaries.

use crate::LedgerError;
use crate::base::{ProductName, Role, Username};
use crate::change::Deposit;
use crate::coin::CoinSet;
use crate::config::LedgerConfig;
use crate::context::Context;
use crate::memory::MemoryStore;
use crate::product::{Product, ProductRequest, ProductUpdate};
use crate::purchase::PurchaseRecord;
use crate::store::LedgerStore;
use crate::summary::AccountSummary;
use crate::user::{User, UserProfile};

/// The money and inventory operations of the ledger.
///
/// Every operation receives the caller's already-authenticated username
/// explicitly; nothing is read from ambient state.
pub trait Ledger: Send + Sync {
    /// Denominations deposits are accepted in and balances are rendered in.
    fn coins(&self) -> &CoinSet;

    /// Balance as coins, purchases grouped by product and price, and total
    /// spent, all read from one snapshot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No account for `username`.
    fn account_summary(
        &self,
        ctx: &Context,
        username: &Username,
    ) -> Result<AccountSummary, LedgerError>;

    /// Adds `amount` to the balance. Negative amounts reverse a credit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No account for `username`.
    /// - [`LedgerError::Invalid`] - The balance would leave `0..=u64::MAX`.
    fn increment_deposit(
        &self,
        ctx: &Context,
        username: &Username,
        amount: i64,
    ) -> Result<(), LedgerError>;

    /// Overwrites the balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No account for `username`.
    fn set_deposit(&self, ctx: &Context, username: &Username, amount: u64)
    -> Result<(), LedgerError>;

    /// Buys `request.amount` units in one atomic step: stock and balance are
    /// decremented and a purchase record is appended, or nothing changes.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - Buyer or product does not exist.
    /// - [`LedgerError::Invalid`] - Zero amount, insufficient stock, or
    ///   insufficient deposit.
    fn buy_product(
        &self,
        ctx: &Context,
        username: &Username,
        request: &ProductRequest,
    ) -> Result<PurchaseRecord, LedgerError>;

    /// Credits coins submitted by the caller and returns the credited amount.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Invalid`] - A denomination outside [`Ledger::coins`],
    ///   or a total out of range.
    /// - [`LedgerError::NotFound`] - No account for `username`.
    fn deposit_coins(
        &self,
        ctx: &Context,
        username: &Username,
        coins: &Deposit,
    ) -> Result<u64, LedgerError> {
        if let Some((coin, _)) = coins.iter().find(|(coin, _)| !self.coins().contains(*coin)) {
            return Err(LedgerError::Invalid(format!("coin {coin} is not accepted")));
        }
        let amount = coins.amount()?;
        let delta =
            i64::try_from(amount).map_err(|_| LedgerError::invalid("deposit amount out of range"))?;
        self.increment_deposit(ctx, username, delta)?;
        Ok(amount)
    }

    /// Sets the balance back to zero.
    fn reset_deposit(&self, ctx: &Context, username: &Username) -> Result<(), LedgerError> {
        self.set_deposit(ctx, username, 0)
    }
}

/// Ledger engine over a [`LedgerStore`].
///
/// Holds no state of its own beyond configuration; all consistency comes
/// from the store's transactions. Each call is bounded by the context's
/// deadline or, failing that, [`LedgerConfig::timeout`].
#[derive(Debug)]
pub struct Engine<S = MemoryStore> {
    store: S,
    config: LedgerConfig,
}

impl Engine<MemoryStore> {
    /// Creates an engine over an empty in-memory store with default settings.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self::with_store(MemoryStore::new(), config)
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LedgerStore> Engine<S> {
    pub fn with_store(store: S, config: LedgerConfig) -> Self {
        Engine { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn bounded(&self, ctx: &Context) -> Context {
        ctx.bounded(self.config.timeout())
    }

    /// Registers a buyer or seller with an empty balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Duplicate`] - Username taken.
    /// - [`LedgerError::Invalid`] - `role` is [`Role::Anonymous`].
    pub fn register_user(
        &self,
        ctx: &Context,
        username: &Username,
        role: Role,
    ) -> Result<(), LedgerError> {
        let result = self.store.insert_user(&self.bounded(ctx), username, role);
        log_outcome("register_user", username, &result);
        result
    }

    pub fn user(&self, ctx: &Context, username: &Username) -> Result<User, LedgerError> {
        self.store.get_user(&self.bounded(ctx), username)
    }

    /// The account with its balance decomposed into coins.
    pub fn user_profile(&self, ctx: &Context, username: &Username) -> Result<UserProfile, LedgerError> {
        let user = self.user(ctx, username)?;
        Ok(UserProfile {
            deposit: Deposit::from_amount(&self.config.coins, user.deposit),
            username: user.username,
            role: user.role,
        })
    }

    pub fn update_role(&self, ctx: &Context, username: &Username, role: Role) -> Result<(), LedgerError> {
        let result = self.store.update_role(&self.bounded(ctx), username, role);
        log_outcome("update_role", username, &result);
        result
    }

    /// Removes the account and its purchase history.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No such account.
    /// - [`LedgerError::Invalid`] - The account still owns listed products.
    pub fn delete_user(&self, ctx: &Context, username: &Username) -> Result<(), LedgerError> {
        let result = self.store.delete_user(&self.bounded(ctx), username);
        log_outcome("delete_user", username, &result);
        result
    }

    /// Lists a new product owned by `seller`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Duplicate`] - Any seller already lists `name`.
    /// - [`LedgerError::NotFound`] - `seller` has no account.
    pub fn create_product(
        &self,
        ctx: &Context,
        seller: &Username,
        name: &ProductName,
        listing: ProductUpdate,
    ) -> Result<Product, LedgerError> {
        let product = Product {
            name: name.clone(),
            seller_id: seller.clone(),
            price: listing.price,
            amount: listing.amount,
        };
        let result = self
            .store
            .insert_product(&self.bounded(ctx), product.clone())
            .map(|()| product);
        log_outcome("create_product", seller, &result);
        result
    }

    pub fn product(&self, ctx: &Context, name: &ProductName) -> Result<Product, LedgerError> {
        self.store.get_product(&self.bounded(ctx), name)
    }

    /// Changes price and stock of a product `seller` owns.
    ///
    /// A product owned by someone else is reported as [`LedgerError::NotFound`],
    /// same as a missing one.
    pub fn update_product(
        &self,
        ctx: &Context,
        seller: &Username,
        name: &ProductName,
        update: ProductUpdate,
    ) -> Result<(), LedgerError> {
        let result = self
            .store
            .update_product(&self.bounded(ctx), seller, name, update);
        log_outcome("update_product", seller, &result);
        result
    }

    /// Deletes a product `seller` owns. Past purchase records are kept.
    ///
    /// A product owned by someone else is reported as [`LedgerError::NotFound`].
    pub fn delete_product(
        &self,
        ctx: &Context,
        seller: &Username,
        name: &ProductName,
    ) -> Result<(), LedgerError> {
        let result = self.store.delete_product(&self.bounded(ctx), seller, name);
        log_outcome("delete_product", seller, &result);
        result
    }
}

impl<S: LedgerStore> Ledger for Engine<S> {
    fn coins(&self) -> &CoinSet {
        &self.config.coins
    }

    fn account_summary(
        &self,
        ctx: &Context,
        username: &Username,
    ) -> Result<AccountSummary, LedgerError> {
        let snapshot = self.store.account_snapshot(&self.bounded(ctx), username)?;
        Ok(AccountSummary::build(&self.config.coins, &snapshot))
    }

    fn increment_deposit(
        &self,
        ctx: &Context,
        username: &Username,
        amount: i64,
    ) -> Result<(), LedgerError> {
        let result = self
            .store
            .increment_deposit(&self.bounded(ctx), username, amount);
        if result.is_ok() {
            tracing::debug!(%username, amount, "deposit incremented");
        }
        log_outcome("increment_deposit", username, &result);
        result
    }

    fn set_deposit(&self, ctx: &Context, username: &Username, amount: u64) -> Result<(), LedgerError> {
        let result = self.store.set_deposit(&self.bounded(ctx), username, amount);
        if result.is_ok() {
            tracing::debug!(%username, amount, "deposit set");
        }
        log_outcome("set_deposit", username, &result);
        result
    }

    fn buy_product(
        &self,
        ctx: &Context,
        username: &Username,
        request: &ProductRequest,
    ) -> Result<PurchaseRecord, LedgerError> {
        let result = self.store.buy_product(&self.bounded(ctx), username, request);
        match &result {
            Ok(record) => tracing::info!(
                %username,
                product = %record.product,
                amount = record.amount,
                price = record.price,
                "purchase recorded"
            ),
            Err(err) if err.is_transient() => {
                tracing::warn!(%username, "buy_product transient failure: {}", err)
            }
            Err(err) => tracing::warn!(
                %username,
                product = %request.name,
                amount = request.amount,
                "purchase rejected: {}",
                err
            ),
        }
        result
    }
}

fn log_outcome<T>(operation: &str, username: &Username, result: &Result<T, LedgerError>) {
    match result {
        Ok(_) => tracing::trace!(operation, %username, "ok"),
        Err(err) if err.is_transient() => {
            tracing::warn!(operation, %username, "transient failure: {}", err)
        }
        Err(err) => tracing::debug!(operation, %username, "rejected: {}", err),
    }
}
