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

//! In-process [`LedgerStore`].
//!
//! Rows live behind `parking_lot` mutexes inside `DashMap`s. An operation's
//! transaction is the set of row locks it holds. Locks are always taken
//! account row first, then product row, and every lock honours the
//! context's deadline. All checks run before the first write, so a failed
//! operation leaves nothing behind.
//!
//! Deletes mark the row retired under its lock before unlinking it, so an
//! operation that looked the row up before the delete sees it as missing.
//! Map guards are dropped before any row lock is awaited.

use crate::LedgerError;
use crate::base::{ProductName, Role, Username};
use crate::context::Context;
use crate::product::{Product, ProductRequest, ProductUpdate};
use crate::purchase::PurchaseRecord;
use crate::store::{AccountSnapshot, LedgerStore};
use crate::user::User;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct AccountRow {
    role: Role,
    balance: u64,
    /// Append-only.
    purchases: Vec<PurchaseRecord>,
    retired: bool,
}

#[derive(Debug)]
struct ProductRow {
    price: u64,
    amount: u32,
    retired: bool,
}

#[derive(Debug)]
struct ProductSlot {
    /// Immutable for the life of the row.
    owner: Username,
    row: Mutex<ProductRow>,
}

/// Schema constraints a write can trip over.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint {
    UsersPkey,
    ProductsPkey,
    /// Reference to a missing account.
    UserFk,
    /// Reference to a missing product.
    ProductFk,
    /// Account still owns listed products.
    SellerFk,
    InsufficientStock,
    InsufficientDeposit,
    Check(&'static str),
}

/// Internal failure, before translation.
#[derive(Debug)]
enum StoreFault {
    /// The statement matched zero rows.
    NoRows,
    Violation(Constraint),
    /// Deadline or cancellation hit while taking locks.
    Aborted(LedgerError),
}

impl From<LedgerError> for StoreFault {
    fn from(err: LedgerError) -> Self {
        StoreFault::Aborted(err)
    }
}

impl From<Constraint> for StoreFault {
    fn from(constraint: Constraint) -> Self {
        StoreFault::Violation(constraint)
    }
}

/// Translates a store failure into the domain taxonomy.
fn domain_error(fault: StoreFault) -> LedgerError {
    match fault {
        StoreFault::NoRows => LedgerError::NotFound,
        StoreFault::Aborted(err) => err,
        StoreFault::Violation(constraint) => match constraint {
            Constraint::UsersPkey => LedgerError::Duplicate("users_pkey".into()),
            Constraint::ProductsPkey => LedgerError::Duplicate("products_pkey".into()),
            Constraint::UserFk | Constraint::ProductFk => LedgerError::NotFound,
            Constraint::SellerFk => LedgerError::invalid("seller still owns listed products"),
            Constraint::InsufficientStock => LedgerError::invalid("insufficient stock"),
            Constraint::InsufficientDeposit => LedgerError::invalid("insufficient deposit"),
            Constraint::Check(message) => LedgerError::invalid(message),
        },
    }
}

type StoreResult<T> = Result<T, StoreFault>;

/// Thread-safe in-memory ledger storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<Username, Arc<Mutex<AccountRow>>>,
    products: DashMap<ProductName, Arc<ProductSlot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All registered usernames, sorted.
    pub fn usernames(&self) -> Vec<Username> {
        let mut names: Vec<Username> = self.accounts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    fn account(&self, username: &Username) -> StoreResult<Arc<Mutex<AccountRow>>> {
        self.accounts
            .get(username)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreFault::NoRows)
    }

    fn product(&self, name: &ProductName) -> StoreResult<Arc<ProductSlot>> {
        self.products
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreFault::NoRows)
    }

    fn insert_user_tx(&self, username: &Username, role: Role) -> StoreResult<()> {
        if role == Role::Anonymous {
            return Err(Constraint::Check("role must be buyer or seller").into());
        }
        match self.accounts.entry(username.clone()) {
            Entry::Occupied(_) => Err(Constraint::UsersPkey.into()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(AccountRow {
                    role,
                    balance: 0,
                    purchases: Vec::new(),
                    retired: false,
                })));
                Ok(())
            }
        }
    }

    fn get_user_tx(&self, ctx: &Context, username: &Username) -> StoreResult<User> {
        let slot = self.account(username)?;
        let row = ctx.lock(&slot)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        Ok(User {
            username: username.clone(),
            role: row.role,
            deposit: row.balance,
        })
    }

    fn update_role_tx(&self, ctx: &Context, username: &Username, role: Role) -> StoreResult<()> {
        if role == Role::Anonymous {
            return Err(Constraint::Check("role must be buyer or seller").into());
        }
        let slot = self.account(username)?;
        let mut row = ctx.lock(&slot)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        row.role = role;
        Ok(())
    }

    fn delete_user_tx(&self, ctx: &Context, username: &Username) -> StoreResult<()> {
        let slot = self.account(username)?;
        let mut row = ctx.lock(&slot)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        // Listings lock their owner's row on insert, so none can appear now.
        if self.products.iter().any(|entry| entry.value().owner == *username) {
            return Err(Constraint::SellerFk.into());
        }
        row.retired = true;
        self.accounts
            .remove_if(username, |_, current| Arc::ptr_eq(current, &slot));
        Ok(())
    }

    fn insert_product_tx(&self, ctx: &Context, product: Product) -> StoreResult<()> {
        let owner = self
            .account(&product.seller_id)
            .map_err(|_| Constraint::UserFk)?;
        let owner_row = ctx.lock(&owner)?;
        if owner_row.retired {
            return Err(Constraint::UserFk.into());
        }
        match self.products.entry(product.name) {
            Entry::Occupied(_) => Err(Constraint::ProductsPkey.into()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(ProductSlot {
                    owner: product.seller_id,
                    row: Mutex::new(ProductRow {
                        price: product.price,
                        amount: product.amount,
                        retired: false,
                    }),
                }));
                Ok(())
            }
        }
    }

    fn get_product_tx(&self, ctx: &Context, name: &ProductName) -> StoreResult<Product> {
        let slot = self.product(name)?;
        let row = ctx.lock(&slot.row)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        Ok(Product {
            name: name.clone(),
            seller_id: slot.owner.clone(),
            price: row.price,
            amount: row.amount,
        })
    }

    fn update_product_tx(
        &self,
        ctx: &Context,
        owner: &Username,
        name: &ProductName,
        update: ProductUpdate,
    ) -> StoreResult<()> {
        let slot = self.product(name)?;
        if slot.owner != *owner {
            return Err(StoreFault::NoRows);
        }
        let mut row = ctx.lock(&slot.row)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        row.price = update.price;
        row.amount = update.amount;
        Ok(())
    }

    fn delete_product_tx(
        &self,
        ctx: &Context,
        owner: &Username,
        name: &ProductName,
    ) -> StoreResult<()> {
        let slot = self.product(name)?;
        if slot.owner != *owner {
            return Err(StoreFault::NoRows);
        }
        let mut row = ctx.lock(&slot.row)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        row.retired = true;
        self.products
            .remove_if(name, |_, current| Arc::ptr_eq(current, &slot));
        Ok(())
    }

    fn increment_deposit_tx(&self, ctx: &Context, username: &Username, delta: i64) -> StoreResult<()> {
        let slot = self.account(username)?;
        let mut row = ctx.lock(&slot)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        row.balance = row
            .balance
            .checked_add_signed(delta)
            .ok_or(Constraint::Check("deposit out of range"))?;
        Ok(())
    }

    fn set_deposit_tx(&self, ctx: &Context, username: &Username, amount: u64) -> StoreResult<()> {
        let slot = self.account(username)?;
        let mut row = ctx.lock(&slot)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        row.balance = amount;
        Ok(())
    }

    fn buy_product_tx(
        &self,
        ctx: &Context,
        username: &Username,
        request: &ProductRequest,
    ) -> StoreResult<PurchaseRecord> {
        if request.amount == 0 {
            return Err(Constraint::Check("purchase amount must be positive").into());
        }
        let account = self.account(username).map_err(|_| Constraint::UserFk)?;
        let product = self.product(&request.name).map_err(|_| Constraint::ProductFk)?;

        let mut buyer = ctx.lock(&account)?;
        if buyer.retired {
            return Err(Constraint::UserFk.into());
        }
        let mut stock = ctx.lock(&product.row)?;
        if stock.retired {
            return Err(Constraint::ProductFk.into());
        }
        if stock.amount < request.amount {
            return Err(Constraint::InsufficientStock.into());
        }
        let cost = stock
            .price
            .checked_mul(u64::from(request.amount))
            .ok_or(Constraint::Check("purchase cost out of range"))?;
        if buyer.balance < cost {
            return Err(Constraint::InsufficientDeposit.into());
        }

        let record = PurchaseRecord {
            buyer: username.clone(),
            product: request.name.clone(),
            amount: request.amount,
            price: stock.price,
            timestamp: Utc::now(),
        };
        stock.amount -= request.amount;
        buyer.balance -= cost;
        buyer.purchases.push(record.clone());
        Ok(record)
    }

    fn account_snapshot_tx(&self, ctx: &Context, username: &Username) -> StoreResult<AccountSnapshot> {
        let slot = self.account(username)?;
        let row = ctx.lock(&slot)?;
        if row.retired {
            return Err(StoreFault::NoRows);
        }
        Ok(AccountSnapshot {
            balance: row.balance,
            purchases: row.purchases.clone(),
        })
    }
}

impl LedgerStore for MemoryStore {
    fn insert_user(&self, ctx: &Context, username: &Username, role: Role) -> Result<(), LedgerError> {
        ctx.check()?;
        self.insert_user_tx(username, role).map_err(domain_error)
    }

    fn get_user(&self, ctx: &Context, username: &Username) -> Result<User, LedgerError> {
        self.get_user_tx(ctx, username).map_err(domain_error)
    }

    fn update_role(&self, ctx: &Context, username: &Username, role: Role) -> Result<(), LedgerError> {
        self.update_role_tx(ctx, username, role).map_err(domain_error)
    }

    fn delete_user(&self, ctx: &Context, username: &Username) -> Result<(), LedgerError> {
        self.delete_user_tx(ctx, username).map_err(domain_error)
    }

    fn insert_product(&self, ctx: &Context, product: Product) -> Result<(), LedgerError> {
        self.insert_product_tx(ctx, product).map_err(domain_error)
    }

    fn get_product(&self, ctx: &Context, name: &ProductName) -> Result<Product, LedgerError> {
        self.get_product_tx(ctx, name).map_err(domain_error)
    }

    fn update_product(
        &self,
        ctx: &Context,
        owner: &Username,
        name: &ProductName,
        update: ProductUpdate,
    ) -> Result<(), LedgerError> {
        self.update_product_tx(ctx, owner, name, update)
            .map_err(domain_error)
    }

    fn delete_product(
        &self,
        ctx: &Context,
        owner: &Username,
        name: &ProductName,
    ) -> Result<(), LedgerError> {
        self.delete_product_tx(ctx, owner, name).map_err(domain_error)
    }

    fn increment_deposit(&self, ctx: &Context, username: &Username, delta: i64) -> Result<(), LedgerError> {
        self.increment_deposit_tx(ctx, username, delta)
            .map_err(domain_error)
    }

    fn set_deposit(&self, ctx: &Context, username: &Username, amount: u64) -> Result<(), LedgerError> {
        self.set_deposit_tx(ctx, username, amount).map_err(domain_error)
    }

    fn buy_product(
        &self,
        ctx: &Context,
        username: &Username,
        request: &ProductRequest,
    ) -> Result<PurchaseRecord, LedgerError> {
        self.buy_product_tx(ctx, username, request)
            .map_err(domain_error)
    }

    fn account_snapshot(&self, ctx: &Context, username: &Username) -> Result<AccountSnapshot, LedgerError> {
        self.account_snapshot_tx(ctx, username).map_err(domain_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn ctx() -> Context {
        Context::with_timeout(Duration::from_secs(5))
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_user(&ctx(), &"mike".into(), Role::Buyer).unwrap();
        store.insert_user(&ctx(), &"sam".into(), Role::Seller).unwrap();
        store
            .insert_product(
                &ctx(),
                Product {
                    name: "cola".into(),
                    seller_id: "sam".into(),
                    price: 100,
                    amount: 10,
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn domain_error_translation() {
        assert_eq!(domain_error(StoreFault::NoRows), LedgerError::NotFound);
        assert_eq!(
            domain_error(Constraint::UsersPkey.into()),
            LedgerError::Duplicate("users_pkey".into())
        );
        assert_eq!(domain_error(Constraint::ProductFk.into()), LedgerError::NotFound);
        assert_eq!(domain_error(Constraint::UserFk.into()), LedgerError::NotFound);
        assert!(matches!(
            domain_error(Constraint::Check("x").into()),
            LedgerError::Invalid(_)
        ));
        assert_eq!(
            domain_error(StoreFault::Aborted(LedgerError::Timeout)),
            LedgerError::Timeout
        );
    }

    #[test]
    fn duplicate_user_and_product() {
        let store = seeded();
        assert_eq!(
            store.insert_user(&ctx(), &"mike".into(), Role::Seller),
            Err(LedgerError::Duplicate("users_pkey".into()))
        );
        let again = Product {
            name: "cola".into(),
            seller_id: "sam".into(),
            price: 1,
            amount: 1,
        };
        assert_eq!(
            store.insert_product(&ctx(), again),
            Err(LedgerError::Duplicate("products_pkey".into()))
        );
    }

    #[test]
    fn anonymous_cannot_register() {
        let store = MemoryStore::new();
        let result = store.insert_user(&ctx(), &"ghost".into(), Role::Anonymous);
        assert!(matches!(result, Err(LedgerError::Invalid(_))));
    }

    #[test]
    fn product_requires_existing_seller() {
        let store = MemoryStore::new();
        let orphan = Product {
            name: "cola".into(),
            seller_id: "nobody".into(),
            price: 1,
            amount: 1,
        };
        assert_eq!(store.insert_product(&ctx(), orphan), Err(LedgerError::NotFound));
        assert_eq!(store.product_count(), 0);
    }

    #[test]
    fn increment_rejects_negative_balance() {
        let store = seeded();
        let mike: Username = "mike".into();
        store.increment_deposit(&ctx(), &mike, 50).unwrap();
        let result = store.increment_deposit(&ctx(), &mike, -60);
        assert!(matches!(result, Err(LedgerError::Invalid(_))));
        assert_eq!(store.get_user(&ctx(), &mike).unwrap().deposit, 50);

        store.increment_deposit(&ctx(), &mike, -50).unwrap();
        assert_eq!(store.get_user(&ctx(), &mike).unwrap().deposit, 0);
    }

    #[test]
    fn seller_with_listings_cannot_be_deleted() {
        let store = seeded();
        let sam: Username = "sam".into();
        assert!(matches!(
            store.delete_user(&ctx(), &sam),
            Err(LedgerError::Invalid(_))
        ));
        store.delete_product(&ctx(), &sam, &"cola".into()).unwrap();
        store.delete_user(&ctx(), &sam).unwrap();
        assert_eq!(store.get_user(&ctx(), &sam), Err(LedgerError::NotFound));
    }

    #[test]
    fn held_account_row_times_out() {
        let store = seeded();
        let mike: Username = "mike".into();
        let slot = store.account(&mike).unwrap();
        let _held = slot.lock();

        let short = Context::with_timeout(Duration::from_millis(20));
        assert_eq!(
            store.increment_deposit(&short, &mike, 10),
            Err(LedgerError::Timeout)
        );
    }

    #[test]
    fn product_deleted_mid_purchase_leaves_no_record() {
        let store = Arc::new(seeded());
        let mike: Username = "mike".into();
        store.increment_deposit(&ctx(), &mike, 500).unwrap();

        // Hold the product row so the purchase parks on it, then retire the
        // row the way a delete would.
        let cola: ProductName = "cola".into();
        let slot = store.product(&cola).unwrap();
        let mut row = slot.row.lock();

        let buyer = {
            let store = Arc::clone(&store);
            let mike = mike.clone();
            thread::spawn(move || store.buy_product(&ctx(), &mike, &ProductRequest::new("cola", 2)))
        };
        thread::sleep(Duration::from_millis(50));
        row.retired = true;
        store
            .products
            .remove_if(&cola, |_, current| Arc::ptr_eq(current, &slot));
        drop(row);

        assert_eq!(buyer.join().unwrap(), Err(LedgerError::NotFound));
        let snapshot = store.account_snapshot(&ctx(), &mike).unwrap();
        assert_eq!(snapshot.balance, 500);
        assert!(snapshot.purchases.is_empty());
    }

    #[test]
    fn failed_purchase_changes_nothing() {
        let store = seeded();
        let mike: Username = "mike".into();
        store.increment_deposit(&ctx(), &mike, 150).unwrap();

        let result = store.buy_product(&ctx(), &mike, &ProductRequest::new("cola", 2));
        assert_eq!(result, Err(LedgerError::invalid("insufficient deposit")));

        let result = store.buy_product(&ctx(), &mike, &ProductRequest::new("cola", 11));
        assert_eq!(result, Err(LedgerError::invalid("insufficient stock")));

        assert_eq!(store.get_product(&ctx(), &"cola".into()).unwrap().amount, 10);
        let snapshot = store.account_snapshot(&ctx(), &mike).unwrap();
        assert_eq!(snapshot.balance, 150);
        assert!(snapshot.purchases.is_empty());
    }
}
