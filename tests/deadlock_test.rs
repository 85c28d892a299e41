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

//! Concurrency and deadlock detection tests.
//!
//! These run the real engine from many threads while parking_lot's deadlock
//! detector (enabled for dev builds) watches the lock graph.

use parking_lot::deadlock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use vending_ledger::{
    Context, Engine, Ledger, LedgerError, ProductName, ProductRequest, ProductUpdate, Role,
    Username,
};

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

fn ctx() -> Context {
    Context::with_timeout(Duration::from_secs(10))
}

fn seeded_engine(buyers: usize, products: usize, stock: u32) -> Arc<Engine> {
    let engine = Engine::new();
    engine.register_user(&ctx(), &"sam".into(), Role::Seller).unwrap();
    for b in 0..buyers {
        engine
            .register_user(&ctx(), &Username(format!("buyer{b}")), Role::Buyer)
            .unwrap();
    }
    for p in 0..products {
        engine
            .create_product(
                &ctx(),
                &"sam".into(),
                &ProductName(format!("item{p}")),
                ProductUpdate { price: 5, amount: stock },
            )
            .unwrap();
    }
    Arc::new(engine)
}

// === Tests ===

/// Concurrent increments on one account must all land.
#[test]
fn concurrent_increments_are_not_lost() {
    let detector = start_deadlock_detector();
    let engine = seeded_engine(1, 0, 0);
    let buyer = Username::from("buyer0");
    engine.increment_deposit(&ctx(), &buyer, 1000).unwrap();

    const NUM_THREADS: i64 = 50;
    const OPS_PER_THREAD: i64 = 100;

    let handles: Vec<_> = (1..=NUM_THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let buyer = buyer.clone();
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    // Distinct amount per call.
                    let amount = t * OPS_PER_THREAD + i;
                    engine.increment_deposit(&ctx(), &buyer, amount).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let expected: i64 = (1..=NUM_THREADS)
        .flat_map(|t| (0..OPS_PER_THREAD).map(move |i| t * OPS_PER_THREAD + i))
        .sum();
    let balance = engine.user(&ctx(), &buyer).unwrap().deposit;
    assert_eq!(balance, 1000 + expected as u64);

    stop_deadlock_detector(detector);
}

/// Buyers racing for the same stock can never oversell it.
#[test]
fn concurrent_buys_never_oversell() {
    let detector = start_deadlock_detector();
    let engine = seeded_engine(20, 1, 100);
    for b in 0..20 {
        engine
            .increment_deposit(&ctx(), &Username(format!("buyer{b}")), 1_000)
            .unwrap();
    }
    let sold = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..20)
        .map(|b| {
            let engine = Arc::clone(&engine);
            let sold = Arc::clone(&sold);
            thread::spawn(move || {
                let buyer = Username(format!("buyer{b}"));
                for _ in 0..10 {
                    match engine.buy_product(&ctx(), &buyer, &ProductRequest::new("item0", 1)) {
                        Ok(_) => {
                            sold.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(LedgerError::Invalid(_)) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    // 20 buyers * 10 attempts = 200 attempts for 100 units.
    assert_eq!(sold.load(Ordering::SeqCst), 100);
    let item = engine.product(&ctx(), &"item0".into()).unwrap();
    assert_eq!(item.amount, 0);

    let mut spent = 0;
    let mut left = 0;
    for b in 0..20 {
        let buyer = Username(format!("buyer{b}"));
        let summary = engine.account_summary(&ctx(), &buyer).unwrap();
        spent += summary.spent;
        left += engine.user(&ctx(), &buyer).unwrap().deposit;
    }
    assert_eq!(spent, 100 * 5);
    assert_eq!(spent + left, 20 * 1_000);

    stop_deadlock_detector(detector);
}

/// Summaries read during purchases always see balance and history together.
#[test]
fn summaries_are_snapshot_consistent() {
    let detector = start_deadlock_detector();
    let engine = seeded_engine(1, 3, 1_000);
    let buyer = Username::from("buyer0");
    engine.increment_deposit(&ctx(), &buyer, 5_000).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let engine = Arc::clone(&engine);
        let buyer = buyer.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..600 {
                let name = format!("item{}", i % 3);
                engine
                    .buy_product(&ctx(), &buyer, &ProductRequest::new(name, 1))
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reader = {
        let engine = Arc::clone(&engine);
        let buyer = buyer.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut reads = 0;
            while !done.load(Ordering::SeqCst) || reads == 0 {
                let summary = engine.account_summary(&ctx(), &buyer).unwrap();
                let balance = vending_ledger::recompose(&summary.deposit).unwrap();
                assert_eq!(balance + summary.spent, 5_000);
                reads += 1;
            }
        })
    };

    writer.join().expect("writer panicked");
    reader.join().expect("reader panicked");
    stop_deadlock_detector(detector);
}

/// Mixed purchases, restocks, deletes, and role changes across many rows.
#[test]
fn no_deadlock_mixed_operations() {
    let detector = start_deadlock_detector();
    let engine = seeded_engine(10, 5, 50);
    for b in 0..10 {
        engine
            .increment_deposit(&ctx(), &Username(format!("buyer{b}")), 10_000)
            .unwrap();
    }

    const NUM_THREADS: usize = 16;
    const OPS_PER_THREAD: usize = 200;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let buyer = Username(format!("buyer{}", (t + i) % 10));
                    let item = ProductName(format!("item{}", (t * 7 + i) % 5));
                    let result = match i % 6 {
                        0 | 1 | 2 => engine
                            .buy_product(&ctx(), &buyer, &ProductRequest {
                                name: item.clone(),
                                amount: 1,
                            })
                            .map(|_| ()),
                        3 => engine.update_product(
                            &ctx(),
                            &"sam".into(),
                            &item,
                            ProductUpdate { price: 5, amount: 50 },
                        ),
                        4 => engine.account_summary(&ctx(), &buyer).map(|_| ()),
                        _ => engine.increment_deposit(&ctx(), &buyer, 5),
                    };
                    match result {
                        Ok(()) | Err(LedgerError::Invalid(_)) | Err(LedgerError::NotFound) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    // Meanwhile, list and delist a product the workers never touch, and
    // churn one product they do.
    let churn = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..50 {
                let _ = engine.delete_product(&ctx(), &"sam".into(), &"item4".into());
                let _ = engine.create_product(
                    &ctx(),
                    &"sam".into(),
                    &"item4".into(),
                    ProductUpdate { price: 5, amount: 50 },
                );
            }
        })
    };

    for handle in handles {
        handle.join().expect("thread panicked");
    }
    churn.join().expect("churn thread panicked");

    stop_deadlock_detector(detector);
}

/// An expired deadline fails fast and changes nothing.
#[test]
fn expired_context_is_transient_and_side_effect_free() {
    let engine = seeded_engine(1, 1, 10);
    let buyer = Username::from("buyer0");
    engine.increment_deposit(&ctx(), &buyer, 100).unwrap();

    let expired = Context::with_timeout(Duration::ZERO);
    let result = engine.buy_product(&expired, &buyer, &ProductRequest::new("item0", 1));
    assert_eq!(result, Err(LedgerError::Timeout));
    assert!(result.unwrap_err().is_transient());

    let summary = engine.account_summary(&ctx(), &buyer).unwrap();
    assert!(summary.products.is_empty());
    assert_eq!(engine.user(&ctx(), &buyer).unwrap().deposit, 100);
}
