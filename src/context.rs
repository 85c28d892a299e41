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

//! Per-call deadline and cancellation.

use crate::LedgerError;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Bounds a single ledger operation.
///
/// Clones share the cancellation flag, so a caller can hand a clone to the
/// ledger and cancel it from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context with no deadline. The engine still applies its configured
    /// timeout.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns a context whose deadline is at most `timeout` from now,
    /// sharing this context's cancellation flag.
    pub fn bounded(&self, timeout: Duration) -> Self {
        let limit = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(deadline) if deadline < limit => deadline,
            _ => limit,
        };
        Self {
            deadline: Some(deadline),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Fails if the caller cancelled or the deadline has passed.
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(LedgerError::Timeout),
            _ => Ok(()),
        }
    }

    /// Locks `mutex`, giving up at the deadline.
    pub(crate) fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, LedgerError> {
        self.check()?;
        let guard = match self.deadline {
            Some(deadline) => mutex.try_lock_until(deadline).ok_or(LedgerError::Timeout)?,
            None => mutex.lock(),
        };
        // Cancellation may have arrived while waiting.
        if self.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        Ok(guard)
    }
}
