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

//! Error types for ledger operations.

use thiserror::Error;

/// Ledger operation errors.
///
/// Storage failures are translated into one of these variants at the store
/// boundary; nothing above the store sees storage-specific detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Target row does not exist, or an ownership-filtered update matched nothing.
    #[error("not found")]
    NotFound,

    /// Insert collided with a uniqueness constraint.
    #[error("duplicate {0}")]
    Duplicate(String),

    /// Any other constraint violation.
    #[error("{0}")]
    Invalid(String),

    /// Deadline expired before the operation could take its locks.
    #[error("operation timed out")]
    Timeout,

    /// Caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    Invalid,
    /// Infrastructure failure; safe to retry.
    Transient,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound => ErrorKind::NotFound,
            LedgerError::Duplicate(_) => ErrorKind::Duplicate,
            LedgerError::Invalid(_) => ErrorKind::Invalid,
            LedgerError::Timeout | LedgerError::Cancelled => ErrorKind::Transient,
        }
    }

    /// Returns `true` when a caller may retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        LedgerError::Invalid(message.into())
    }
}
