// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use thiserror::Error;

/// Recoverable errors surfaced at the subsystem boundary. Invariant
/// violations inside the adaptation logic are not represented here; those
/// abort the run (see the panics in the engine modules), since continuing
/// with an inconsistent rate table would silently corrupt results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("peer advertises no rates in common with the local device")]
    NoCommonRates,
    #[error("invalid transmit vector: {0}")]
    InvalidTxVector(#[from] anyhow::Error),
}
