// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Common 802.11 vocabulary shared across the rate-selection subsystem: MAC
//! addressing and access categories, PHY-level enums, decoded capability
//! elements with rate-set intersection, the transmit-parameter bundle handed
//! to the PHY, airtime math, and the injected time source.

pub mod airtime;
pub mod ie;
pub mod mac;
pub mod phy;
pub mod signal;
pub mod test_utils;
pub mod time;
pub mod tx_vector;
