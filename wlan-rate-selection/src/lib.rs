// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Link adaptation for unicast transmissions: a per-peer station registry
//! answering protocol questions (RTS/CTS, fragmentation, retransmission) and
//! pluggable rate selectors choosing the transmit vector for each frame from
//! observed transmission outcomes. The registry and selectors run entirely
//! inside the caller's logical thread; outcome reports for a peer must
//! arrive in transmission order. See the [`registry`] and [`minstrel_ht`]
//! modules.
//!
//! [`registry`]: crate::registry
//! [`minstrel_ht`]: crate::minstrel_ht

pub mod constant_rate;
pub mod device;
pub mod error;
pub mod frame_error;
pub mod groups;
pub mod minstrel;
pub mod minstrel_ht;
pub mod peer;
pub mod probe_sequence;
pub mod registry;
pub mod selector;

pub use wlan_common as common;
