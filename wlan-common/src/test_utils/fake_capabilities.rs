// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Canned capability elements for tests: a dual-stream 40 MHz short-GI HT
//! peer, an 80 MHz VHT peer and a 2-stream HE peer, mirroring the mock
//! beacon contents used across the stack's tests.

use crate::{
    ie::{ChanWidthSet, HeCapabilities, HtCapabilities, RxMcsMap, SupportedRate, VhtCapabilities},
    phy::GuardInterval,
};

pub fn fake_ht_capabilities() -> HtCapabilities {
    HtCapabilities {
        chan_width_set: ChanWidthSet::TWENTY_FORTY,
        sgi_20: true,
        sgi_40: true,
        // MCS 0-15: two spatial streams.
        rx_mcs_bitmask: 0x0000_FFFF,
    }
}

pub fn fake_vht_capabilities() -> VhtCapabilities {
    VhtCapabilities {
        supported_cbw_set: 0,
        sgi_80: true,
        sgi_160: false,
        // Two streams at MCS 0-9, remaining lanes unsupported.
        rx_mcs_map: RxMcsMap(0xFFFA),
    }
}

pub fn fake_he_capabilities() -> HeCapabilities {
    HeCapabilities {
        // 40 MHz in 2.4 GHz; 40/80 and 160 MHz in 5 GHz.
        chan_width_set: 0b111,
        // Two streams at MCS 0-11.
        rx_mcs_map: RxMcsMap(0xFFFA),
        gi: GuardInterval::Ns800,
    }
}

/// The 802.11b/g rate set with the 802.11b subset flagged basic.
pub fn fake_legacy_rates() -> Vec<SupportedRate> {
    [2u8, 4, 11, 22]
        .iter()
        .map(|r| SupportedRate(*r).with_basic(true))
        .chain([12u8, 18, 24, 36, 48, 72, 96, 108].iter().map(|r| SupportedRate(*r)))
        .collect()
}
