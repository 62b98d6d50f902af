// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! OFDM airtime math: data rates and frame durations per transmit vector.
//!
//! Rates follow the standard symbol model (data subcarriers x bits per
//! subcarrier x coding rate x streams per symbol interval). Preamble
//! durations use the per-amendment field layout with the long-training
//! count rounded up per the standard; they feed relative airtime
//! comparisons, not signal-level modeling.

use {
    crate::ie::SupportedRate,
    crate::phy::{Cbw, GuardInterval, WlanPhyType},
    crate::tx_vector::{Preamble, TxVector},
    std::time::Duration,
};

pub const SLOT_TIME: Duration = Duration::from_micros(9);
pub const SIFS: Duration = Duration::from_micros(16);

/// OFDM service (16) plus tail (6) bits appended to each PSDU.
const SERVICE_AND_TAIL_BITS: u64 = 22;

const ACK_FRAME_LEN: u32 = 14;
const BLOCK_ACK_FRAME_LEN: u32 = 32;

// (bits per subcarrier, coding numerator, coding denominator) per MCS.
// Indexes 0-7 double as the ERP-OFDM rate set.
const MCS_TABLE: [(u64, u64, u64); 12] = [
    (1, 1, 2),
    (2, 1, 2),
    (2, 3, 4),
    (4, 1, 2),
    (4, 3, 4),
    (6, 2, 3),
    (6, 3, 4),
    (6, 5, 6),
    (8, 3, 4),
    (8, 5, 6),
    (10, 3, 4),
    (10, 5, 6),
];

fn data_subcarriers(phy: WlanPhyType, cbw: Cbw) -> u64 {
    match phy {
        WlanPhyType::Ht | WlanPhyType::Vht => match cbw {
            Cbw::Cbw20 => 52,
            Cbw::Cbw40 => 108,
            Cbw::Cbw80 => 234,
            Cbw::Cbw160 => 468,
        },
        WlanPhyType::He => match cbw {
            Cbw::Cbw20 => 234,
            Cbw::Cbw40 => 468,
            Cbw::Cbw80 => 980,
            Cbw::Cbw160 => 1960,
        },
        // Legacy OFDM is always 20 MHz with 48 data subcarriers.
        _ => 48,
    }
}

fn symbol_duration_ns(phy: WlanPhyType, gi: GuardInterval) -> u64 {
    match phy {
        WlanPhyType::He => 12_800 + gi.nanos() as u64,
        WlanPhyType::Ht | WlanPhyType::Vht => 3_200 + gi.nanos() as u64,
        _ => 4_000,
    }
}

/// Long-training-field count for a stream count, per the standard's
/// rounding (3 streams train with 4 LTFs).
fn num_ltf(nss: u8) -> u64 {
    match nss {
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

fn bits_per_symbol(v: &TxVector) -> u64 {
    let unique_mcs = match v.phy() {
        WlanPhyType::Ht => v.mcs_idx() % 8,
        _ => v.mcs_idx(),
    };
    let (bits, num, den) = MCS_TABLE[unique_mcs as usize];
    data_subcarriers(v.phy(), v.cbw()) * bits * num * v.nss() as u64 / den
}

/// Nominal PHY data rate of a vector in bits per second.
pub fn data_rate_bps(v: &TxVector) -> u64 {
    match v.phy() {
        WlanPhyType::Dsss | WlanPhyType::Cck => {
            v.erp_rate().map(|r| r.data_rate_bps()).unwrap_or_else(|| {
                // DSSS/CCK rates in 0.5 Mbps units map directly.
                let rate = match v.mcs_idx() {
                    0 => 2u64,
                    1 => 4,
                    2 => 11,
                    _ => 22,
                };
                rate * 500_000
            })
        }
        _ => bits_per_symbol(v) * 1_000_000_000 / symbol_duration_ns(v.phy(), v.gi()),
    }
}

/// Preamble duration in front of the first MPDU of a PPDU.
pub fn preamble_time(v: &TxVector) -> Duration {
    let micros = match v.phy() {
        WlanPhyType::Dsss | WlanPhyType::Cck => {
            if v.preamble() == Preamble::Short {
                96
            } else {
                192
            }
        }
        WlanPhyType::Erp => 20,
        // L-preamble + HT-SIG + HT-STF + per-stream HT-LTFs.
        WlanPhyType::Ht => 32 + 4 * num_ltf(v.nss()),
        // L-preamble + VHT-SIG-A/B + VHT-STF + per-stream VHT-LTFs.
        WlanPhyType::Vht => 36 + 4 * num_ltf(v.nss()),
        // L-preamble + RL-SIG + HE-SIG-A + HE-STF + 2x HE-LTFs.
        WlanPhyType::He => 36 + 8 * num_ltf(v.nss()),
    };
    Duration::from_micros(micros)
}

/// Symbol time covering the MPDU payload alone (no preamble), as for an
/// MPDU in the middle of an aggregate.
pub fn payload_tx_time(v: &TxVector, bytes: u32) -> Duration {
    match v.phy() {
        WlanPhyType::Dsss | WlanPhyType::Cck => {
            let nanos = bytes as u64 * 8 * 1_000_000_000 / data_rate_bps(v);
            Duration::from_nanos(nanos)
        }
        _ => {
            let bits = bytes as u64 * 8 + SERVICE_AND_TAIL_BITS;
            let bps = bits_per_symbol(v);
            let symbols = (bits + bps - 1) / bps;
            Duration::from_nanos(symbols * symbol_duration_ns(v.phy(), v.gi()))
        }
    }
}

/// Full airtime of the first (or only) MPDU of a PPDU.
pub fn mpdu_tx_time_first(v: &TxVector, bytes: u32) -> Duration {
    preamble_time(v) + payload_tx_time(v, bytes)
}

/// Airtime contribution of an MPDU past the first one in an aggregate.
pub fn mpdu_tx_time_middle(v: &TxVector, bytes: u32) -> Duration {
    payload_tx_time(v, bytes)
}

fn control_response_time(frame_len: u32) -> Duration {
    // Control responses ride the 24 Mbps ERP-OFDM mandatory rate.
    let v = TxVector::from_supported_rate(&SupportedRate(48))
        .expect("control response rate is a valid ERP rate");
    mpdu_tx_time_first(&v, frame_len)
}

pub fn ack_tx_time() -> Duration {
    control_response_time(ACK_FRAME_LEN)
}

pub fn block_ack_tx_time() -> Duration {
    control_response_time(BLOCK_ACK_FRAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(phy: WlanPhyType, gi: GuardInterval, cbw: Cbw, nss: u8, mcs: u8) -> TxVector {
        TxVector::new(phy, gi, cbw, nss, mcs).expect("valid vector")
    }

    #[test]
    fn known_ht_rates() {
        // HT MCS 7, 20 MHz, long GI: 65 Mbps.
        let v = vector(WlanPhyType::Ht, GuardInterval::Ns800, Cbw::Cbw20, 1, 7);
        assert_eq!(data_rate_bps(&v), 65_000_000);
        // HT MCS 15, 40 MHz, short GI: 300 Mbps.
        let v = vector(WlanPhyType::Ht, GuardInterval::Ns400, Cbw::Cbw40, 1, 15);
        assert_eq!(data_rate_bps(&v), 300_000_000);
    }

    #[test]
    fn known_vht_rates() {
        // VHT MCS 9, 80 MHz, short GI, 1 SS: 433.3 Mbps.
        let v = vector(WlanPhyType::Vht, GuardInterval::Ns400, Cbw::Cbw80, 1, 9);
        assert_eq!(data_rate_bps(&v), 433_333_333);
    }

    #[test]
    fn known_he_rates() {
        // HE MCS 11, 20 MHz, 0.8 us GI, 1 SS: 143.4 Mbps.
        let v = vector(WlanPhyType::He, GuardInterval::Ns800, Cbw::Cbw20, 1, 11);
        assert_eq!(data_rate_bps(&v), 143_382_352);
    }

    #[test]
    fn known_erp_rates() {
        let v = TxVector::from_supported_rate(&SupportedRate(108)).unwrap();
        assert_eq!(data_rate_bps(&v), 54_000_000);
        let v = TxVector::from_supported_rate(&SupportedRate(12)).unwrap();
        assert_eq!(data_rate_bps(&v), 6_000_000);
    }

    #[test]
    fn first_mpdu_includes_preamble() {
        let v = vector(WlanPhyType::Ht, GuardInterval::Ns800, Cbw::Cbw20, 1, 0);
        let first = mpdu_tx_time_first(&v, 1200);
        let middle = mpdu_tx_time_middle(&v, 1200);
        assert_eq!(first - middle, preamble_time(&v));
        assert!(middle > Duration::from_micros(0));
    }

    #[test]
    fn faster_mcs_is_shorter() {
        let slow = vector(WlanPhyType::Ht, GuardInterval::Ns800, Cbw::Cbw20, 1, 0);
        let fast = vector(WlanPhyType::Ht, GuardInterval::Ns800, Cbw::Cbw20, 1, 7);
        assert!(payload_tx_time(&fast, 1200) < payload_tx_time(&slow, 1200));
    }

    #[test]
    fn control_response_durations() {
        // 14-byte ACK at 24 Mbps: 134 bits over 96-bit symbols -> 2 symbols
        // plus the 20 us legacy preamble.
        assert_eq!(ack_tx_time(), Duration::from_micros(28));
        // 32-byte compressed BlockAck: 278 bits -> 3 symbols.
        assert_eq!(block_ack_tx_time(), Duration::from_micros(32));
    }
}
