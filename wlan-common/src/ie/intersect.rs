// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::ie::SupportedRate,
    anyhow::{format_err, Error},
    std::collections::HashSet,
};

pub struct LocalRates(pub Vec<SupportedRate>);
pub struct PeerRates(pub Vec<SupportedRate>);

/// Returns the locally supported rates that the peer also supports, with
/// basic bits following their local values.
/// Returns Error if intersection fails.
/// Note: the peer MUST support ALL locally configured basic rates or the
/// intersection fails.
pub fn intersect_rates(local: LocalRates, peer: PeerRates) -> Result<Vec<SupportedRate>, Error> {
    let mut local = local.0;
    let peer = peer.0.into_iter().map(|r| r.rate()).collect::<HashSet<_>>();
    // The peer MUST support ALL basic rates in the local set.
    if local.iter().any(|ra| ra.basic() && !peer.contains(&ra.rate())) {
        return Err(format_err!("At least one basic rate not supported."));
    }

    // Remove rates that are not supported by the peer.
    local.retain(|ra| peer.contains(&ra.rate()));
    if local.is_empty() {
        Err(format_err!("Peer does not support any local rates."))
    } else {
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(rate: u8) -> SupportedRate {
        SupportedRate(rate).with_basic(true)
    }

    #[test]
    fn some_basic_rate_missing() {
        let local = vec![basic(120), basic(111)];
        let peer = vec![SupportedRate(111)];
        // Local basic rate 120 is not supported, resulting in an Error
        let error = intersect_rates(LocalRates(local), PeerRates(peer)).unwrap_err();
        assert!(format!("{}", error).contains("At least one basic rate not supported."));
    }

    #[test]
    fn all_basic_rates_supported() {
        let local = vec![basic(120), SupportedRate(111)];
        let peer = vec![SupportedRate(120)];
        assert_eq!(vec![basic(120)], intersect_rates(LocalRates(local), PeerRates(peer)).unwrap());
    }

    #[test]
    fn no_rates_are_supported() {
        let local = vec![SupportedRate(120)];
        let peer = vec![];
        let error = intersect_rates(LocalRates(local), PeerRates(peer)).unwrap_err();
        assert!(format!("{}", error).contains("Peer does not support any local rates."));
    }

    #[test]
    fn preserve_local_rates_basicness() {
        let local = vec![SupportedRate(120), SupportedRate(111)];
        let peer = vec![basic(120)];
        // The local side's 120 is not basic so the result should be non-basic.
        assert_eq!(
            vec![SupportedRate(120)],
            intersect_rates(LocalRates(local), PeerRates(peer)).unwrap()
        );
    }
}
