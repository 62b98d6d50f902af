// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Randomized per-peer sampling order. Each column holds a permutation of
//! the group's rate ids, so walking a column samples every rate exactly
//! once; with the cursor advancing one rate per grant, each rate gets
//! probed roughly once per column count of update intervals.

use rand::{rngs::StdRng, Rng};

const UNINITIALIZED: u8 = u8::MAX;

#[derive(Debug, Clone)]
pub struct ProbeSequence {
    /// `table[row][col]` = rate id to sample.
    table: Vec<Vec<u8>>,
    num_rates: u8,
    num_columns: u8,
}

impl ProbeSequence {
    pub fn random_new(rng: &mut StdRng, num_rates: u8, num_columns: u8) -> Self {
        let mut table = vec![vec![UNINITIALIZED; num_columns as usize]; num_rates as usize];
        for col in 0..num_columns as usize {
            for rate in 0..num_rates {
                // Start from a random row and probe linearly for a free
                // slot, yielding a uniform-ish permutation per column.
                let offset = rng.gen_range(0..num_rates) as usize;
                let mut row = (rate as usize + offset) % num_rates as usize;
                while table[row][col] != UNINITIALIZED {
                    row = (row + 1) % num_rates as usize;
                }
                table[row][col] = rate;
            }
        }
        Self { table, num_rates, num_columns }
    }

    pub fn entry(&self, row: u8, col: u8) -> u8 {
        self.table[row as usize][col as usize]
    }

    pub fn num_rates(&self) -> u8 {
        self.num_rates
    }

    pub fn num_columns(&self) -> u8 {
        self.num_columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn every_column_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(1);
        let sequence = ProbeSequence::random_new(&mut rng, 10, 8);
        for col in 0..8 {
            let mut seen = vec![false; 10];
            for row in 0..10 {
                let rate = sequence.entry(row, col);
                assert!(rate < 10);
                assert!(!seen[rate as usize], "rate {} appears twice in column {}", rate, col);
                seen[rate as usize] = true;
            }
        }
    }

    #[test]
    fn seeded_tables_are_reproducible() {
        let table_a = ProbeSequence::random_new(&mut StdRng::seed_from_u64(7), 8, 10);
        let table_b = ProbeSequence::random_new(&mut StdRng::seed_from_u64(7), 8, 10);
        assert_eq!(table_a.table, table_b.table);
    }
}
