// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Test helpers: a variant matcher and fake capability builders.

pub mod fake_capabilities;

/// Asserts that an expression matches a pattern, optionally binding and
/// returning parts of the match.
#[macro_export]
macro_rules! assert_variant {
    ($expression:expr, $pattern:pat) => {
        match $expression {
            $pattern => {}
            other => panic!("unexpected variant: {:?}", other),
        }
    };
    ($expression:expr, $pattern:pat => $out:expr) => {
        match $expression {
            $pattern => $out,
            other => panic!("unexpected variant: {:?}", other),
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug)]
    enum Foo {
        A(u8),
        B,
    }

    #[test]
    fn matches_and_extracts() {
        let foo = Foo::A(7);
        assert_variant!(&foo, Foo::A(_));
        let value = assert_variant!(foo, Foo::A(v) => v);
        assert_eq!(value, 7);
    }

    #[test]
    #[should_panic(expected = "unexpected variant")]
    fn panics_on_mismatch() {
        assert_variant!(Foo::B, Foo::A(_));
    }
}
