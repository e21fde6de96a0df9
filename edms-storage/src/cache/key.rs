//! Deterministic cache file names.
//!
//! Canonical form hashed with SHA-256: the input path, the number of
//! positional arguments and each one in order, then the number of keyword
//! arguments and each key and value, sorted by key. Every field is written
//! as its byte length (8 bytes, big-endian) followed by its bytes, so no
//! choice of characters inside a field can shift a boundary.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-256 of the canonical form of the inputs.
pub fn cache_filename<A, K, V>(input: &str, args: &[A], kwargs: &[(K, V)]) -> String
where
    A: AsRef<str>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut hasher = Sha256::new();
    push_field(&mut hasher, input.as_bytes());
    push_count(&mut hasher, args.len());
    for arg in args {
        push_field(&mut hasher, arg.as_ref().as_bytes());
    }

    let mut sorted: Vec<(&str, &str)> = kwargs
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    sorted.sort();
    push_count(&mut hasher, sorted.len());
    for (key, value) in sorted {
        push_field(&mut hasher, key.as_bytes());
        push_field(&mut hasher, value.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// [`cache_filename`] placed under `directory`.
pub fn cache_path<A, K, V>(directory: &Path, input: &str, args: &[A], kwargs: &[(K, V)]) -> PathBuf
where
    A: AsRef<str>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    directory.join(cache_filename(input, args, kwargs))
}

fn push_count(hasher: &mut Sha256, count: usize) {
    hasher.update((count as u64).to_be_bytes());
}

fn push_field(hasher: &mut Sha256, bytes: &[u8]) {
    push_count(hasher, bytes.len());
    hasher.update(bytes);
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The key is a pure function of its inputs.
        #[test]
        fn prop_deterministic(
            input in ".{0,64}",
            args in prop::collection::vec(".{0,16}", 0..4),
            kwargs in prop::collection::vec(("[a-z]{1,8}", ".{0,16}"), 0..4),
        ) {
            prop_assert_eq!(
                cache_filename(&input, &args, &kwargs),
                cache_filename(&input, &args, &kwargs)
            );
        }

        /// Reversing keyword arguments never changes the key.
        #[test]
        fn prop_kwargs_order_independent(
            input in "[ -~]{0,64}",
            kwargs in prop::collection::vec(("[a-z]{1,8}", "[ -~]{0,16}"), 0..6),
        ) {
            let mut reversed = kwargs.clone();
            reversed.reverse();
            let no_args: Vec<String> = Vec::new();
            prop_assert_eq!(
                cache_filename(&input, &no_args, &kwargs),
                cache_filename(&input, &no_args, &reversed)
            );
        }
    }
}
