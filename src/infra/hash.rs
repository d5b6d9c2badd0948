use std::hash::Hasher;

use twox_hash::XxHash64;

/// Hash several strings as one key. Parts are length-prefixed so
/// `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_parts(parts: &[&str]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for part in parts {
        hasher.write_usize(part.len());
        hasher.write(part.as_bytes());
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_boundaries_matter() {
        assert_ne!(hash_parts(&["ab", "c"]), hash_parts(&["a", "bc"]));
        assert_eq!(hash_parts(&["x"]), hash_parts(&["x"]));
    }
}
