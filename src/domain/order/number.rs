use chrono::{DateTime, Utc};
use rand::Rng;

// ============================================================================
// Order Number Generation
// ============================================================================
//
// Human-readable and collision-resistant: a date prefix plus a random
// suffix. Uniqueness is still enforced by the order store; the caller
// regenerates on a duplicate.
//
// ============================================================================

/// Ambiguous glyphs (0/O, 1/I/L) are excluded so support staff can read
/// numbers back over the phone.
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const SUFFIX_LEN: usize = 6;

/// Generate an order number like `ORD-20260829-K7M2QX`.
pub fn generate(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();
        let number = generate(now);
        assert!(number.starts_with("ORD-20260829-"));
        assert_eq!(number.len(), "ORD-20260829-".len() + SUFFIX_LEN);
    }

    #[test]
    fn test_suffix_uses_unambiguous_charset() {
        let number = generate(Utc::now());
        let suffix = number.rsplit('-').next().unwrap();
        for c in suffix.bytes() {
            assert!(
                SUFFIX_CHARSET.contains(&c),
                "unexpected suffix character: {}",
                c as char
            );
        }
    }

    #[test]
    fn test_two_numbers_differ() {
        let now = Utc::now();
        // 31^6 possibilities; a collision here is effectively impossible.
        assert_ne!(generate(now), generate(now));
    }
}
