//! National identity number checksum.
//!
//! Numbers are 5–9 digits, left-padded with zeros to 9. Digits at odd
//! (0-indexed) positions are doubled and folded back below 10 by
//! subtracting 9; the number is valid when the weighted sum is a multiple
//! of 10.

/// Length of a padded identity number.
pub const ID_LENGTH: usize = 9;
const MIN_LENGTH: usize = 5;

/// Check the identity-number checksum of `input` exactly as given.
///
/// Non-digit characters or a length outside 5–9 make the number invalid
/// without computing the checksum.
pub fn is_valid_identity_number(input: &str) -> bool {
    if input.len() < MIN_LENGTH
        || input.len() > ID_LENGTH
        || !input.bytes().all(|b| b.is_ascii_digit())
    {
        return false;
    }

    let padded = format!("{input:0>9}");
    let sum: u32 = padded
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            let weighted = if i % 2 == 0 { digit } else { digit * 2 };
            if weighted > 9 {
                weighted - 9
            } else {
                weighted
            }
        })
        .sum();
    sum % 10 == 0
}

/// Trim, validate and left-pad an identity number to nine digits.
pub fn normalize_identity_number(input: &str) -> Option<String> {
    let trimmed = input.trim();
    is_valid_identity_number(trimmed).then(|| format!("{trimmed:0>9}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straight transcription of the rule, used as the oracle below.
    fn reference_checksum(digits: &str) -> bool {
        let padded: Vec<u32> = format!("{digits:0>9}")
            .chars()
            .map(|c| c.to_digit(10).unwrap())
            .collect();
        let mut sum = 0;
        for (i, d) in padded.iter().enumerate() {
            let mut w = d * if i % 2 == 0 { 1 } else { 2 };
            if w > 9 {
                w -= 9;
            }
            sum += w;
        }
        sum % 10 == 0
    }

    #[test]
    fn known_values() {
        assert!(is_valid_identity_number("123456782"));
        assert!(!is_valid_identity_number("123456789"));
        assert!(is_valid_identity_number("000000018"));
        assert!(!is_valid_identity_number("18"), "too short even though 000000018 is valid");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(!is_valid_identity_number(""));
        assert!(!is_valid_identity_number("1234"));
        assert!(!is_valid_identity_number("1234567890"));
        assert!(!is_valid_identity_number("12345678a"));
        assert!(!is_valid_identity_number("12345 782"));
        assert!(!is_valid_identity_number("-23456782"));
    }

    #[test]
    fn matches_reference_for_every_length() {
        // Deterministic spread of inputs across lengths 5..=9.
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..5_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let len = 5 + (seed % 5) as usize;
            let digits: String = (0..len)
                .map(|i| char::from(b'0' + ((seed >> (i * 4)) % 10) as u8))
                .collect();
            assert_eq!(
                is_valid_identity_number(&digits),
                reference_checksum(&digits),
                "mismatch for {digits}"
            );
        }
    }

    #[test]
    fn short_numbers_are_left_padded() {
        // 00018 pads to 000000018, which is valid.
        assert!(is_valid_identity_number("00018"));
        assert_eq!(normalize_identity_number(" 00018 "), Some("000000018".to_string()));
        assert_eq!(normalize_identity_number("123456789"), None);
    }
}
