//! Verification of extracted text.
//!
//! A verification is a pure predicate run on the text of one capturing group
//! after a pattern matched. A `false` result vetoes the match: the rule then
//! behaves as if the pattern never matched there.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    /// Luhn mod-10 checksum over the digits; whitespace is ignored.
    Luhn,
}

/// Run the predicate for `kind` on `text`.
pub fn verify(kind: VerificationKind, text: &str) -> bool {
    match kind {
        VerificationKind::Luhn => luhn(text),
    }
}

/// Sum of the digits of `2 * d` for `d` in `0..10`.
const DOUBLED_DIGIT_SUMS: [u32; 10] = [0, 2, 4, 6, 8, 1, 3, 5, 7, 9];

/// Luhn check. Any codepoint other than an ASCII digit or whitespace fails the
/// check, and at least two digits are required.
pub(crate) fn luhn(text: &str) -> bool {
    let mut sum = 0u32;
    let mut digits = 0usize;

    for c in text.chars().rev().filter(|c| !c.is_whitespace()) {
        let Some(d) = c.to_digit(10).filter(|_| c.is_ascii_digit()) else {
            return false;
        };
        sum += if digits % 2 == 1 { DOUBLED_DIGIT_SUMS[d as usize] } else { d };
        digits += 1;
    }

    digits > 1 && sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_card_numbers() {
        let numbers = ["4012 8888 8888 1881", "4111111111111111", "5555555555554444", "378282246310005", "79927398713"];
        for number in numbers {
            assert!(luhn(number), "{number} should pass");
        }
    }

    #[test]
    fn rejects_invalid_card_numbers() {
        for number in ["2221 0067 4735 6282", "4012 8888 8888 1882", "79927398710"] {
            assert!(!luhn(number), "{number} should fail");
        }
    }

    #[test]
    fn changing_the_check_digit_flips_validity() {
        let valid = "4012888888881881";
        let (body, last) = valid.split_at(valid.len() - 1);
        let bumped = (last.parse::<u32>().unwrap() + 1) % 10;
        assert!(luhn(valid));
        assert!(!luhn(&format!("{body}{bumped}")));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(!luhn(""));
        assert!(!luhn("0"));
        assert!(!luhn("   "));
        assert!(!luhn("4012-8888-8888-1881"));
        assert!(!luhn("٤٠١٢"));
        assert!(luhn("00"));
    }

    #[test]
    fn verify_dispatches_on_kind() {
        assert!(verify(VerificationKind::Luhn, "4012 8888 8888 1881"));
        assert!(!verify(VerificationKind::Luhn, "2221 0067 4735 6282"));
    }
}
