//! Payment screen rules.

use crate::error::FieldErrors;
use crate::record::{CardExpiry, Payer, PaymentInput, PaymentRecord};
use chrono::{DateTime, TimeZone, Utc};

const CARD_MIN_DIGITS: usize = 13;
const CARD_MAX_DIGITS: usize = 19;
const HOLDER_MIN: usize = 2;
const HOLDER_MAX: usize = 60;

/// Parse a strict `MM/YY` expiry. Two-digit years are in the 2000s.
pub fn parse_expiry(input: &str) -> Option<CardExpiry> {
    let bytes = input.as_bytes();
    if bytes.len() != 5
        || bytes[2] != b'/'
        || !bytes[..2].iter().chain(&bytes[3..]).all(u8::is_ascii_digit)
    {
        return None;
    }
    let month: u32 = input[..2].parse().ok()?;
    let yy: i32 = input[3..].parse().ok()?;
    (1..=12).contains(&month).then_some(CardExpiry {
        month,
        year: 2000 + yy,
    })
}

impl CardExpiry {
    /// First instant after the expiry month, in UTC.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
    }

    /// A card is usable through the last instant of its expiry month.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.period_end().is_some_and(|end| end > now)
    }
}

/// `MM/YY` parses and has not yet lapsed at `now`.
pub fn is_valid_expiry(input: &str, now: DateTime<Utc>) -> bool {
    parse_expiry(input).is_some_and(|e| e.is_valid_at(now))
}

/// Drop spaces and dashes from a typed card number.
pub fn normalize_card_number(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect()
}

/// Group digits in fours: `4111111111111111` → `4111 1111 1111 1111`.
///
/// Non-digits are stripped first, so formatting is idempotent.
pub fn format_card_number(input: &str) -> String {
    let digits: Vec<char> = input.chars().filter(char::is_ascii_digit).collect();
    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate the payment screen.
///
/// `has_spouse` reports whether a spouse record exists; without one the
/// spouse cannot be the payer.
pub fn validate_payment(
    input: &PaymentInput,
    has_spouse: bool,
    now: DateTime<Utc>,
) -> Result<PaymentRecord, FieldErrors> {
    let mut errors = FieldErrors::new();

    let cardholder_name = input.cardholder_name.trim();
    let holder_len = cardholder_name.chars().count();
    if !(HOLDER_MIN..=HOLDER_MAX).contains(&holder_len) {
        errors.push(
            "cardholder_name",
            format!("Cardholder name must be {HOLDER_MIN}-{HOLDER_MAX} characters"),
        );
    }

    if input.payer == Payer::Spouse && !has_spouse {
        errors.push("payer", "The spouse can only pay when spouse details were entered");
    }

    let card_number = normalize_card_number(&input.card_number);
    if !(CARD_MIN_DIGITS..=CARD_MAX_DIGITS).contains(&card_number.len())
        || !card_number.bytes().all(|b| b.is_ascii_digit())
    {
        errors.push(
            "card_number",
            format!("Card number must be {CARD_MIN_DIGITS}-{CARD_MAX_DIGITS} digits"),
        );
    }

    let expiry = match parse_expiry(input.expiry.trim()) {
        None => {
            errors.push("expiry", "Expiry must be MM/YY");
            None
        }
        Some(e) if !e.is_valid_at(now) => {
            errors.push("expiry", "This card has expired");
            None
        }
        Some(e) => Some(e),
    };

    let cvv = input.cvv.trim();
    if !(3..=4).contains(&cvv.len()) || !cvv.bytes().all(|b| b.is_ascii_digit()) {
        errors.push("cvv", "CVV must be 3 or 4 digits");
    }

    match expiry {
        Some(expiry) if errors.is_empty() => Ok(PaymentRecord {
            cardholder_name: cardholder_name.to_string(),
            payer: input.payer,
            card_number,
            expiry,
            cvv: cvv.to_string(),
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn sample_payment() -> PaymentInput {
        PaymentInput {
            cardholder_name: "Dana Levi".into(),
            payer: Payer::Primary,
            card_number: "4111 1111-1111 1111".into(),
            expiry: "08/29".into(),
            cvv: "123".into(),
        }
    }

    #[test]
    fn expiry_parsing_is_strict() {
        assert_eq!(parse_expiry("03/31"), Some(CardExpiry { month: 3, year: 2031 }));
        for bad in ["3/31", "03/2031", "13/30", "00/30", "03-31", "ab/cd", " 03/31", ""] {
            assert_eq!(parse_expiry(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn expiry_valid_through_end_of_month() {
        let card = parse_expiry("10/26").unwrap();
        assert!(card.is_valid_at(at(2026, 10, 31)));
        assert!(!card.is_valid_at(Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap()));
        let december = parse_expiry("12/26").unwrap();
        assert_eq!(
            december.period_end(),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).single()
        );
    }

    #[test]
    fn lapsed_expiry_rejected_in_every_later_year() {
        for year in 2021..2030 {
            assert!(!is_valid_expiry("01/20", at(year, 6, 1)), "01/20 accepted in {year}");
        }
        assert!(is_valid_expiry("01/99", at(2026, 10, 19)));
        assert!(!is_valid_expiry("01/99", at(2099, 2, 1)));
    }

    #[test]
    fn card_formatting_is_idempotent() {
        let once = format_card_number("4111111111111111");
        assert_eq!(once, "4111 1111 1111 1111");
        assert_eq!(format_card_number(&once), once);
        assert_eq!(format_card_number("378282246310005"), "3782 8224 6310 005");
    }

    #[test]
    fn valid_payment_is_normalised() {
        let record = validate_payment(&sample_payment(), false, at(2026, 10, 19)).unwrap();
        assert_eq!(record.card_number, "4111111111111111");
        assert_eq!(record.expiry, CardExpiry { month: 8, year: 2029 });
        assert_eq!(record.cardholder_name, "Dana Levi");
    }

    #[test]
    fn spouse_payer_requires_spouse() {
        let mut input = sample_payment();
        input.payer = Payer::Spouse;
        let errors = validate_payment(&input, false, at(2026, 10, 19)).unwrap_err();
        assert!(errors.has("payer"));
        assert!(validate_payment(&input, true, at(2026, 10, 19)).is_ok());
    }

    #[test]
    fn reports_every_bad_field() {
        let input = PaymentInput {
            cardholder_name: "D".into(),
            payer: Payer::Primary,
            card_number: "4111".into(),
            expiry: "01/20".into(),
            cvv: "12a".into(),
        };
        let errors = validate_payment(&input, false, at(2026, 10, 19)).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors.message_for("expiry"), Some("This card has expired"));
        assert!(errors.has("cardholder_name"));
        assert!(errors.has("card_number"));
        assert!(errors.has("cvv"));
    }
}
