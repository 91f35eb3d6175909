//! Printed representations of record values.

use chrono::NaiveDate;

pub use crate::validate::payment::format_card_number;

/// `DD/MM/YY`, as the form's date boxes expect.
pub fn format_birth_date(date: NaiveDate) -> String {
    date.format("%d/%m/%y").to_string()
}

/// `DD/MM/YYYY` for the submission date.
pub fn format_form_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Split an address at the first `@` so each half fits its own column.
///
/// Without an `@` the whole value is the user part.
pub fn split_email(email: &str) -> (&str, &str) {
    email.split_once('@').unwrap_or((email, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        let d = NaiveDate::from_ymd_opt(1985, 11, 5).unwrap();
        assert_eq!(format_birth_date(d), "05/11/85");
        assert_eq!(format_form_date(d), "05/11/1985");
        let y2k = NaiveDate::from_ymd_opt(2003, 1, 9).unwrap();
        assert_eq!(format_birth_date(y2k), "09/01/03");
    }

    #[test]
    fn email_halves() {
        assert_eq!(split_email("dana@example.com"), ("dana", "example.com"));
        assert_eq!(split_email("nodomain"), ("nodomain", ""));
    }
}
