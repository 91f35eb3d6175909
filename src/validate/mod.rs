//! Declarative field rules for the three input screens.
//!
//! Every validator is a pure function from a raw draft to either a
//! normalised record or the complete list of field errors. Nothing here
//! panics or returns early on the first bad field: the UI shows all errors
//! for the screen at once.
//!
//! Rules that depend on the outside world (the current date, the home
//! country and the known country list) come in through [`ValidationContext`]
//! so tests can pin them.

pub mod identity;
pub mod payment;
pub mod person;

use crate::reference::CountryList;
use chrono::{DateTime, Datelike, Utc};

pub use identity::{is_valid_identity_number, normalize_identity_number};
pub use payment::{format_card_number, is_valid_expiry, parse_expiry, validate_payment};
pub use person::{validate_primary, validate_spouse};

/// Earliest accepted immigration year.
pub const MIN_IMMIGRATION_YEAR: i32 = 1948;

/// Home-country names used when none are configured.
pub const DEFAULT_HOME_COUNTRY: [&str; 2] = ["ישראל", "Israel"];

pub fn default_home_country() -> Vec<String> {
    DEFAULT_HOME_COUNTRY.iter().map(|c| c.to_string()).collect()
}

/// True when `country` is one of the `home_country` names (ASCII
/// case-insensitive, surrounding whitespace ignored).
pub fn is_home_country(home_country: &[String], country: &str) -> bool {
    let country = country.trim();
    home_country
        .iter()
        .any(|home| home.trim().eq_ignore_ascii_case(country))
}

/// External inputs the field rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Names that count as the home country (any language, case-insensitive).
    pub home_country: &'a [String],
    /// Known countries; `None` accepts any non-empty birth country.
    pub countries: Option<&'a CountryList>,
    /// The current moment.
    pub now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(home_country: &'a [String], now: DateTime<Utc>) -> Self {
        Self {
            home_country,
            countries: None,
            now,
        }
    }

    pub fn with_countries(mut self, countries: Option<&'a CountryList>) -> Self {
        self.countries = countries;
        self
    }

    pub fn current_year(&self) -> i32 {
        self.now.year()
    }

    /// True when `country` names the home country.
    pub fn is_home_country(&self, country: &str) -> bool {
        is_home_country(self.home_country, country)
    }
}
