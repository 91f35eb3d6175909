//! Person screen rules (primary applicant and spouse).

use super::{identity::normalize_identity_number, ValidationContext, MIN_IMMIGRATION_YEAR};
use crate::error::FieldErrors;
use crate::record::{
    Gender, MaritalStatus, PersonInput, PersonRecord, PrimaryApplicant, SpouseRecord,
};
use crate::signature::SignatureImage;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const ADDRESS_MAX: usize = 100;
const EMAIL_MAX: usize = 254;
const MAX_AGE_YEARS: i32 = 120;

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap());

static RE_MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^05\d{8}$").unwrap());

/// Fields both person screens share.
struct CommonFields {
    id_number: String,
    first_name: String,
    last_name: String,
    father_name: String,
    birth_date: NaiveDate,
    gender: Gender,
    birth_country: String,
    immigration_year: Option<i32>,
    mobile: String,
    email: String,
    signature: SignatureImage,
}

/// Validate the primary applicant's screen.
pub fn validate_primary(
    input: &PersonInput,
    ctx: &ValidationContext<'_>,
) -> Result<PrimaryApplicant, FieldErrors> {
    let mut errors = FieldErrors::new();
    let common = check_common(input, ctx, &mut errors);

    let marital_status = match MaritalStatus::from_label(&input.marital_status) {
        Some(status) => Some(status),
        None => {
            errors.push("marital_status", "Please select a marital status");
            None
        }
    };
    let address = check_required_text("address", &input.address, ADDRESS_MAX, &mut errors);
    let city = check_required_text("city", &input.city, ADDRESS_MAX, &mut errors);
    let postal_code = check_postal_code(&input.postal_code, &mut errors);

    match (common, marital_status, address, city) {
        (Some(c), Some(marital_status), Some(address), Some(city)) if errors.is_empty() => {
            Ok(PrimaryApplicant {
                person: PersonRecord {
                    id_number: c.id_number,
                    first_name: c.first_name,
                    last_name: c.last_name,
                    father_name: c.father_name,
                    birth_date: c.birth_date,
                    gender: c.gender,
                    marital_status,
                    birth_country: c.birth_country,
                    immigration_year: c.immigration_year,
                    address,
                    city,
                    postal_code,
                    mobile: c.mobile,
                    email: c.email,
                    signature: c.signature,
                },
                include_spouse: input.include_spouse,
            })
        }
        _ => Err(errors),
    }
}

/// Validate the spouse screen. Marital status and address fields are ignored.
pub fn validate_spouse(
    input: &PersonInput,
    ctx: &ValidationContext<'_>,
) -> Result<SpouseRecord, FieldErrors> {
    let mut errors = FieldErrors::new();
    match check_common(input, ctx, &mut errors) {
        Some(c) if errors.is_empty() => Ok(SpouseRecord {
            id_number: c.id_number,
            first_name: c.first_name,
            last_name: c.last_name,
            father_name: c.father_name,
            birth_date: c.birth_date,
            gender: c.gender,
            birth_country: c.birth_country,
            immigration_year: c.immigration_year,
            mobile: c.mobile,
            email: c.email,
            signature: c.signature,
        }),
        _ => Err(errors),
    }
}

fn check_common(
    input: &PersonInput,
    ctx: &ValidationContext<'_>,
    errors: &mut FieldErrors,
) -> Option<CommonFields> {
    let id_number = normalize_identity_number(&input.id_number);
    if id_number.is_none() {
        errors.push("id_number", "Invalid identity number");
    }
    let first_name = check_name("first_name", &input.first_name, errors);
    let last_name = check_name("last_name", &input.last_name, errors);
    let father_name = check_name("father_name", &input.father_name, errors);
    let birth_date = check_birth_date(&input.birth_date, ctx, errors);
    let gender = Gender::from_label(&input.gender);
    if gender.is_none() {
        errors.push("gender", "Please select a gender");
    }
    let birth_country = check_birth_country(&input.birth_country, ctx, errors);
    let immigration_year = check_immigration_year(input, birth_date, ctx, errors);
    let mobile = check_mobile(&input.mobile, errors);
    let email = check_email(&input.email, errors);
    let signature = input.signature.clone();
    if signature.is_none() {
        errors.push("signature", "A signature is required");
    }

    Some(CommonFields {
        id_number: id_number?,
        first_name: first_name?,
        last_name: last_name?,
        father_name: father_name?,
        birth_date: birth_date?,
        gender: gender?,
        birth_country: birth_country?,
        immigration_year: immigration_year?,
        mobile: mobile?,
        email: email?,
        signature: signature?,
    })
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphabetic() || matches!(ch, ' ' | '\'' | '"' | '-' | '.' | '׳' | '״')
}

fn check_name(field: &str, value: &str, errors: &mut FieldErrors) -> Option<String> {
    let value = value.trim();
    let len = value.chars().count();
    if len < NAME_MIN {
        errors.push(field, format!("Must be at least {NAME_MIN} characters"));
        None
    } else if len > NAME_MAX {
        errors.push(field, format!("Must be at most {NAME_MAX} characters"));
        None
    } else if !value.chars().all(is_name_char) {
        errors.push(field, "May contain letters, spaces, apostrophes and hyphens only");
        None
    } else {
        Some(value.to_string())
    }
}

/// Accept `DD/MM/YYYY` (as typed) or `YYYY-MM-DD` (as a date picker sends it).
pub(crate) fn parse_birth_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

fn check_birth_date(
    value: &str,
    ctx: &ValidationContext<'_>,
    errors: &mut FieldErrors,
) -> Option<NaiveDate> {
    if value.trim().is_empty() {
        errors.push("birth_date", "Birth date is required");
        return None;
    }
    let Some(date) = parse_birth_date(value) else {
        errors.push("birth_date", "Invalid date (expected DD/MM/YYYY)");
        return None;
    };
    let today = ctx.now.date_naive();
    if date > today {
        errors.push("birth_date", "Birth date cannot be in the future");
        None
    } else if today.year() - date.year() > MAX_AGE_YEARS {
        errors.push("birth_date", "Invalid birth date");
        None
    } else {
        Some(date)
    }
}

fn check_birth_country(
    value: &str,
    ctx: &ValidationContext<'_>,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.push("birth_country", "Birth country is required");
        return None;
    }
    if let Some(countries) = ctx.countries {
        if !ctx.is_home_country(value) && !countries.contains(value) {
            errors.push("birth_country", "Unknown country");
            return None;
        }
    }
    Some(value.to_string())
}

/// `Some(None)` = valid and absent, `Some(Some(y))` = valid year, `None` = invalid.
fn check_immigration_year(
    input: &PersonInput,
    birth_date: Option<NaiveDate>,
    ctx: &ValidationContext<'_>,
    errors: &mut FieldErrors,
) -> Option<Option<i32>> {
    if input.birth_country.trim().is_empty() || ctx.is_home_country(&input.birth_country) {
        return Some(None);
    }

    let value = input.immigration_year.trim();
    if value.is_empty() {
        errors.push(
            "immigration_year",
            "Immigration year is required when born abroad",
        );
        return None;
    }
    let current_year = ctx.current_year();
    let Ok(year) = value.parse::<i32>() else {
        errors.push("immigration_year", "Immigration year must be a number");
        return None;
    };
    if !(MIN_IMMIGRATION_YEAR..=current_year).contains(&year) {
        errors.push(
            "immigration_year",
            format!("Immigration year must be between {MIN_IMMIGRATION_YEAR} and {current_year}"),
        );
        return None;
    }
    if let Some(born) = birth_date {
        if year < born.year() {
            errors.push("immigration_year", "Immigration year is before the birth year");
            return None;
        }
    }
    Some(Some(year))
}

fn check_required_text(
    field: &str,
    value: &str,
    max: usize,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.push(field, "This field is required");
        None
    } else if value.chars().count() > max {
        errors.push(field, format!("Must be at most {max} characters"));
        None
    } else {
        Some(value.to_string())
    }
}

/// Postal codes are optional; when given they are 5 or 7 digits.
fn check_postal_code(value: &str, errors: &mut FieldErrors) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let digits_only = value.bytes().all(|b| b.is_ascii_digit());
    if digits_only && (value.len() == 5 || value.len() == 7) {
        Some(value.to_string())
    } else {
        errors.push("postal_code", "Postal code must be 5 or 7 digits");
        None
    }
}

/// Strip separators and fold `+972 5x` into the local `05x` form.
pub(crate) fn normalize_mobile(value: &str) -> String {
    let compact: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    match compact.strip_prefix("+972") {
        Some(rest) => format!("0{rest}"),
        None => compact,
    }
}

fn check_mobile(value: &str, errors: &mut FieldErrors) -> Option<String> {
    let mobile = normalize_mobile(value);
    if RE_MOBILE.is_match(&mobile) {
        Some(mobile)
    } else {
        errors.push("mobile", "Invalid mobile number (expected 05XXXXXXXX)");
        None
    }
}

fn check_email(value: &str, errors: &mut FieldErrors) -> Option<String> {
    let value = value.trim();
    if value.len() <= EMAIL_MAX && RE_EMAIL.is_match(value) {
        Some(value.to_lowercase())
    } else {
        errors.push("email", "Invalid email address");
        None
    }
}
