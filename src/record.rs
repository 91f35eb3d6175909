//! Data model: raw input drafts and the validated records built from them.
//!
//! Drafts ([`PersonInput`], [`PaymentInput`]) hold exactly what the user
//! typed, as strings, and are what the session keeps between screens so that
//! nothing has to be re-entered after a back-navigation. Records
//! ([`PersonRecord`], [`SpouseRecord`], [`PaymentRecord`]) only exist after
//! validation succeeded and carry normalised, typed values.

use crate::error::FormError;
use crate::signature::{SignatureImage, SignatureRenderer};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ── Enums ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Parse an English or Hebrew label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "male" | "m" | "זכר" => Some(Gender::Male),
            "female" | "f" | "נקבה" => Some(Gender::Female),
            _ => None,
        }
    }

    /// Label printed on the form.
    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "זכר",
            Gender::Female => "נקבה",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

impl MaritalStatus {
    /// Parse an English or Hebrew label, including the gendered `/ה` forms.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "single" | "רווק" | "רווקה" | "רווק/ה" => Some(MaritalStatus::Single),
            "married" | "נשוי" | "נשואה" | "נשוי/אה" => Some(MaritalStatus::Married),
            "divorced" | "גרוש" | "גרושה" | "גרוש/ה" => Some(MaritalStatus::Divorced),
            "widowed" | "אלמן" | "אלמנה" | "אלמן/ה" => Some(MaritalStatus::Widowed),
            _ => None,
        }
    }

    /// Single-letter code printed in the form's status box.
    pub fn code(self) -> &'static str {
        match self {
            MaritalStatus::Single => "ר",
            MaritalStatus::Married => "נ",
            MaritalStatus::Divorced => "ג",
            MaritalStatus::Widowed => "א",
        }
    }
}

/// Which applicant's card pays the membership fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payer {
    #[default]
    Primary,
    Spouse,
}

// ── Drafts ───────────────────────────────────────────────────────────────

/// Raw values of one person screen, as typed.
///
/// Used for both the primary applicant and the spouse; the spouse schema
/// ignores `marital_status`, the address fields and `include_spouse`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonInput {
    pub id_number: String,
    pub first_name: String,
    pub last_name: String,
    pub father_name: String,
    pub birth_date: String,
    pub gender: String,
    pub marital_status: String,
    pub birth_country: String,
    pub immigration_year: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub mobile: String,
    pub email: String,
    pub signature: Option<SignatureImage>,
    pub include_spouse: bool,
}

impl PersonInput {
    pub fn has_signature(&self) -> bool {
        self.signature.is_some()
    }

    /// Assign a signature produced by either provider, replacing any previous one.
    pub fn set_signature(&mut self, signature: SignatureImage) {
        self.signature = Some(signature);
    }

    /// Generate a signature from the name once both name parts are filled.
    ///
    /// Returns `Ok(true)` when a signature was generated. An existing
    /// signature, drawn or generated, is never overwritten.
    pub fn autosign(&mut self, renderer: &SignatureRenderer) -> Result<bool, FormError> {
        if self.has_signature()
            || self.first_name.trim().is_empty()
            || self.last_name.trim().is_empty()
        {
            return Ok(false);
        }
        let signature = renderer.render(&self.first_name, &self.last_name)?;
        debug!("Auto-generated signature for {} {}", self.first_name.trim(), self.last_name.trim());
        self.signature = Some(signature);
        Ok(true)
    }
}

/// Raw values of the payment screen, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentInput {
    pub cardholder_name: String,
    pub payer: Payer,
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
}

// ── Records ──────────────────────────────────────────────────────────────

/// A validated primary applicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Nine digits, checksum-valid.
    pub id_number: String,
    pub first_name: String,
    pub last_name: String,
    pub father_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub marital_status: MaritalStatus,
    pub birth_country: String,
    /// Only set when the birth country is not the home country.
    pub immigration_year: Option<i32>,
    pub address: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub mobile: String,
    pub email: String,
    pub signature: SignatureImage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryApplicant {
    #[serde(flatten)]
    pub person: PersonRecord,
    pub include_spouse: bool,
}

/// A validated spouse: no marital status, address inherited from the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpouseRecord {
    pub id_number: String,
    pub first_name: String,
    pub last_name: String,
    pub father_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub birth_country: String,
    pub immigration_year: Option<i32>,
    pub mobile: String,
    pub email: String,
    pub signature: SignatureImage,
}

/// Card expiry month. Serialised as `"MM/YY"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardExpiry {
    /// 1–12.
    pub month: u32,
    /// Four-digit year.
    pub year: i32,
}

impl fmt::Display for CardExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.year.rem_euclid(100))
    }
}

impl Serialize for CardExpiry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CardExpiry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::validate::payment::parse_expiry(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid expiry '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub cardholder_name: String,
    pub payer: Payer,
    /// Digits only.
    pub card_number: String,
    pub expiry: CardExpiry,
    pub cvv: String,
}

/// Everything collected by one session: the unit that is stamped and uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionBundle {
    pub primary: PrimaryApplicant,
    pub spouse: Option<SpouseRecord>,
    pub payment: PaymentRecord,
}

impl SubmissionBundle {
    /// Assemble a bundle, rejecting a spouse payer without a spouse record.
    pub fn new(
        primary: PrimaryApplicant,
        spouse: Option<SpouseRecord>,
        payment: PaymentRecord,
    ) -> Result<Self, FormError> {
        if payment.payer == Payer::Spouse && spouse.is_none() {
            return Err(FormError::Internal(
                "payment names the spouse as payer but no spouse was collected".into(),
            ));
        }
        Ok(Self {
            primary,
            spouse,
            payment,
        })
    }

    /// Identity number of the designated payer.
    pub fn payer_id_number(&self) -> &str {
        match (self.payment.payer, &self.spouse) {
            (Payer::Spouse, Some(spouse)) => &spouse.id_number,
            _ => &self.primary.person.id_number,
        }
    }

    /// Signature of the designated payer, reused on the payment block.
    pub fn payer_signature(&self) -> &SignatureImage {
        match (self.payment.payer, &self.spouse) {
            (Payer::Spouse, Some(spouse)) => &spouse.signature,
            _ => &self.primary.person.signature,
        }
    }
}
