//! Placement planning: turn a bundle and a layout into an ordered list of
//! things to draw, before any PDF object is touched.

use super::format::{format_birth_date, format_card_number, format_form_date, split_email};
use super::font::TextMeasure;
use super::layout::{Block, Direction, FieldLayout, FieldPosition};
use crate::error::FormError;
use crate::record::{PersonRecord, SpouseRecord, SubmissionBundle};
use crate::signature::SignatureImage;
use crate::validate::is_home_country;
use chrono::NaiveDate;
use tracing::debug;

/// Signatures are drawn at this fraction of the position's `max_width`.
pub const SIGNATURE_WIDTH_RATIO: f32 = 0.5;

/// One thing to draw on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Text {
        block: Block,
        field: String,
        text: String,
        /// Left edge of the drawn text.
        x: f32,
        y: f32,
        /// Font size after shrink-to-fit.
        size: f32,
        width: f32,
    },
    Image {
        block: Block,
        field: String,
        image: SignatureImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

impl Placement {
    pub fn field(&self) -> (Block, &str) {
        match self {
            Placement::Text { block, field, .. } | Placement::Image { block, field, .. } => {
                (*block, field)
            }
        }
    }
}

/// Everything the renderer draws, in drawing order.
#[derive(Debug, Clone, PartialEq)]
pub struct StampPlan {
    /// 1-indexed page.
    pub page: u32,
    pub placements: Vec<Placement>,
    /// Overlay the calibration grid.
    pub grid: bool,
}

impl StampPlan {
    pub fn find(&self, block: Block, field: &str) -> Option<&Placement> {
        self.placements
            .iter()
            .find(|p| p.field() == (block, field))
    }
}

/// Values of one block, in drawing order.
enum Value<'a> {
    Text(String),
    Image(&'a SignatureImage),
}

/// Compute every placement for `bundle`.
///
/// Fields without a registered position or with an empty value are
/// skipped. An immigration year is never stamped for someone born in one of
/// the `home_country` names. Equal inputs give equal plans.
pub fn plan_stamp(
    bundle: &SubmissionBundle,
    layout: &FieldLayout,
    measure: &dyn TextMeasure,
    home_country: &[String],
    stamped_on: NaiveDate,
    grid: bool,
) -> Result<StampPlan, FormError> {
    let mut placements = Vec::new();

    let mut primary = person_values(&bundle.primary.person, home_country);
    primary.push(("form_date", Value::Text(format_form_date(stamped_on))));
    place_block(Block::Primary, primary, layout, measure, &mut placements)?;

    if let Some(spouse) = &bundle.spouse {
        place_block(Block::Spouse, spouse_values(spouse, home_country), layout, measure, &mut placements)?;
    }

    let payment = &bundle.payment;
    let payment_values = vec![
        ("cardholder_name", Value::Text(payment.cardholder_name.clone())),
        ("cardholder_id", Value::Text(bundle.payer_id_number().to_string())),
        ("card_number", Value::Text(format_card_number(&payment.card_number))),
        ("expiry", Value::Text(payment.expiry.to_string())),
        ("cvv", Value::Text(payment.cvv.clone())),
        ("signature", Value::Image(bundle.payer_signature())),
    ];
    place_block(Block::Payment, payment_values, layout, measure, &mut placements)?;

    debug!("Planned {} placements", placements.len());
    Ok(StampPlan {
        page: layout.page,
        placements,
        grid,
    })
}

fn immigration_year(year: Option<i32>, birth_country: &str, home_country: &[String]) -> String {
    match year {
        Some(year) if !is_home_country(home_country, birth_country) => year.to_string(),
        _ => String::new(),
    }
}

fn person_values<'a>(
    person: &'a PersonRecord,
    home_country: &[String],
) -> Vec<(&'static str, Value<'a>)> {
    let (email_user, email_domain) = split_email(&person.email);
    vec![
        ("id_number", Value::Text(person.id_number.clone())),
        ("first_name", Value::Text(person.first_name.clone())),
        ("last_name", Value::Text(person.last_name.clone())),
        ("father_name", Value::Text(person.father_name.clone())),
        ("birth_date", Value::Text(format_birth_date(person.birth_date))),
        ("gender", Value::Text(person.gender.label().to_string())),
        ("marital_status", Value::Text(person.marital_status.code().to_string())),
        ("birth_country", Value::Text(person.birth_country.clone())),
        (
            "immigration_year",
            Value::Text(immigration_year(
                person.immigration_year,
                &person.birth_country,
                home_country,
            )),
        ),
        ("address", Value::Text(person.address.clone())),
        ("city", Value::Text(person.city.clone())),
        ("postal_code", Value::Text(person.postal_code.clone().unwrap_or_default())),
        ("mobile", Value::Text(person.mobile.clone())),
        ("email_user", Value::Text(email_user.to_string())),
        ("email_domain", Value::Text(email_domain.to_string())),
        ("signature", Value::Image(&person.signature)),
    ]
}

fn spouse_values<'a>(
    spouse: &'a SpouseRecord,
    home_country: &[String],
) -> Vec<(&'static str, Value<'a>)> {
    let (email_user, email_domain) = split_email(&spouse.email);
    vec![
        ("id_number", Value::Text(spouse.id_number.clone())),
        ("first_name", Value::Text(spouse.first_name.clone())),
        ("last_name", Value::Text(spouse.last_name.clone())),
        ("father_name", Value::Text(spouse.father_name.clone())),
        ("birth_date", Value::Text(format_birth_date(spouse.birth_date))),
        ("gender", Value::Text(spouse.gender.label().to_string())),
        ("birth_country", Value::Text(spouse.birth_country.clone())),
        (
            "immigration_year",
            Value::Text(immigration_year(
                spouse.immigration_year,
                &spouse.birth_country,
                home_country,
            )),
        ),
        ("mobile", Value::Text(spouse.mobile.clone())),
        ("email_user", Value::Text(email_user.to_string())),
        ("email_domain", Value::Text(email_domain.to_string())),
        ("signature", Value::Image(&spouse.signature)),
    ]
}

fn place_block(
    block: Block,
    values: Vec<(&'static str, Value<'_>)>,
    layout: &FieldLayout,
    measure: &dyn TextMeasure,
    out: &mut Vec<Placement>,
) -> Result<(), FormError> {
    for (field, value) in values {
        let Some(pos) = layout.position(block, field) else {
            continue;
        };
        let placement = match value {
            Value::Text(text) if text.trim().is_empty() => continue,
            Value::Text(text) => place_text(block, field, text, pos, measure)?,
            Value::Image(image) => place_image(block, field, image, pos)?,
        };
        out.push(placement);
    }
    Ok(())
}

fn place_text(
    block: Block,
    field: &str,
    text: String,
    pos: &FieldPosition,
    measure: &dyn TextMeasure,
) -> Result<Placement, FormError> {
    let natural = measure.measure(&text, pos.size).map_err(|e| match e {
        FormError::MissingGlyph { font, ch, .. } => FormError::MissingGlyph {
            font,
            field: format!("{block}.{field}"),
            ch,
        },
        other => other,
    })?;

    let (size, width) = if pos.max_width > 0.0 && natural > pos.max_width {
        (pos.size * pos.max_width / natural, pos.max_width)
    } else {
        (pos.size, natural)
    };
    let x = match pos.direction {
        Direction::Rtl => pos.x - width,
        Direction::Ltr => pos.x,
    };
    debug!("{}.{} at ({:.1}, {:.1}) size {:.2}", block, field, x, pos.y, size);

    Ok(Placement::Text {
        block,
        field: field.to_string(),
        text,
        x,
        y: pos.y,
        size,
        width,
    })
}

fn place_image(
    block: Block,
    field: &str,
    image: &SignatureImage,
    pos: &FieldPosition,
) -> Result<Placement, FormError> {
    let (px_w, px_h) = image.dimensions()?;
    if px_w == 0 || px_h == 0 {
        return Err(FormError::UnsupportedImage {
            detail: format!("{block}.{field} has an empty image"),
        });
    }
    let width = pos.max_width * SIGNATURE_WIDTH_RATIO;
    let height = width * px_h as f32 / px_w as f32;
    Ok(Placement::Image {
        block,
        field: field.to_string(),
        image: image.clone(),
        x: pos.x,
        y: pos.y,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payer;
    use crate::test_support::{home, sample_bundle, FixedAdvance};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn layout() -> FieldLayout {
        FieldLayout::builtin().unwrap()
    }

    fn text_of(plan: &StampPlan, block: Block, field: &str) -> Option<String> {
        match plan.find(block, field)? {
            Placement::Text { text, .. } => Some(text.clone()),
            Placement::Image { .. } => None,
        }
    }

    #[test]
    fn derived_values_are_formatted() {
        let bundle = sample_bundle(true, Payer::Primary);
        let plan = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.5), &home(), day(), false).unwrap();

        assert_eq!(text_of(&plan, Block::Primary, "birth_date").as_deref(), Some("05/11/85"));
        assert_eq!(text_of(&plan, Block::Primary, "marital_status").as_deref(), Some("נ"));
        assert_eq!(text_of(&plan, Block::Primary, "gender").as_deref(), Some("נקבה"));
        assert_eq!(text_of(&plan, Block::Primary, "email_user").as_deref(), Some("dana.levi"));
        assert_eq!(text_of(&plan, Block::Primary, "email_domain").as_deref(), Some("example.com"));
        assert_eq!(text_of(&plan, Block::Primary, "form_date").as_deref(), Some("19/10/2026"));
        assert_eq!(
            text_of(&plan, Block::Payment, "card_number").as_deref(),
            Some("4111 1111 1111 1111")
        );
        assert_eq!(text_of(&plan, Block::Payment, "expiry").as_deref(), Some("08/29"));
    }

    #[test]
    fn immigration_year_only_for_the_foreign_born() {
        let mut bundle = sample_bundle(true, Payer::Primary);
        bundle.primary.person.immigration_year = Some(1990);
        let plan = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.5), &home(), day(), false)
            .unwrap();

        // Primary was born in the home country; spouse in France.
        assert!(plan.find(Block::Primary, "immigration_year").is_none());
        assert_eq!(text_of(&plan, Block::Spouse, "immigration_year").as_deref(), Some("2001"));

        bundle.primary.person.birth_country = "  israel ".into();
        let plan = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.5), &home(), day(), false)
            .unwrap();
        assert!(plan.find(Block::Primary, "immigration_year").is_none());

        bundle.primary.person.birth_country = "Morocco".into();
        let plan = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.5), &home(), day(), false)
            .unwrap();
        assert_eq!(text_of(&plan, Block::Primary, "immigration_year").as_deref(), Some("1990"));
    }

    #[test]
    fn rtl_text_is_right_aligned_and_ltr_left_aligned() {
        let bundle = sample_bundle(false, Payer::Primary);
        let layout = layout();
        let plan = plan_stamp(&bundle, &layout, &FixedAdvance::em(0.5), &home(), day(), false).unwrap();

        let city = layout.position(Block::Primary, "city").unwrap();
        match plan.find(Block::Primary, "city").unwrap() {
            Placement::Text { x, width, .. } => {
                assert!((x + width - city.x).abs() < 1e-3, "right edge lands on x");
            }
            other => panic!("unexpected {other:?}"),
        }

        let mobile = layout.position(Block::Primary, "mobile").unwrap();
        match plan.find(Block::Primary, "mobile").unwrap() {
            Placement::Text { x, .. } => assert_eq!(*x, mobile.x),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn overlong_text_shrinks_to_max_width() {
        let mut bundle = sample_bundle(false, Payer::Primary);
        bundle.primary.person.address = "א".repeat(90);
        let layout = layout();
        let pos = *layout.position(Block::Primary, "address").unwrap();
        let plan = plan_stamp(&bundle, &layout, &FixedAdvance::em(0.5), &home(), day(), false).unwrap();

        match plan.find(Block::Primary, "address").unwrap() {
            Placement::Text { size, width, x, .. } => {
                assert_eq!(*width, pos.max_width);
                assert!(*size < pos.size);
                assert!((90.0 * 0.5 * size - pos.max_width).abs() < 1e-2);
                assert!((x - (pos.x - pos.max_width)).abs() < 1e-3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn spouse_block_only_with_spouse() {
        let without = plan_stamp(
            &sample_bundle(false, Payer::Primary),
            &layout(),
            &FixedAdvance::em(0.5),
            &home(),
            day(),
            false,
        )
        .unwrap();
        assert!(without.placements.iter().all(|p| p.field().0 != Block::Spouse));

        let with = plan_stamp(
            &sample_bundle(true, Payer::Primary),
            &layout(),
            &FixedAdvance::em(0.5),
            &home(),
            day(),
            false,
        )
        .unwrap();
        assert!(with.find(Block::Spouse, "first_name").is_some());
        assert!(with.find(Block::Spouse, "marital_status").is_none());
    }

    #[test]
    fn payment_block_borrows_from_payer() {
        let bundle = sample_bundle(true, Payer::Spouse);
        let spouse = bundle.spouse.clone().unwrap();
        let plan = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.5), &home(), day(), false).unwrap();
        assert_eq!(
            text_of(&plan, Block::Payment, "cardholder_id"),
            Some(spouse.id_number.clone())
        );
        match plan.find(Block::Payment, "signature").unwrap() {
            Placement::Image { image, .. } => assert_eq!(image, &spouse.signature),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn signature_is_half_width_keeping_aspect() {
        let bundle = sample_bundle(false, Payer::Primary);
        let layout = layout();
        let pos = layout.position(Block::Primary, "signature").unwrap();
        let plan = plan_stamp(&bundle, &layout, &FixedAdvance::em(0.5), &home(), day(), false).unwrap();
        let (px_w, px_h) = bundle.primary.person.signature.dimensions().unwrap();
        match plan.find(Block::Primary, "signature").unwrap() {
            Placement::Image { width, height, x, y, .. } => {
                assert_eq!(*width, pos.max_width * 0.5);
                assert!((height / width - px_h as f32 / px_w as f32).abs() < 1e-4);
                assert_eq!((*x, *y), (pos.x, pos.y));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unregistered_and_empty_fields_are_skipped() {
        let mut bundle = sample_bundle(false, Payer::Primary);
        bundle.primary.person.postal_code = None;
        bundle.primary.person.immigration_year = None;
        let mut layout = layout();
        layout.primary.remove("father_name");
        let plan = plan_stamp(&bundle, &layout, &FixedAdvance::em(0.5), &home(), day(), false).unwrap();
        assert!(plan.find(Block::Primary, "postal_code").is_none());
        assert!(plan.find(Block::Primary, "immigration_year").is_none());
        assert!(plan.find(Block::Primary, "father_name").is_none());
        assert!(plan.find(Block::Primary, "first_name").is_some());
    }

    #[test]
    fn plans_are_deterministic() {
        let bundle = sample_bundle(true, Payer::Primary);
        let a = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.55), &home(), day(), true).unwrap();
        let b = plan_stamp(&bundle, &layout(), &FixedAdvance::em(0.55), &home(), day(), true).unwrap();
        assert_eq!(a, b);
        assert!(a.grid);
    }

    #[test]
    fn missing_glyph_names_the_field() {
        let bundle = sample_bundle(false, Payer::Primary);
        let err = plan_stamp(&bundle, &layout(), &FixedAdvance::without('ו'), &home(), day(), false)
            .unwrap_err();
        match err {
            FormError::MissingGlyph { field, ch, .. } => {
                assert_eq!(ch, 'ו');
                assert!(field.starts_with("primary."), "{field}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
