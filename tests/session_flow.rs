//! Whole-session tests through the public API.
//!
//! The stamping test needs a TrueType font that covers Hebrew. It looks in
//! `FORMSTAMP_TEST_FONT` and a few system locations and prints SKIP when
//! none is usable.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use image::{Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, Stream};
use membership_form::signature::encode_png;
use membership_form::stamp::font::EmbeddedFont;
use membership_form::upload::backend::PdfUpload;
use membership_form::upload::StoredObject;
use membership_form::{
    ClientEnvironment, Dispatcher, DocumentStamper, FormConfig, FormError, Payer, PaymentInput,
    PersonInput, ResourceSource, Screen, Session, Stage, SubmissionBundle, UploadBackend,
};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn signed(mut person: PersonInput) -> PersonInput {
    let mut ink = RgbaImage::from_pixel(150, 50, Rgba([0, 0, 0, 0]));
    for x in 10..140 {
        ink.put_pixel(x, 25 + (x % 7), Rgba([20, 20, 60, 255]));
    }
    person.set_signature(encode_png(&ink).unwrap());
    person
}

fn primary(include_spouse: bool) -> PersonInput {
    signed(PersonInput {
        id_number: "123456782".into(),
        first_name: "Dana".into(),
        last_name: "Levi".into(),
        father_name: "Moshe".into(),
        birth_date: "05/11/1985".into(),
        gender: "נקבה".into(),
        marital_status: "נשואה".into(),
        birth_country: "ישראל".into(),
        address: "רחוב הרצל 12".into(),
        city: "חיפה".into(),
        postal_code: "3303912".into(),
        mobile: "052-1234567".into(),
        email: "dana.levi@example.com".into(),
        include_spouse,
        ..PersonInput::default()
    })
}

fn spouse() -> PersonInput {
    signed(PersonInput {
        id_number: "00018".into(),
        first_name: "Avi".into(),
        last_name: "Levi".into(),
        father_name: "Yosef".into(),
        birth_date: "1983-02-14".into(),
        gender: "male".into(),
        birth_country: "France".into(),
        immigration_year: "2001".into(),
        mobile: "0547654321".into(),
        email: "avi@example.com".into(),
        ..PersonInput::default()
    })
}

fn payment(payer: Payer) -> PaymentInput {
    PaymentInput {
        cardholder_name: "Dana Levi".into(),
        payer,
        card_number: "4111-1111-1111-1111".into(),
        expiry: "08/29".into(),
        cvv: "123".into(),
    }
}

fn clock() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

struct CannedStamper;

#[async_trait]
impl DocumentStamper for CannedStamper {
    async fn stamp(
        &self,
        bundle: &SubmissionBundle,
        stamped_on: NaiveDate,
    ) -> Result<Vec<u8>, FormError> {
        Ok(format!("%PDF-1.7 {} {}", bundle.payer_id_number(), stamped_on).into_bytes())
    }
}

#[derive(Default)]
struct MemoryBackend {
    reject: bool,
    objects: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl UploadBackend for MemoryBackend {
    async fn upload_pdf(&self, upload: PdfUpload<'_>) -> Result<StoredObject, FormError> {
        if self.reject {
            return Err(FormError::UploadRejected {
                object: upload.file_name.into(),
                status: 400,
                detail: "bad request".into(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .push((upload.file_name.into(), Value::Null));
        Ok(StoredObject {
            url: format!("mem://{}", upload.file_name),
        })
    }

    async fn upload_metadata(
        &self,
        upload_context: &str,
        metadata: &Value,
        _pdf_url: &str,
    ) -> Result<StoredObject, FormError> {
        self.objects
            .lock()
            .unwrap()
            .push((format!("{upload_context}.json"), metadata.clone()));
        Ok(StoredObject {
            url: format!("mem://{upload_context}.json"),
        })
    }
}

fn session(backend: Arc<MemoryBackend>) -> Session {
    let dispatcher = Dispatcher::new(backend, reqwest::Client::new());
    Session::new(Arc::new(CannedStamper), Some(dispatcher)).with_clock(clock)
}

// ── Session flow ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn couple_paid_by_spouse_is_confirmed() {
    let backend = Arc::new(MemoryBackend::default());
    let mut s = session(backend.clone());

    assert_eq!(assert_ok!(s.submit_primary(primary(true))), Stage::Spouse);
    assert_eq!(s.screen(), Screen::SpouseDetails);
    assert_eq!(assert_ok!(s.submit_spouse(spouse())), Stage::Payment);
    assert_eq!(
        assert_ok!(s.submit_payment(payment(Payer::Spouse)).await),
        Stage::Preview
    );
    assert_eq!(
        s.preview_pdf().unwrap(),
        b"%PDF-1.7 000000018 2026-10-19".as_slice(),
        "payer is the spouse and the form is dated by the session clock"
    );

    let receipt = assert_ok!(s.confirm(&ClientEnvironment::default()).await).clone();
    assert_eq!(s.stage(), Stage::Confirmed);
    assert_eq!(s.screen().id(), "thank-you");
    assert!(s.preview_pdf().is_none());
    assert!(s.primary().is_none(), "collected data released after upload");
    assert_eq!(
        receipt.context.as_str(),
        receipt.pdf_url.trim_start_matches("mem://").trim_end_matches(".pdf")
    );

    let objects = backend.objects.lock().unwrap();
    assert_eq!(objects.len(), 2);
    let metadata = &objects[1].1;
    assert_eq!(metadata["formData"]["spouse"]["id_number"], "000000018");
    assert_eq!(metadata["formData"]["spouse"]["immigration_year"], 2001);
    assert_eq!(metadata["environment"]["ipAddress"], "unknown");

    assert!(matches!(s.back(), Err(FormError::InvalidTransition { .. })));
}

#[tokio::test]
async fn rejected_upload_keeps_preview_for_retry() {
    let backend = Arc::new(MemoryBackend {
        reject: true,
        ..MemoryBackend::default()
    });
    let mut s = session(backend);
    assert_ok!(s.submit_primary(primary(false)));
    assert_ok!(s.submit_payment(payment(Payer::Primary)).await);

    let err = assert_err!(s.confirm(&ClientEnvironment::default()).await);
    assert!(matches!(err, FormError::UploadFailed { .. }));
    assert_eq!(
        err.user_message(),
        "The form could not be submitted. Please try again."
    );
    assert_eq!(s.stage(), Stage::Preview);
    assert!(s.preview_pdf().is_some());
}

#[tokio::test]
async fn spouse_payer_without_spouse_is_a_field_error() {
    let mut s = session(Arc::new(MemoryBackend::default()));
    assert_ok!(s.submit_primary(primary(false)));
    let err = assert_err!(s.submit_payment(payment(Payer::Spouse)).await);
    assert!(err.field_errors().unwrap().has("payer"));
    assert_eq!(s.stage(), Stage::Payment);
}

#[tokio::test]
async fn invalid_identity_number_blocks_the_first_screen() {
    let mut s = session(Arc::new(MemoryBackend::default()));
    let mut input = primary(false);
    input.id_number = "123456789".into();
    let err = assert_err!(s.submit_primary(input));
    let errors = err.field_errors().unwrap();
    assert!(errors.has("id_number"));
    assert_eq!(errors.len(), 1, "{errors}");
    assert_eq!(s.stage(), Stage::Primary);
}

// ── Real stamping ────────────────────────────────────────────────────────────

fn hebrew_font() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::env::var_os("FORMSTAMP_TEST_FONT")
        .map(PathBuf::from)
        .into_iter()
        .collect();
    candidates.extend(
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/noto/NotoSansHebrew-Regular.ttf",
        ]
        .into_iter()
        .map(PathBuf::from),
    );
    candidates.into_iter().find(|path| {
        std::fs::read(path)
            .ok()
            .and_then(|data| EmbeddedFont::from_bytes("probe", data).ok())
            .is_some_and(|font| font.shape("אבגדהוזחטיכלמנסעפצקרשת Dana Levi 0123456789 /.-").is_ok())
    })
}

/// One A4 page; MediaBox inherited from the page tree.
fn a4_template() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"0 0 m 100 100 l S".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {},
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(595.28),
                Object::Real(841.89),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

#[tokio::test]
async fn stamps_real_template_and_writes_preview() {
    let Some(font) = hebrew_font() else {
        println!("SKIP — no Hebrew-capable TrueType font found (set FORMSTAMP_TEST_FONT)");
        return;
    };
    let mut template = tempfile::NamedTempFile::new().unwrap();
    template.write_all(&a4_template()).unwrap();

    let config = FormConfig::builder()
        .template(ResourceSource::Path(template.path().to_path_buf()))
        .text_font(ResourceSource::Path(font))
        .build()
        .unwrap();
    let mut s = assert_ok!(Session::from_config(&config).await).with_clock(clock);

    assert_ok!(s.submit_primary(primary(true)));
    assert_ok!(s.submit_spouse(spouse()));
    assert_ok!(s.submit_payment(payment(Payer::Primary)).await);

    let pdf = s.preview_pdf().unwrap().to_vec();
    let doc = Document::load_mem(&pdf).unwrap();
    let page_id = doc.get_pages()[&1];
    let page = doc.get_dictionary(page_id).unwrap();
    let resources = match page.get(b"Resources").unwrap() {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        other => other.as_dict().unwrap(),
    };
    let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
    let font_id = fonts.get(b"FmText").unwrap().as_reference().unwrap();
    let type0 = doc.get_dictionary(font_id).unwrap();
    assert_eq!(type0.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");

    let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
    assert_eq!(xobjects.len(), 3, "primary, spouse and payment signatures");

    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("preview.pdf");
    assert_ok!(s.save_preview(&path).await);
    assert_eq!(std::fs::read(&path).unwrap(), pdf);

    // Stamping is repeatable for the same bundle and date.
    assert_ok!(s.back());
    assert_ok!(s.submit_payment(payment(Payer::Primary)).await);
    assert_eq!(s.preview_pdf().unwrap(), pdf.as_slice());
}

#[tokio::test]
async fn missing_template_surfaces_one_stamping_error() {
    // The template is fetched before the font, so the font path is never read.
    let config = FormConfig::builder()
        .template(ResourceSource::Path("/definitely/not/here.pdf".into()))
        .text_font(ResourceSource::Path("/definitely/not/here.ttf".into()))
        .build()
        .unwrap();
    let mut s = assert_ok!(Session::from_config(&config).await).with_clock(clock);
    assert_ok!(s.submit_primary(primary(false)));
    let err = assert_err!(s.submit_payment(payment(Payer::Primary)).await);
    assert!(matches!(err, FormError::StampingFailed { .. }), "{err:?}");
    assert_eq!(s.stage(), Stage::Payment);
}
