//! The multi-stage collection pipeline.
//!
//! A [`Session`] walks one applicant through
//! `Primary → [Spouse] → Payment → Preview → Confirmed`. Every forward step
//! validates the submitted screen first and stays put on failure; drafts
//! and validated records accumulate, so going back and forward again never
//! loses input. The stamped PDF exists only while the session is in
//! [`Stage::Preview`].

use crate::config::FormConfig;
use crate::fetch::fetch_bytes;
use crate::output::write_pdf;
use crate::error::FormError;
use crate::progress::ProgressCallback;
use crate::record::{
    Payer, PaymentInput, PaymentRecord, PersonInput, PrimaryApplicant, SpouseRecord,
    SubmissionBundle,
};
use crate::reference::{country_list, CountryList};
use crate::signature::SignatureRenderer;
use crate::stamp::{DocumentStamper, TemplateStamper};
use crate::upload::environment::ClientEnvironment;
use crate::upload::{Dispatcher, HttpUploadBackend, UploadReceipt};
use crate::validate::{validate_payment, validate_primary, validate_spouse, ValidationContext};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Spouse,
    Payment,
    Preview,
    Confirmed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Primary => "primary",
            Stage::Spouse => "spouse",
            Stage::Payment => "payment",
            Stage::Preview => "preview",
            Stage::Confirmed => "confirmed",
        })
    }
}

/// The screen a UI shows for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    PersonalDetails,
    SpouseDetails,
    PaymentDetails,
    DocumentPreview,
    ThankYou,
}

impl Screen {
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Primary => Screen::PersonalDetails,
            Stage::Spouse => Screen::SpouseDetails,
            Stage::Payment => Screen::PaymentDetails,
            Stage::Preview => Screen::DocumentPreview,
            Stage::Confirmed => Screen::ThankYou,
        }
    }

    /// Identifier a router binds to.
    pub fn id(self) -> &'static str {
        match self {
            Screen::PersonalDetails => "personal-details",
            Screen::SpouseDetails => "spouse-details",
            Screen::PaymentDetails => "payment-details",
            Screen::DocumentPreview => "preview",
            Screen::ThankYou => "thank-you",
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// One applicant's trip through the form.
pub struct Session {
    stage: Stage,
    primary_draft: PersonInput,
    spouse_draft: PersonInput,
    payment_draft: PaymentInput,
    primary: Option<PrimaryApplicant>,
    spouse: Option<SpouseRecord>,
    payment: Option<PaymentRecord>,
    bundle: Option<SubmissionBundle>,
    preview: Option<Vec<u8>>,
    receipt: Option<UploadReceipt>,

    stamper: Arc<dyn DocumentStamper>,
    dispatcher: Option<Dispatcher>,
    home_country: Vec<String>,
    countries: Option<CountryList>,
    progress: Option<ProgressCallback>,
    signer: Option<Arc<SignatureRenderer>>,
    clock: Clock,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("stage", &self.stage)
            .field("has_primary", &self.primary.is_some())
            .field("has_spouse", &self.spouse.is_some())
            .field("has_payment", &self.payment.is_some())
            .field("preview_bytes", &self.preview.as_ref().map(Vec::len))
            .finish()
    }
}

impl Session {
    /// A session in [`Stage::Primary`]. Without a dispatcher, `confirm`
    /// always fails.
    pub fn new(stamper: Arc<dyn DocumentStamper>, dispatcher: Option<Dispatcher>) -> Self {
        Self {
            stage: Stage::Primary,
            primary_draft: PersonInput::default(),
            spouse_draft: PersonInput::default(),
            payment_draft: PaymentInput::default(),
            primary: None,
            spouse: None,
            payment: None,
            bundle: None,
            preview: None,
            receipt: None,
            stamper,
            dispatcher,
            home_country: crate::validate::default_home_country(),
            countries: None,
            progress: None,
            signer: None,
            clock: Box::new(Utc::now),
        }
    }

    /// Wire a session from configuration: template stamper, HTTP upload
    /// backend (when an endpoint is set) and the cached country list.
    pub async fn from_config(config: &FormConfig) -> Result<Self, FormError> {
        let stamper = Arc::new(TemplateStamper::new(config)?);
        let client = config.http_client()?;
        let dispatcher = HttpUploadBackend::from_config(config)?.map(|backend| {
            Dispatcher::new(Arc::new(backend), client.clone())
                .with_ip_lookup(config.ip_lookup_url.clone())
                .with_progress(config.progress_callback.clone())
        });
        let countries = match &config.country_list_url {
            Some(url) => country_list(&client, url, config.download_timeout_secs)
                .await
                .cloned(),
            None => None,
        };
        let signer = match &config.signature_font {
            Some(source) => {
                let data = fetch_bytes(&client, source, config.download_timeout_secs).await?;
                Some(Arc::new(SignatureRenderer::from_bytes(source.to_string(), data)?))
            }
            None => None,
        };
        Ok(Self::new(stamper, dispatcher)
            .with_home_country(config.home_country.clone())
            .with_countries(countries)
            .with_progress(config.progress_callback.clone())
            .with_signature_renderer(signer))
    }

    pub fn with_home_country(mut self, names: Vec<String>) -> Self {
        self.home_country = names;
        self
    }

    pub fn with_countries(mut self, countries: Option<CountryList>) -> Self {
        self.countries = countries;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Sign unsigned person screens from the typed name on submit.
    pub fn with_signature_renderer(mut self, signer: Option<Arc<SignatureRenderer>>) -> Self {
        self.signer = signer;
        self
    }

    /// Replace the wall clock (validation "today", form date, upload time).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn screen(&self) -> Screen {
        Screen::for_stage(self.stage)
    }

    pub fn primary_draft(&self) -> &PersonInput {
        &self.primary_draft
    }

    pub fn spouse_draft(&self) -> &PersonInput {
        &self.spouse_draft
    }

    pub fn payment_draft(&self) -> &PaymentInput {
        &self.payment_draft
    }

    pub fn primary(&self) -> Option<&PrimaryApplicant> {
        self.primary.as_ref()
    }

    pub fn spouse(&self) -> Option<&SpouseRecord> {
        self.spouse.as_ref()
    }

    pub fn payment(&self) -> Option<&PaymentRecord> {
        self.payment.as_ref()
    }

    /// The stamped PDF, only while previewing.
    pub fn preview_pdf(&self) -> Option<&[u8]> {
        self.preview.as_deref()
    }

    /// Write the preview to `path`. Fails outside the preview stage.
    pub async fn save_preview(&self, path: impl AsRef<std::path::Path>) -> Result<(), FormError> {
        match &self.preview {
            Some(pdf) => write_pdf(path, pdf.clone()).await,
            None => Err(self.invalid("save the preview")),
        }
    }

    pub fn receipt(&self) -> Option<&UploadReceipt> {
        self.receipt.as_ref()
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Submit the personal-details screen.
    pub fn submit_primary(&mut self, input: PersonInput) -> Result<Stage, FormError> {
        self.expect_stage(Stage::Primary, "submit personal details")?;
        let mut input = input;
        self.autosign(&mut input);
        self.primary_draft = input;

        let now = (self.clock)();
        let ctx = ValidationContext::new(&self.home_country, now)
            .with_countries(self.countries.as_ref());
        let primary = validate_primary(&self.primary_draft, &ctx)?;

        if !primary.include_spouse {
            if self.spouse.take().is_some() {
                info!("Spouse no longer included; dropping spouse record");
            }
            if self.payment_draft.payer == Payer::Spouse {
                self.payment_draft.payer = Payer::Primary;
                self.payment = None;
            }
        }
        let next = if primary.include_spouse {
            Stage::Spouse
        } else {
            Stage::Payment
        };
        self.primary = Some(primary);
        Ok(self.advance(next))
    }

    /// Submit the spouse screen.
    pub fn submit_spouse(&mut self, input: PersonInput) -> Result<Stage, FormError> {
        self.expect_stage(Stage::Spouse, "submit spouse details")?;
        let mut input = input;
        self.autosign(&mut input);
        self.spouse_draft = input;

        let now = (self.clock)();
        let ctx = ValidationContext::new(&self.home_country, now)
            .with_countries(self.countries.as_ref());
        self.spouse = Some(validate_spouse(&self.spouse_draft, &ctx)?);
        Ok(self.advance(Stage::Payment))
    }

    /// Submit the payment screen and stamp the document.
    ///
    /// Stamping failures are logged in detail and surface as a single
    /// [`FormError::StampingFailed`]; the session stays on the payment stage.
    pub async fn submit_payment(&mut self, input: PaymentInput) -> Result<Stage, FormError> {
        self.expect_stage(Stage::Payment, "submit payment details")?;
        self.payment_draft = input;

        let now = (self.clock)();
        let has_spouse = self.spouse_included();
        let payment = validate_payment(&self.payment_draft, has_spouse, now)?;
        self.payment = Some(payment.clone());

        let primary = self.primary.clone().ok_or_else(|| {
            FormError::Internal("payment submitted without a primary applicant".into())
        })?;
        let spouse = if has_spouse { self.spouse.clone() } else { None };
        let bundle = SubmissionBundle::new(primary, spouse, payment)?;

        if let Some(cb) = &self.progress {
            cb.on_stamp_start();
        }
        match self.stamper.stamp(&bundle, now.date_naive()).await {
            Ok(pdf) => {
                if let Some(cb) = &self.progress {
                    cb.on_stamp_complete(pdf.len());
                }
                self.preview = Some(pdf);
                self.bundle = Some(bundle);
                Ok(self.advance(Stage::Preview))
            }
            Err(e) => {
                error!("Stamping failed: {}", e);
                Err(FormError::StampingFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Upload the previewed document and its metadata.
    ///
    /// On failure the session stays in preview so the user can retry.
    pub async fn confirm(&mut self, env: &ClientEnvironment) -> Result<&UploadReceipt, FormError> {
        self.expect_stage(Stage::Preview, "confirm the submission")?;
        let (Some(pdf), Some(bundle)) = (&self.preview, &self.bundle) else {
            return Err(FormError::Internal("preview stage without a document".into()));
        };
        let Some(dispatcher) = &self.dispatcher else {
            warn!("Confirm requested but no upload endpoint is configured");
            return Err(FormError::UploadFailed {
                reason: "no upload endpoint configured".into(),
            });
        };

        let now = (self.clock)();
        let receipt = match dispatcher
            .dispatch_at(pdf, bundle, env, now, uuid::Uuid::new_v4())
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                error!("Upload failed: {}", e);
                return Err(FormError::UploadFailed {
                    reason: e.to_string(),
                });
            }
        };

        self.clear_collected();
        self.advance(Stage::Confirmed);
        Ok(self.receipt.insert(receipt))
    }

    /// Step back one screen. Only legal from spouse, payment and preview.
    pub fn back(&mut self) -> Result<Stage, FormError> {
        let previous = match self.stage {
            Stage::Spouse => Stage::Primary,
            Stage::Payment if self.spouse_included() => Stage::Spouse,
            Stage::Payment => Stage::Primary,
            Stage::Preview => {
                self.preview = None;
                self.bundle = None;
                Stage::Payment
            }
            Stage::Primary | Stage::Confirmed => {
                return Err(self.invalid("go back"));
            }
        };
        Ok(self.advance(previous))
    }

    /// Discard everything and start over.
    pub fn reset(&mut self) {
        self.clear_collected();
        self.receipt = None;
        self.advance(Stage::Primary);
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn spouse_included(&self) -> bool {
        self.primary.as_ref().is_some_and(|p| p.include_spouse) && self.spouse.is_some()
    }

    fn autosign(&self, draft: &mut PersonInput) {
        let Some(signer) = &self.signer else {
            return;
        };
        if let Err(e) = draft.autosign(signer) {
            warn!("Automatic signature failed, leaving the screen unsigned: {}", e);
        }
    }

    fn clear_collected(&mut self) {
        self.primary_draft = PersonInput::default();
        self.spouse_draft = PersonInput::default();
        self.payment_draft = PaymentInput::default();
        self.primary = None;
        self.spouse = None;
        self.payment = None;
        self.bundle = None;
        self.preview = None;
    }

    fn advance(&mut self, next: Stage) -> Stage {
        info!("Stage {} → {}", self.stage, next);
        self.stage = next;
        next
    }

    fn expect_stage(&self, stage: Stage, action: &str) -> Result<(), FormError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &str) -> FormError {
        FormError::InvalidTransition {
            stage: self.stage.to_string(),
            action: action.to_string(),
        }
    }
}
