//! Document stamping: place a submission's values onto the blank form PDF.
//!
//! Stamping runs in two steps. [`plan::plan_stamp`] decides what goes where
//! (formatting, RTL alignment, shrink-to-fit, signature sizing) against the
//! [`font::TextMeasure`] seam; [`render::render`] then writes the plan into a
//! fresh `lopdf` document loaded from the cached template bytes. Either step
//! failing fails the whole stamp: no partial PDF is ever returned.

pub mod font;
pub mod format;
pub mod grid;
pub mod layout;
pub mod plan;
pub mod render;

use crate::config::{FormConfig, ResourceSource};
use crate::error::FormError;
use crate::fetch::{fetch_bytes, fetch_pdf};
use crate::record::SubmissionBundle;
use async_trait::async_trait;
use chrono::NaiveDate;
use font::EmbeddedFont;
use layout::FieldLayout;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub use font::TextMeasure;
pub use layout::{Block, Direction, FieldPosition};
pub use plan::{Placement, StampPlan};

/// Produces the final PDF for a bundle.
#[async_trait]
pub trait DocumentStamper: Send + Sync {
    /// Stamp `bundle`, dating the form `stamped_on`.
    async fn stamp(
        &self,
        bundle: &SubmissionBundle,
        stamped_on: NaiveDate,
    ) -> Result<Vec<u8>, FormError>;
}

/// Template and font, fetched once per stamper.
struct Resources {
    template: Vec<u8>,
    font: EmbeddedFont,
}

/// Stamps onto a PDF template fetched from a URL or path.
pub struct TemplateStamper {
    template: ResourceSource,
    text_font: ResourceSource,
    layout: Arc<FieldLayout>,
    home_country: Arc<[String]>,
    grid: bool,
    client: reqwest::Client,
    timeout_secs: Option<u64>,
    resources: OnceCell<Arc<Resources>>,
}

impl TemplateStamper {
    pub fn new(config: &FormConfig) -> Result<Self, FormError> {
        let grid = if config.debug_grid && !cfg!(debug_assertions) {
            warn!("Calibration grid requested in a release build; ignoring");
            false
        } else {
            config.debug_grid
        };
        Ok(Self {
            template: config.template.clone(),
            text_font: config.text_font.clone(),
            layout: Arc::new(config.layout.clone()),
            home_country: config.home_country.clone().into(),
            grid,
            client: config.http_client()?,
            timeout_secs: config.download_timeout_secs,
            resources: OnceCell::new(),
        })
    }

    async fn resources(&self) -> Result<Arc<Resources>, FormError> {
        self.resources
            .get_or_try_init(|| async {
                let template = fetch_pdf(&self.client, &self.template, self.timeout_secs).await?;
                let font_bytes =
                    fetch_bytes(&self.client, &self.text_font, self.timeout_secs).await?;
                let font = EmbeddedFont::from_bytes(font_label(&self.text_font), font_bytes)?;
                info!(
                    "Loaded template ({} bytes) and font {}",
                    template.len(),
                    font.name()
                );
                Ok(Arc::new(Resources { template, font }))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl DocumentStamper for TemplateStamper {
    async fn stamp(
        &self,
        bundle: &SubmissionBundle,
        stamped_on: NaiveDate,
    ) -> Result<Vec<u8>, FormError> {
        let resources = self.resources().await?;
        let layout = Arc::clone(&self.layout);
        let home_country = Arc::clone(&self.home_country);
        let bundle = bundle.clone();
        let grid = self.grid;

        // Shaping, image decoding and PDF serialisation are CPU-bound.
        let pdf = tokio::task::spawn_blocking(move || {
            let plan = plan::plan_stamp(
                &bundle,
                &layout,
                &resources.font,
                &home_country,
                stamped_on,
                grid,
            )?;
            render::render(&resources.template, &plan, &resources.font)
        })
        .await
        .map_err(|e| FormError::Internal(format!("stamping task failed: {e}")))??;

        debug!("Stamped PDF is {} bytes", pdf.len());
        Ok(pdf)
    }
}

fn font_label(source: &ResourceSource) -> String {
    let raw = source.to_string();
    raw.rsplit(['/', '\\'])
        .next()
        .and_then(|file| file.split('.').next())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("FormFont")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_label_uses_file_stem() {
        assert_eq!(
            font_label(&ResourceSource::Url("https://cdn.example.org/f/Rubik-Regular.ttf".into())),
            "Rubik-Regular"
        );
        assert_eq!(
            font_label(&ResourceSource::Path("/usr/share/fonts/DejaVuSans.ttf".into())),
            "DejaVuSans"
        );
    }
}
