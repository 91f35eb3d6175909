//! Reference data: the list of countries a birth country is checked against.
//!
//! The list is fetched at most once per process and cached. A failed fetch
//! is logged and degrades to "no list", in which case any non-empty birth
//! country is accepted.

use crate::config::ResourceSource;
use crate::error::FormError;
use crate::fetch::fetch_bytes;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Known country names, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryList {
    names: Vec<String>,
    folded: Vec<String>,
}

impl CountryList {
    pub fn new(names: Vec<String>) -> Self {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        let folded = names.iter().map(|n| n.to_lowercase()).collect();
        Self { names, folded }
    }

    /// Parse a JSON array of names.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FormError> {
        let names: Vec<String> = serde_json::from_slice(bytes)
            .map_err(|e| FormError::Internal(format!("country list is not a JSON array: {e}")))?;
        Ok(Self::new(names))
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.folded.iter().any(|n| *n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

static COUNTRIES: OnceCell<Option<CountryList>> = OnceCell::const_new();

/// The process-wide country list, fetched from `url` on first use.
///
/// The first caller's URL wins; later calls return the cached result.
pub async fn country_list(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: Option<u64>,
) -> Option<&'static CountryList> {
    COUNTRIES
        .get_or_init(|| load(client, url, timeout_secs))
        .await
        .as_ref()
}

async fn load(client: &reqwest::Client, url: &str, timeout_secs: Option<u64>) -> Option<CountryList> {
    let source = match ResourceSource::parse(url) {
        Ok(source) => source,
        Err(e) => {
            warn!("Country list disabled: {}", e);
            return None;
        }
    };
    match fetch_bytes(client, &source, timeout_secs)
        .await
        .and_then(|bytes| CountryList::from_json(&bytes))
    {
        Ok(list) => {
            debug!("Loaded {} countries from {}", list.len(), url);
            Some(list)
        }
        Err(e) => {
            warn!("Country list unavailable, accepting any birth country: {}", e);
            None
        }
    }
}
