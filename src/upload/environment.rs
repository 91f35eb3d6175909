//! Client environment recorded alongside each submission.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Recorded when the public IP cannot be determined.
pub const UNKNOWN_IP: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// What the host (browser shell, kiosk, CLI) knows about the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientEnvironment {
    pub user_agent: String,
    pub language: String,
    pub timezone: String,
    pub screen: Option<Geometry>,
    pub window: Option<Geometry>,
}

/// The environment block of the uploaded metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRecord {
    pub ip_address: String,
    #[serde(flatten)]
    pub client: ClientEnvironment,
}

#[derive(Deserialize)]
struct IpResponse {
    ip: String,
}

/// Ask the lookup service for the public IP, falling back to [`UNKNOWN_IP`].
pub async fn lookup_ip(client: &reqwest::Client, url: &str) -> String {
    let result = async {
        let response = client.get(url).send().await?.error_for_status()?;
        response.json::<IpResponse>().await
    }
    .await;
    match result {
        Ok(body) if !body.ip.trim().is_empty() => {
            debug!("Public IP resolved");
            body.ip.trim().to_string()
        }
        Ok(_) => {
            warn!("IP lookup returned an empty address");
            UNKNOWN_IP.to_string()
        }
        Err(e) => {
            warn!("IP lookup failed, recording '{}': {}", UNKNOWN_IP, e);
            UNKNOWN_IP.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_serialises_flat_camel_case() {
        let record = EnvironmentRecord {
            ip_address: UNKNOWN_IP.into(),
            client: ClientEnvironment {
                user_agent: "formstamp/0.1".into(),
                language: "he-IL".into(),
                timezone: "Asia/Jerusalem".into(),
                screen: Some(Geometry {
                    width: 1920,
                    height: 1080,
                }),
                window: None,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ipAddress"], "unknown");
        assert_eq!(json["userAgent"], "formstamp/0.1");
        assert_eq!(json["screen"]["width"], 1920);
        assert!(json["window"].is_null());
    }

    #[tokio::test]
    async fn unreachable_lookup_yields_sentinel() {
        let ip = lookup_ip(&reqwest::Client::new(), "http://127.0.0.1:9/ip").await;
        assert_eq!(ip, UNKNOWN_IP);
    }
}
