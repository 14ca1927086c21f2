use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context};

use crate::text_util::split_list;

pub const DEFAULT_PORT: u16 = 7071;
pub const DEFAULT_REGION: &str = "USWest";

/// How upstream provisioning failures are reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponses {
    /// Failed PlayFab calls answer `200 null`, same as a skipped request.
    Silent,
    /// Failed PlayFab calls answer `502` with a typed error body.
    Explicit,
}

impl FromStr for ErrorResponses {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(ErrorResponses::Silent),
            "explicit" => Ok(ErrorResponses::Explicit),
            other => Err(anyhow!("unknown error response mode '{}'", other)),
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub title_id: String,
    pub developer_secret_key: String,
    pub api_url: String,
    pub preferred_regions: Vec<String>,
    pub error_responses: ErrorResponses,
    pub session_store_dir: Option<PathBuf>,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            title_id: "TITLE".to_string(),
            developer_secret_key: "SECRET".to_string(),
            api_url: playfab_url("TITLE"),
            preferred_regions: vec![DEFAULT_REGION.to_string()],
            error_responses: ErrorResponses::Silent,
            session_store_dir: None,
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Settings> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let title_id = lookup("PLAYFAB_TITLE_ID").unwrap_or_default();
        let developer_secret_key = lookup("PLAYFAB_DEVELOPER_SECRET_KEY").unwrap_or_default();
        if title_id.is_empty() || developer_secret_key.is_empty() {
            log::warn!("PlayFab credentials are not fully configured, outbound calls will fail");
        }
        let api_url = lookup("PLAYFAB_API_URL")
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| playfab_url(title_id.as_str()));
        let mut preferred_regions = lookup("PREFERRED_REGIONS")
            .map(|r| split_list(r.as_str()))
            .unwrap_or_default();
        if preferred_regions.is_empty() {
            preferred_regions.push(DEFAULT_REGION.to_string());
        }
        let error_responses = match lookup("ERROR_RESPONSES") {
            Some(mode) => mode.parse()?,
            None => ErrorResponses::Silent,
        };
        let session_store_dir = lookup("SESSION_STORE_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);
        let port = match lookup("FUNCTIONS_CUSTOMHANDLER_PORT").or_else(|| lookup("PORT")) {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("Invalid port '{}'", port))?,
            None => DEFAULT_PORT,
        };
        anyhow::Ok(Settings {
            title_id,
            developer_secret_key,
            api_url,
            preferred_regions,
            error_responses,
            session_store_dir,
            port,
        })
    }
}

fn playfab_url(title_id: &str) -> String {
    format!("https://{}.playfabapi.com", title_id)
}
