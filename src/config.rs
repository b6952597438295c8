// merge-watch/src/config.rs

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::converters::ConverterBackend;
use crate::error::ConfigError;

pub const DEFAULT_TEMP_SUFFIX: &str = ".tmp";
pub const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 300;

/// Process settings taken from the environment (`.env` is loaded first by the binary).
#[derive(Debug, Clone)]
pub struct Settings {
    pub watch_folder: PathBuf,
    pub recipient: String,
    pub sender: String,
    pub smtp: Option<SmtpSettings>,
    pub draft_dir: PathBuf,
    pub temp_suffix: String,
    pub convert_timeout: Duration,
    pub converter: ConverterBackend,
    pub soffice_bin: PathBuf,
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable source; empty values count as unset.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let watch_folder = PathBuf::from(get("WATCH_FOLDER").ok_or(ConfigError::MissingVar("WATCH_FOLDER"))?);
        if !watch_folder.is_dir() {
            return Err(ConfigError::WatchFolder(watch_folder));
        }
        let recipient = get("EMAIL_TO").ok_or(ConfigError::MissingVar("EMAIL_TO"))?;
        let sender = get("EMAIL_FROM").unwrap_or_else(|| recipient.clone());

        let smtp = match get("SMTP_SERVER") {
            Some(server) => {
                let port = match get("SMTP_PORT") {
                    None => None,
                    // 0 means the transport default port.
                    Some(raw) if raw.trim() == "0" => None,
                    Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidVar {
                        name: "SMTP_PORT",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?),
                };
                Some(SmtpSettings {
                    server,
                    port,
                    username: get("EMAIL_USER"),
                    password: get("EMAIL_PASS"),
                })
            }
            None => None,
        };

        let draft_dir = get("DRAFT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| watch_folder.join("outbox"));
        let temp_suffix = get("TEMP_SUFFIX").unwrap_or_else(|| DEFAULT_TEMP_SUFFIX.to_string());

        let convert_timeout = match get("CONVERT_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_CONVERT_TIMEOUT_SECS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                Ok(_) => {
                    return Err(ConfigError::InvalidVar {
                        name: "CONVERT_TIMEOUT_SECS",
                        value: raw,
                        reason: "must be positive".into(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::InvalidVar {
                        name: "CONVERT_TIMEOUT_SECS",
                        value: raw,
                        reason: e.to_string(),
                    })
                }
            },
        };

        let converter = match get("CONVERTER") {
            None => ConverterBackend::Office,
            Some(raw) => raw.parse().map_err(|reason| ConfigError::InvalidVar {
                name: "CONVERTER",
                value: raw,
                reason,
            })?,
        };
        let soffice_bin = get("SOFFICE_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("soffice"));

        Ok(Self {
            watch_folder,
            recipient,
            sender,
            smtp,
            draft_dir,
            temp_suffix,
            convert_timeout,
            converter,
            soffice_bin,
        })
    }

    pub fn trace_loaded(&self) {
        info!(
            watch_folder = %self.watch_folder.display(),
            recipient = %self.recipient,
            converter = ?self.converter,
            smtp = self.smtp.is_some(),
            "Loaded settings"
        );
        debug!(?self, "Settings loaded (full debug)");
    }
}
