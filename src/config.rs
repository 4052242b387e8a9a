use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// What a round does when some of its image calls fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePolicy {
    /// Any failed image fails the whole round.
    #[default]
    AllOrNothing,
    /// Offers whose image failed are dropped; the round fails only if none succeed.
    KeepSucceeded,
}

impl std::str::FromStr for ImagePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_or_nothing" => Ok(ImagePolicy::AllOrNothing),
            "keep_succeeded" => Ok(ImagePolicy::KeepSucceeded),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub call_timeout: Duration,
    pub image_policy: ImagePolicy,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential)?;

        let api_base = lookup("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let text_model = lookup("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        let image_model = lookup("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());

        let call_timeout = match lookup("OFFER_CALL_TIMEOUT_SECS") {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Invalid { key: "OFFER_CALL_TIMEOUT_SECS", value: v }),
            },
            None => Duration::from_secs(60),
        };

        let image_policy = match lookup("OFFER_IMAGE_POLICY") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key: "OFFER_IMAGE_POLICY", value: v.clone() })?,
            None => ImagePolicy::default(),
        };

        let port = match lookup("PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { key: "PORT", value: v.clone() })?,
            None => 8080,
        };

        Ok(Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            text_model,
            image_model,
            call_timeout,
            image_policy,
            port,
        })
    }

    /// Key prefix safe to print in logs.
    pub fn masked_key(&self) -> String {
        let shown: String = self.api_key.chars().take(4).collect();
        format!("{shown}***")
    }
}
