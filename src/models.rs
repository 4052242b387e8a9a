use serde::{Serialize, Deserialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::FormError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl std::fmt::Display for PostLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self { PostLength::Short => "Short", PostLength::Medium => "Medium", PostLength::Long => "Long" };
        f.write_str(s)
    }
}

/// Campaign parameters as entered in the offer form.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub business_type: String,
    #[serde(default)]
    pub occasion: String,
    #[serde(default)]
    pub auto_detect_occasion: bool,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub post_length: PostLength,
    // range inputs submit "5" rather than 5
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_richness")]
    pub keyword_richness: u8,
}

fn default_richness() -> u8 { 5 }

impl Default for FormState {
    fn default() -> Self {
        Self {
            business_name: None,
            location: None,
            business_type: String::new(),
            occasion: String::new(),
            auto_detect_occasion: false,
            keywords: String::new(),
            post_length: PostLength::Medium,
            keyword_richness: default_richness(),
        }
    }
}

fn is_blank(s: &str) -> bool { s.trim().is_empty() }

impl FormState {
    pub fn validate(&self) -> Result<(), FormError> {
        if is_blank(&self.business_type) {
            return Err(FormError::MissingField("businessType"));
        }
        if !self.auto_detect_occasion && is_blank(&self.occasion) {
            return Err(FormError::MissingField("occasion"));
        }
        if is_blank(&self.keywords) {
            return Err(FormError::MissingField("keywords"));
        }
        if !(1..=10).contains(&self.keyword_richness) {
            return Err(FormError::RichnessOutOfRange(self.keyword_richness));
        }
        Ok(())
    }

    /// Optional field with blank input treated as absent.
    pub fn business_name(&self) -> Option<&str> {
        self.business_name.as_deref().filter(|s| !is_blank(s))
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref().filter(|s| !is_blank(s))
    }
}

/// One entry of the text model's `offers` array.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedOfferText {
    pub title: String,
    pub body: String,
    pub image_prompt: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub image_prompt: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn from_text(text: GeneratedOfferText, image_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: text.title,
            body: text.body,
            image_prompt: text.image_prompt,
            image_url,
            created_at: Utc::now(),
        }
    }
}
