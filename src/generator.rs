//! Offer rounds: one text generation call, then one image call per returned offer.

use std::{sync::Arc, time::Duration, future::Future};

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{info, error, warn};

use crate::{
    config::ImagePolicy,
    error::OfferError,
    gemini::{GeminiError, GenerativeBackend, Part},
    models::{FormState, GeneratedOfferText, Offer},
};

pub const OFFERS_PER_ROUND: usize = 3;
const NOT_PROVIDED: &str = "Not provided";
const AUTO_DETECTED: &str = "Auto-detected based on other details";

pub fn build_offer_prompt(form: &FormState) -> String {
    let occasion = if form.auto_detect_occasion { AUTO_DETECTED } else { form.occasion.trim() };
    let business_name = form.business_name().unwrap_or(NOT_PROVIDED);
    let location = form.location().unwrap_or(NOT_PROVIDED);
    let length = form.post_length;
    let richness = form.keyword_richness;

    format!(
        "You are an expert marketing copywriter and social media strategist. Based on the following business details, generate {OFFERS_PER_ROUND} unique and compelling promotional post offers.\n\n\
        Business Details:\n\
        - Business Name: {business_name}\n\
        - Location: {location}\n\
        - Business Type: {business_type}\n\
        - Occasion for Promotion: {occasion}\n\
        - Keywords or Special Wishes: {keywords}\n\
        - Desired Post Length: {length}\n\
        - Keyword Richness (1-10 scale): {richness}\n\n\
        For EACH of the {OFFERS_PER_ROUND} offers, you MUST provide the following in the specified JSON format:\n\
        1. A short, catchy \"title\".\n\
        2. The full post \"body\". This should be '{length}' in length, incorporate keywords with a richness level of {richness}/10, and must include relevant emojis and SEO-friendly hashtags.\n\
        3. A detailed, photorealistic \"imagePrompt\" for an AI image generator. It must describe a visually stunning, high-quality image that captures the essence of the offer. Avoid generic descriptions. Be creative and specific.",
        business_type = form.business_type.trim(),
        keywords = form.keywords.trim(),
    )
}

/// Response schema handed to the text model.
pub fn offer_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "offers": {
                "type": "ARRAY",
                "description": format!("An array of {OFFERS_PER_ROUND} unique promotional offers."),
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": {
                            "type": "STRING",
                            "description": "A short, catchy title for the promotional post."
                        },
                        "body": {
                            "type": "STRING",
                            "description": "The full body of the post, including emojis and SEO keywords/hashtags."
                        },
                        "imagePrompt": {
                            "type": "STRING",
                            "description": "A detailed, photorealistic prompt for an AI image generator to create a visually stunning image representing the offer."
                        }
                    },
                    "required": ["title", "body", "imagePrompt"]
                }
            }
        },
        "required": ["offers"]
    })
}

#[derive(Debug, Deserialize)]
struct OffersEnvelope {
    offers: Vec<GeneratedOfferText>,
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Decodes the text model's answer. Any shape problem is a format error.
pub fn parse_offers(text: &str) -> Result<Vec<GeneratedOfferText>, OfferError> {
    let envelope: OffersEnvelope = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        error!("❌ Offer text did not match the schema: {}", e);
        OfferError::GenerationFormat
    })?;
    if envelope.offers.is_empty() {
        error!("❌ Model returned an empty offers array");
        return Err(OfferError::GenerationFormat);
    }
    if envelope.offers.len() != OFFERS_PER_ROUND {
        warn!("⚠️ Expected {} offers, model returned {}", OFFERS_PER_ROUND, envelope.offers.len());
    }
    Ok(envelope.offers)
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, GeminiError>
where
    F: Future<Output = Result<T, GeminiError>>,
{
    tokio::time::timeout(limit, call).await.unwrap_or(Err(GeminiError::Timeout(limit)))
}

pub async fn generate_text_offers(
    backend: &dyn GenerativeBackend,
    form: &FormState,
    limit: Duration,
) -> Result<Vec<GeneratedOfferText>, OfferError> {
    let prompt = build_offer_prompt(form);
    let schema = offer_schema();
    let text = with_timeout(limit, backend.generate_text(&prompt, &schema)).await.map_err(|e| {
        error!("❌ Error during text generation: {}", e);
        OfferError::GenerationFailure
    })?;
    parse_offers(&text)
}

fn sniff_format(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "PNG",
        Ok(image::ImageFormat::Jpeg) => "JPEG",
        Ok(_) => "Other",
        Err(_) => "Unknown",
    }
}

/// Builds a data URI from the first inline image part.
pub fn image_data_uri(parts: &[Part]) -> Result<String, OfferError> {
    let inline = parts.iter().find_map(|p| match p {
        Part::Inline { inline_data } if !inline_data.data.is_empty() => Some(inline_data),
        _ => None,
    });
    let Some(inline) = inline else {
        warn!("⚠️ No inline image data found in response");
        return Err(OfferError::ImageMissing);
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| {
            error!("❌ Inline image payload is not valid base64: {}", e);
            OfferError::ImageMissing
        })?;
    info!(
        "🖼️ Extracted {} image ({} bytes, declared {})",
        sniff_format(&bytes), bytes.len(), inline.mime_type
    );
    Ok(format!("data:{};base64,{}", inline.mime_type, inline.data))
}

pub async fn generate_image_for_prompt(
    backend: &dyn GenerativeBackend,
    prompt: &str,
    limit: Duration,
) -> Result<String, OfferError> {
    let parts = with_timeout(limit, backend.generate_image(prompt)).await.map_err(|e| {
        error!("❌ Error generating image for prompt {:?}: {}", prompt, e);
        OfferError::ImageGenerationFailure
    })?;
    image_data_uri(&parts)
}

/// Runs offer rounds against an injected backend.
pub struct OfferGenerator {
    backend: Arc<dyn GenerativeBackend>,
    call_timeout: Duration,
    policy: ImagePolicy,
}

impl OfferGenerator {
    pub fn new(backend: Arc<dyn GenerativeBackend>, call_timeout: Duration, policy: ImagePolicy) -> Self {
        Self { backend, call_timeout, policy }
    }

    /// One round. Offers come back in the order the text model listed them.
    pub async fn generate_round(&self, form: &FormState) -> Result<Vec<Offer>, OfferError> {
        info!(
            "🚀 Generating offers for {} (occasion: {})",
            form.business_type,
            if form.auto_detect_occasion { "auto-detect" } else { form.occasion.as_str() }
        );

        let texts = generate_text_offers(self.backend.as_ref(), form, self.call_timeout).await?;
        info!("✅ Received {} text offers, requesting images", texts.len());

        let mut tasks = JoinSet::new();
        for (index, text) in texts.iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let prompt = text.image_prompt.clone();
            let limit = self.call_timeout;
            tasks.spawn(async move {
                (index, generate_image_for_prompt(backend.as_ref(), &prompt, limit).await)
            });
        }

        let mut images: Vec<Option<String>> = vec![None; texts.len()];
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| {
                error!("❌ Image task did not complete: {}", e);
                OfferError::ImageGenerationFailure
            })?;
            match result {
                Ok(uri) => images[index] = Some(uri),
                Err(e) if self.policy == ImagePolicy::AllOrNothing => {
                    // dropping the set aborts the images still in flight
                    error!("❌ Image {} failed, abandoning round: {}", index, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("⚠️ Image {} failed, dropping offer: {}", index, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let offers: Vec<Offer> = texts
            .into_iter()
            .zip(images)
            .filter_map(|(text, image)| image.map(|uri| Offer::from_text(text, uri)))
            .collect();

        if offers.is_empty() {
            return Err(first_error.unwrap_or(OfferError::ImageGenerationFailure));
        }
        info!("✅ Round complete with {} offers", offers.len());
        Ok(offers)
    }
}
