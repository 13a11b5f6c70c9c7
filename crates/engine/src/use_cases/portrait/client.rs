//! Portrait generation with payload validation.

use std::io::Cursor;
use std::sync::Arc;

use hearthtalk_domain::{FailureReason, GenerationResult, NpcDescriptor};
use image::ImageFormat;

use crate::infrastructure::ports::{ImageGenError, ImageGenPort, ImageRequest};

pub const DEFAULT_STYLE: &str =
    "3D rendered, high quality, detailed fantasy RPG character portrait, head and shoulders";

pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "blurry, low quality, deformed, extra limbs, text, watermark, signature, cropped face";

#[derive(Clone)]
pub struct PortraitClient {
    images: Arc<dyn ImageGenPort>,
    size: u32,
    style: String,
}

impl PortraitClient {
    pub fn new(images: Arc<dyn ImageGenPort>, size: u32) -> Self {
        Self {
            images,
            size,
            style: DEFAULT_STYLE.to_string(),
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn build_request(&self, npc: &NpcDescriptor) -> ImageRequest {
        let mut prompt = format!("A portrait of {}, {}.", npc.name, npc.kind_phrase());
        if !npc.description.is_empty() {
            prompt.push_str(&format!(" Description: {}.", npc.description));
        }
        prompt.push(' ');
        prompt.push_str(&self.style);

        ImageRequest {
            prompt,
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            width: self.size,
            height: self.size,
        }
    }

    /// One generation attempt. Returns PNG bytes that are known to decode.
    pub async fn generate(&self, npc: &NpcDescriptor) -> GenerationResult<Vec<u8>> {
        let request = self.build_request(npc);

        let result = match self.images.generate(request).await {
            Ok(result) => result,
            Err(e) => {
                let reason = classify_image_error(&e);
                tracing::warn!(npc_id = %npc.id, error = %e, transient = reason.is_transient(), "Portrait generation failed");
                return GenerationResult::failure(reason);
            }
        };

        match validate_image(&result.image_data) {
            Ok(png) => GenerationResult::Success(png),
            Err(reason) => {
                tracing::warn!(
                    npc_id = %npc.id,
                    reported_format = %result.format,
                    bytes = result.image_data.len(),
                    %reason,
                    "Rejected portrait payload"
                );
                GenerationResult::failure(reason)
            }
        }
    }
}

fn classify_image_error(error: &ImageGenError) -> FailureReason {
    match error {
        ImageGenError::Timeout => FailureReason::Timeout,
        ImageGenError::Unavailable(msg) => FailureReason::Connection(msg.clone()),
        ImageGenError::GenerationFailed(msg) => FailureReason::InvalidRequest(msg.clone()),
        ImageGenError::InvalidResponse(msg) => FailureReason::MalformedResponse(msg.clone()),
        ImageGenError::Status { status, body } => {
            let detail = format!("HTTP {status}: {body}");
            match status {
                401 | 403 => FailureReason::Unauthorized(detail),
                408 => FailureReason::Timeout,
                429 => FailureReason::RateLimited(detail),
                500..=599 => FailureReason::ServerError(detail),
                _ => FailureReason::InvalidRequest(detail),
            }
        }
    }
}

/// Check that `bytes` decode as PNG, JPEG or WebP and return them as PNG.
pub fn validate_image(bytes: &[u8]) -> Result<Vec<u8>, FailureReason> {
    if bytes.is_empty() {
        return Err(FailureReason::Validation("empty image payload".to_string()));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| FailureReason::Validation(format!("unrecognised image data: {e}")))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP) {
        return Err(FailureReason::Validation(format!(
            "unsupported image format {format:?}"
        )));
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| FailureReason::Validation(format!("image does not decode: {e}")))?;

    if format == ImageFormat::Png {
        return Ok(bytes.to_vec());
    }

    let mut png = Cursor::new(Vec::new());
    decoded
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| FailureReason::Validation(format!("PNG re-encode failed: {e}")))?;
    Ok(png.into_inner())
}
