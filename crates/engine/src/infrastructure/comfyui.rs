//! ComfyUI image generation client
//!
//! Implements the ImageGenPort trait for NPC portraits using ComfyUI's API:
//! queue a workflow, poll its history until an image output appears, then
//! download that image.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

use crate::infrastructure::ports::{ImageGenError, ImageGenPort, ImageRequest, ImageResult};

/// Default ComfyUI base URL.
pub const DEFAULT_COMFYUI_BASE_URL: &str = "http://localhost:8188";

/// Default checkpoint loaded by the portrait workflow.
pub const DEFAULT_CHECKPOINT: &str = "v1-5-pruned-emaonly.ckpt";

const MAX_POLL_ATTEMPTS: u32 = 120; // 2 minutes with 1 second intervals
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client for ComfyUI API
#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    checkpoint: String,
}

impl ComfyUIClient {
    pub fn with_checkpoint(base_url: &str, checkpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300)) // 5 minute timeout for generation
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            checkpoint: checkpoint.to_string(),
        }
    }

    /// Queue a workflow for execution
    async fn queue_prompt(
        &self,
        workflow: serde_json::Value,
    ) -> Result<QueueResponse, ImageGenError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let request = QueuePromptRequest {
            prompt: workflow,
            client_id,
        };

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(ImageGenError::from_reqwest)?;

        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))
    }

    /// Get the history of a completed prompt
    async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ImageGenError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .send()
            .await
            .map_err(ImageGenError::from_reqwest)?;

        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))
    }

    /// Download a generated image
    async fn get_image(&self, output: &ImageOutput) -> Result<Vec<u8>, ImageGenError> {
        let response = self
            .client
            .get(format!("{}/view", self.base_url))
            .query(&[
                ("filename", output.filename.as_str()),
                ("subfolder", output.subfolder.as_str()),
                ("type", output.r#type.as_str()),
            ])
            .send()
            .await
            .map_err(ImageGenError::from_reqwest)?;

        let response = ensure_success(response).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(ImageGenError::from_reqwest)
    }

    /// Wait for a prompt to complete and return the first image
    async fn wait_for_completion(&self, prompt_id: &str) -> Result<ImageOutput, ImageGenError> {
        for _ in 0..MAX_POLL_ATTEMPTS {
            let history = self.get_history(prompt_id).await?;

            if let Some(prompt_history) = history.prompts.get(prompt_id) {
                if prompt_history.status.completed {
                    return first_image(prompt_history).ok_or_else(|| {
                        ImageGenError::GenerationFailed("No images in output".to_string())
                    });
                }
                if prompt_history.status.status_str == "error" {
                    return Err(ImageGenError::GenerationFailed(
                        "Workflow execution failed".to_string(),
                    ));
                }
            }

            sleep(POLL_INTERVAL).await;
        }

        Err(ImageGenError::Timeout)
    }

    /// Build the portrait workflow for a request.
    fn build_workflow(&self, request: &ImageRequest) -> serde_json::Value {
        serde_json::json!({
            "3": {
                "inputs": {
                    "seed": rand::random::<u32>(),
                    "steps": 20,
                    "cfg": 8.0,
                    "sampler_name": "euler",
                    "scheduler": "normal",
                    "denoise": 1.0,
                    "model": ["4", 0],
                    "positive": ["6", 0],
                    "negative": ["7", 0],
                    "latent_image": ["5", 0]
                },
                "class_type": "KSampler"
            },
            "4": {
                "inputs": {
                    "ckpt_name": self.checkpoint
                },
                "class_type": "CheckpointLoaderSimple"
            },
            "5": {
                "inputs": {
                    "width": request.width,
                    "height": request.height,
                    "batch_size": 1
                },
                "class_type": "EmptyLatentImage"
            },
            "6": {
                "inputs": {
                    "text": request.prompt,
                    "clip": ["4", 1]
                },
                "class_type": "CLIPTextEncode"
            },
            "7": {
                "inputs": {
                    "text": request.negative_prompt,
                    "clip": ["4", 1]
                },
                "class_type": "CLIPTextEncode"
            },
            "8": {
                "inputs": {
                    "samples": ["3", 0],
                    "vae": ["4", 2]
                },
                "class_type": "VAEDecode"
            },
            "9": {
                "inputs": {
                    "filename_prefix": "hearthtalk_portrait",
                    "images": ["8", 0]
                },
                "class_type": "SaveImage"
            }
        })
    }
}

#[async_trait]
impl ImageGenPort for ComfyUIClient {
    async fn generate(&self, request: ImageRequest) -> Result<ImageResult, ImageGenError> {
        let workflow = self.build_workflow(&request);
        let queue_response = self.queue_prompt(workflow).await?;
        tracing::debug!(prompt_id = %queue_response.prompt_id, "Queued portrait workflow");

        let image_output = self.wait_for_completion(&queue_response.prompt_id).await?;
        let image_data = self.get_image(&image_output).await?;

        Ok(ImageResult {
            format: format_from_filename(&image_output.filename).to_string(),
            image_data,
        })
    }

    async fn check_health(&self) -> Result<bool, ImageGenError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ImageGenError::Unavailable(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ImageGenError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ImageGenError::Status {
        status: status.as_u16(),
        body,
    })
}

fn first_image(history: &PromptHistory) -> Option<ImageOutput> {
    history
        .outputs
        .values()
        .filter_map(|output| output.images.as_ref())
        .find_map(|images| images.first().cloned())
}

/// Determine format from filename
fn format_from_filename(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "jpeg"
    } else if lower.ends_with(".webp") {
        "webp"
    } else {
        "png"
    }
}

// =============================================================================
// ComfyUI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct QueuePromptRequest {
    prompt: serde_json::Value,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(flatten)]
    prompts: HashMap<String, PromptHistory>,
}

#[derive(Debug, Deserialize)]
struct PromptHistory {
    outputs: HashMap<String, NodeOutput>,
    status: PromptStatus,
}

#[derive(Debug, Deserialize)]
struct NodeOutput {
    images: Option<Vec<ImageOutput>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageOutput {
    filename: String,
    subfolder: String,
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct PromptStatus {
    status_str: String,
    completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_carries_prompt_size_and_checkpoint() {
        let client = ComfyUIClient::with_checkpoint("http://comfy:8188/", "portrait.safetensors");
        let request = ImageRequest {
            prompt: "A portrait of Brom".to_string(),
            negative_prompt: "blurry".to_string(),
            width: 512,
            height: 640,
        };

        let workflow = client.build_workflow(&request);

        assert_eq!(workflow["4"]["inputs"]["ckpt_name"], "portrait.safetensors");
        assert_eq!(workflow["5"]["inputs"]["width"], 512);
        assert_eq!(workflow["5"]["inputs"]["height"], 640);
        assert_eq!(workflow["6"]["inputs"]["text"], "A portrait of Brom");
        assert_eq!(workflow["7"]["inputs"]["text"], "blurry");
        assert_eq!(client.base_url, "http://comfy:8188");
    }

    #[test]
    fn history_parsing_finds_first_image() {
        let json = r#"{
            "abc": {
                "outputs": {"9": {"images": [{"filename": "p_0001.png", "subfolder": "", "type": "output"}]}},
                "status": {"status_str": "success", "completed": true}
            }
        }"#;
        let history: HistoryResponse = serde_json::from_str(json).expect("parse");
        let prompt = history.prompts.get("abc").expect("prompt");
        let image = first_image(prompt).expect("image");
        assert_eq!(image.filename, "p_0001.png");
    }

    #[test]
    fn format_detection() {
        assert_eq!(format_from_filename("a.PNG"), "png");
        assert_eq!(format_from_filename("a.jpeg"), "jpeg");
        assert_eq!(format_from_filename("a.webp"), "webp");
        assert_eq!(format_from_filename("a"), "png");
    }
}
