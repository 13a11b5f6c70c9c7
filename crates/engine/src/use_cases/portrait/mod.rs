//! Portrait use cases.
//!
//! The cache on disk is the only gate: a portrait is generated when its
//! file is missing and never again once the file exists.

mod client;
mod ensure;

pub use client::{validate_image, PortraitClient, DEFAULT_NEGATIVE_PROMPT, DEFAULT_STYLE};
pub use ensure::{EnsurePortrait, PortraitStatus};
