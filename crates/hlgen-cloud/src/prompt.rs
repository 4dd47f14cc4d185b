//! The instruction template sent with every analysis request.

use std::path::Path;

use tracing::info;

/// Template compiled into the binary.
pub const DEFAULT_PROMPT: &str = include_str!("../prompts/highlight_prompt.md");

/// Load the template, preferring `override_path` when given.
pub async fn load_prompt(override_path: Option<&Path>) -> std::io::Result<String> {
    match override_path {
        Some(path) => {
            let prompt = tokio::fs::read_to_string(path).await?;
            if prompt.trim().is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("prompt file {} is empty", path.display()),
                ));
            }
            info!("Loaded instruction template from {}", path.display());
            Ok(prompt)
        }
        None => Ok(DEFAULT_PROMPT.to_string()),
    }
}
