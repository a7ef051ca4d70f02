//! Read image tool - lets the model look at image files
//!
//! Output is an image content part, so this tool declares the
//! `ContentParts` output mode.

use super::{OutputMode, Tool, ToolContext, ToolError, ToolOutput};
use crate::conversation::ContentPart;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Maximum image size (5MB)
const MAX_IMAGE_SIZE: u64 = 5 * 1024 * 1024;

const SUPPORTED_FORMATS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

pub struct ReadImageTool;

impl ReadImageTool {
    fn resolve_path(ctx: &ToolContext, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            ctx.working_dir.join(path)
        }
    }

    fn media_type(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        SUPPORTED_FORMATS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, media_type)| *media_type)
    }
}

#[derive(Debug, Deserialize)]
struct ReadImageInput {
    path: String,
}

#[async_trait]
impl Tool for ReadImageTool {
    fn name(&self) -> &'static str {
        "read_image"
    }

    fn description(&self) -> String {
        "View an image file (PNG, JPG, GIF, WebP) from the working directory or an absolute path.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the image file to read"
                }
            }
        })
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::ContentParts
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: ReadImageInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return Ok(ToolOutput::error(format!("Invalid input: {e}"))),
        };

        let path = Self::resolve_path(&ctx, &input.path);

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolOutput::error(format!("File not found: {}", path.display())));
            }
            Err(e) => return Ok(ToolOutput::error(format!("Cannot read file: {e}"))),
        };

        if !metadata.is_file() {
            return Ok(ToolOutput::error(format!("Not a file: {}", path.display())));
        }

        let Some(media_type) = Self::media_type(&path) else {
            let supported: Vec<_> = SUPPORTED_FORMATS.iter().map(|(e, _)| *e).collect();
            return Ok(ToolOutput::error(format!(
                "Unsupported image format. Supported: {}",
                supported.join(", ")
            )));
        };

        if metadata.len() > MAX_IMAGE_SIZE {
            return Ok(ToolOutput::error(format!(
                "Image too large: {} bytes (max {MAX_IMAGE_SIZE} bytes)",
                metadata.len()
            )));
        }

        let data = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(ToolError::Interrupted),
            data = fs::read(&path) => data.map_err(|e| ToolError::Failed(format!("Failed to read file: {e}")))?,
        };

        Ok(ToolOutput::parts(vec![ContentPart::Image {
            media_type: media_type.to_string(),
            data: BASE64.encode(&data),
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolPayload;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn test_context(working_dir: PathBuf) -> ToolContext {
        ToolContext::new(CancellationToken::new(), working_dir)
    }

    // Minimal valid PNG (1x1 transparent pixel)
    const MINIMAL_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[tokio::test]
    async fn test_read_png_returns_image_part() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("test.png"), MINIMAL_PNG).unwrap();

        let result = ReadImageTool
            .run(json!({"path": "test.png"}), test_context(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert!(result.success);

        let ToolPayload::Parts(parts) = result.payload else {
            panic!("expected parts, got {:?}", result.payload);
        };
        let [ContentPart::Image { media_type, data }] = parts.as_slice() else {
            panic!("expected one image part, got {parts:?}");
        };
        assert_eq!(media_type, "image/png");
        assert_eq!(BASE64.decode(data).unwrap(), MINIMAL_PNG);
    }

    #[tokio::test]
    async fn test_read_absolute_path() {
        let dir = TempDir::new().unwrap();
        let img_path = dir.path().join("abs.jpeg");
        std::fs::write(&img_path, b"fake jpeg").unwrap();

        let result = ReadImageTool
            .run(json!({"path": img_path.to_str().unwrap()}), test_context(std::env::temp_dir()))
            .await
            .unwrap();
        assert!(result.success, "Failed: {}", result.text());
    }

    #[tokio::test]
    async fn test_file_not_found() {
        let dir = TempDir::new().unwrap();
        let result = ReadImageTool
            .run(json!({"path": "nonexistent.png"}), test_context(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.text().contains("not found"));
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("test.bmp"), b"fake bmp data").unwrap();

        let result = ReadImageTool
            .run(json!({"path": "test.bmp"}), test_context(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.text().contains("Unsupported"));
    }

    #[tokio::test]
    async fn test_directory_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("subdir.png")).unwrap();

        let result = ReadImageTool
            .run(json!({"path": "subdir.png"}), test_context(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.text().contains("Not a file"));
    }
}
