//! Remote classifier client

use crate::error::VisionError;
use crate::vision::Frame;
use async_trait::async_trait;
use drishti_core::ClassifierResponse;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "files";
/// File name announced for the image part
pub const IMAGE_FILE_NAME: &str = "file.jpeg";

/// Object classifier reached over the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a JPEG image. `code` selects the room whose endpoint is used.
    async fn classify(&self, image: Vec<u8>, code: Option<String>) -> Result<ClassifierResponse, VisionError>;
}

/// Classifier reached through the relay's `/classify` proxy
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(relay_url: &str, timeout: Option<Duration>) -> Result<Self, VisionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: format!("{}/classify", relay_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: Vec<u8>, code: Option<String>) -> Result<ClassifierResponse, VisionError> {
        let part = Part::bytes(image)
            .file_name(IMAGE_FILE_NAME)
            .mime_str("image/jpeg")?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(code) = code.as_deref() {
            request = request.query(&[("id", code)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(VisionError::Classifier(format!("classifier returned {}", status)));
        }

        let body = response.text().await?;
        let parsed: ClassifierResponse = serde_json::from_str(&body)
            .map_err(|e| VisionError::Classifier(format!("malformed classifier response: {}", e)))?;
        debug!("Classifier result '{}' with {} boxes", parsed.result, parsed.classified.len());
        Ok(parsed)
    }
}

/// Encode an RGBA frame as JPEG, dropping the alpha channel
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, VisionError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(VisionError::Encode("empty frame".to_string()));
    }

    let rgb: RgbImage = frame.convert();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(buffer)
}
