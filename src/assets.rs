use crate::error::DanfseError;
use base64::Engine;
use image::GenericImageView;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Where an optional image (NFS-e logo, municipality crest) comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ImageSource {
    Path(PathBuf),
    DataUri(String),
}

impl From<String> for ImageSource {
    fn from(value: String) -> Self {
        if value.starts_with("data:") {
            ImageSource::DataUri(value)
        } else {
            ImageSource::Path(PathBuf::from(value))
        }
    }
}

impl From<&str> for ImageSource {
    fn from(value: &str) -> Self {
        ImageSource::from(value.to_string())
    }
}

impl From<&Path> for ImageSource {
    fn from(value: &Path) -> Self {
        ImageSource::Path(value.to_path_buf())
    }
}

impl ImageSource {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::DataUri(uri) => {
                let head: String = uri.chars().take(32).collect();
                format!("{head}...")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// JPEG bytes embedded as-is.
    Dct,
    /// Raw 8-bit samples.
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub resource_id: String,
    pub width: u32,
    pub height: u32,
    pub gray: bool,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

impl ImageAsset {
    pub fn load(source: &ImageSource) -> Result<Self, DanfseError> {
        let bytes = read_source(source)?;
        Self::decode(&bytes).map_err(|reason| {
            DanfseError::AssetMissing(format!("{}: {}", source.describe(), reason))
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let resource_id = resource_id(bytes);
        let format = image::guess_format(bytes).map_err(|err| err.to_string())?;
        let decoded = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
        let (width, height) = decoded.dimensions();

        if format == image::ImageFormat::Jpeg {
            let gray = matches!(
                decoded.color(),
                image::ColorType::L8 | image::ColorType::La8
            );
            return Ok(Self {
                resource_id,
                width,
                height,
                gray,
                encoding: ImageEncoding::Dct,
                data: bytes.to_vec(),
                alpha: None,
            });
        }

        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            if a != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
        Ok(Self {
            resource_id,
            width,
            height,
            gray: false,
            encoding: ImageEncoding::Raw,
            data: rgb,
            alpha: has_alpha.then_some(alpha),
        })
    }

    /// Height that keeps the aspect ratio at `width`.
    pub fn scaled_height(&self, width: crate::types::Pt) -> crate::types::Pt {
        if self.width == 0 {
            return crate::types::Pt::ZERO;
        }
        width.mul_ratio(self.height as i32, self.width as i32)
    }
}

fn read_source(source: &ImageSource) -> Result<Vec<u8>, DanfseError> {
    match source {
        ImageSource::Path(path) => std::fs::read(path)
            .map_err(|err| DanfseError::AssetMissing(format!("{}: {}", path.display(), err))),
        ImageSource::DataUri(uri) => parse_data_uri(uri)
            .ok_or_else(|| DanfseError::AssetMissing(format!("{}: bad data URI", source.describe()))),
    }
}

fn parse_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part.trim())
            .ok()
    } else {
        Some(data_part.as_bytes().to_vec())
    }
}

fn resource_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("Im{hex}")
}
