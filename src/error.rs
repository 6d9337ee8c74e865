use thiserror::Error;

#[derive(Debug, Error)]
pub enum DanfseError {
    /// The source record is not a usable NFS-e document. Aborts before layout.
    #[error("invalid NFS-e document: {0}")]
    Parse(String),
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
    /// An optional image could not be loaded. Absorbed by the layout engine.
    #[error("asset unavailable: {0}")]
    AssetMissing(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DanfseError {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, DanfseError::Parse(_) | DanfseError::Xml(_))
    }
}

impl From<toml::de::Error> for DanfseError {
    fn from(value: toml::de::Error) -> Self {
        DanfseError::InvalidConfiguration(value.to_string())
    }
}
