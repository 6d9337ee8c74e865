use crate::assets::ImageSource;
use crate::error::DanfseError;
use serde::Deserialize;
use std::path::PathBuf;

/// Issuing-authority display data not present in the NFS-e record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthorityInfo {
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Municipality crest.
    pub image: Option<ImageSource>,
}

/// Payer city name and state, resolved by the caller from the payer's IBGE
/// code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PayerLocality {
    pub name: String,
    #[serde(default)]
    pub uf: String,
}

impl PayerLocality {
    pub fn new(name: impl Into<String>, uf: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uf: uf.into(),
        }
    }
}

/// Caller-supplied values merged into the extracted record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub municipality: Option<AuthorityInfo>,
    pub payer_locality: Option<PayerLocality>,
}

/// Everything a render needs besides the XML itself.
///
/// ```toml
/// title = "NFSe-00123456789.pdf"
/// logo = "assets/logo-nfse.png"
///
/// [municipality]
/// department = "Secretaria Municipal da Fazenda"
/// phone = "(48) 3431-0074"
///
/// [payer_locality]
/// name = "Sapiranga"
/// uf = "RS"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub title: String,
    pub creator: String,
    pub logo: Option<ImageSource>,
    /// JSON-lines layout trace destination.
    pub trace_path: Option<PathBuf>,
    #[serde(flatten)]
    pub overrides: Overrides,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "DANFSe".to_string(),
            creator: "NFS-e PDF Generator".to_string(),
            logo: None,
            trace_path: None,
            overrides: Overrides::default(),
        }
    }
}

impl RenderConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, DanfseError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, DanfseError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_fills_overrides() {
        let config = RenderConfig::from_toml_str(
            r#"
            title = "NFSe-00123456789.pdf"
            logo = "assets/logo.png"

            [municipality]
            department = "Secretaria Municipal da Fazenda"
            phone = "(11) 4002-8922"
            image = "data:image/png;base64,AAAA"

            [payer_locality]
            name = "Sapiranga"
            uf = "RS"
            "#,
        )
        .unwrap();
        assert_eq!(config.title, "NFSe-00123456789.pdf");
        assert_eq!(config.creator, "NFS-e PDF Generator");
        assert!(matches!(config.logo, Some(ImageSource::Path(_))));
        let municipality = config.overrides.municipality.unwrap();
        assert_eq!(municipality.phone.as_deref(), Some("(11) 4002-8922"));
        assert!(municipality.email.is_none());
        assert!(matches!(municipality.image, Some(ImageSource::DataUri(_))));
        assert_eq!(
            config.overrides.payer_locality,
            Some(PayerLocality::new("Sapiranga", "RS"))
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = RenderConfig::from_toml_str("").unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn loads_config_from_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("danfse.toml");
        std::fs::write(
            &path,
            "creator = \"Prefeitura de Criciúma\"\ntrace_path = \"layout.jsonl\"\n\n[payer_locality]\nname = \"Criciúma\"\nuf = \"SC\"\n",
        )
        .unwrap();

        let config = RenderConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.creator, "Prefeitura de Criciúma");
        assert_eq!(config.trace_path, Some(PathBuf::from("layout.jsonl")));
        assert_eq!(
            config.overrides.payer_locality,
            Some(PayerLocality::new("Criciúma", "SC"))
        );

        let missing = RenderConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, DanfseError::Io(_)));
    }

    #[test]
    fn malformed_config_is_a_configuration_error() {
        let err = RenderConfig::from_toml_str("[payer_locality]\nuf = 3").unwrap_err();
        assert!(matches!(err, DanfseError::InvalidConfiguration(_)));
    }
}
