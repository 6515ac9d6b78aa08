#![allow(async_fn_in_trait)]

use crate::config::TemplateServiceConfig;
use crate::error::{Result, SignatureError};
use crate::signatures::{SignatureKey, SignatureTemplate};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Where signature templates come from.
pub trait TemplateSource {
    async fn fetch_template(&self, key: SignatureKey) -> Result<SignatureTemplate>;
}

/// One entry of the service's signature listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignatureListing {
    pub id: String,
    #[serde(rename = "templateUrl", alias = "template_url")]
    pub template_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplatePayload {
    Object { html: String },
    Bare(String),
}

impl TemplatePayload {
    fn into_html(self) -> String {
        match self {
            TemplatePayload::Object { html } => html,
            TemplatePayload::Bare(html) => html,
        }
    }
}

pub struct TemplateClient {
    client: Client,
    base_url: Url,
    list_path: String,
}

impl TemplateClient {
    pub fn new(config: &TemplateServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            list_path: config.list_path.clone(),
        })
    }

    /// Signatures offered by the service.
    pub async fn list_signatures(&self) -> Result<Vec<SignatureListing>> {
        let url = self.base_url.join(&self.list_path)?;
        log::debug!("Fetching signature listing from {url}");

        let listing = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<SignatureListing>>()
            .await?;
        Ok(listing)
    }

    fn template_url(&self, listing: &[SignatureListing], key: SignatureKey) -> Result<Url> {
        let entry = listing
            .iter()
            .find(|entry| entry.id.eq_ignore_ascii_case(key.as_str()))
            .ok_or_else(|| {
                SignatureError::TemplateService(format!("signature {key} is not offered"))
            })?;
        // Relative template URLs resolve against the service base
        Ok(self.base_url.join(&entry.template_url)?)
    }
}

impl TemplateSource for TemplateClient {
    async fn fetch_template(&self, key: SignatureKey) -> Result<SignatureTemplate> {
        let listing = self.list_signatures().await?;
        let url = self.template_url(&listing, key)?;
        log::debug!("Fetching template {key} from {url}");

        let payload = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<TemplatePayload>()
            .await?;

        let html = payload.into_html();
        if html.trim().is_empty() {
            return Err(SignatureError::TemplateService(format!(
                "template {key} is empty"
            )));
        }
        Ok(SignatureTemplate { key, html })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TemplateClient {
        TemplateClient::new(&TemplateServiceConfig {
            base_url: "https://signatures.contoso.com/api/".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_listing_parses() {
        let json = r#"[
            {"id": "corporate", "templateUrl": "templates/corporate"},
            {"id": "support", "template_url": "https://cdn.contoso.com/support.json"}
        ]"#;
        let listing: Vec<SignatureListing> = serde_json::from_str(json).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[1].template_url, "https://cdn.contoso.com/support.json");
    }

    #[test]
    fn test_payload_shapes() {
        let object: TemplatePayload = serde_json::from_str(r#"{"id": "x", "html": "<b>A</b>"}"#).unwrap();
        assert_eq!(object.into_html(), "<b>A</b>");
        let bare: TemplatePayload = serde_json::from_str(r#""<i>B</i>""#).unwrap();
        assert_eq!(bare.into_html(), "<i>B</i>");
    }

    #[test]
    fn test_template_url_resolution() {
        let client = client();
        let listing = vec![
            SignatureListing {
                id: "Corporate".to_string(),
                template_url: "templates/corporate".to_string(),
            },
            SignatureListing {
                id: "support".to_string(),
                template_url: "https://cdn.contoso.com/support.json".to_string(),
            },
        ];

        assert_eq!(
            client
                .template_url(&listing, SignatureKey::Corporate)
                .unwrap()
                .as_str(),
            "https://signatures.contoso.com/api/templates/corporate"
        );
        assert_eq!(
            client
                .template_url(&listing, SignatureKey::Support)
                .unwrap()
                .as_str(),
            "https://cdn.contoso.com/support.json"
        );
        assert!(matches!(
            client.template_url(&listing, SignatureKey::Marketing),
            Err(SignatureError::TemplateService(_))
        ));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = TemplateClient::new(&TemplateServiceConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SignatureError::Url(_))));
    }
}
