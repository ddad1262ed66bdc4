use anyhow::Context as _;

pub const DEFAULT_ENDPOINT: &str = "https://webservices.amazon.com";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MARKETPLACE: &str = "www.amazon.com";

/// Credentials and endpoint settings for the external catalog source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub access_key: String,
    pub secret_key: String,
    pub partner_tag: String,
    pub endpoint: String,
    pub region: String,
    pub marketplace: String,
}

impl SourceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            access_key: required_env("PAAPI_ACCESS_KEY")?,
            secret_key: required_env("PAAPI_SECRET_KEY")?,
            partner_tag: required_env("PAAPI_PARTNER_TAG")?,
            endpoint: optional_env("PAAPI_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
            region: optional_env("PAAPI_REGION").unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            marketplace: optional_env("PAAPI_MARKETPLACE")
                .unwrap_or_else(|| DEFAULT_MARKETPLACE.to_owned()),
        })
    }

    /// Host portion of the endpoint, as signed into each request.
    pub fn host(&self) -> String {
        let rest = self
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        rest.split('/').next().unwrap_or(rest).to_owned()
    }
}

fn required_env(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name).with_context(|| format!("{name} must be set"))?;
    let value = value.trim().to_owned();
    if value.is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(value)
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
