use crmquery_core::config::CrmRegion;
use crmquery_core::ProviderError;
use reqwest::Url;

/// Base URLs for one Zoho data center.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZohoEndpoints {
    pub accounts_url: String,
    pub api_url: String,
}

impl ZohoEndpoints {
    pub fn for_region(region: CrmRegion) -> Self {
        let (accounts, api) = match region {
            CrmRegion::Us => ("https://accounts.zoho.com", "https://www.zohoapis.com"),
            CrmRegion::Eu => ("https://accounts.zoho.eu", "https://www.zohoapis.eu"),
            CrmRegion::In => ("https://accounts.zoho.in", "https://www.zohoapis.in"),
            CrmRegion::Au => ("https://accounts.zoho.com.au", "https://www.zohoapis.com.au"),
            CrmRegion::Cn => ("https://accounts.zoho.com.cn", "https://www.zohoapis.com.cn"),
            CrmRegion::Jp => ("https://accounts.zoho.jp", "https://www.zohoapis.jp"),
            CrmRegion::Ca => ("https://accounts.zohocloud.ca", "https://www.zohoapis.ca"),
        };
        Self { accounts_url: accounts.to_string(), api_url: api.to_string() }
    }

    pub fn custom(accounts_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self { accounts_url: accounts_url.into(), api_url: api_url.into() }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.accounts_url.trim_end_matches('/'))
    }

    /// `<api>/crm/v2/<module>` with `module` pushed as a single encoded segment.
    pub fn records_url(&self, module: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.api_url).map_err(|error| {
            ProviderError::Transport(format!("invalid api url {}: {error}", self.api_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                ProviderError::Transport(format!("api url {} cannot carry a path", self.api_url))
            })?
            .pop_if_empty()
            .extend(["crm", "v2", module]);
        Ok(url)
    }
}
