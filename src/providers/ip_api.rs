use std::time::Duration;

use async_trait::async_trait;
use cached::proc_macro::cached;
use serde::Deserialize;

use super::{CountryCodeTrait, REQUEST_TIMEOUT};
use crate::utils;

const ENDPOINT_URL: &str = "http://ip-api.com/json";

#[derive(Debug, Clone, Deserialize)]
struct ApiReply {
    status: String,
    #[serde(default, rename = "countryCode")]
    country_code: Option<String>,
}

/// One IP maps to one country for as long as we run, so successful answers
/// are memoized per address.
#[cached(
    result = true,
    size = 64,
    key = "String",
    convert = r#"{ ip.clone() }"#
)]
async fn lookup_country(ip: String) -> anyhow::Result<String> {
    let url = format!("{}/{}?fields=status,countryCode", ENDPOINT_URL, ip);
    let body = utils::fetch_text(&url, REQUEST_TIMEOUT).await?;

    let reply: ApiReply = serde_json::from_str(&body)?;
    if reply.status != "success" {
        anyhow::bail!("ip-api.com answered {:?} for {}", reply.status, ip);
    }
    reply
        .country_code
        .ok_or_else(|| anyhow::anyhow!("ip-api.com left out the country code for {}", ip))
}

/// Country lookups against the ip-api.com JSON endpoint. The free tier only
/// speaks plain http.
pub struct IpApiProvider;

#[async_trait]
impl CountryCodeTrait for IpApiProvider {
    fn name(&self) -> &'static str {
        "ip-api"
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn fetch(&self, ip: &str) -> anyhow::Result<String> {
        lookup_country(ip.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn success_reply_decodes() {
        let reply: ApiReply =
            serde_json::from_str(r#"{"status":"success","countryCode":"DE"}"#).unwrap();
        assert_eq!(reply.status, "success");
        assert_eq!(reply.country_code.as_deref(), Some("DE"));
    }

    #[test]
    fn failure_reply_decodes_without_a_country() {
        let reply: ApiReply =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert_eq!(reply.status, "fail");
        assert_eq!(reply.country_code, None);
    }
}
