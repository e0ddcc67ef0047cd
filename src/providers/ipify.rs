use std::time::Duration;

use async_trait::async_trait;

use super::{parse_ip, IpEchoTrait, REQUEST_TIMEOUT};
use crate::utils;

const ENDPOINT_URL: &str = "https://api64.ipify.org/";

/// Echo service backed by api64.ipify.org.
pub struct IpifyProvider;

#[async_trait]
impl IpEchoTrait for IpifyProvider {
    fn name(&self) -> &'static str {
        "ipify"
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        let body = utils::fetch_text(ENDPOINT_URL, REQUEST_TIMEOUT).await?;
        parse_ip(&body)
    }
}
