use std::time::Duration;

use async_trait::async_trait;

use super::{parse_ip, IpEchoTrait, REQUEST_TIMEOUT};
use crate::utils;

const ENDPOINT_URL: &str = "https://ipv4.icanhazip.com/";

/// Echo service backed by icanhazip.com. Answers with a trailing newline,
/// which the parser strips.
pub struct IcanhazipProvider;

#[async_trait]
impl IpEchoTrait for IcanhazipProvider {
    fn name(&self) -> &'static str {
        "icanhazip"
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        let body = utils::fetch_text(ENDPOINT_URL, REQUEST_TIMEOUT).await?;
        parse_ip(&body)
    }
}
