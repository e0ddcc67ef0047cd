use std::{
    net::{IpAddr, Ipv4Addr},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use cached::proc_macro::cached;
use trust_dns_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};

use super::IpEchoTrait;

/// Resolver pointed at OpenDNS instead of the system configuration, built
/// once per process.
#[cached]
async fn opendns_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(
        ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(
                &[IpAddr::V4(Ipv4Addr::new(208, 67, 222, 222))], // OpenDNS server
                53,
                false,
            ),
        ),
        ResolverOpts::default(),
    )
}

/// Echo service that resolves `myip.opendns.com.` against OpenDNS; the
/// answer is the caller's public address.
pub struct OpenDnsProvider;

#[async_trait]
impl IpEchoTrait for OpenDnsProvider {
    fn name(&self) -> &'static str {
        "opendns"
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        let start_time = Instant::now();
        let resolver = opendns_resolver().await;
        let response = resolver.lookup_ip("myip.opendns.com.").await?;
        let ip = response
            .iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("myip.opendns.com. resolved to an empty answer"))?;

        #[cfg(feature = "log")]
        log::debug!("opendns echoed {} in {:?}", ip, start_time.elapsed());
        Ok(ip.to_string())
    }
}
