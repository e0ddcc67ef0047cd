use std::{net::IpAddr, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use hashbrown::HashMap;

use crate::settings::{CountryCodeService, IpEchoService};

pub mod geolite;
pub mod icanhazip;
pub mod ip_api;
pub mod ipify;
pub mod opendns;

pub use geolite::GeoLiteProvider;
pub use icanhazip::IcanhazipProvider;
pub use ip_api::IpApiProvider;
pub use ipify::IpifyProvider;
pub use opendns::OpenDnsProvider;

/// Time before giving up on a single provider request.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A service that echoes the caller's public IP.
#[async_trait]
pub trait IpEchoTrait: Send + Sync {
    /// Service name, also recorded alongside observations.
    fn name(&self) -> &'static str;

    /// Minimum wait the service asks for between two calls.
    fn cooldown(&self) -> Duration;

    async fn fetch(&self) -> anyhow::Result<String>;
}

/// A service that resolves which country an IP belongs to.
#[async_trait]
pub trait CountryCodeTrait: Send + Sync {
    fn name(&self) -> &'static str;

    fn cooldown(&self) -> Duration;

    /// Resolves the ISO 3166 alpha-2 code for `ip`.
    async fn fetch(&self, ip: &str) -> anyhow::Result<String>;
}

/// Checks that a provider response is the textual form of an IP address.
pub(crate) fn parse_ip(payload: &str) -> anyhow::Result<String> {
    let trimmed = payload.trim();
    match IpAddr::from_str(trimmed) {
        Ok(ip) => Ok(ip.to_string()),
        Err(_) => anyhow::bail!("response {:?} is not an IP address", trimmed),
    }
}

/// Maps the configured services onto provider implementations.
///
/// `Default` registers every built-in provider; `register_ip` and
/// `register_country` swap single entries out, which is how tests inject
/// their fakes.
pub struct ProviderRegistry {
    ip_echo: HashMap<IpEchoService, Arc<dyn IpEchoTrait>>,
    country: HashMap<CountryCodeService, Arc<dyn CountryCodeTrait>>,
}

impl ProviderRegistry {
    /// A registry with nothing registered at all.
    pub fn empty() -> Self {
        Self {
            ip_echo: HashMap::new(),
            country: HashMap::new(),
        }
    }

    pub fn register_ip(&mut self, service: IpEchoService, provider: Arc<dyn IpEchoTrait>) {
        self.ip_echo.insert(service, provider);
    }

    pub fn register_country(
        &mut self,
        service: CountryCodeService,
        provider: Arc<dyn CountryCodeTrait>,
    ) {
        self.country.insert(service, provider);
    }

    pub fn ip_getter(&self, service: IpEchoService) -> anyhow::Result<Arc<dyn IpEchoTrait>> {
        self.ip_echo
            .get(&service)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no ip echo provider registered for {}", service))
    }

    pub fn country_getter(
        &self,
        service: CountryCodeService,
    ) -> anyhow::Result<Arc<dyn CountryCodeTrait>> {
        self.country
            .get(&service)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no country provider registered for {}", service))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_ip(IpEchoService::Ipify, Arc::new(IpifyProvider));
        registry.register_ip(IpEchoService::Icanhazip, Arc::new(IcanhazipProvider));
        registry.register_ip(IpEchoService::OpenDns, Arc::new(OpenDnsProvider));
        registry.register_country(CountryCodeService::IpApi, Arc::new(IpApiProvider));
        registry.register_country(CountryCodeService::GeoLite2, Arc::new(GeoLiteProvider::new()));
        registry
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::settings::SettingEnum;

    #[test]
    fn parse_ip_accepts_both_address_families() {
        assert_eq!(parse_ip("203.0.113.9\n").unwrap(), "203.0.113.9");
        assert_eq!(parse_ip("  2001:db8::1  ").unwrap(), "2001:db8::1");
    }

    #[test]
    fn parse_ip_rejects_everything_else() {
        assert!(parse_ip("").is_err());
        assert!(parse_ip("not an ip").is_err());
        assert!(parse_ip("<html>502 Bad Gateway</html>").is_err());
        assert!(parse_ip("203.0.113.9 extra").is_err());
    }

    #[test]
    fn built_in_names_match_the_setting_keywords() {
        let registry = ProviderRegistry::default();
        for service in IpEchoService::values() {
            let provider = registry.ip_getter(*service).unwrap();
            assert_eq!(provider.name(), service.keyword());
        }
        for service in CountryCodeService::values() {
            let provider = registry.country_getter(*service).unwrap();
            assert_eq!(provider.name(), service.keyword());
        }
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        let registry = ProviderRegistry::empty();
        let error = registry
            .ip_getter(IpEchoService::Ipify)
            .err()
            .unwrap()
            .to_string();
        assert!(error.contains("ipify"));

        let error = registry
            .country_getter(CountryCodeService::IpApi)
            .err()
            .unwrap()
            .to_string();
        assert!(error.contains("ip-api"));
    }

    #[tokio::test]
    async fn registration_replaces_the_built_in() {
        struct FakeEcho;

        #[async_trait]
        impl IpEchoTrait for FakeEcho {
            fn name(&self) -> &'static str {
                "fake"
            }

            fn cooldown(&self) -> Duration {
                Duration::from_secs(0)
            }

            async fn fetch(&self) -> anyhow::Result<String> {
                Ok("203.0.113.7".to_string())
            }
        }

        let mut registry = ProviderRegistry::default();
        registry.register_ip(IpEchoService::Ipify, Arc::new(FakeEcho));

        let provider = registry.ip_getter(IpEchoService::Ipify).unwrap();
        assert_eq!(provider.name(), "fake");
        assert_eq!(provider.fetch().await.unwrap(), "203.0.113.7");
    }
}
