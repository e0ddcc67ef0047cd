use std::{fmt::Display, time::Duration};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::{bool_or, enum_or, SettingEnum, ValidatorSpec};

/// Which service answers "what is my public IP?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpEchoService {
    Ipify,
    Icanhazip,
    OpenDns,
}

/// Which service maps an IP to a country code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountryCodeService {
    IpApi,
    GeoLite2,
}

/// How often the timer orders a refresh on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshRate {
    Every5Minutes,
    Every15Minutes,
    Every30Minutes,
    EveryHour,
    Every6Hours,
    EveryDay,
}

/// How long observed changes stay in the IP log. `Off` disables logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLifetime {
    Off,
    OneDay,
    OneWeek,
    OneMonth,
    OneYear,
}

impl SettingEnum for IpEchoService {
    fn values() -> &'static [Self] {
        &[Self::Ipify, Self::Icanhazip, Self::OpenDns]
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::Ipify => "ipify",
            Self::Icanhazip => "icanhazip",
            Self::OpenDns => "opendns",
        }
    }
}

impl SettingEnum for CountryCodeService {
    fn values() -> &'static [Self] {
        &[Self::IpApi, Self::GeoLite2]
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::IpApi => "ip-api",
            Self::GeoLite2 => "geolite2",
        }
    }
}

impl SettingEnum for RefreshRate {
    fn values() -> &'static [Self] {
        &[
            Self::Every5Minutes,
            Self::Every15Minutes,
            Self::Every30Minutes,
            Self::EveryHour,
            Self::Every6Hours,
            Self::EveryDay,
        ]
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::Every5Minutes => "5m",
            Self::Every15Minutes => "15m",
            Self::Every30Minutes => "30m",
            Self::EveryHour => "1h",
            Self::Every6Hours => "6h",
            Self::EveryDay => "1d",
        }
    }
}

impl SettingEnum for LogLifetime {
    fn values() -> &'static [Self] {
        &[
            Self::Off,
            Self::OneDay,
            Self::OneWeek,
            Self::OneMonth,
            Self::OneYear,
        ]
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::OneDay => "1d",
            Self::OneWeek => "7d",
            Self::OneMonth => "30d",
            Self::OneYear => "365d",
        }
    }
}

impl RefreshRate {
    /// The wait between timer-ordered refreshes.
    pub fn interval(&self) -> Duration {
        let secs = match self {
            Self::Every5Minutes => 5 * 60,
            Self::Every15Minutes => 15 * 60,
            Self::Every30Minutes => 30 * 60,
            Self::EveryHour => 60 * 60,
            Self::Every6Hours => 6 * 60 * 60,
            Self::EveryDay => 24 * 60 * 60,
        };
        Duration::from_secs(secs)
    }
}

impl LogLifetime {
    /// Retention window for log entries, or `None` when logging is off.
    pub fn retention(&self) -> Option<Duration> {
        let days = match self {
            Self::Off => return None,
            Self::OneDay => 1,
            Self::OneWeek => 7,
            Self::OneMonth => 30,
            Self::OneYear => 365,
        };
        Some(Duration::from_secs(days * 24 * 60 * 60))
    }
}

impl Display for IpEchoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl Display for CountryCodeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl Display for RefreshRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl Display for LogLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl Serialize for IpEchoService {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.keyword())
    }
}

impl Serialize for CountryCodeService {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.keyword())
    }
}

impl Serialize for RefreshRate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.keyword())
    }
}

impl Serialize for LogLifetime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.keyword())
    }
}

/// Settings shared across every machine the user runs on.
///
/// Instances are only ever produced by [`ValidatorSpec::sanitize`] or
/// [`Default`], so a `SyncSettings` in hand is valid by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSettings {
    pub ip_echo_service: IpEchoService,
    pub country_code_service: CountryCodeService,
    /// Whether the country lookup runs at all.
    pub look_up_country: bool,
    pub refresh_rate: RefreshRate,
    /// Whether a detected change raises a notification.
    pub notify: bool,
    /// Whether the toolbar shows the country as a flag icon.
    pub display_flag: bool,
}

/// Settings that stay on this machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalSettings {
    pub log_lifetime: LogLifetime,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            ip_echo_service: IpEchoService::Ipify,
            country_code_service: CountryCodeService::IpApi,
            look_up_country: true,
            refresh_rate: RefreshRate::Every15Minutes,
            notify: true,
            display_flag: true,
        }
    }
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            log_lifetime: LogLifetime::OneMonth,
        }
    }
}

impl ValidatorSpec for SyncSettings {
    fn sanitize(raw: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            ip_echo_service: enum_or(defaults.ip_echo_service).repair(raw.get("ip_echo_service")),
            country_code_service: enum_or(defaults.country_code_service)
                .repair(raw.get("country_code_service")),
            look_up_country: bool_or(defaults.look_up_country).repair(raw.get("look_up_country")),
            refresh_rate: enum_or(defaults.refresh_rate).repair(raw.get("refresh_rate")),
            notify: bool_or(defaults.notify).repair(raw.get("notify")),
            display_flag: bool_or(defaults.display_flag).repair(raw.get("display_flag")),
        }
    }
}

impl ValidatorSpec for LocalSettings {
    fn sanitize(raw: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            log_lifetime: enum_or(defaults.log_lifetime).repair(raw.get("log_lifetime")),
        }
    }
}

/// The subset of [`SyncSettings`] that decides *what* gets fetched.
///
/// The settings poller compares consecutive values of this record; cosmetic
/// fields changing must not order a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EssentialConfig {
    pub ip_echo_service: IpEchoService,
    pub country_code_service: CountryCodeService,
    pub look_up_country: bool,
}

impl SyncSettings {
    pub fn essentials(&self) -> EssentialConfig {
        EssentialConfig {
            ip_echo_service: self.ip_echo_service,
            country_code_service: self.country_code_service,
            look_up_country: self.look_up_country,
        }
    }
}
