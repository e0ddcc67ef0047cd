mod guard;
mod models;
mod store;

pub use guard::{fix_settings_on_update, load, validate, OptionsPage};
pub use models::{
    CountryCodeService, EssentialConfig, IpEchoService, LocalSettings, LogLifetime, RefreshRate,
    SyncSettings,
};
pub use store::{FileArea, SettingsArea, LOCAL_SETTINGS_FILE, SYNC_SETTINGS_FILE};

use serde_json::Value;

/// A total repair function for one stored settings field.
///
/// Whatever the stored value looks like (absent, wrong type, out of range),
/// applying the sanitizer yields a valid value; non-conforming input falls
/// back to the default the sanitizer was built with. Sanitizers are the only
/// place untrusted persisted data is coerced.
pub struct Sanitizer<T> {
    fix: Box<dyn Fn(Option<&Value>) -> T + Send + Sync>,
}

impl<T> Sanitizer<T> {
    /// Applies the sanitizer to a raw stored value. `None` means the field
    /// was absent from storage.
    pub fn repair(&self, stored: Option<&Value>) -> T {
        (self.fix)(stored)
    }
}

/// Settings fields whose values come from a fixed keyword list.
///
/// The keyword doubles as the serde encoding of the value, so sanitizing and
/// serializing can never disagree about the stored spelling.
pub trait SettingEnum: Copy + PartialEq + 'static {
    /// Every value the options surface may persist for this field.
    fn values() -> &'static [Self];

    /// The stored spelling of this value.
    fn keyword(&self) -> &'static str;
}

/// Keeps a stored boolean as-is; anything else becomes `default`.
pub fn bool_or(default: bool) -> Sanitizer<bool> {
    Sanitizer {
        fix: Box::new(move |stored| match stored {
            Some(Value::Bool(value)) => *value,
            _ => default,
        }),
    }
}

/// Keeps a stored string equal to one of `T`'s keywords; anything else
/// becomes `default`. Membership is decided by comparing keyword strings,
/// never by identity.
pub fn enum_or<T>(default: T) -> Sanitizer<T>
where
    T: SettingEnum + Send + Sync,
{
    Sanitizer {
        fix: Box::new(move |stored| match stored {
            Some(Value::String(text)) => T::values()
                .iter()
                .copied()
                .find(|value| value.keyword() == text.as_str())
                .unwrap_or(default),
            _ => default,
        }),
    }
}

/// Field-by-field repair of one settings record type.
///
/// Implementations assign every field of the record from exactly one
/// sanitizer; the struct literal makes a missing or doubled field a compile
/// error rather than a runtime surprise. Stored keys no field claims are
/// ignored, so records written by newer versions still sanitize cleanly.
pub trait ValidatorSpec: Sized {
    /// Rebuilds a fully valid record from untrusted stored fields.
    fn sanitize(raw: &serde_json::Map<String, Value>) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Fruit {
        Apple,
        Pear,
    }

    impl SettingEnum for Fruit {
        fn values() -> &'static [Self] {
            &[Fruit::Apple, Fruit::Pear]
        }

        fn keyword(&self) -> &'static str {
            match self {
                Fruit::Apple => "apple",
                Fruit::Pear => "pear",
            }
        }
    }

    #[test]
    fn bool_sanitizer_keeps_native_booleans() {
        let sanitizer = bool_or(true);
        assert!(!sanitizer.repair(Some(&json!(false))));
        assert!(sanitizer.repair(Some(&json!(true))));
    }

    #[test]
    fn bool_sanitizer_falls_back_for_everything_else() {
        let sanitizer = bool_or(false);
        assert!(!sanitizer.repair(Some(&json!("true"))));
        assert!(!sanitizer.repair(Some(&json!(1))));
        assert!(!sanitizer.repair(Some(&json!(null))));
        assert!(!sanitizer.repair(None));

        let sanitizer = bool_or(true);
        assert!(sanitizer.repair(Some(&json!("false"))));
        assert!(sanitizer.repair(None));
    }

    #[test]
    fn enum_sanitizer_keeps_every_allowed_keyword() {
        let sanitizer = enum_or(Fruit::Apple);
        for value in Fruit::values() {
            assert_eq!(sanitizer.repair(Some(&json!(value.keyword()))), *value);
        }
    }

    #[test]
    fn enum_sanitizer_falls_back_for_everything_else() {
        let sanitizer = enum_or(Fruit::Pear);
        assert_eq!(sanitizer.repair(Some(&json!("banana"))), Fruit::Pear);
        assert_eq!(sanitizer.repair(Some(&json!(""))), Fruit::Pear);
        assert_eq!(sanitizer.repair(Some(&json!(3))), Fruit::Pear);
        assert_eq!(sanitizer.repair(Some(&json!(["apple"]))), Fruit::Pear);
        assert_eq!(sanitizer.repair(None), Fruit::Pear);
    }

    #[test]
    fn sanitizers_are_deterministic() {
        let sanitizer = enum_or(Fruit::Apple);
        let first = sanitizer.repair(Some(&json!("pear")));
        let second = sanitizer.repair(Some(&json!("pear")));
        assert_eq!(first, second);
    }
}
