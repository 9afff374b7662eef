//! # Module Settings
//!
//! Business toggles stored in the `settings` key-value table, resolved once
//! per orchestrator call.
//!
//! ## Recognized Keys
//! ```text
//! ┌────────────────────────────────┬────────────────────────────────┬─────────┐
//! │ Key                            │ Fallback alias                 │ Default │
//! ├────────────────────────────────┼────────────────────────────────┼─────────┤
//! │ accounting.enabled             │ modules.accounting.enabled     │ true    │
//! │ ledgers.enabled                │ modules.ledgers.enabled        │ true    │
//! │ units.enabled                  │ modules.units.enabled          │ true    │
//! │ currency.base                  │                                │ IQD     │
//! │ accounting.fiscalYearStart     │                                │ 01-01   │
//! │ accounting.*AccountCode        │                                │ chart   │
//! └────────────────────────────────┴────────────────────────────────┴─────────┘
//! ```
//! A toggle is on unless its value is exactly `"false"`.

use serde::{Deserialize, Serialize};

use crate::accounting::{AccountCodes, AccountRole};
use crate::BASE_CURRENCY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingKey {
    AccountingEnabled,
    LedgersEnabled,
    UnitsEnabled,
    BaseCurrency,
    FiscalYearStart,
    CoaSeeded,
}

impl SettingKey {
    pub fn key(&self) -> &'static str {
        match self {
            SettingKey::AccountingEnabled => "accounting.enabled",
            SettingKey::LedgersEnabled => "ledgers.enabled",
            SettingKey::UnitsEnabled => "units.enabled",
            SettingKey::BaseCurrency => "currency.base",
            SettingKey::FiscalYearStart => "accounting.fiscalYearStart",
            SettingKey::CoaSeeded => "accounting.coaSeeded",
        }
    }

    /// Older key read when the primary key is absent.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            SettingKey::AccountingEnabled => Some("modules.accounting.enabled"),
            SettingKey::LedgersEnabled => Some("modules.ledgers.enabled"),
            SettingKey::UnitsEnabled => Some("modules.units.enabled"),
            _ => None,
        }
    }
}

/// Resolved toggles and account codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSettings {
    pub accounting_enabled: bool,
    pub ledgers_enabled: bool,
    pub units_enabled: bool,
    pub base_currency: String,
    /// `MM-DD`.
    pub fiscal_year_start: String,
    pub account_codes: AccountCodes,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        ModuleSettings {
            accounting_enabled: true,
            ledgers_enabled: true,
            units_enabled: true,
            base_currency: BASE_CURRENCY.to_string(),
            fiscal_year_start: "01-01".to_string(),
            account_codes: AccountCodes::default(),
        }
    }
}

impl ModuleSettings {
    /// Resolves every recognized key through `lookup`.
    ///
    /// ## Example
    /// ```rust
    /// use std::collections::HashMap;
    /// use tally_core::settings::ModuleSettings;
    ///
    /// let mut stored = HashMap::new();
    /// stored.insert("modules.ledgers.enabled".to_string(), "false".to_string());
    /// stored.insert("accounting.cashAccountCode".to_string(), "1010".to_string());
    ///
    /// let settings = ModuleSettings::resolve(|key| stored.get(key).cloned());
    /// assert!(settings.accounting_enabled);
    /// assert!(!settings.ledgers_enabled);
    /// assert_eq!(settings.account_codes.cash, "1010");
    /// ```
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: SettingKey| {
            lookup(key.key()).or_else(|| key.alias().and_then(|alias| lookup(alias)))
        };
        let enabled = |key: SettingKey| read(key).map(|v| v != "false").unwrap_or(true);
        let text = |key: SettingKey, default: &str| {
            read(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let account_codes = AccountRole::ALL
            .iter()
            .fold(AccountCodes::default(), |codes, role| {
                match lookup(role.setting_key()) {
                    Some(code) => codes.with_code(*role, &code),
                    None => codes,
                }
            });

        ModuleSettings {
            accounting_enabled: enabled(SettingKey::AccountingEnabled),
            ledgers_enabled: enabled(SettingKey::LedgersEnabled),
            units_enabled: enabled(SettingKey::UnitsEnabled),
            base_currency: text(SettingKey::BaseCurrency, BASE_CURRENCY),
            fiscal_year_start: text(SettingKey::FiscalYearStart, "01-01"),
            account_codes,
        }
    }
}
