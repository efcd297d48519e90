//! Confirmation gate for downloads over metered networks

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::ledger::{FjallStore, LedgerError};

const TRAFFIC_WARNING_KEY: &str = "traffic_warning";

/// Tells whether the active network connection is metered.
pub trait NetworkMonitor: Send + Sync {
    fn is_metered(&self) -> bool;
}

/// Network whose metered flag is set from configuration and may be flipped
/// at runtime.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    metered: AtomicBool,
}

impl StaticNetwork {
    pub fn new(metered: bool) -> Self {
        Self {
            metered: AtomicBool::new(metered),
        }
    }

    pub fn set_metered(&self, metered: bool) {
        self.metered.store(metered, Ordering::Relaxed);
    }
}

impl NetworkMonitor for StaticNetwork {
    fn is_metered(&self) -> bool {
        self.metered.load(Ordering::Relaxed)
    }
}

/// User preferences persisted in the ledger
#[derive(Clone)]
pub struct AppSettings {
    store: FjallStore,
    default_traffic_warning: bool,
}

impl AppSettings {
    pub fn new(store: FjallStore, default_traffic_warning: bool) -> Self {
        Self {
            store,
            default_traffic_warning,
        }
    }

    /// Whether downloads over a metered network need confirmation
    pub fn is_traffic_warning_enabled(&self) -> Result<bool, LedgerError> {
        Ok(match self.store.setting(TRAFFIC_WARNING_KEY)?.as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => self.default_traffic_warning,
        })
    }

    pub fn set_traffic_warning_enabled(&self, enabled: bool) -> Result<(), LedgerError> {
        self.store
            .put_setting(TRAFFIC_WARNING_KEY, if enabled { "true" } else { "false" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmAction {
    Continue,
    Cancel,
}

/// Answer to the data transfer warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub action: ConfirmAction,
    #[serde(default)]
    pub dont_ask_again: bool,
}

impl Confirmation {
    pub fn proceed(dont_ask_again: bool) -> Self {
        Self {
            action: ConfirmAction::Continue,
            dont_ask_again,
        }
    }

    pub fn cancel() -> Self {
        Self {
            action: ConfirmAction::Cancel,
            dont_ask_again: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDecision {
    Proceed,
    ConfirmationRequired,
    Declined,
}

/// Decides whether a start request may go ahead on the current network.
#[derive(Clone)]
pub struct TrafficGate {
    network: Arc<dyn NetworkMonitor>,
    settings: AppSettings,
}

impl TrafficGate {
    pub fn new(network: Arc<dyn NetworkMonitor>, settings: AppSettings) -> Self {
        Self { network, settings }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn check(&self, confirmation: Option<Confirmation>) -> Result<TransferDecision, LedgerError> {
        if !self.network.is_metered() || !self.settings.is_traffic_warning_enabled()? {
            return Ok(TransferDecision::Proceed);
        }

        match confirmation {
            None => Ok(TransferDecision::ConfirmationRequired),
            Some(Confirmation {
                action: ConfirmAction::Cancel,
                ..
            }) => Ok(TransferDecision::Declined),
            Some(Confirmation {
                action: ConfirmAction::Continue,
                dont_ask_again,
            }) => {
                self.settings.set_traffic_warning_enabled(!dont_ask_again)?;
                if dont_ask_again {
                    info!("Traffic warning disabled");
                }
                Ok(TransferDecision::Proceed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gate(metered: bool) -> (TrafficGate, Arc<StaticNetwork>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("ledger")).unwrap();
        let network = Arc::new(StaticNetwork::new(metered));
        let gate = TrafficGate::new(network.clone(), AppSettings::new(store, true));
        (gate, network, temp_dir)
    }

    #[test]
    fn test_unmetered_network_proceeds() {
        let (gate, _network, _temp) = gate(false);
        assert_eq!(gate.check(None).unwrap(), TransferDecision::Proceed);
    }

    #[test]
    fn test_metered_network_requires_confirmation() {
        let (gate, _network, _temp) = gate(true);
        assert_eq!(gate.check(None).unwrap(), TransferDecision::ConfirmationRequired);
        assert_eq!(
            gate.check(Some(Confirmation::cancel())).unwrap(),
            TransferDecision::Declined
        );
        assert_eq!(
            gate.check(Some(Confirmation::proceed(false))).unwrap(),
            TransferDecision::Proceed
        );
        assert!(gate.settings().is_traffic_warning_enabled().unwrap());
    }

    #[test]
    fn test_dont_ask_again_persists() {
        let (gate, network, _temp) = gate(true);
        assert_eq!(
            gate.check(Some(Confirmation::proceed(true))).unwrap(),
            TransferDecision::Proceed
        );
        assert!(!gate.settings().is_traffic_warning_enabled().unwrap());
        assert_eq!(gate.check(None).unwrap(), TransferDecision::Proceed);

        network.set_metered(false);
        assert_eq!(gate.check(None).unwrap(), TransferDecision::Proceed);
    }
}
