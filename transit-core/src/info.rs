//! Per-card decode results handed to display and export collaborators.

use serde::Serialize;

use crate::currency::TransitBalance;
use crate::subscription::Subscription;
use crate::trip::Trip;
use crate::types::TransitError;

/// Cheap identification of a card: scheme name plus serial if derivable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitIdentity {
    pub name: String,
    pub serial: Option<String>,
}

impl TransitIdentity {
    pub fn new(name: impl Into<String>, serial: Option<String>) -> Self {
        TransitIdentity {
            name: name.into(),
            serial,
        }
    }
}

/// Free-form label/value pair for advanced or debug display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraInfo {
    pub label: String,
    pub value: String,
}

impl ExtraInfo {
    pub fn new(label: impl Into<String>, value: impl ToString) -> Self {
        ExtraInfo {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

/// Everything decoded from one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitInfo {
    pub card_name: String,
    pub serial_number: Option<String>,
    pub balances: Vec<TransitBalance>,
    pub trips: Option<Vec<Trip>>,
    pub subscriptions: Option<Vec<Subscription>>,
    pub extra_info: Vec<ExtraInfo>,
}

impl TransitInfo {
    pub fn new(identity: TransitIdentity) -> Self {
        TransitInfo {
            card_name: identity.name,
            serial_number: identity.serial,
            balances: Vec::new(),
            trips: None,
            subscriptions: None,
            extra_info: Vec::new(),
        }
    }

    pub fn identity(&self) -> TransitIdentity {
        TransitIdentity::new(self.card_name.clone(), self.serial_number.clone())
    }

    pub fn trip_count(&self) -> usize {
        self.trips.as_ref().map_or(0, Vec::len)
    }
}

/// Result of running a card through the dispatch registry.
#[derive(Debug)]
pub enum CardOutcome {
    Decoded(TransitInfo),
    /// A decoder claimed the card but could not decode it. The identity is
    /// kept so the caller can still show which card was scanned.
    Failed {
        identity: Option<TransitIdentity>,
        error: TransitError,
    },
    /// No decoder claimed the card.
    Unsupported { serial: Option<String> },
}

impl CardOutcome {
    pub fn into_info(self) -> Option<TransitInfo> {
        match self {
            CardOutcome::Decoded(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, CardOutcome::Unsupported { .. })
    }

    /// One-line summary for listings.
    pub fn summary(&self) -> String {
        match self {
            CardOutcome::Decoded(info) => format!(
                "{} {}",
                info.card_name,
                info.serial_number.as_deref().unwrap_or("-")
            ),
            CardOutcome::Failed { identity, error } => match identity {
                Some(id) => format!("{} {}: {error}", id.name, id.serial.as_deref().unwrap_or("-")),
                None => format!("unreadable card: {error}"),
            },
            CardOutcome::Unsupported { serial } => {
                format!("unsupported card {}", serial.as_deref().unwrap_or("-"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_from_identity() {
        let info = TransitInfo::new(TransitIdentity::new("Clipper", Some("572691763".into())));
        assert_eq!(info.card_name, "Clipper");
        assert_eq!(info.trip_count(), 0);
        assert_eq!(info.identity().serial.as_deref(), Some("572691763"));
    }

    #[test]
    fn test_outcome_summary() {
        let failed = CardOutcome::Failed {
            identity: Some(TransitIdentity::new("Troika", Some("123".into()))),
            error: TransitError::MissingSector(8),
        };
        assert_eq!(failed.summary(), "Troika 123: sector 8 is missing or locked");
        assert!(failed.is_supported());
        assert!(failed.into_info().is_none());

        let unsupported = CardOutcome::Unsupported { serial: None };
        assert!(!unsupported.is_supported());
        assert_eq!(unsupported.summary(), "unsupported card -");
    }
}
