//! Dispatch: pick the one decoder that claims a card.
//!
//! Decoders are unit structs registered by value in `DECODERS`. Order matters
//! only as a tie-break; fixtures assert that at most one decoder matches any
//! card, so ambiguity shows up as a test failure rather than a silent choice.

use crate::card::Card;
use crate::info::{CardOutcome, TransitIdentity, TransitInfo};
use crate::schemes::{
    clipper::ClipperDecoder, ovc::OvcDecoder, suica::SuicaDecoder, tmoney::TmoneyDecoder,
    troika::TroikaDecoder, ventra::VentraDecoder,
};
use crate::types::{hex_encode, Result};

/// One transit scheme's decoder.
pub trait CardDecoder: Send + Sync {
    /// Scheme name, also used as the card name.
    fn name(&self) -> &'static str;

    /// Card family the decoder reads, for listings.
    fn family(&self) -> &'static str;

    /// Cheap structural check. Must never fail or panic.
    fn matches(&self, card: &Card) -> bool;

    /// Card name and serial without a full decode.
    fn identity(&self, card: &Card) -> Result<TransitIdentity>;

    /// Full decode: balances, trips, subscriptions.
    fn decode_info(&self, card: &Card) -> Result<TransitInfo>;
}

/// All decoders, in dispatch order.
pub static DECODERS: &[&dyn CardDecoder] = &[
    &ClipperDecoder,
    &OvcDecoder,
    &TroikaDecoder,
    &VentraDecoder,
    &SuicaDecoder,
    &TmoneyDecoder,
];

/// Ordered decoder list.
#[derive(Clone)]
pub struct Registry {
    decoders: Vec<&'static dyn CardDecoder>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new(DECODERS.to_vec())
    }
}

impl Registry {
    pub fn new(decoders: Vec<&'static dyn CardDecoder>) -> Self {
        Registry { decoders }
    }

    pub fn decoders(&self) -> &[&'static dyn CardDecoder] {
        &self.decoders
    }

    /// First decoder whose `matches` accepts the card.
    pub fn resolve(&self, card: &Card) -> Option<&'static dyn CardDecoder> {
        self.decoders.iter().copied().find(|d| d.matches(card))
    }

    /// Names of every decoder that accepts the card. More than one entry is a
    /// registration bug.
    pub fn matching(&self, card: &Card) -> Vec<&'static str> {
        self.decoders
            .iter()
            .filter(|d| d.matches(card))
            .map(|d| d.name())
            .collect()
    }

    /// Cheap identification, suitable for a whole card history list.
    pub fn identify(&self, card: &Card) -> Option<TransitIdentity> {
        let decoder = self.resolve(card)?;
        match decoder.identity(card) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!(decoder = decoder.name(), error = %e, "identity unavailable");
                Some(TransitIdentity::new(decoder.name(), None))
            }
        }
    }

    /// Full decode. Never fails: problems are reported through `CardOutcome`.
    pub fn decode(&self, card: &Card) -> CardOutcome {
        let Some(decoder) = self.resolve(card) else {
            tracing::debug!(family = card.family(), "no decoder claims card");
            return CardOutcome::Unsupported {
                serial: raw_serial(card),
            };
        };

        tracing::debug!(decoder = decoder.name(), family = card.family(), "decoding card");
        match decoder.decode_info(card) {
            Ok(info) => CardOutcome::Decoded(info),
            Err(error) => {
                tracing::warn!(decoder = decoder.name(), %error, "card decode failed");
                CardOutcome::Failed {
                    identity: decoder.identity(card).ok(),
                    error,
                }
            }
        }
    }
}

/// Tag id as hex, the only serial an unsupported card can offer.
fn raw_serial(card: &Card) -> Option<String> {
    let id = card.tag_id();
    if id.is_empty() {
        None
    } else {
        Some(hex_encode(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
