//! transit-core: decoding engine for transit fare card dumps.
//!
//! No I/O beyond the optional config file: card dumps come in as structured
//! [`Card`] values, and each scheme decoder turns them into [`TransitInfo`]
//! (balances, trips, subscriptions). Exports can be run through
//! [`ObfuscationContext`] to scrub dates, times and fares.

pub mod bits;
pub mod card;
pub mod config;
pub mod currency;
pub mod info;
pub mod merge;
pub mod obfuscate;
pub mod registry;
pub mod schemes;
pub mod station;
pub mod subscription;
pub mod trip;
pub mod types;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types at crate root
pub use card::Card;
pub use currency::{TransitBalance, TransitCurrency};
pub use info::{CardOutcome, ExtraInfo, TransitIdentity, TransitInfo};
pub use obfuscate::{ObfuscationContext, ObfuscationOptions};
pub use registry::{CardDecoder, Registry};
pub use trip::{Mode, Trip};
pub use types::{Result, TransitError};
