//! Subscription Channel Building
//!
//! Turns symbols and channel codes into the exact subscription tokens the
//! upstream wire protocol expects (`{code}.{symbol}`), validating every
//! requested code against the resolved entitlement first.

use thiserror::Error;

use super::entitlement::{Entitlement, channel_catalog, default_channel};
use super::market::{AssetClass, SubscriptionTier, Symbol};

// =============================================================================
// Errors
// =============================================================================

/// Rejected subscription request.
///
/// Raised before any token is produced; a request with one bad code yields
/// no output at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The code exists but requires a higher tier than the account has.
    #[error(
        "channel '{code}' is not available for {asset_class} on the {tier} tier \
         (requires {required} or higher)"
    )]
    Unauthorized {
        /// Offending channel code.
        code: String,
        /// Asset class of the request.
        asset_class: AssetClass,
        /// Tier the account resolved to.
        tier: SubscriptionTier,
        /// Minimum tier the channel requires.
        required: SubscriptionTier,
    },

    /// The code is not part of the asset class's catalog at any tier.
    #[error("unknown channel '{code}' for {asset_class}")]
    UnknownChannel {
        /// Offending channel code.
        code: String,
        /// Asset class of the request.
        asset_class: AssetClass,
    },
}

// =============================================================================
// Channel Builder
// =============================================================================

/// Builds wire subscription tokens from symbols and channel codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelBuilder;

impl ChannelBuilder {
    /// Build the ordered token list for a subscription request.
    ///
    /// When `codes` is `None` the asset class's single default channel is
    /// used. Tokens are the Cartesian product of codes and symbols with
    /// codes as the outer loop, so all tokens for one code stay contiguous;
    /// the output is deterministic for identical inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if any requested code is unknown or not
    /// available at the entitlement's tier. Validation is all-or-nothing:
    /// no tokens are produced when any code is rejected.
    pub fn build(
        entitlement: &Entitlement,
        symbols: &[Symbol],
        codes: Option<&[String]>,
    ) -> Result<Vec<String>, ChannelError> {
        let codes: Vec<&str> = codes.map_or_else(
            || vec![default_channel(entitlement.asset_class)],
            |requested| requested.iter().map(String::as_str).collect(),
        );

        for code in &codes {
            Self::validate(entitlement, code)?;
        }

        let mut tokens = Vec::with_capacity(codes.len() * symbols.len());
        for code in &codes {
            for symbol in symbols {
                tokens.push(format!("{code}.{symbol}"));
            }
        }

        Ok(tokens)
    }

    /// Check a single code against the entitlement's availability filter.
    fn validate(entitlement: &Entitlement, code: &str) -> Result<(), ChannelError> {
        if entitlement.allows(code) {
            return Ok(());
        }

        let known = channel_catalog(entitlement.asset_class)
            .iter()
            .find(|spec| spec.code == code);

        match known {
            Some(spec) => Err(ChannelError::Unauthorized {
                code: code.to_string(),
                asset_class: entitlement.asset_class,
                tier: entitlement.tier,
                required: spec.min_tier,
            }),
            None => Err(ChannelError::UnknownChannel {
                code: code.to_string(),
                asset_class: entitlement.asset_class,
            }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
