//! Channel and assurance-tier types.
//!
//! `AssuranceTier` is fully determined by `Channel` (spec.md §3); the
//! mapping lives here as the single source of truth so every crate that
//! needs it (identity store, pipeline, adapters) agrees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inbound/outbound channel recognized by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Slack,
    Discord,
    Telegram,
    Neovim,
    Terminal,
}

impl Channel {
    /// The full set of recognized channels, in a fixed order.
    pub const ALL: [Channel; 5] = [
        Channel::Slack,
        Channel::Discord,
        Channel::Telegram,
        Channel::Neovim,
        Channel::Terminal,
    ];

    /// `assurance_tier` is fully determined by `channel` (spec.md §3, §4.3).
    pub fn assurance_tier(self) -> AssuranceTier {
        match self {
            Channel::Slack | Channel::Discord | Channel::Neovim | Channel::Terminal => {
                AssuranceTier::TierA
            }
            Channel::Telegram => AssuranceTier::TierB,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Slack => "slack",
            Channel::Discord => "discord",
            Channel::Telegram => "telegram",
            Channel::Neovim => "neovim",
            Channel::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse identity-strength label derived solely from the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssuranceTier {
    TierA,
    TierB,
    TierC,
}

impl AssuranceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            AssuranceTier::TierA => "tier_a",
            AssuranceTier::TierB => "tier_b",
            AssuranceTier::TierC => "tier_c",
        }
    }
}

impl fmt::Display for AssuranceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_for_channel_is_fixed() {
        assert_eq!(Channel::Slack.assurance_tier(), AssuranceTier::TierA);
        assert_eq!(Channel::Discord.assurance_tier(), AssuranceTier::TierA);
        assert_eq!(Channel::Neovim.assurance_tier(), AssuranceTier::TierA);
        assert_eq!(Channel::Terminal.assurance_tier(), AssuranceTier::TierA);
        assert_eq!(Channel::Telegram.assurance_tier(), AssuranceTier::TierB);
    }
}
