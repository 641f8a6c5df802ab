//! Protocol, chain and market identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported perpetuals protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolId {
    /// GMX v2 synthetics (on-chain).
    GmxV2,
    /// Perennial v2 (on-chain).
    Perennial,
    /// Orderly Network (off-chain order book).
    Orderly,
    /// Aevo (off-chain order book).
    Aevo,
}

impl ProtocolId {
    /// All protocols, in routing order.
    pub const ALL: [Self; 4] = [Self::GmxV2, Self::Perennial, Self::Orderly, Self::Aevo];

    /// Canonical identifier used inside market ids.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GmxV2 => "GMXV2",
            Self::Perennial => "PERENNIAL",
            Self::Orderly => "ORDERLY",
            Self::Aevo => "AEVO",
        }
    }

    /// Whether trades settle through wallet-signed transactions.
    #[must_use]
    pub const fn is_on_chain(&self) -> bool {
        matches!(self, Self::GmxV2 | Self::Perennial)
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GMXV2" | "GMX_V2" => Ok(Self::GmxV2),
            "PERENNIAL" => Ok(Self::Perennial),
            "ORDERLY" => Ok(Self::Orderly),
            "AEVO" => Ok(Self::Aevo),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// An EVM chain, identified by chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(u64);

impl Chain {
    /// Ethereum mainnet.
    pub const ETHEREUM: Self = Self(1);
    /// Optimism.
    pub const OPTIMISM: Self = Self(10);
    /// Arbitrum One.
    pub const ARBITRUM: Self = Self(42_161);
    /// Arbitrum Sepolia.
    pub const ARBITRUM_SEPOLIA: Self = Self(421_614);
    /// Sepolia.
    pub const SEPOLIA: Self = Self(11_155_111);

    /// Wrap a raw chain id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw chain id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }

    /// Whether this is a test network.
    #[must_use]
    pub const fn is_testnet(&self) -> bool {
        matches!(self.0, 421_614 | 11_155_111)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique market identifier: `{chain_id}-{PROTOCOL}-{native_id}`.
///
/// The native id is whatever the venue uses (a market token address, a
/// symbol such as `PERP_ETH_USDC`, or an instrument name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarketId {
    chain: Chain,
    protocol: ProtocolId,
    native_id: String,
}

impl MarketId {
    /// Build a market id.
    #[must_use]
    pub fn new(chain: Chain, protocol: ProtocolId, native_id: impl Into<String>) -> Self {
        Self {
            chain,
            protocol,
            native_id: native_id.into(),
        }
    }

    /// Chain the market lives on.
    #[must_use]
    pub const fn chain(&self) -> Chain {
        self.chain
    }

    /// Owning protocol.
    #[must_use]
    pub const fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    /// Venue-native market identifier.
    #[must_use]
    pub fn native_id(&self) -> &str {
        &self.native_id
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.chain, self.protocol, self.native_id)
    }
}

impl FromStr for MarketId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (Some(chain), Some(protocol), Some(native_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("malformed market id: {s}"));
        };

        let chain = chain
            .parse::<u64>()
            .map_err(|_| format!("invalid chain id in market id: {s}"))?;
        let protocol = protocol.parse::<ProtocolId>()?;
        if native_id.is_empty() {
            return Err(format!("empty native id in market id: {s}"));
        }

        Ok(Self::new(Chain::new(chain), protocol, native_id))
    }
}

impl TryFrom<String> for MarketId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MarketId> for String {
    fn from(value: MarketId) -> Self {
        value.to_string()
    }
}
