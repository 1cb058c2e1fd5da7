//! Tradable asset representation.

use serde::Serialize;

use super::error::TradeError;

/// Closed set of asset classes; exhaustive handling matters for
/// class-specific rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Crypto,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Crypto => "crypto",
        }
    }

    pub fn parse(value: &str) -> Option<AssetClass> {
        match value.to_lowercase().as_str() {
            "equity" | "stock" => Some(AssetClass::Equity),
            "crypto" | "cryptocurrency" => Some(AssetClass::Crypto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub symbol: String,
    pub class: AssetClass,
    pub exchange: Option<String>,
}

impl Asset {
    pub fn is_crypto(&self) -> bool {
        self.class == AssetClass::Crypto
    }
}

/// Canonical form for symbols: trimmed and uppercased.
pub fn normalize_symbol(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Symbols are non-empty and limited to A-Z, 0-9, '-', '.' after
/// normalization.
pub fn validate_symbol(symbol: &str) -> Result<(), TradeError> {
    let valid = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(TradeError::UnknownSymbol(symbol.to_string()))
    }
}

/// Infer the asset class from the symbol's shape. Crypto quotes carry the
/// `-USD` suffix (`BTC-USD`); everything else is treated as an equity.
pub fn infer_class(symbol: &str) -> AssetClass {
    if symbol.ends_with("-USD") {
        AssetClass::Crypto
    } else {
        AssetClass::Equity
    }
}
