//! Domain error types.
//!
//! Three tiers: [`FeedError`] for the price feed boundary, [`TradeError`]
//! for single-trade validation failures, and [`PapertradeError`] as the
//! top-level type covering configuration, storage, and io.

/// Errors from the price feed boundary.
///
/// Transient variants (`Timeout`, `RateLimited`, `Transient`) are absorbed
/// by the price cache via the stale-quote fallback and only surface when no
/// usable quote exists at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    #[error("unknown symbol: {0}")]
    SymbolUnknown(String),

    #[error("feed timeout after {seconds}s for {symbol}")]
    Timeout { symbol: String, seconds: u64 },

    #[error("feed rate limited")]
    RateLimited,

    #[error("feed error for {symbol}: {reason}")]
    Transient { symbol: String, reason: String },
}

impl FeedError {
    /// Whether a retry on the next refresh cycle could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FeedError::SymbolUnknown(_))
    }
}

/// Validation failures for a single trade request.
///
/// Terminal for that request; engine state is left unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeError {
    #[error("unknown player id {0}")]
    UnknownPlayer(u64),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(f64),

    #[error("no usable price for {symbol}: {source}")]
    PriceUnavailable { symbol: String, source: FeedError },

    #[error("stale quote for {symbol} rejected")]
    StalePrice { symbol: String },

    #[error("insufficient funds: need {required:.2}, have {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient holdings of {symbol}: want {requested}, hold {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: f64,
        held: f64,
    },
}

/// Top-level error type for papertrade.
#[derive(Debug, thiserror::Error)]
pub enum PapertradeError {
    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("store error: {reason}")]
    Store { reason: String },

    #[error("store query error: {reason}")]
    StoreQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PapertradeError> for std::process::ExitCode {
    fn from(err: &PapertradeError) -> Self {
        let code: u8 = match err {
            PapertradeError::Io(_) => 1,
            PapertradeError::ConfigParse { .. }
            | PapertradeError::ConfigMissing { .. }
            | PapertradeError::ConfigInvalid { .. } => 2,
            PapertradeError::Store { .. } | PapertradeError::StoreQuery { .. } => 3,
            PapertradeError::Feed(_) => 4,
            PapertradeError::Trade(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
