use clap::{Args, Parser, Subcommand};
use execution_core::{OrderFilter, OrderSide};
use execution_engine::QuoteSides;
use rust_decimal::Decimal;

/// Maker-only order automation for Bitfinex.
#[derive(Debug, Parser)]
#[command(name = "maker-kit", version)]
pub struct Cli {
    /// Print what would be sent without touching the venue.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Use the paper trading environment regardless of BITFINEX_ENV.
    #[arg(long, global = true)]
    pub paper: bool,

    /// Allow in-place price updates. Otherwise price changes cancel and recreate.
    #[arg(long, global = true, env = "BITFINEX_ATOMIC_PRICE")]
    pub atomic_price: bool,

    #[command(subcommand)]
    pub command: Action,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Place one post-only limit order.
    Put {
        symbol: String,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    },
    /// Cancel orders by exchange id or by filter.
    Cancel {
        /// Exchange ids to cancel.
        #[arg(long = "id", num_args = 1..)]
        ids: Vec<u64>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show tracked orders.
    List {
        #[command(flatten)]
        filter: FilterArgs,
        /// Per-side totals instead of one line per order.
        #[arg(long)]
        summary: bool,
    },
    /// Change price and/or amount of one order, or of every order matching
    /// the --filter-* options.
    Update {
        /// Exchange id of the order.
        id: Option<u64>,
        #[arg(long)]
        price: Option<Decimal>,
        /// New unsigned amount.
        #[arg(long, conflicts_with = "delta")]
        amount: Option<Decimal>,
        /// Signed change to the remaining amount.
        #[arg(long, allow_negative_numbers = true)]
        delta: Option<Decimal>,
        #[command(flatten)]
        filter: UpdateFilterArgs,
    },
    /// Cancel every open order, optionally for one symbol only.
    Clear { symbol: Option<String> },
    /// Place evenly spaced orders stepping away from the spread.
    Ladder {
        symbol: String,
        side: OrderSide,
        /// Price of the level closest to the spread.
        #[arg(long)]
        start: Decimal,
        #[arg(long)]
        step: Decimal,
        #[arg(long, default_value_t = 5)]
        levels: usize,
        /// Amount per level.
        #[arg(long)]
        amount: Decimal,
    },
    /// Quote symmetric levels around a center price.
    MarketMake {
        symbol: String,
        /// Center price. Defaults to the current mid.
        #[arg(long)]
        center: Option<Decimal>,
        /// Levels per side.
        #[arg(long, default_value_t = 3)]
        levels: usize,
        /// Distance between levels in percent of the center.
        #[arg(long, default_value = "0.5")]
        spread: Decimal,
        /// Amount per level.
        #[arg(long)]
        amount: Decimal,
        #[arg(long, conflicts_with = "sell_only")]
        buy_only: bool,
        #[arg(long)]
        sell_only: bool,
    },
    /// Place orders inside the spread until it is narrower than a target.
    FillSpread {
        symbol: String,
        /// Widest acceptable spread in percent of mid.
        #[arg(long)]
        target_spread: Decimal,
        /// Amount per order.
        #[arg(long)]
        amount: Decimal,
        /// Quote one order per side around this price instead.
        #[arg(long)]
        center: Option<Decimal>,
        /// Most orders on either side.
        #[arg(long, default_value_t = 5)]
        max_levels: usize,
    },
    /// Follow connection state and order changes until Ctrl+C.
    Watch {
        /// Symbols whose best bid/ask should be tracked.
        symbols: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    #[arg(long)]
    pub symbol: Option<String>,
    #[arg(long)]
    pub side: Option<OrderSide>,
    /// Match the unsigned remaining amount exactly.
    #[arg(long)]
    pub amount: Option<Decimal>,
    /// Match orders priced strictly below this.
    #[arg(long)]
    pub below: Option<Decimal>,
    /// Match orders priced strictly above this.
    #[arg(long)]
    pub above: Option<Decimal>,
}

impl FilterArgs {
    pub fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.side.is_none()
            && self.amount.is_none()
            && self.below.is_none()
            && self.above.is_none()
    }

    /// Active orders matching every given criterion.
    pub fn to_filter(&self) -> OrderFilter {
        let mut filter = OrderFilter::active();
        if let Some(symbol) = &self.symbol {
            filter = filter.with_symbol(symbol.clone());
        }
        if let Some(side) = self.side {
            filter = filter.with_side(side);
        }
        if let Some(amount) = self.amount {
            filter = filter.with_amount(amount);
        }
        if let Some(price) = self.below {
            filter = filter.with_price_below(price);
        }
        if let Some(price) = self.above {
            filter = filter.with_price_above(price);
        }
        filter
    }
}

/// Selects the orders a bulk update applies to.
#[derive(Debug, Args)]
pub struct UpdateFilterArgs {
    #[arg(id = "filter_symbol", long = "filter-symbol", conflicts_with = "id")]
    pub symbol: Option<String>,
    #[arg(id = "filter_direction", long = "filter-direction", conflicts_with = "id")]
    pub side: Option<OrderSide>,
    /// Match the unsigned remaining amount exactly.
    #[arg(id = "filter_size", long = "filter-size", conflicts_with = "id")]
    pub amount: Option<Decimal>,
}

impl UpdateFilterArgs {
    pub fn is_empty(&self) -> bool {
        self.symbol.is_none() && self.side.is_none() && self.amount.is_none()
    }

    pub fn to_filter(&self) -> OrderFilter {
        FilterArgs {
            symbol: self.symbol.clone(),
            side: self.side,
            amount: self.amount,
            below: None,
            above: None,
        }
        .to_filter()
    }
}

pub fn quote_sides(buy_only: bool, sell_only: bool) -> QuoteSides {
    match (buy_only, sell_only) {
        (true, _) => QuoteSides::BuyOnly,
        (_, true) => QuoteSides::SellOnly,
        _ => QuoteSides::Both,
    }
}

impl Action {
    /// Symbols whose quotes must be known before the command can be validated.
    pub fn quoted_symbols(&self) -> Vec<String> {
        match self {
            Action::Put { symbol, .. }
            | Action::Ladder { symbol, .. }
            | Action::MarketMake { symbol, .. }
            | Action::FillSpread { symbol, .. } => vec![symbol.clone()],
            Action::Watch { symbols } => symbols.clone(),
            Action::Cancel { .. } | Action::Clear { .. } | Action::List { .. } => Vec::new(),
            Action::Update { .. } => Vec::new(),
        }
    }
}
