use crate::constants::USD;
use crate::errors::{DataIntegrityError, Result};

/// Drops the `t`/`f` trading/funding marker of an exchange symbol.
fn strip_symbol_marker(symbol: &str) -> &str {
    let mut chars = symbol.chars();
    match (chars.next(), chars.next()) {
        (Some('t' | 'f'), Some(c)) if c.is_ascii_uppercase() => &symbol[1..],
        _ => symbol,
    }
}

/// Splits `tBTCUSD` or `tTESTBTC:TESTUSD` into its first and last leg.
pub fn split_symbol_pair(symbol: &str) -> Result<(String, String)> {
    let bare = strip_symbol_marker(symbol);
    let pair = match bare.split_once(':') {
        Some((first, last)) if !first.is_empty() && !last.is_empty() && !last.contains(':') => {
            Some((first, last))
        }
        Some(_) => None,
        None if bare.len() == 6 && bare.is_ascii() => Some(bare.split_at(3)),
        None => None,
    };

    pair.map(|(first, last)| (first.to_string(), last.to_string()))
        .ok_or_else(|| {
            DataIntegrityError::CurrencyPairSeparation {
                symbol: symbol.to_string(),
            }
            .into()
        })
}

/// Candle symbol pricing `currency` in USD.
pub fn usd_pair_symbol(currency: &str) -> String {
    let separator = if currency.len() > 3 { ":" } else { "" };
    format!("t{currency}{separator}{USD}")
}

/// Perpetual and futures symbols carry an `F0` leg.
pub fn is_derivative_symbol(symbol: &str) -> bool {
    symbol.contains("F0")
}

pub fn is_usd(currency: &str) -> bool {
    currency.eq_ignore_ascii_case(USD)
}
