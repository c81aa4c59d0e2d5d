//! Fugle realtime intraday quote frames.
//!
//! Only the fields the matcher needs are modelled:
//!
//! ```json
//! {"data": {
//!   "info":  {"symbolId": "2330", "type": "EQUITY"},
//!   "quote": {"trade": {"price": 581, "at": "2023-05-02T01:30:00.000Z"},
//!             "total": {"tradeVolume": 12034}}}}
//! ```

use crate::error::WsResult;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tickwatch_core::{Price, Quote, Symbol, Volume};
use tracing::debug;

/// Instrument type whose quotes are forwarded.
pub const EQUITY_TYPE: &str = "EQUITY";

#[derive(Debug, Deserialize)]
struct Frame {
    data: Option<FrameData>,
}

#[derive(Debug, Deserialize)]
struct FrameData {
    info: Option<Info>,
    quote: Option<QuoteBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Info {
    symbol_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    trade: Option<Trade>,
    total: Option<Total>,
}

#[derive(Debug, Deserialize)]
struct Trade {
    price: Option<serde_json::Value>,
    at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Total {
    trade_volume: Option<serde_json::Value>,
    at: Option<DateTime<Utc>>,
}

/// Parse one text frame.
///
/// Returns `Ok(None)` for frames that carry no equity quote (control frames,
/// non-equity instruments, frames without a quote body) and for frames about
/// a symbol other than `subscribed`. A quote without a `trade` section is
/// returned with `price: None`.
pub fn parse_quote(text: &str, subscribed: &Symbol) -> WsResult<Option<Quote>> {
    let frame: Frame = serde_json::from_str(text)?;
    let Some(data) = frame.data else {
        return Ok(None);
    };
    let Some(info) = data.info else {
        return Ok(None);
    };
    if info.kind.as_deref() != Some(EQUITY_TYPE) {
        return Ok(None);
    }
    let Some(body) = data.quote else {
        return Ok(None);
    };

    if let Some(raw) = info.symbol_id.as_deref() {
        if !Symbol::new(raw).is_ok_and(|symbol| symbol == *subscribed) {
            debug!(%subscribed, frame_symbol = raw, "Dropping frame for another symbol");
            return Ok(None);
        }
    }

    let (price, trade_at) = match &body.trade {
        Some(trade) => (
            trade.price.as_ref().and_then(Price::from_json),
            trade.at,
        ),
        None => (None, None),
    };

    let volume = body
        .total
        .as_ref()
        .and_then(|t| t.trade_volume.as_ref())
        .and_then(Volume::from_json)
        .unwrap_or(Volume::ZERO);

    let timestamp = trade_at
        .or_else(|| body.total.as_ref().and_then(|t| t.at))
        .unwrap_or_else(Utc::now);

    Ok(Some(Quote::new(subscribed.clone(), price, volume, timestamp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tsmc() -> Symbol {
        Symbol::new("2330").unwrap()
    }

    #[test]
    fn test_parse_equity_trade() {
        let raw = r#"{"data":{"info":{"symbolId":"2330","type":"EQUITY"},
            "quote":{"trade":{"price":581.5,"at":"2023-05-02T01:30:00.000Z"},
                     "total":{"tradeVolume":12034}}}}"#;
        let quote = parse_quote(raw, &tsmc()).unwrap().unwrap();
        assert_eq!(quote.symbol, tsmc());
        assert_eq!(quote.price, Some(Price::new(dec!(581.5))));
        assert_eq!(quote.volume, Volume::new(dec!(12034)));
        assert_eq!(quote.timestamp.to_rfc3339(), "2023-05-02T01:30:00+00:00");
    }

    #[test]
    fn test_parse_without_trade_has_no_price() {
        let raw = r#"{"data":{"info":{"symbolId":"2330","type":"EQUITY"},
            "quote":{"total":{"tradeVolume":0}}}}"#;
        let quote = parse_quote(raw, &tsmc()).unwrap().unwrap();
        assert_eq!(quote.price, None);
        assert_eq!(quote.tradable_price(), None);
    }

    #[test]
    fn test_non_equity_is_skipped() {
        let raw = r#"{"data":{"info":{"symbolId":"IX0001","type":"INDEX"},
            "quote":{"trade":{"price":17000}}}}"#;
        assert!(parse_quote(raw, &tsmc()).unwrap().is_none());
    }

    #[test]
    fn test_control_frame_is_skipped() {
        assert!(parse_quote(r#"{"event":"pong"}"#, &tsmc()).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_quote("not json", &tsmc()).is_err());
    }

    #[test]
    fn test_frame_for_other_symbol_is_dropped() {
        let raw = r#"{"data":{"info":{"symbolId":"2317","type":"EQUITY"},
            "quote":{"trade":{"price":105}}}}"#;
        assert!(parse_quote(raw, &tsmc()).unwrap().is_none());

        let raw = r#"{"data":{"info":{"symbolId":"   ","type":"EQUITY"},
            "quote":{"trade":{"price":105}}}}"#;
        assert!(parse_quote(raw, &tsmc()).unwrap().is_none());
    }

    #[test]
    fn test_missing_symbol_falls_back_to_subscription() {
        let raw = r#"{"data":{"info":{"type":"EQUITY"},"quote":{"trade":{"price":"10.05"}}}}"#;
        let quote = parse_quote(raw, &tsmc()).unwrap().unwrap();
        assert_eq!(quote.symbol, tsmc());
        assert_eq!(quote.price, Some(Price::new(dec!(10.05))));
    }
}
