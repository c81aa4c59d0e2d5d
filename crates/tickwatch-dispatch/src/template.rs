//! Alert message template.

use crate::error::{DispatchError, DispatchResult};
use chrono::FixedOffset;
use tickwatch_core::{AlertAction, Quote};

/// Taipei time, the exchange's local time.
pub const DEFAULT_DISPLAY_OFFSET: &str = "+08:00";

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Parse an offset such as `+08:00` or `-05:00`.
pub fn parse_display_offset(raw: &str) -> DispatchResult<FixedOffset> {
    raw.trim()
        .parse::<FixedOffset>()
        .map_err(|e| DispatchError::InvalidOffset(format!("{raw}: {e}")))
}

/// Render the notification text for a triggered alert.
///
/// The text starts with an empty line so the title sits below the sender
/// name in the LINE client.
pub fn format_alert_message(alert: &AlertAction, quote: &Quote, offset: FixedOffset) -> String {
    let price = quote
        .price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let time = quote.timestamp.with_timezone(&offset).format(TIME_FORMAT);

    [
        String::new(),
        format!("<<{}>>", alert.title),
        alert.body.clone(),
        format!("成交價: {price}"),
        format!("成交量: {}", quote.volume),
        format!("時間: {time}"),
    ]
    .join("\n")
}
