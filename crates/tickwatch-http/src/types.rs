//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tickwatch_core::{
    Action, AlertAction, CoreError, Direction, Monitor, MonitorId, MonitorSpec, OrderPayload,
    Price, Symbol,
};

/// `POST /monitor/alerts`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlertRequest {
    pub symbol: String,
    /// `price:gt` or `price:lt`.
    #[serde(rename = "type")]
    pub condition: String,
    /// Number or decimal string.
    pub value: serde_json::Value,
    pub title: String,
    #[serde(default)]
    pub message: String,
}

/// `POST /monitor/orders`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    #[serde(rename = "type")]
    pub condition: String,
    pub value: serde_json::Value,
    /// JSON object, or a string holding one.
    pub order: serde_json::Value,
}

fn parse_threshold(value: &serde_json::Value) -> Result<Price, CoreError> {
    Price::from_json(value)
        .ok_or_else(|| CoreError::InvalidThreshold(format!("value is not a number: {value}")))
}

impl CreateAlertRequest {
    pub fn into_spec(self) -> Result<MonitorSpec, CoreError> {
        Ok(MonitorSpec {
            symbol: Symbol::new(&self.symbol)?,
            direction: Direction::from_condition(&self.condition)?,
            threshold: parse_threshold(&self.value)?,
            action: Action::Alert(AlertAction {
                title: self.title,
                body: self.message,
            }),
        })
    }
}

impl CreateOrderRequest {
    pub fn into_spec(self) -> Result<MonitorSpec, CoreError> {
        Ok(MonitorSpec {
            symbol: Symbol::new(&self.symbol)?,
            direction: Direction::from_condition(&self.condition)?,
            threshold: parse_threshold(&self.value)?,
            action: Action::Order {
                payload: OrderPayload::parse(self.order)?,
            },
        })
    }
}

/// Monitor as returned by the API, in the request's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorView {
    pub id: MonitorId,
    pub symbol: Symbol,
    #[serde(rename = "type")]
    pub condition: String,
    pub value: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<serde_json::Value>,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Monitor> for MonitorView {
    fn from(m: Monitor) -> Self {
        let (title, message, order) = match m.action {
            Action::Alert(alert) => (Some(alert.title), Some(alert.body), None),
            Action::Order { payload } => (None, None, Some(payload.0)),
        };
        Self {
            id: m.id,
            symbol: m.symbol,
            condition: m.direction.as_condition().to_string(),
            value: m.threshold,
            title,
            message,
            order,
            triggered: m.triggered,
            created_at: m.created_at,
        }
    }
}
