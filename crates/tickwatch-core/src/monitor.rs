//! Monitor model: a single price threshold bound to a one-shot action.
//!
//! A monitor is either *active* (untriggered, indexed, backing a live
//! subscription) or *terminal* (triggered or removed). The only allowed
//! transitions are `Active -> Triggered -> Deleted` and `Active -> Deleted`.

use crate::decimal::Price;
use crate::error::CoreError;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique monitor identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(pub Uuid);

impl MonitorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MonitorId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidMonitorId(format!("{s}: {e}")))
    }
}

/// Which side of the threshold fires the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Fires when the traded price is at or above the threshold.
    Above,
    /// Fires when the traded price is at or below the threshold.
    Below,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Above, Direction::Below];

    /// Condition string used by the monitor API.
    pub fn as_condition(&self) -> &'static str {
        match self {
            Self::Above => "price:gt",
            Self::Below => "price:lt",
        }
    }

    pub fn from_condition(s: &str) -> Result<Self, CoreError> {
        match s {
            "price:gt" => Ok(Self::Above),
            "price:lt" => Ok(Self::Below),
            other => Err(CoreError::InvalidDirection(format!(
                "expected price:gt or price:lt, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Above => write!(f, "above"),
            Self::Below => write!(f, "below"),
        }
    }
}

/// Notification content for an alert monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    pub title: String,
    pub body: String,
}

/// Opaque order instruction forwarded verbatim to the broker.
///
/// Always a JSON object once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderPayload(pub serde_json::Value);

impl OrderPayload {
    /// Build from a JSON object, or from a string holding a JSON object.
    pub fn parse(value: serde_json::Value) -> Result<Self, CoreError> {
        let value = match value {
            serde_json::Value::String(s) => serde_json::from_str(&s).map_err(|e| {
                CoreError::InvalidAction(format!("order payload is not valid JSON: {e}"))
            })?,
            other => other,
        };
        if !value.is_object() {
            return Err(CoreError::InvalidAction(
                "order payload must be a JSON object".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Reaction fired when a monitor's threshold is crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Alert(AlertAction),
    Order { payload: OrderPayload },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Alert(_) => ActionKind::Alert,
            Self::Order { .. } => ActionKind::Order,
        }
    }
}

/// Discriminant of [`Action`], used for listing and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Alert,
    Order,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client request for a new monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub symbol: Symbol,
    pub direction: Direction,
    pub threshold: Price,
    pub action: Action,
}

impl MonitorSpec {
    /// Check the invariants a symbol type alone cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.threshold.is_positive() {
            return Err(CoreError::InvalidThreshold(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        match &self.action {
            Action::Alert(alert) => {
                if alert.title.trim().is_empty() {
                    return Err(CoreError::InvalidAction(
                        "alert title must not be empty".to_string(),
                    ));
                }
            }
            Action::Order { payload } => {
                if !payload.as_value().is_object() {
                    return Err(CoreError::InvalidAction(
                        "order payload must be a JSON object".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Persisted monitor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub threshold: Price,
    pub action: Action,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
}

impl Monitor {
    /// Materialize a spec as a fresh, untriggered record.
    pub fn from_spec(spec: MonitorSpec) -> Self {
        Self::with_id(MonitorId::new(), spec, Utc::now())
    }

    pub fn with_id(id: MonitorId, spec: MonitorSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: spec.symbol,
            direction: spec.direction,
            threshold: spec.threshold,
            action: spec.action,
            triggered: false,
            created_at,
            triggered_at: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        !self.triggered
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    /// Monotonic `false -> true` transition. Returns whether it happened.
    pub fn mark_triggered(&mut self, at: DateTime<Utc>) -> bool {
        if self.triggered {
            return false;
        }
        self.triggered = true;
        self.triggered_at = Some(at);
        true
    }
}
