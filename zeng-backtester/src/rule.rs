//! Rule model: AND-ed conditions followed by an ordered action list.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zeng_core::{Price, Quantity, Side};

/// Period used when a condition does not name one.
pub const DEFAULT_PERIOD: usize = 14;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Rule {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionKind {
    Price,
    Sma,
    Ema,
    Rsi,
    /// Anything else never evaluates to true.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct IndicatorParams {
    #[serde(default)]
    pub period: Option<usize>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(other)]
    Unsupported,
}

impl Comparison {
    pub fn holds(self, left: Decimal, right: Decimal) -> bool {
        match self {
            Self::Greater => left > right,
            Self::Less => left < right,
            Self::GreaterOrEqual => left >= right,
            Self::LessOrEqual => left <= right,
            Self::Equal => left == right,
            Self::Unsupported => false,
        }
    }
}

/// Another series on the right-hand side, e.g. `{"type": "SMA", "period": 20}`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeriesRef {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub period: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(Decimal),
    /// Numeric text; anything unparsable makes the condition false.
    Text(String),
    Series(SeriesRef),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<IndicatorParams>,
    pub operator: Comparison,
    pub value: ConditionValue,
}

impl Condition {
    /// The series this condition reads on its left-hand side, if any.
    ///
    /// Indicator conditions without an `indicator` block have no series and
    /// therefore never hold.
    pub fn series(&self, default_period: usize) -> Option<SeriesKey> {
        match self.kind {
            ConditionKind::Price => Some(SeriesKey::price()),
            ConditionKind::Unknown => None,
            kind => self
                .indicator
                .map(|params| SeriesKey::new(kind, params.period, default_period)),
        }
    }
}

/// Identity of a precomputed series: indicator kind plus effective period.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SeriesKey {
    pub kind: ConditionKind,
    pub period: usize,
}

impl SeriesKey {
    pub fn new(kind: ConditionKind, period: Option<usize>, default_period: usize) -> Self {
        let period = match kind {
            ConditionKind::Price => 0,
            _ => period.filter(|period| *period > 0).unwrap_or(default_period),
        };
        Self { kind, period }
    }

    pub fn price() -> Self {
        Self {
            kind: ConditionKind::Price,
            period: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    PlaceOrder,
    #[serde(other)]
    Other,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct OrderParams {
    #[serde(default)]
    pub side: Option<OrderSide>,
    #[serde(default)]
    pub quantity: Option<Quantity>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: OrderParams,
}

impl Action {
    pub fn place_order(side: Side, quantity: Quantity) -> Self {
        let side = match side {
            Side::Buy => OrderSide::Buy,
            Side::Sell => OrderSide::Sell,
        };
        Self {
            kind: ActionKind::PlaceOrder,
            params: OrderParams {
                side: Some(side),
                quantity: Some(quantity),
            },
        }
    }

    /// Side and quantity of a simulated order; quantity defaults to one.
    pub fn order(&self) -> Option<(Side, Quantity)> {
        if self.kind != ActionKind::PlaceOrder {
            return None;
        }
        let side = match self.params.side? {
            OrderSide::Buy => Side::Buy,
            OrderSide::Sell => Side::Sell,
            OrderSide::Unsupported => return None,
        };
        let quantity = self
            .params
            .quantity
            .filter(|quantity| !quantity.is_zero())
            .unwrap_or(Decimal::ONE);
        Some((side, quantity))
    }
}

impl ConditionValue {
    pub fn constant(&self) -> Option<Price> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Series(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_rule_with_series_reference() {
        let rule: Rule = serde_json::from_value(json!({
            "conditions": [
                { "type": "PRICE", "operator": ">", "value": { "type": "SMA", "period": 20 } },
                { "type": "RSI", "indicator": {}, "operator": "<", "value": "30" }
            ],
            "actions": [{ "type": "PLACE_ORDER", "params": { "side": "BUY" } }]
        }))
        .unwrap();
        assert_eq!(
            rule.conditions[0].value,
            ConditionValue::Series(SeriesRef {
                kind: ConditionKind::Sma,
                period: Some(20),
            })
        );
        assert_eq!(rule.conditions[1].value.constant(), Some(dec!(30)));
        assert_eq!(
            rule.conditions[1].series(DEFAULT_PERIOD),
            Some(SeriesKey {
                kind: ConditionKind::Rsi,
                period: 14,
            })
        );
        assert_eq!(rule.actions[0].order(), Some((Side::Buy, Decimal::ONE)));
    }

    #[test]
    fn unknown_tokens_fail_closed() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "MACD", "indicator": { "period": 9 }, "operator": "!=", "value": 1
        }))
        .unwrap();
        assert_eq!(condition.kind, ConditionKind::Unknown);
        assert_eq!(condition.operator, Comparison::Unsupported);
        assert_eq!(condition.series(DEFAULT_PERIOD), None);
        assert!(!Comparison::Unsupported.holds(dec!(1), dec!(1)));

        let action: Action = serde_json::from_value(json!({
            "type": "SEND_ALERT", "params": { "side": "BUY" }
        }))
        .unwrap();
        assert_eq!(action.order(), None);
        let odd_side: Action = serde_json::from_value(json!({
            "type": "PLACE_ORDER", "params": { "side": "HOLD", "quantity": 3 }
        }))
        .unwrap();
        assert_eq!(odd_side.order(), None);
    }

    #[test]
    fn indicator_without_params_has_no_series() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "SMA", "operator": ">", "value": 1
        }))
        .unwrap();
        assert_eq!(condition.series(DEFAULT_PERIOD), None);
        assert_eq!(ConditionValue::Text("abc".into()).constant(), None);
    }
}
