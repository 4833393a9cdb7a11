use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use zeng_backtester::{
    run_backtest, synthetic_candles, BacktestConfig, BacktestError, Backtester, Rule,
};
use zeng_core::{Candle, Side};

fn candles_from(closes: &[Decimal]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Candle {
            timestamp: start + chrono::Duration::minutes(i as i64),
            open: *close,
            high: *close,
            low: *close,
            close: *close,
            volume: Decimal::ONE,
        })
        .collect()
}

fn rule(value: serde_json::Value) -> Rule {
    serde_json::from_value(value).unwrap()
}

fn price_above_sma(period: usize) -> Rule {
    rule(json!({
        "conditions": [
            { "type": "PRICE", "operator": ">", "value": { "type": "SMA", "period": period } }
        ],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "BUY", "quantity": 1 } }]
    }))
}

#[test]
fn sine_wave_scenario() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 15, 0).unwrap();
    let candles = synthetic_candles(500, start);
    let result = run_backtest(&price_above_sma(20), &candles, dec!(100000)).unwrap();

    assert_eq!(result.equity_curve.len(), 500);
    assert_eq!(result.equity_curve[0], dec!(100000));
    assert_eq!(
        result.total_profit,
        *result.equity_curve.last().unwrap() - dec!(100000)
    );
    // Long-only BUY rule: enters once, then holds.
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].side, Side::Buy);
    assert_eq!(result.trades[0].quantity, Decimal::ONE);
    assert_eq!(result.win_rate, Decimal::ZERO);
    assert!(result.max_drawdown >= Decimal::ZERO);
}

#[test]
fn repeated_runs_serialize_identically() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 15, 0).unwrap();
    let candles = synthetic_candles(300, start);
    let rule = rule(json!({
        "conditions": [
            { "type": "RSI", "indicator": { "period": 14 }, "operator": ">", "value": 50 },
            { "type": "EMA", "indicator": { "period": 10 }, "operator": ">=", "value": "24000" }
        ],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "SELL", "quantity": 2 } }]
    }));
    let first = serde_json::to_string(&run_backtest(&rule, &candles, dec!(100000)).unwrap()).unwrap();
    let second = serde_json::to_string(&run_backtest(&rule, &candles, dec!(100000)).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn buy_and_sell_follow_position_sign() {
    let candles = candles_from(&[dec!(10), dec!(11), dec!(12), dec!(13)]);
    let buy = rule(json!({
        "conditions": [{ "type": "PRICE", "operator": ">", "value": 0 }],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "BUY", "quantity": 5 } }]
    }));
    let result = run_backtest(&buy, &candles, dec!(100)).unwrap();
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].price, dec!(11));
    // cash 45 + 5 * 13
    assert_eq!(result.equity_curve, vec![dec!(100), dec!(100), dec!(105), dec!(110)]);
    assert_eq!(result.total_profit, dec!(10));
    assert_eq!(result.sharpe_ratio, dec!(10));

    let sell = rule(json!({
        "conditions": [{ "type": "PRICE", "operator": ">", "value": 0 }],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "SELL" } }]
    }));
    let result = run_backtest(&sell, &candles, dec!(100)).unwrap();
    assert_eq!(result.trades.len(), 1);
    // short 1 at 11: 111 - 12 = 99, 111 - 13 = 98
    assert_eq!(result.equity_curve, vec![dec!(100), dec!(100), dec!(99), dec!(98)]);
    assert_eq!(result.max_drawdown, dec!(2));
    assert_eq!(result.sharpe_ratio, dec!(-100));
}

#[test]
fn buy_requires_sufficient_cash() {
    let candles = candles_from(&[dec!(50), dec!(60), dec!(70)]);
    let buy = rule(json!({
        "conditions": [],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "BUY", "quantity": 2 } }]
    }));
    let result = run_backtest(&buy, &candles, dec!(100)).unwrap();
    assert!(result.trades.is_empty());
    assert_eq!(result.total_profit, Decimal::ZERO);
}

#[test]
fn null_indicator_values_fail_closed() {
    let candles = candles_from(&[dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]);
    let result = run_backtest(&price_above_sma(20), &candles, dec!(1000)).unwrap();
    assert!(result.trades.is_empty());
    assert_eq!(result.equity_curve.len(), 5);

    let unknown = rule(json!({
        "conditions": [{ "type": "VWAP", "indicator": { "period": 2 }, "operator": ">", "value": 0 }],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "BUY" } }]
    }));
    assert!(run_backtest(&unknown, &candles, dec!(1000)).unwrap().trades.is_empty());
}

#[test]
fn missing_period_uses_configured_default() {
    let candles = candles_from(&[dec!(1), dec!(2), dec!(3), dec!(4)]);
    let rule = rule(json!({
        "conditions": [{ "type": "SMA", "indicator": {}, "operator": ">", "value": 0 }],
        "actions": [{ "type": "PLACE_ORDER", "params": { "side": "BUY" } }]
    }));
    let config = BacktestConfig {
        initial_capital: dec!(100),
        default_period: 3,
    };
    let result = Backtester::new(config, &rule, &candles).run().unwrap();
    // SMA(3) is first defined at index 2.
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].price, dec!(3));

    let with_default = run_backtest(&rule, &candles, dec!(100)).unwrap();
    assert!(with_default.trades.is_empty());
}

#[test]
fn rejects_invalid_capital() {
    let rule = Rule::default();
    let candles = candles_from(&[dec!(1)]);
    assert_eq!(
        run_backtest(&rule, &candles, Decimal::ZERO).unwrap_err(),
        BacktestError::InvalidCapital(Decimal::ZERO)
    );
    let single = run_backtest(&rule, &candles, dec!(100)).unwrap();
    assert_eq!(single.equity_curve, vec![dec!(100)]);
    assert!(single.to_string().contains("Backtest Performance Report"));
}

#[test]
fn empty_candles_yield_a_flat_result() {
    let result = run_backtest(&price_above_sma(3), &[], dec!(5000)).unwrap();
    assert_eq!(result.equity_curve, vec![dec!(5000)]);
    assert_eq!(result.total_profit, Decimal::ZERO);
    assert_eq!(result.max_drawdown, Decimal::ZERO);
    assert!(result.trades.is_empty());
}
