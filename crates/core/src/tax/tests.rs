use super::*;
use crate::conversion::CandlePriceCache;
use crate::errors::{DataIntegrityError, Error};
use crate::settings::SyncSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn trade_event(asset: &str, mts: i64, amount: Decimal, price: Decimal) -> TaxEvent {
    TaxEvent {
        asset: asset.to_string(),
        mts,
        amount,
        price_usd: price,
        kind: TaxEventKind::Trade,
    }
}

async fn try_replay(
    strategy: TaxLotStrategy,
    events: Vec<TaxEvent>,
    start: i64,
    end: i64,
) -> crate::Result<TaxLotOutcome> {
    TaxLotCalculator::new(strategy, Duration::from_secs(1))
        .compute(events, start, end)
        .await
}

async fn replay(
    strategy: TaxLotStrategy,
    events: Vec<TaxEvent>,
    start: i64,
    end: i64,
) -> TaxLotOutcome {
    try_replay(strategy, events, start, end).await.unwrap()
}

mod calculator_tests {
    use super::*;

    #[tokio::test]
    async fn test_sale_matches_weighted_average_cost() {
        let outcome = replay(
            TaxLotStrategy::Fifo,
            vec![
                trade_event("BTC", 2_000, dec!(-2), dec!(33000)),
                trade_event("BTC", 1_000, dec!(3), dec!(20000)),
            ],
            0,
            10_000,
        )
        .await;

        assert_eq!(outcome.realized.len(), 1);
        let gain = &outcome.realized[0];
        assert_eq!(gain.proceeds, dec!(66000));
        assert_eq!(gain.cost, dec!(40000));
        assert_eq!(gain.gain_or_loss, dec!(26000));
        assert_eq!(gain.acquired_at, Some(1_000));
        assert_eq!(gain.sold_at, Some(2_000));

        let totals = &outcome.totals["BTC"];
        assert_eq!(totals.buy_weighted_price_usd, dec!(20000));
        assert_eq!(totals.sell_weighted_price_usd, dec!(33000));

        assert_eq!(outcome.open.len(), 1);
        assert_eq!(outcome.open[0].amount, dec!(1));
        assert_eq!(outcome.open[0].cost, dec!(20000));
    }

    #[tokio::test]
    async fn test_strategy_picks_which_lots_are_drawn() {
        let events = vec![
            trade_event("ETH", 1, dec!(1), dec!(10)),
            trade_event("ETH", 2, dec!(1), dec!(20)),
            trade_event("ETH", 3, dec!(-1), dec!(30)),
        ];

        let fifo = replay(TaxLotStrategy::Fifo, events.clone(), 0, 10).await;
        let lifo = replay(TaxLotStrategy::Lifo, events, 0, 10).await;

        assert_eq!(fifo.realized[0].cost, dec!(15));
        assert_eq!(lifo.realized[0].cost, dec!(15));
        assert_eq!(fifo.realized[0].acquired_at, Some(1));
        assert_eq!(lifo.realized[0].acquired_at, Some(2));
        assert_eq!(fifo.open[0].lots[0].acquired_at, 2);
        assert_eq!(lifo.open[0].lots[0].acquired_at, 1);
    }

    #[tokio::test]
    async fn test_prior_period_lots_carry_into_window() {
        let outcome = replay(
            TaxLotStrategy::Fifo,
            vec![
                trade_event("BTC", 100, dec!(2), dec!(100)),
                trade_event("BTC", 200, dec!(-1), dec!(150)),
                trade_event("BTC", 1_000, dec!(-1), dec!(300)),
                trade_event("BTC", 5_000, dec!(-1), dec!(999)),
            ],
            500,
            2_000,
        )
        .await;

        assert_eq!(outcome.realized.len(), 1);
        assert_eq!(outcome.realized[0].sold_at, Some(1_000));
        assert_eq!(outcome.realized[0].cost, dec!(100));
        assert_eq!(outcome.realized[0].gain_or_loss, dec!(200));
        assert!(outcome.open.is_empty());
    }

    #[tokio::test]
    async fn test_oversold_disposal_aborts_with_shortfall() {
        let err = try_replay(
            TaxLotStrategy::Fifo,
            vec![
                trade_event("XRP", 1, dec!(1), dec!(10)),
                trade_event("XRP", 2, dec!(-2), dec!(20)),
            ],
            0,
            10,
        )
        .await
        .unwrap_err();

        match err {
            Error::DataIntegrity(DataIntegrityError::InsufficientLots {
                asset,
                mts,
                shortfall,
            }) => {
                assert_eq!(asset, "XRP");
                assert_eq!(mts, 2);
                assert_eq!(shortfall, dec!(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_oversold_disposal_before_window_still_aborts() {
        let result = try_replay(
            TaxLotStrategy::Lifo,
            vec![
                trade_event("XRP", 1, dec!(-1), dec!(10)),
                trade_event("XRP", 50, dec!(1), dec!(20)),
            ],
            10,
            100,
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::DataIntegrity(DataIntegrityError::InsufficientLots { .. }))
        ));
    }

    #[tokio::test]
    async fn test_selling_exact_position_is_not_an_oversell() {
        let outcome = replay(
            TaxLotStrategy::Fifo,
            vec![
                trade_event("XRP", 1, dec!(0.5), dec!(10)),
                trade_event("XRP", 2, dec!(0.5), dec!(30)),
                trade_event("XRP", 3, dec!(-1), dec!(40)),
            ],
            0,
            10,
        )
        .await;

        assert_eq!(outcome.realized[0].cost, dec!(20));
        assert_eq!(outcome.realized[0].gain_or_loss, dec!(20));
        assert!(outcome.open.is_empty());
    }

    #[tokio::test]
    async fn test_open_lot_costs_add_up_to_position_cost() {
        let outcome = replay(
            TaxLotStrategy::Fifo,
            vec![
                trade_event("SOL", 1, dec!(1), dec!(10)),
                trade_event("SOL", 2, dec!(1), dec!(20)),
                trade_event("SOL", 3, dec!(1), dec!(40)),
            ],
            0,
            10,
        )
        .await;

        let position = &outcome.open[0];
        assert_eq!(position.cost, dec!(70));
        let lot_sum: Decimal = position.lots.iter().map(|l| l.cost).sum();
        assert_eq!(lot_sum, position.cost);
    }

    #[test]
    fn test_strategy_parses_case_insensitively() {
        assert_eq!("lifo".parse::<TaxLotStrategy>().unwrap(), TaxLotStrategy::Lifo);
        assert_eq!(TaxLotStrategy::default(), TaxLotStrategy::Fifo);
        assert!("HIFO".parse::<TaxLotStrategy>().is_err());
    }
}

struct FakeEvents {
    trades: Vec<TradeRecord>,
    movements: Vec<MovementRecord>,
}

impl TaxEventSource for FakeEvents {
    fn get_trades_until(&self, _user_id: i64, end: i64) -> crate::Result<Vec<TradeRecord>> {
        Ok(self
            .trades
            .iter()
            .filter(|t| t.mts_create <= end)
            .cloned()
            .collect())
    }

    fn get_movements_until(&self, _user_id: i64, end: i64) -> crate::Result<Vec<MovementRecord>> {
        Ok(self
            .movements
            .iter()
            .filter(|m| m.mts_updated <= end)
            .cloned()
            .collect())
    }
}

fn trade(id: i64, symbol: &str, mts: i64, amount: Decimal, price: Decimal) -> TradeRecord {
    TradeRecord {
        id,
        symbol: symbol.to_string(),
        mts_create: mts,
        exec_amount: amount,
        exec_price: price,
        order_type: Some("EXCHANGE LIMIT".to_string()),
    }
}

fn service(
    trades: Vec<TradeRecord>,
    movements: Vec<MovementRecord>,
    prices: CandlePriceCache,
) -> TaxReportService {
    TaxReportService::new(
        Arc::new(FakeEvents { trades, movements }),
        Arc::new(prices),
        SyncSettings::default(),
    )
}

mod report_tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_realized_unrealized_and_derivatives() {
        let mut margin = trade(4, "tETHUSD", 2_200, dec!(-1), dec!(1800));
        margin.order_type = Some("LIMIT".to_string());
        let mut perp = trade(3, "tBTCF0:USTF0", 2_500, dec!(5), dec!(30000));
        perp.order_type = None;

        let mut prices = CandlePriceCache::new();
        prices.insert("tBTCUSD", 3_000, dec!(40000));

        let report = service(
            vec![
                trade(1, "tBTCUSD", 1_000, dec!(3), dec!(20000)),
                trade(2, "tBTCUSD", 2_000, dec!(-2), dec!(33000)),
                perp,
                margin,
            ],
            vec![],
            prices,
        )
        .get_transaction_tax_report(1, 0, 3_000, TaxLotStrategy::Fifo)
        .await
        .unwrap();

        assert_eq!(report.realized.len(), 2);
        assert_eq!(report.realized[0].gain_or_loss, dec!(26000));
        let aggregate = &report.realized[1];
        assert_eq!(aggregate.asset, DERIVATIVES_ASSET);
        assert_eq!(aggregate.kind, GainKind::Derivative);
        assert_eq!(aggregate.amount, dec!(6));

        assert_eq!(report.unrealized.len(), 1);
        let open = &report.unrealized[0];
        assert_eq!(open.amount, dec!(1));
        assert_eq!(open.cost, dec!(20000));
        assert_eq!(open.market_value, dec!(40000));
        assert_eq!(open.gain_or_loss, dec!(20000));
    }

    #[tokio::test]
    async fn test_cross_pair_falls_back_to_quote_leg_price() {
        let mut prices = CandlePriceCache::new();
        prices.insert("tBTCUSD", 1_000, dec!(20000));

        let report = service(
            vec![
                trade(1, "tETHBTC", 1_000, dec!(2), dec!(0.05)),
                trade(2, "tETHBTC", 2_000, dec!(-2), dec!(0.06)),
            ],
            vec![],
            prices,
        )
        .get_transaction_tax_report(1, 0, 3_000, TaxLotStrategy::Fifo)
        .await
        .unwrap();

        assert_eq!(report.realized.len(), 1);
        assert_eq!(report.realized[0].cost, dec!(2000));
        assert_eq!(report.realized[0].proceeds, dec!(2400));
        assert!(report.unrealized.is_empty());
    }

    #[tokio::test]
    async fn test_movements_are_acquisitions_and_disposals() {
        let report = service(
            vec![],
            vec![
                MovementRecord {
                    id: 1,
                    currency: "BTC".to_string(),
                    mts_updated: 500,
                    amount: dec!(1),
                    amount_usd: Some(dec!(30000)),
                },
                MovementRecord {
                    id: 2,
                    currency: "BTC".to_string(),
                    mts_updated: 600,
                    amount: dec!(-1),
                    amount_usd: Some(dec!(-35000)),
                },
            ],
            CandlePriceCache::new(),
        )
        .get_transaction_tax_report(1, 0, 1_000, TaxLotStrategy::Lifo)
        .await
        .unwrap();

        assert_eq!(report.realized[0].gain_or_loss, dec!(5000));
        assert!(report.unrealized.is_empty());
    }

    #[tokio::test]
    async fn test_missing_quote_price_aborts() {
        let err = service(
            vec![trade(1, "tETHEUR", 1_000, dec!(1), dec!(1500))],
            vec![],
            CandlePriceCache::new(),
        )
        .get_transaction_tax_report(1, 0, 3_000, TaxLotStrategy::Fifo)
        .await
        .unwrap_err();

        match err {
            Error::DataIntegrity(DataIntegrityError::CurrencyConversion { currency, mts }) => {
                assert_eq!(currency, "EUR");
                assert_eq!(mts, 1_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unsplittable_symbol_aborts() {
        let err = service(
            vec![trade(1, "tBTCUSDT", 1_000, dec!(1), dec!(1))],
            vec![],
            CandlePriceCache::new(),
        )
        .get_transaction_tax_report(1, 0, 3_000, TaxLotStrategy::Fifo)
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::DataIntegrity(DataIntegrityError::CurrencyPairSeparation { .. })
        ));
    }

    #[tokio::test]
    async fn test_withdrawal_without_holdings_aborts_report() {
        let err = service(
            vec![],
            vec![MovementRecord {
                id: 1,
                currency: "ETH".to_string(),
                mts_updated: 500,
                amount: dec!(-3),
                amount_usd: Some(dec!(-6000)),
            }],
            CandlePriceCache::new(),
        )
        .get_transaction_tax_report(1, 0, 1_000, TaxLotStrategy::Fifo)
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::DataIntegrity(DataIntegrityError::InsufficientLots { ref asset, .. })
                if asset == "ETH"
        ));
    }

    #[tokio::test]
    async fn test_inverted_window_is_a_bad_request() {
        let err = service(vec![], vec![], CandlePriceCache::new())
            .get_transaction_tax_report(1, 10, 5, TaxLotStrategy::Fifo)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
