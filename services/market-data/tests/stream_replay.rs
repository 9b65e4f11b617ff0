//! End-to-end replay of market stream messages
//!
//! Decoded JSON goes through the change-message factory and the
//! subscription handler before reaching the market cache, the same path
//! the live feed takes.

use std::sync::Arc;
use std::time::Duration;

use market_data::change_message::ChangeMessageFactory;
use market_data::market_cache::MarketCache;
use market_data::metrics::StreamMetrics;
use market_data::stream::{
    MarketChange, MarketChangeMessage, MarketDataFilter, MarketFilter, MarketStatus,
    MarketSubscriptionMessage,
};
use market_data::subscription::{SubscriptionConfig, SubscriptionHandler};
use rust_decimal::Decimal;
use types::ids::{MarketId, RunnerId};
use types::numeric::CurrencyRate;

fn d(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

fn feed(handler: &mut SubscriptionHandler<MarketChange>, cache: &MarketCache, json: &str) -> bool {
    let raw: MarketChangeMessage = serde_json::from_str(json).unwrap();
    let message = ChangeMessageFactory::from_market_change_message(raw);
    match handler.process_change_message(message) {
        Some(change) => {
            cache.on_market_change(&change);
            true
        }
        None => false,
    }
}

fn handler(id: i32) -> SubscriptionHandler<MarketChange> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    SubscriptionHandler::new(id, SubscriptionConfig::default(), Arc::new(StreamMetrics::new()))
}

const SEG_START: &str = r#"{"op":"mcm","id":1,"ct":"SUB_IMAGE","segmentType":"SEG_START","initialClk":"init-1","clk":"c-1","heartbeatMs":5000,"conflateMs":0,"pt":1000,
  "mc":[{"id":"1.100","img":true,"tv":500,"marketDefinition":{"status":"OPEN","inPlay":false,"runners":[{"id":11,"status":"ACTIVE","sortPriority":1},{"id":12,"status":"ACTIVE","sortPriority":2}]},
         "rc":[{"id":11,"atb":[[2.0,50],[1.98,20]],"atl":[[2.02,30],[2.04,3]],"ltp":2.0}]}]}"#;
const SEG_IN: &str = r#"{"op":"mcm","id":1,"ct":"SUB_IMAGE","segmentType":"SEG","clk":"c-2","pt":1001,
  "mc":[{"id":"1.200","img":true,"rc":[{"id":21,"atb":[[5.0,10]]}]}]}"#;
const SEG_END: &str = r#"{"op":"mcm","id":1,"ct":"SUB_IMAGE","segmentType":"SEG_END","clk":"c-3","heartbeatMs":5000,"conflateMs":0,"pt":1002,
  "mc":[{"id":"1.300","img":true,"rc":[{"id":31,"trd":[[1.5,100]],"tv":100}]}]}"#;

#[test]
fn segmented_image_applied_atomically() {
    let mut handler = handler(1);
    let cache = MarketCache::with_defaults();
    let completion = handler.completion();

    assert!(!feed(&mut handler, &cache, SEG_START));
    assert!(!feed(&mut handler, &cache, SEG_IN));
    assert_eq!(cache.market_count(), 0, "nothing applied before the last segment");
    assert!(!completion.is_released());

    assert!(feed(&mut handler, &cache, SEG_END));
    assert_eq!(cache.market_count(), 3);
    assert!(handler.is_subscribed());
    assert!(completion.wait(Duration::from_millis(10)));
    assert_eq!(handler.heartbeat_ms(), Some(5000));

    let tokens = handler.resubscription_tokens();
    assert_eq!(tokens.initial_clk.as_deref(), Some("init-1"));
    assert_eq!(tokens.clk.as_deref(), Some("c-3"));

    let market = cache.market(&MarketId::new("1.100")).unwrap();
    assert_eq!(market.status(), Some(MarketStatus::Open));
    assert_eq!(market.traded_value(), d("500"));
    assert_eq!(market.runner_count(), 2);

    let runner = market.runner(&RunnerId::selection(11)).unwrap();
    assert_eq!(runner.best_back().unwrap().price(), d("2.0"));
    assert_eq!(runner.best_available_lay_price(&[], d("100"), CurrencyRate::ONE), d("2.02"));
    // At 0.2 account units per stream unit, 30 converts to 6, under the cap of 10
    let rate = CurrencyRate::new(d("0.2"));
    assert_eq!(runner.best_available_lay_price(&[], d("1000"), rate), Decimal::ZERO);
}

#[test]
fn heartbeats_never_reach_the_cache() {
    let mut handler = handler(1);
    let cache = MarketCache::with_defaults();
    let image = r#"{"op":"mcm","id":1,"ct":"SUB_IMAGE","clk":"c-1","mc":[{"id":"1.100","img":true,"rc":[{"id":11,"atb":[[2.0,50]]}]}]}"#;
    assert!(feed(&mut handler, &cache, image));

    let heartbeat = r#"{"op":"mcm","id":1,"ct":"HEARTBEAT","clk":"c-2","pt":2000}"#;
    assert!(!feed(&mut handler, &cache, heartbeat));
    assert_eq!(handler.resubscription_tokens().clk.as_deref(), Some("c-2"));
    assert_eq!(handler.metrics().export()["heartbeats"], 1);
}

#[test]
fn deltas_after_image_and_stale_stragglers() {
    let mut handler = handler(2);
    let cache = MarketCache::with_defaults();
    let image = r#"{"op":"mcm","id":2,"ct":"SUB_IMAGE","clk":"a","mc":[{"id":"1.100","img":true,"rc":[{"id":11,"atb":[[2.0,50],[1.9,5]],"ltp":2.0,"tv":10}]}]}"#;
    let delta = r#"{"op":"mcm","id":2,"clk":"b","mc":[{"id":"1.100","rc":[{"id":11,"atb":[[2.0,0],[1.95,12]],"tv":15}]}]}"#;
    let straggler = r#"{"op":"mcm","id":1,"clk":"z","mc":[{"id":"1.100","rc":[{"id":11,"atb":[[3.0,99]]}]}]}"#;

    assert!(feed(&mut handler, &cache, image));
    assert!(feed(&mut handler, &cache, delta));
    assert!(!feed(&mut handler, &cache, straggler));

    let runner = cache.runner(&MarketId::new("1.100"), &RunnerId::selection(11)).unwrap();
    let atb = runner.available_to_back();
    assert_eq!(atb.len(), 2);
    assert_eq!(atb.best().unwrap().price(), d("1.95"));
    assert_eq!(runner.last_traded_price(), d("2.0"));
    assert_eq!(runner.traded_value(), d("15"));
    assert_eq!(handler.resubscription_tokens().clk.as_deref(), Some("b"));
}

#[test]
fn resubscription_replays_tokens_and_keeps_cache() {
    let mut first = handler(1);
    let cache = MarketCache::with_defaults();
    feed(&mut first, &cache, r#"{"op":"mcm","id":1,"ct":"SUB_IMAGE","initialClk":"i","clk":"c","mc":[{"id":"1.100","img":true,"rc":[{"id":11,"atb":[[2.0,50]]}]}]}"#);

    let request =
        MarketSubscriptionMessage::new(2, MarketFilter::default(), MarketDataFilter::default())
            .with_clocks(&first.resubscription_tokens());
    assert_eq!(request.initial_clk.as_deref(), Some("i"));
    assert_eq!(request.clk.as_deref(), Some("c"));

    let mut second = handler(2).with_tokens(first.resubscription_tokens());
    let resub = r#"{"op":"mcm","id":2,"ct":"RESUB_DELTA","clk":"d","mc":[{"id":"1.100","rc":[{"id":11,"atb":[[2.02,7]]}]}]}"#;
    assert!(feed(&mut second, &cache, resub));

    assert!(second.is_subscribed());
    let runner = cache.runner(&MarketId::new("1.100"), &RunnerId::selection(11)).unwrap();
    assert_eq!(runner.available_to_back().len(), 2, "resub delta merges into existing state");
    assert_eq!(second.resubscription_tokens().initial_clk.as_deref(), Some("i"));
}

#[test]
fn snapshot_survives_json_round_trip() {
    let mut handler = handler(1);
    let cache = MarketCache::with_defaults();
    feed(&mut handler, &cache, SEG_START);
    feed(&mut handler, &cache, SEG_IN);
    feed(&mut handler, &cache, SEG_END);

    let blob = cache.snapshot().unwrap().to_json().unwrap();
    let restored = MarketCache::with_defaults();
    restored
        .restore(market_data::snapshot::CacheSnapshot::from_json(&blob).unwrap())
        .unwrap();

    assert_eq!(restored.market_count(), 3);
    let runner = restored.runner(&MarketId::new("1.300"), &RunnerId::selection(31)).unwrap();
    assert_eq!(runner.traded().matched_size(d("1.5")), d("100"));
    assert_eq!(runner.traded_value(), d("100"));
}
