//! Order book data structure tests.

mod common;

use rust_decimal_macros::dec;

use common::level;
use depthsync::book::{BookStatus, OrderBook};

fn seeded_book() -> OrderBook {
    let mut book = OrderBook::new(None);
    book.apply_snapshot(
        100,
        &[
            level("50000.00", "1.5"),
            level("49999.00", "2.0"),
            level("49998.00", "0.5"),
        ],
        &[
            level("50001.00", "0.75"),
            level("50002.00", "1.25"),
            level("50003.00", "3.0"),
        ],
    );
    book
}

#[test]
fn snapshot_replaces_wholesale() {
    let mut book = seeded_book();
    book.apply_snapshot(200, &[level("60000.00", "1.0")], &[level("60001.00", "1.0")]);

    assert_eq!(book.version(), 200);
    assert_eq!(book.bids().len(), 1);
    assert_eq!(book.asks().len(), 1);
    assert_eq!(book.best_bid().unwrap().price, dec!(60000.00));
}

#[test]
fn best_levels_are_priority_ordered() {
    let book = seeded_book();

    let best_bid = book.best_bid().unwrap();
    assert_eq!(best_bid.price, dec!(50000.00));
    assert_eq!(best_bid.qty, dec!(1.5));

    let best_ask = book.best_ask().unwrap();
    assert_eq!(best_ask.price, dec!(50001.00));
    assert_eq!(best_ask.qty, dec!(0.75));
}

#[test]
fn depth_returns_first_n_levels_per_side() {
    let book = seeded_book();
    let (bids, asks) = book.depth(2);

    assert_eq!(bids.len(), 2);
    assert_eq!(bids[0].price, dec!(50000.00));
    assert_eq!(bids[1].price, dec!(49999.00));

    assert_eq!(asks.len(), 2);
    assert_eq!(asks[0].price, dec!(50001.00));
    assert_eq!(asks[1].price, dec!(50002.00));
}

#[test]
fn diff_overwrites_and_inserts_levels() {
    let mut book = seeded_book();
    book.apply_diff(
        105,
        &[level("50000.00", "9.9"), level("50000.50", "0.1")],
        &[level("50001.00", "0.25")],
    );

    assert_eq!(book.version(), 105);
    assert_eq!(book.best_bid().unwrap().price, dec!(50000.50));
    assert_eq!(book.bids().len(), 4);
    assert_eq!(book.best_ask().unwrap().qty, dec!(0.25));
}

#[test]
fn zero_quantity_removes_existing_level() {
    let mut book = seeded_book();
    book.apply_diff(105, &[level("50000.00", "0")], &[]);

    assert_eq!(book.bids().len(), 2);
    assert_eq!(book.best_bid().unwrap().price, dec!(49999.00));
}

#[test]
fn zero_quantity_on_absent_level_is_a_noop() {
    let mut book = seeded_book();
    book.apply_diff(105, &[level("12345.00", "0")], &[level("99999.00", "0")]);

    assert_eq!(book.version(), 105);
    assert_eq!(book.bids().len(), 3);
    assert_eq!(book.asks().len(), 3);
}

#[test]
fn depth_limit_truncates_to_best_levels() {
    let mut book = OrderBook::new(Some(2));
    book.apply_snapshot(
        100,
        &[
            level("50000.00", "1.0"),
            level("49999.00", "1.0"),
            level("49998.00", "1.0"),
        ],
        &[
            level("50001.00", "1.0"),
            level("50002.00", "1.0"),
            level("50003.00", "1.0"),
        ],
    );

    // The worst level on each side is discarded, not the best.
    assert_eq!(book.bids().len(), 2);
    assert_eq!(book.asks().len(), 2);
    let (bids, asks) = book.depth(2);
    assert_eq!(bids[1].price, dec!(49999.00));
    assert_eq!(asks[1].price, dec!(50002.00));
}

#[test]
fn full_depth_never_truncates() {
    let mut book = OrderBook::new(None);
    let bids: Vec<_> = (0..500)
        .map(|i| level(&format!("{}.00", 40_000 + i), "1.0"))
        .collect();
    book.apply_snapshot(1, &bids, &[]);
    assert_eq!(book.bids().len(), 500);
}

#[test]
fn view_reflects_status_and_levels() {
    let book = seeded_book();
    let view = book.view(BookStatus::Synced);

    assert_eq!(view.status, BookStatus::Synced);
    assert_eq!(view.version, 100);
    assert_eq!(view.bids.len(), 3);
    assert_eq!(view.bids[0].price, dec!(50000.00));
    assert_eq!(view.asks[0].price, dec!(50001.00));
}
