//! Control-loop scenarios against the mock venue.

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio::sync::mpsc;

    use stx_worker::engine::sink::channel_sink;
    use stx_worker::engine::{spawn_record_writer, Record, RunningWorker, Worker};
    use stx_worker::error::SdkError;
    use stx_worker::types::{ActiveOrders, ActiveTrade, ActiveTrades};

    use crate::mock_venue::{credentials, wait_for, worker_config, Failures, MockVenue, SharedBuffer};

    async fn start(venue: &MockVenue, orders_per_market: u32) -> (RunningWorker, mpsc::Receiver<Record>) {
        let (sink, mut rx) = channel_sink(1024);
        let running = Worker::new(venue.venue(), credentials(), worker_config(orders_per_market), sink)
            .start()
            .await
            .unwrap();
        // LoggedIn
        assert!(matches!(rx.recv().await.unwrap(), Record::SessionStatus(_)));
        (running, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Record>) -> Vec<Record> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn trade(trade_id: &str, order_id: &str) -> ActiveTrade {
        ActiveTrade {
            trade_id: trade_id.into(),
            order_id: order_id.into(),
            market_id: "MKT-OPEN".into(),
            price: Decimal::new(450, 2),
            quantity: 1,
            action: None,
            traded_at: None,
        }
    }

    fn cycle_entries(timeline: &[String]) -> Vec<&str> {
        timeline
            .iter()
            .map(String::as_str)
            .filter(|e| *e == "cancel_all_orders" || e.starts_with("confirm_order:"))
            .collect()
    }

    #[tokio::test]
    async fn test_each_cycle_cancels_then_places_on_open_markets() {
        let venue = MockVenue::with_default_markets();
        let (mut running, _rx) = start(&venue, 2).await;

        running.run_cycle().await;
        running.run_cycle().await;

        let timeline = venue.timeline();
        let one_cycle = [
            "cancel_all_orders",
            "confirm_order:MKT-OPEN",
            "confirm_order:MKT-OPEN",
            "confirm_order:MKT-PRE",
            "confirm_order:MKT-PRE",
        ];
        let expected: Vec<&str> = one_cycle.iter().chain(one_cycle.iter()).copied().collect();
        assert_eq!(cycle_entries(&timeline), expected);
        assert_eq!(running.cycles(), 2);
    }

    #[tokio::test]
    async fn test_every_placement_is_reported_and_tracked() {
        let venue = MockVenue::with_default_markets();
        let (mut running, mut rx) = start(&venue, 3).await;

        let report = running.run_cycle().await;
        assert_eq!(report.placed, 6);
        assert_eq!(report.failed, 0);

        let placed: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|r| match r {
                Record::OrderPlaced { order_id, .. } => Some(order_id),
                _ => None,
            })
            .collect();
        assert_eq!(placed.len(), 6);
        assert_eq!(placed.last().map(String::as_str), Some("order-6"));
        assert_eq!(running.state().placed_order_id().as_deref(), Some("order-6"));
    }

    #[tokio::test]
    async fn test_failed_placements_do_not_stop_the_loop() {
        let venue = MockVenue::with_default_markets();
        venue.set_failures(Failures {
            confirm: Some(SdkError::Api("INSUFFICIENT_FUNDS: not enough buying power".into())),
            ..Failures::default()
        });
        let (mut running, mut rx) = start(&venue, 3).await;

        let first = running.run_cycle().await;
        let second = running.run_cycle().await;
        assert_eq!((first.attempts, first.failed), (6, 6));
        assert_eq!((second.attempts, second.failed), (6, 6));

        let errors = drain(&mut rx)
            .into_iter()
            .filter(|r| matches!(r, Record::OrderError { message, .. } if message.starts_with("INSUFFICIENT_FUNDS")))
            .count();
        assert_eq!(errors, 12);
        assert!(!running.state().has_placed_order());
    }

    #[tokio::test]
    async fn test_cancel_failure_is_tolerated() {
        let venue = MockVenue::with_default_markets();
        venue.set_failures(Failures {
            cancel: Some(SdkError::Connection("reset".into())),
            ..Failures::default()
        });
        let (mut running, _rx) = start(&venue, 1).await;

        let report = running.run_cycle().await;
        assert!(!report.cancel_succeeded);
        assert_eq!(report.placed, 2);
    }

    #[tokio::test]
    async fn test_trade_matching_latest_order_is_reported() {
        let venue = MockVenue::with_default_markets();
        let (mut running, mut rx) = start(&venue, 1).await;
        running.run_cycle().await;
        drain(&mut rx);
        // Latest placement is order-2 (MKT-PRE).
        venue
            .push_trades(Some(ActiveTrades {
                trades: Some(vec![trade("T-1", "order-1"), trade("T-2", "order-2")]),
            }))
            .await;

        match rx.recv().await.unwrap() {
            Record::Trade(t) => {
                assert_eq!(t.trade_id, "T-2");
                assert_eq!(t.order_id, "order-2");
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trades_before_first_order_are_ignored() {
        let venue = MockVenue::with_default_markets();
        let (running, mut rx) = start(&venue, 1).await;
        let locks_before = running.state().lock_acquisitions();

        venue
            .push_trades(Some(ActiveTrades {
                trades: Some(vec![trade("T-1", "order-1")]),
            }))
            .await;
        venue.push_trades(None).await;
        // On the current-thread runtime the trades task was woken first, so
        // it has drained both payloads by the time the orders record lands.
        venue.push_orders(ActiveOrders::default()).await;

        assert!(matches!(rx.recv().await.unwrap(), Record::Orders(_)));
        assert!(rx.try_recv().is_err());
        // Only the orders emission took the lock.
        assert_eq!(running.state().lock_acquisitions(), locks_before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycles_until_shutdown() {
        let venue = MockVenue::with_default_markets();
        let (running, _rx) = start(&venue, 1).await;

        // Delay is 10ms; shutdown at 35ms leaves room for exactly three cycles.
        let cycles = running.run(tokio::time::sleep(Duration::from_millis(35))).await;

        assert_eq!(cycles, 3);
        let cancels = venue
            .timeline()
            .iter()
            .filter(|e| *e == "cancel_all_orders")
            .count();
        assert_eq!(cancels, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_output_stays_line_atomic() {
        let venue = MockVenue::with_default_markets();
        let buffer = SharedBuffer::default();
        let (sink, _writer) = spawn_record_writer(4096, buffer.clone());
        let mut running = Worker::new(venue.venue(), credentials(), worker_config(50), sink)
            .start()
            .await
            .unwrap();

        let pusher = async {
            for _ in 0..50 {
                venue.push_orders(ActiveOrders::default()).await;
                venue
                    .push_trades(Some(ActiveTrades {
                        trades: Some(vec![trade("T-x", "order-1")]),
                    }))
                    .await;
            }
        };
        let (report, ()) = tokio::join!(running.run_cycle(), pusher);
        assert_eq!(report.placed, 100);

        // 1 login + 100 placements + 50 order snapshots, plus any trade
        // records that arrived after order-1 was current.
        wait_for(|| buffer.lines().len() >= 151).await;
        for line in buffer.lines() {
            let (tag, json) = line.split_once(' ').unwrap();
            assert!(tag.starts_with('[') && tag.ends_with(']'), "bad tag in {line}");
            serde_json::from_str::<serde_json::Value>(json).unwrap();
        }
    }
}
