//! Startup sequence against the mock venue.

#[cfg(test)]
mod tests {
    use stx_worker::engine::sink::channel_sink;
    use stx_worker::engine::{spawn_record_writer, Record, Worker};
    use stx_worker::error::{SdkError, StartupError};
    use stx_worker::types::{SessionMessage, SessionStatus};

    use crate::mock_venue::{credentials, wait_for, worker_config, Failures, MockVenue, SharedBuffer};

    #[tokio::test]
    async fn test_startup_runs_steps_in_order() {
        let venue = MockVenue::with_default_markets();
        let (sink, _rx) = channel_sink(64);
        let worker = Worker::new(venue.venue(), credentials(), worker_config(1), sink);

        let running = worker.start().await.unwrap();

        assert_eq!(
            venue.timeline(),
            vec![
                "set_session_status_handler",
                "login:trader@example.com:true",
                "tokens",
                "sport_and_competitions",
                "market_infos:7",
                "subscribe:market",
                "subscribe:orders",
                "subscribe:trades",
                "subscribe:portfolio",
            ]
        );
        assert_eq!(running.snapshot().len(), 3);
        assert_eq!(running.snapshot().open_markets().count(), 2);
        assert!(running.tokens().is_some());
        let names: Vec<_> = running.channels().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["market", "orders", "trades", "portfolio"]);
    }

    #[tokio::test]
    async fn test_login_failure_stops_before_catalog() {
        let venue = MockVenue::with_default_markets();
        venue.set_failures(Failures {
            login: Some(SdkError::Auth("invalid credentials".into())),
            ..Failures::default()
        });
        let (sink, _rx) = channel_sink(64);

        let err = Worker::new(venue.venue(), credentials(), worker_config(1), sink)
            .start()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, StartupError::Login(SdkError::Auth(_))));
        assert_eq!(
            venue.timeline(),
            vec!["set_session_status_handler", "login:trader@example.com:true"]
        );
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let venue = MockVenue::with_default_markets();
        venue.set_failures(Failures {
            catalog: Some(SdkError::Api("unavailable".into())),
            ..Failures::default()
        });
        let (sink, _rx) = channel_sink(64);

        let err = Worker::new(venue.venue(), credentials(), worker_config(1), sink)
            .start()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, StartupError::Catalog(_)));
        assert!(!venue.timeline().iter().any(|e| e.starts_with("subscribe:")));
    }

    #[tokio::test]
    async fn test_channel_failure_names_channel_and_stops() {
        let venue = MockVenue::with_default_markets();
        venue.set_failures(Failures {
            channel: Some("trades"),
            ..Failures::default()
        });
        let (sink, _rx) = channel_sink(64);

        let err = Worker::new(venue.venue(), credentials(), worker_config(1), sink)
            .start()
            .await
            .err()
            .unwrap();

        match err {
            StartupError::ChannelStart { channel, .. } => assert_eq!(channel, "trades"),
            other => panic!("unexpected error {other:?}"),
        }
        let timeline = venue.timeline();
        assert!(timeline.contains(&"subscribe:orders".to_string()));
        assert!(!timeline.contains(&"subscribe:portfolio".to_string()));
    }

    #[tokio::test]
    async fn test_session_events_reach_output() {
        let venue = MockVenue::with_default_markets();
        let buffer = SharedBuffer::default();
        let (sink, _writer) = spawn_record_writer(64, buffer.clone());
        let _running = Worker::new(venue.venue(), credentials(), worker_config(1), sink)
            .start()
            .await
            .unwrap();

        venue.push_session_status(SessionMessage::new(SessionStatus::SessionExpired, "expired"));

        wait_for(|| buffer.lines().len() >= 2).await;
        let lines = buffer.lines();
        assert!(lines[0].starts_with("[SESSION] "));
        assert!(lines[0].contains("logged_in"));
        assert!(lines[1].starts_with("[SESSION] "));
        assert!(lines[1].contains("session_expired"));
    }

    #[tokio::test]
    async fn test_channel_payloads_emit_records() {
        let venue = MockVenue::with_default_markets();
        let (sink, mut rx) = channel_sink(64);
        let _running = Worker::new(venue.venue(), credentials(), worker_config(1), sink)
            .start()
            .await
            .unwrap();
        // LoggedIn from login
        assert!(matches!(rx.recv().await.unwrap(), Record::SessionStatus(_)));

        venue.push_orders(Default::default()).await;
        assert!(matches!(rx.recv().await.unwrap(), Record::Orders(_)));

        venue.push_portfolio(None).await;
        venue
            .push_portfolio(Some(stx_worker::types::Portfolio {
                balance: rust_decimal::Decimal::new(10_000, 2),
                buying_power: None,
                positions: vec![],
            }))
            .await;
        match rx.recv().await.unwrap() {
            Record::Portfolio(p) => assert_eq!(p.balance, rust_decimal::Decimal::new(10_000, 2)),
            other => panic!("unexpected record {other:?}"),
        }
    }
}
