//! Property tests for backoff arithmetic and the connection lifecycle
//!
//! The lifecycle properties drive a manager through arbitrary interleavings
//! of caller operations, transport events and clock advances.

use livewire::connection::Backoff;
use livewire::testing::{ManualScheduler, MockTransport};
use livewire::{Callback, ConnectionManager, ConnectionState, ReconnectConfig};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

fn reconnect_config() -> impl Strategy<Value = ReconnectConfig> {
    (1u64..5_000, 0u64..60_000).prop_map(|(base, extra)| ReconnectConfig {
        base_delay_ms: base,
        max_delay_ms: base + extra,
    })
}

proptest! {
    #[test]
    fn prop_delays_non_decreasing_and_capped(config in reconnect_config(), attempts in 1usize..40) {
        let delays = config.delay_sequence(attempts);

        prop_assert_eq!(delays[0], config.base_delay_ms);
        for pair in delays.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        for delay in &delays {
            prop_assert!(*delay >= config.base_delay_ms);
            prop_assert!(*delay <= config.max_delay_ms);
        }
        // Each delay doubles the previous one until the cap
        for pair in delays.windows(2) {
            prop_assert_eq!(pair[1], (pair[0] * 2).min(config.max_delay_ms));
        }
    }

    #[test]
    fn prop_reset_always_restarts_at_base(config in reconnect_config(), failures in 0usize..40) {
        let mut backoff = Backoff::new(&config);
        for _ in 0..failures {
            backoff.next_delay();
        }
        prop_assert!(backoff.peek() <= backoff.cap());

        backoff.reset();
        prop_assert_eq!(backoff.next_delay(), Duration::from_millis(config.base_delay_ms));
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Disconnect,
    Open,
    Frame,
    Error,
    Close,
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Connect),
        1 => Just(Op::Disconnect),
        3 => Just(Op::Open),
        2 => Just(Op::Frame),
        1 => Just(Op::Error),
        2 => Just(Op::Close),
        3 => (0u64..20_000).prop_map(Op::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_lifecycle_invariants(ops in prop::collection::vec(op(), 1..60)) {
        let transport = MockTransport::new();
        let scheduler = ManualScheduler::new();
        let manager = ConnectionManager::new(
            Url::parse("ws://localhost/ws").unwrap(),
            Arc::new(transport.clone()),
            Arc::new(scheduler.clone()),
        );

        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = states.clone();
        let _status = manager.on_status_change(Callback::new(move |state: &ConnectionState| {
            states_clone.lock().unwrap().push(*state);
        }));

        // Index into `states` from which no `connecting` may appear
        let mut quiet_since: Option<usize> = None;

        for op in ops {
            match op {
                Op::Connect => {
                    quiet_since = None;
                    manager.connect();
                }
                Op::Disconnect => {
                    manager.disconnect();
                    quiet_since = Some(states.lock().unwrap().len());
                }
                Op::Open => if let Some(c) = transport.last() { c.open() },
                Op::Frame => if let Some(c) = transport.last() { c.frame(r#"{"type":"price"}"#) },
                Op::Error => if let Some(c) = transport.last() { c.error("reset") },
                Op::Close => if let Some(c) = transport.last() { c.close() },
                Op::Advance(ms) => scheduler.advance(Duration::from_millis(ms)),
            }

            // At most one socket the manager has not asked to close, and none
            // while disconnected
            let open_sockets = transport
                .connections()
                .iter()
                .filter(|c| !c.close_requested())
                .count();
            prop_assert!(open_sockets <= 1);
            if manager.state() == ConnectionState::Disconnected {
                prop_assert_eq!(open_sockets, 0);
            }

            let states = states.lock().unwrap();
            for pair in states.windows(2) {
                if pair[1] == ConnectionState::Connected {
                    prop_assert_eq!(pair[0], ConnectionState::Connecting);
                }
                prop_assert_ne!(pair[0], pair[1]);
            }
            if let Some(since) = quiet_since {
                prop_assert!(!states[since..].contains(&ConnectionState::Connecting));
            }

            prop_assert!(manager.events().len() <= 100);
            let delay = manager.next_reconnect_delay();
            prop_assert!(delay >= Duration::from_millis(1000));
            prop_assert!(delay <= Duration::from_millis(16000));
        }
    }
}
