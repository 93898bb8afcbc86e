//! Property tests: whatever mix of bookings and cancellations arrives, the
//! live claims on a continuous resource never overlap, and every rejection
//! is justified by a live claim.

use proptest::prelude::*;

use holdfast::model::*;
use holdfast::{Engine, EngineError};

const H: Ms = HOUR_MS;

#[derive(Debug, Clone)]
enum Op {
    Book { start_h: i64, len_h: i64 },
    /// Cancel the n-th booking made so far (modulo count).
    Cancel { nth: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0i64..200, 1i64..48).prop_map(|(start_h, len_h)| Op::Book { start_h, len_h }),
        1 => (0usize..64).prop_map(|nth| Op::Cancel { nth }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_live_claims_never_overlap(ops in prop::collection::vec(op(), 1..60)) {
        let rt = runtime();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let engine = Engine::builder()
                .resources([Resource::vehicle("VEH-7", 2400)])
                .build()
                .unwrap();
            let mut made: Vec<BookingId> = Vec::new();

            for op in ops {
                match op {
                    Op::Book { start_h, len_h } => {
                        let span = Span::new(start_h * H, (start_h + len_h) * H);
                        let live: Vec<Booking> = engine
                            .bookings_for_resource("VEH-7")
                            .unwrap()
                            .into_iter()
                            .filter(|b| b.is_active())
                            .collect();
                        let expected_clash = live.iter().any(|b| b.span.overlaps(&span));

                        match engine.book_time_range("VEH-7", "cust", span.start, span.end).await {
                            Ok(b) => {
                                prop_assert!(!expected_clash, "{span:?} accepted over a live claim");
                                made.push(b.id);
                            }
                            Err(EngineError::Overlap(id)) => {
                                prop_assert!(expected_clash, "{span:?} rejected with no clash");
                                let blocker = live.iter().find(|b| b.id == id);
                                prop_assert!(blocker.is_some_and(|b| b.span.overlaps(&span)));
                            }
                            Err(e) => prop_assert!(false, "unexpected error {e}"),
                        }
                    }
                    Op::Cancel { nth } => {
                        if made.is_empty() {
                            continue;
                        }
                        let id = made[nth % made.len()];
                        let was_active = engine.get_booking(id).unwrap().is_active();
                        let result = engine.cancel_time_range_booking(id).await;
                        prop_assert_eq!(result.is_ok(), was_active);
                        prop_assert!(!engine.get_booking(id).unwrap().is_active());
                    }
                }
            }

            let mut spans: Vec<Span> = engine
                .bookings_for_resource("VEH-7")
                .unwrap()
                .into_iter()
                .filter(|b| b.is_active())
                .map(|b| b.span)
                .collect();
            spans.sort_by_key(|s| s.start);
            for pair in spans.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
            }

            // Free windows are exactly the complement of the live claims
            let free = engine.availability("VEH-7", 0, 260 * H).await.unwrap();
            let covered: Ms = free.iter().map(|s| s.duration_ms()).sum::<Ms>()
                + spans.iter().map(|s| s.duration_ms()).sum::<Ms>();
            prop_assert_eq!(covered, 260 * H);
            Ok(())
        });
        result?;
    }

    #[test]
    fn prop_half_open_adjacency(start_h in 0i64..1000, a in 1i64..100, b in 1i64..100) {
        let rt = runtime();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let engine = Engine::builder()
                .resources([Resource::vehicle("VEH-7", 2400)])
                .build()
                .unwrap();
            let mid = (start_h + a) * H;
            let first = engine
                .book_time_range("VEH-7", "c1", start_h * H, mid)
                .await;
            prop_assert!(first.is_ok());
            let second = engine.book_time_range("VEH-7", "c2", mid, mid + b * H).await;
            prop_assert!(second.is_ok());
            // One more hour straddling the boundary always clashes
            let straddle = engine.book_time_range("VEH-7", "c3", mid - H / 2, mid + H / 2).await;
            prop_assert!(matches!(straddle, Err(EngineError::Overlap(_))));
            Ok(())
        });
        result?;
    }
}
