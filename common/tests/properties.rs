//! Property tests for timing, arbitration and history invariants.

use hvac_common::{
    history::{RingBuffer, HISTORY_CAPACITY},
    CompressorGuard, ControlAction, FanArbiter, FanSpeed, Instant, PowerHistory,
};
use proptest::prelude::*;

const MIN_RUNTIME_MS: u32 = 300_000;
const RESTART_DELAY_MS: u32 = 120_000;

#[derive(Debug, Clone, Copy)]
enum GuardOp {
    RequestOn,
    RequestOff,
    ForceOff,
}

fn arb_guard_op() -> impl Strategy<Value = GuardOp> {
    prop_oneof![
        3 => Just(GuardOp::RequestOn),
        2 => Just(GuardOp::RequestOff),
        1 => Just(GuardOp::ForceOff),
    ]
}

fn arb_fan_speed() -> impl Strategy<Value = FanSpeed> {
    prop_oneof![
        Just(FanSpeed::Off),
        Just(FanSpeed::Low),
        Just(FanSpeed::Medium),
        Just(FanSpeed::High),
    ]
}

proptest! {
    /// Starts only after the restart delay, and stops on request only after
    /// the minimum runtime, wherever the counter starts.
    #[test]
    fn guard_honours_timing_across_rollover(
        start in any::<u32>(),
        steps in proptest::collection::vec((0u32..=400_000, arb_guard_op()), 1..64),
    ) {
        let mut now = Instant::from_millis(start);
        let mut guard = CompressorGuard::new(MIN_RUNTIME_MS, RESTART_DELAY_MS, now);
        let mut last_on: Option<Instant> = None;
        let mut last_off = now;

        for (advance, op) in steps {
            now = now.wrapping_add_ms(advance);

            match op {
                GuardOp::RequestOn => guard.request_on(),
                GuardOp::RequestOff => guard.request_off(),
                GuardOp::ForceOff => {
                    if guard.force_off(now) == Some(ControlAction::CompressorOff) {
                        last_off = now;
                    }
                    prop_assert!(!guard.is_running());
                }
            }

            match guard.update(now) {
                Some(ControlAction::CompressorOn) => {
                    prop_assert!(now.elapsed_since(last_off) >= RESTART_DELAY_MS);
                    last_on = Some(now);
                }
                Some(ControlAction::CompressorOff) => {
                    let on = last_on.expect("off without a prior on");
                    prop_assert!(now.elapsed_since(on) >= MIN_RUNTIME_MS);
                    last_off = now;
                }
                Some(other) => prop_assert!(false, "unexpected action {other:?}"),
                None => {}
            }

            if guard.is_running() {
                prop_assert_eq!(guard.restart_delay_remaining(now), 0);
                prop_assert!(last_on.is_some());
            }
        }
    }

    #[test]
    fn fan_runs_at_faster_of_request_and_floor(
        cycles in proptest::collection::vec(
            (arb_fan_speed(), proptest::option::of(arb_fan_speed())),
            1..32,
        ),
    ) {
        let mut fan = FanArbiter::new();

        for (requested, floor) in cycles {
            fan.set_requested_speed(requested);
            if let Some(floor) = floor {
                fan.enforce_minimum_speed(floor);
            }
            let before = fan.current_speed();
            let changed = fan.update();

            let expected = requested.max(floor.unwrap_or(FanSpeed::Off));
            prop_assert_eq!(fan.current_speed(), expected);
            prop_assert_eq!(fan.enforced_minimum(), FanSpeed::Off);
            prop_assert_eq!(changed.is_some(), before != expected);
        }
    }

    /// The running total equals the sum of each sample's draw over the time
    /// until the next sample, and bucket totals never decrease.
    #[test]
    fn power_total_matches_integrated_draw(
        start in 0u32..1_000_000,
        steps in proptest::collection::vec(
            (1u32..=150_000, arb_fan_speed(), any::<bool>()),
            1..40,
        ),
    ) {
        let mut history = PowerHistory::new();
        let mut now = Instant::from_millis(start);
        let mut expected_wh = 0.0_f64;
        let mut previous = (FanSpeed::Off, false);
        history.log_state(now, previous.0, previous.1);

        for (advance, fan_speed, compressor_on) in steps {
            expected_wh +=
                history.lookup_watts(previous.0, previous.1) as f64 * advance as f64 / 3_600_000.0;
            now = now.wrapping_add_ms(advance);
            history.log_state(now, fan_speed, compressor_on);
            previous = (fan_speed, compressor_on);
        }

        let total = history.total_energy_wh();
        prop_assert!((total - expected_wh).abs() <= 1e-9 * expected_wh.max(1.0));

        let energies: Vec<f64> = history.iter().map(|entry| entry.energy_wh).collect();
        prop_assert!(energies.windows(2).all(|pair| pair[0] <= pair[1]));
        prop_assert_eq!(energies.last().copied(), Some(total));
        prop_assert!(history.len() <= HISTORY_CAPACITY);

        // Fewer than 120 minutes are touched, so no bucket has been evicted and
        // each bucket's average times its covered span adds back up.
        let (first_ms, last_ms) = (start as u64, now.as_millis() as u64);
        let reconstructed_wh: f64 = history
            .iter()
            .map(|entry| {
                let bucket_start = entry.timestamp.as_millis() as u64;
                let covered_ms = (bucket_start + 60_000).min(last_ms) - bucket_start.max(first_ms);
                entry.average_watts as f64 * covered_ms as f64 / 3_600_000.0
            })
            .sum();
        prop_assert!((reconstructed_wh - total).abs() <= 1e-5 * total.max(1.0));
    }

    #[test]
    fn ring_keeps_newest_in_order(extra in 0usize..300) {
        let mut ring: RingBuffer<usize, HISTORY_CAPACITY> = RingBuffer::new();
        let written = HISTORY_CAPACITY + extra;
        for value in 0..written {
            ring.push(value);
        }

        let forward: Vec<usize> = ring.iter().copied().collect();
        let expected: Vec<usize> = (extra..written).collect();
        prop_assert_eq!(&forward, &expected);

        let backward: Vec<usize> = ring.iter().rev().copied().collect();
        prop_assert_eq!(backward, expected.into_iter().rev().collect::<Vec<_>>());
        prop_assert_eq!(ring.latest().copied(), Some(written - 1));
    }

    #[test]
    fn deadlines_survive_counter_wrap(base in any::<u32>(), delay in 0u32..=i32::MAX as u32) {
        let start = Instant::from_millis(base);
        let deadline = start.wrapping_add_ms(delay);

        prop_assert!(deadline.has_reached(deadline));
        prop_assert_eq!(start.remaining_until(deadline), delay);
        prop_assert_eq!(deadline.elapsed_since(start), delay);
        if delay > 0 {
            prop_assert!(!start.has_reached(deadline));
        }
    }
}
