//! Five philosophers, five ticketed forks, one hundred thousand meals

use actor_runtime::Scheduler;
use runtime_config::{DispatcherPolicyKind, RuntimeConfig};
use runtime_e2e_tests::{run_dining, DiningConfig, PhilosopherState};
use std::time::Duration;

fn scheduler(policy: DispatcherPolicyKind) -> Scheduler {
    let mut config = RuntimeConfig::default();
    config.dispatcher.policy = policy;
    Scheduler::new(config)
}

fn config() -> DiningConfig {
    DiningConfig {
        philosophers: 5,
        rounds: 100_000,
        timeout: Duration::from_secs(120),
        progress_interval: Duration::from_secs(5),
    }
}

#[test_log::test]
fn test_dining_philosophers_finish_fairly() {
    let scheduler = scheduler(DispatcherPolicyKind::Elastic);
    let report = run_dining(&scheduler, &config()).expect("table deadlocked");
    scheduler.shutdown();

    assert_eq!(report.total_meals(), 100_000);
    let floor = report.fairness_floor();
    for seat in &report.seats {
        assert!(
            seat.meals as f64 >= floor,
            "philosopher-{} ate {} times, below {:.1}",
            seat.seat,
            seat.meals,
            floor
        );
        assert_eq!(seat.state, PhilosopherState::Done);
    }
    assert_eq!(report.forks_in_use, 0);
    assert!(report.passed(), "{:?}", report.validate());
}

#[test_log::test]
fn test_dining_philosophers_on_one_dispatcher() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let config = DiningConfig {
        rounds: 20_000,
        ..config()
    };
    let report = run_dining(&scheduler, &config).expect("table deadlocked");
    assert_eq!(scheduler.status().dispatcher_count, 1);
    scheduler.shutdown();

    assert_eq!(report.total_meals(), 20_000);
    assert!(report.passed(), "{:?}", report.validate());
}

#[test_log::test]
fn test_odd_table_sizes_do_not_deadlock() {
    for philosophers in [2, 3, 7] {
        let scheduler = scheduler(DispatcherPolicyKind::Elastic);
        let config = DiningConfig {
            philosophers,
            rounds: 5_000,
            ..config()
        };
        let report = run_dining(&scheduler, &config).expect("table deadlocked");
        scheduler.shutdown();
        assert_eq!(report.seats.len(), philosophers);
        assert!(report.passed(), "{} seats: {:?}", philosophers, report.validate());
    }
}
