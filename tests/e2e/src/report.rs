//! Scenario results and their validation

use crate::philosophers::PhilosopherState;
use actor_runtime::RuntimeStats;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct SeatReport {
    pub seat: usize,
    pub state: PhilosopherState,
    pub meals: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiningReport {
    pub rounds: u64,
    pub seats: Vec<SeatReport>,
    pub duration: Duration,
    /// Forks still ticketed after the table finished
    pub forks_in_use: usize,
    pub stats: RuntimeStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub validator: String,
    pub passed: bool,
    pub message: String,
}

impl ValidationResult {
    fn check(validator: &str, passed: bool, message: String) -> Self {
        Self {
            validator: validator.to_string(),
            passed,
            message,
        }
    }
}

impl DiningReport {
    pub fn total_meals(&self) -> u64 {
        self.seats.iter().map(|s| s.meals).sum()
    }

    pub fn average_meals(&self) -> f64 {
        if self.seats.is_empty() {
            return 0.0;
        }
        self.total_meals() as f64 / self.seats.len() as f64
    }

    /// No seat may eat less than half the table average
    pub fn fairness_floor(&self) -> f64 {
        self.average_meals() / 2.0
    }

    pub fn meals_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_meals() as f64 / secs
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> Vec<ValidationResult> {
        let floor = self.fairness_floor();
        let hungriest = self.seats.iter().min_by_key(|s| s.meals);
        vec![
            ValidationResult::check(
                "rounds_served",
                self.total_meals() == self.rounds,
                format!("{} of {} meals served", self.total_meals(), self.rounds),
            ),
            ValidationResult::check(
                "fairness",
                self.seats.iter().all(|s| s.meals as f64 >= floor),
                match hungriest {
                    Some(seat) => format!(
                        "seat {} ate {} times, floor {:.1}",
                        seat.seat, seat.meals, floor
                    ),
                    None => "no seats".to_string(),
                },
            ),
            ValidationResult::check(
                "everyone_left",
                self.seats.iter().all(|s| s.state == PhilosopherState::Done),
                format!(
                    "{} of {} philosophers done",
                    self.seats
                        .iter()
                        .filter(|s| s.state == PhilosopherState::Done)
                        .count(),
                    self.seats.len()
                ),
            ),
            ValidationResult::check(
                "forks_returned",
                self.forks_in_use == 0,
                format!("{} forks still held", self.forks_in_use),
            ),
            ValidationResult::check(
                "no_handler_failures",
                self.stats.invocation_failures == 0 && self.stats.handler_panics == 0,
                format!(
                    "{} failures, {} panics",
                    self.stats.invocation_failures, self.stats.handler_panics
                ),
            ),
        ]
    }

    pub fn passed(&self) -> bool {
        self.validate().iter().all(|v| v.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(meals: &[u64]) -> DiningReport {
        DiningReport {
            rounds: meals.iter().sum(),
            seats: meals
                .iter()
                .enumerate()
                .map(|(seat, &meals)| SeatReport {
                    seat,
                    state: PhilosopherState::Done,
                    meals,
                })
                .collect(),
            duration: Duration::from_secs(1),
            forks_in_use: 0,
            stats: RuntimeStats::default(),
        }
    }

    #[test]
    fn test_even_table_passes() {
        let report = report(&[20, 19, 21, 20, 20]);
        assert_eq!(report.average_meals(), 20.0);
        assert!(report.passed());
    }

    #[test]
    fn test_starved_seat_fails_fairness() {
        let report = report(&[40, 40, 4, 8, 8]);
        let fairness = report
            .validate()
            .into_iter()
            .find(|v| v.validator == "fairness")
            .unwrap();
        assert!(!fairness.passed);
        assert!(fairness.message.starts_with("seat 2"));
    }
}
