//! Dining philosophers over ticketed forks
//!
//! Each philosopher is an actor; each fork is a key in one shared
//! [`TicketMachine`]. A philosopher claims a round from the table, queues for
//! its lower-numbered fork, then for the higher one, eats, and hands both
//! forks back before asking for the next round. No thread ever blocks on a
//! fork: every wait is a continuation posted back to the philosopher.

use crate::report::{DiningReport, SeatReport};
use actor_runtime::{Actor, ActorError, Context, Future, Outcome, Scheduler, SpawnOptions, TicketMachine};
use anyhow::{ensure, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Scenario parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningConfig {
    pub philosophers: usize,
    /// Meals served across the whole table
    pub rounds: u64,
    /// Longest the table may go without finishing before it counts as deadlocked
    pub timeout: Duration,
    /// How often progress is logged while waiting
    pub progress_interval: Duration,
}

impl Default for DiningConfig {
    fn default() -> Self {
        Self {
            philosophers: 5,
            rounds: 100_000,
            timeout: Duration::from_secs(120),
            progress_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhilosopherState {
    Thinking,
    Hungry,
    Eating,
    Done,
}

/// Round accounting shared by everyone at the table
struct Table {
    target: u64,
    claimed: AtomicU64,
    seated: AtomicUsize,
    finished: Future<()>,
}

impl Table {
    /// Reserve one meal; false once the table has served them all
    fn claim(&self) -> bool {
        self.claimed.fetch_add(1, Ordering::AcqRel) < self.target
    }

    fn served(&self) -> u64 {
        self.claimed.load(Ordering::Acquire).min(self.target)
    }

    fn leave(&self) {
        if self.seated.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finished.resolve(());
        }
    }
}

pub struct Philosopher {
    seat: usize,
    first_fork: usize,
    second_fork: usize,
    forks: TicketMachine<usize>,
    table: Arc<Table>,
    state: PhilosopherState,
    meals: u64,
}

pub enum PhilosopherMsg {
    Dine,
    Report(Future<SeatReport>),
}

impl Philosopher {
    fn new(seat: usize, seats: usize, forks: TicketMachine<usize>, table: Arc<Table>) -> Self {
        // Lower-numbered fork first breaks the circular wait
        let left = seat;
        let right = (seat + 1) % seats;
        Self {
            seat,
            first_fork: left.min(right),
            second_fork: left.max(right),
            forks,
            table,
            state: PhilosopherState::Thinking,
            meals: 0,
        }
    }

    fn dine(&mut self, ctx: &mut Context<'_, Self>) {
        if !self.table.claim() {
            self.state = PhilosopherState::Done;
            debug!(seat = self.seat, meals = self.meals, "Leaving the table");
            self.table.leave();
            return;
        }

        self.state = PhilosopherState::Hungry;
        self.forks
            .serial_on(ctx, self.first_fork, |philosopher: &mut Philosopher, ctx, release_first| {
                philosopher.pick_up_second(ctx, release_first)
            });
    }

    fn pick_up_second(&mut self, ctx: &mut Context<'_, Self>, release_first: Future<()>) {
        let ticket = self.forks.get_ticket(self.second_fork);
        ctx.then(&ticket, move |philosopher: &mut Philosopher, ctx, granted| match granted {
            Ok(release_second) => {
                philosopher.state = PhilosopherState::Eating;
                philosopher.meals += 1;
                release_second.resolve(());
                release_first.resolve(());
                philosopher.think(ctx);
            }
            Err(e) => {
                release_first.resolve(());
                philosopher.abandon(e);
            }
        });
    }

    fn think(&mut self, ctx: &mut Context<'_, Self>) {
        self.state = PhilosopherState::Thinking;
        let me = ctx.myself();
        if let Err(e) = ctx.tell(&me, PhilosopherMsg::Dine) {
            self.abandon(e);
        }
    }

    fn abandon(&mut self, error: ActorError) {
        warn!(seat = self.seat, error = %error, "Philosopher gave up");
        self.state = PhilosopherState::Done;
        self.table.finished.reject(error);
    }

    fn report(&self) -> SeatReport {
        SeatReport {
            seat: self.seat,
            state: self.state,
            meals: self.meals,
        }
    }
}

impl Actor for Philosopher {
    type Message = PhilosopherMsg;

    fn receive(&mut self, msg: PhilosopherMsg, ctx: &mut Context<'_, Self>) -> Outcome {
        match msg {
            PhilosopherMsg::Dine => self.dine(ctx),
            PhilosopherMsg::Report(reply) => {
                reply.resolve(self.report());
            }
        }
        Outcome::Success
    }

    fn message_name(msg: &PhilosopherMsg) -> &'static str {
        match msg {
            PhilosopherMsg::Dine => "Dine",
            PhilosopherMsg::Report(_) => "Report",
        }
    }
}

/// Seat the table, serve `config.rounds` meals and report how they were shared
pub fn run_dining(scheduler: &Scheduler, config: &DiningConfig) -> Result<DiningReport> {
    ensure!(config.philosophers >= 2, "at least two philosophers are needed to share forks");
    ensure!(config.rounds > 0, "rounds must be greater than 0");

    let forks = TicketMachine::new();
    let table = Arc::new(Table {
        target: config.rounds,
        claimed: AtomicU64::new(0),
        seated: AtomicUsize::new(config.philosophers),
        finished: Future::new(),
    });

    let started = Instant::now();
    let seats = (0..config.philosophers)
        .map(|seat| {
            let philosopher = Philosopher::new(seat, config.philosophers, forks.clone(), Arc::clone(&table));
            scheduler.spawn_with(philosopher, SpawnOptions::named(format!("philosopher-{}", seat)))
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to seat philosophers")?;

    info!(philosophers = seats.len(), rounds = config.rounds, "Dinner served");
    for philosopher in &seats {
        philosopher.tell(PhilosopherMsg::Dine)?;
    }

    let deadline = started + config.timeout;
    loop {
        match table.finished.await_result(config.progress_interval) {
            Ok(()) => break,
            Err(ActorError::Timeout(_)) if Instant::now() < deadline => {
                info!(
                    served = table.served(),
                    target = config.rounds,
                    forks_busy = forks.active_keys().len(),
                    "Dinner in progress"
                );
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Table stalled after {} of {} rounds, forks held: {:?}",
                        table.served(),
                        config.rounds,
                        forks.active_keys()
                    )
                });
            }
        }
    }
    let duration = started.elapsed();

    let reports = Future::all_of(seats.iter().map(|p| p.ask(PhilosopherMsg::Report)).collect())
        .await_result(config.progress_interval.max(Duration::from_secs(5)))
        .context("Philosophers did not report")?
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let report = DiningReport {
        rounds: config.rounds,
        seats: reports,
        duration,
        forks_in_use: forks.active_keys().len(),
        stats: scheduler.metrics().get_stats(),
    };
    info!(
        meals = report.total_meals(),
        duration_ms = duration.as_millis() as u64,
        "Dinner finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_seat_takes_fork_zero_first() {
        let table = Arc::new(Table {
            target: 1,
            claimed: AtomicU64::new(0),
            seated: AtomicUsize::new(5),
            finished: Future::new(),
        });
        let last = Philosopher::new(4, 5, TicketMachine::new(), Arc::clone(&table));
        assert_eq!((last.first_fork, last.second_fork), (0, 4));

        let middle = Philosopher::new(2, 5, TicketMachine::new(), table);
        assert_eq!((middle.first_fork, middle.second_fork), (2, 3));
    }

    #[test]
    fn test_table_finishes_when_last_seat_leaves() {
        let table = Table {
            target: 2,
            claimed: AtomicU64::new(0),
            seated: AtomicUsize::new(2),
            finished: Future::new(),
        };
        assert!(table.claim());
        assert!(table.claim());
        assert!(!table.claim());
        assert_eq!(table.served(), 2);

        table.leave();
        assert!(!table.finished.is_settled());
        table.leave();
        assert!(table.finished.is_settled());
    }

    #[test]
    fn test_rejects_a_lonely_philosopher() {
        let scheduler = Scheduler::default();
        let config = DiningConfig {
            philosophers: 1,
            ..DiningConfig::default()
        };
        assert!(run_dining(&scheduler, &config).is_err());
        scheduler.shutdown();
    }
}
