//! Message delivery: ordering, replies, failures, stop and dead letters

mod common;

use actor_runtime::{
    current_actor, Actor, ActorError, ActorId, ActorRef, Context, CorrelationToken, Future, Lane, Outcome,
    SpawnOptions,
};
use common::{eventually, scheduler, WAIT};
use crossbeam_channel::{bounded, Receiver, Sender};
use runtime_config::DispatcherPolicyKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

struct Journal {
    entries: Vec<(u32, u32)>,
    stopped_flag: Arc<AtomicBool>,
}

enum JournalMsg {
    Record { producer: u32, seq: u32 },
    Entries(Future<Vec<(u32, u32)>>),
    Fail(Future<u32>),
    Explode(Future<u32>),
    Quit,
    Correlation(Future<Option<Vec<u8>>>),
    Sender(Future<Option<ActorId>>),
    Current(Future<Option<ActorId>>),
    Hold { entered: Sender<()>, gate: Receiver<()> },
}

impl Journal {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            stopped_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Actor for Journal {
    type Message = JournalMsg;

    fn receive(&mut self, msg: JournalMsg, ctx: &mut Context<'_, Self>) -> Outcome {
        match msg {
            JournalMsg::Record { producer, seq } => self.entries.push((producer, seq)),
            JournalMsg::Entries(reply) => {
                reply.resolve(self.entries.clone());
            }
            JournalMsg::Fail(_reply) => return Outcome::failure("ledger is read-only"),
            JournalMsg::Explode(_reply) => panic!("journal exploded"),
            JournalMsg::Quit => return Outcome::ActorStopped,
            JournalMsg::Correlation(reply) => {
                reply.resolve(ctx.correlation().map(|token| token.as_bytes().to_vec()));
            }
            JournalMsg::Sender(reply) => {
                reply.resolve(ctx.sender().map(|sender| sender.id));
            }
            JournalMsg::Current(reply) => {
                reply.resolve(current_actor());
            }
            JournalMsg::Hold { entered, gate } => {
                let _ = entered.send(());
                let _ = gate.recv();
            }
        }
        Outcome::Success
    }

    fn stopped(&mut self) {
        self.stopped_flag.store(true, Ordering::SeqCst);
    }

    fn message_name(msg: &JournalMsg) -> &'static str {
        match msg {
            JournalMsg::Record { .. } => "Record",
            JournalMsg::Entries(_) => "Entries",
            JournalMsg::Fail(_) => "Fail",
            JournalMsg::Explode(_) => "Explode",
            JournalMsg::Quit => "Quit",
            JournalMsg::Correlation(_) => "Correlation",
            JournalMsg::Sender(_) => "Sender",
            JournalMsg::Current(_) => "Current",
            JournalMsg::Hold { .. } => "Hold",
        }
    }
}

/// Forwards a question to another journal so the sender identity can be observed
struct Relay;

enum RelayMsg {
    AskSender {
        to: ActorRef<Journal>,
        reply: Future<Option<ActorId>>,
    },
}

impl Actor for Relay {
    type Message = RelayMsg;

    fn receive(&mut self, msg: RelayMsg, _ctx: &mut Context<'_, Self>) -> Outcome {
        match msg {
            RelayMsg::AskSender { to, reply } => to.tell(JournalMsg::Sender(reply)).into(),
        }
    }
}

#[test_log::test]
fn test_messages_from_one_sender_keep_their_order() {
    let scheduler = scheduler(DispatcherPolicyKind::Elastic);
    let journal = scheduler.spawn(Journal::new()).unwrap();

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let journal = journal.clone();
            thread::spawn(move || {
                for seq in 0..2_000u32 {
                    journal.tell(JournalMsg::Record { producer, seq }).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let entries = journal.ask(JournalMsg::Entries).await_result(WAIT).unwrap();
    assert_eq!(entries.len(), 8_000);

    let mut last: HashMap<u32, u32> = HashMap::new();
    for (producer, seq) in entries {
        if let Some(previous) = last.insert(producer, seq) {
            assert!(seq > previous, "producer {} went from {} to {}", producer, previous, seq);
        }
    }
    scheduler.shutdown();
}

#[test_log::test]
fn test_failure_rejects_the_linked_reply() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let journal = scheduler.spawn(Journal::new()).unwrap();

    let reply = journal.ask(JournalMsg::Fail).await_result(WAIT);
    assert_eq!(reply, Err(ActorError::failure("ledger is read-only")));

    let stats = scheduler.metrics().get_stats();
    assert_eq!(stats.invocation_failures, 1);
    scheduler.shutdown();
}

#[test_log::test]
fn test_panic_is_contained_and_reported() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let journal = scheduler.spawn(Journal::new()).unwrap();

    let err = journal.ask(JournalMsg::Explode).await_result(WAIT).unwrap_err();
    assert!(matches!(err, ActorError::Panicked(ref msg) if msg == "journal exploded"));

    // The dispatcher and the actor keep going
    journal.tell(JournalMsg::Record { producer: 0, seq: 0 }).unwrap();
    let entries = journal.ask(JournalMsg::Entries).await_result(WAIT).unwrap();
    assert_eq!(entries, vec![(0, 0)]);
    assert_eq!(scheduler.metrics().get_stats().handler_panics, 1);
    scheduler.shutdown();
}

#[test_log::test]
fn test_calls_after_stop_become_dead_letters() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let journal = Journal::new();
    let stopped_flag = Arc::clone(&journal.stopped_flag);
    let journal = scheduler.spawn_with(journal, SpawnOptions::named("ledger")).unwrap();

    journal.tell(JournalMsg::Quit).unwrap();
    // Queued behind the stop, so it is never invoked
    let queued = journal.ask(JournalMsg::Entries).await_result(WAIT);
    assert!(matches!(queued, Err(ActorError::DeadLetter { ref target, .. }) if target == "ledger"));

    assert!(eventually(WAIT, || journal.is_stopped()));
    assert!(eventually(WAIT, || stopped_flag.load(Ordering::SeqCst)));

    let err = journal
        .tell(JournalMsg::Record { producer: 1, seq: 1 })
        .unwrap_err();
    assert!(err.is_dead_letter());

    let letters = scheduler.dead_letters();
    assert!(letters.iter().any(|letter| letter.message == "Entries"));
    assert!(letters.iter().any(|letter| letter.message == "Record"));
    assert!(letters.iter().all(|letter| letter.target_name == "ledger"));
    scheduler.shutdown();
}

#[test_log::test]
fn test_stop_handle_drains_queue_first() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let journal = scheduler.spawn(Journal::new()).unwrap();

    for seq in 0..10 {
        journal.tell(JournalMsg::Record { producer: 0, seq }).unwrap();
    }
    let entries = journal.ask(JournalMsg::Entries);
    journal.stop().unwrap();

    assert_eq!(entries.await_result(WAIT).unwrap().len(), 10);
    assert!(eventually(WAIT, || journal.is_stopped()));
    scheduler.shutdown();
}

#[test_log::test]
fn test_try_tell_reports_full_mailbox() {
    let scheduler = scheduler(DispatcherPolicyKind::Elastic);
    let journal = scheduler
        .spawn_with(Journal::new(), SpawnOptions::default().with_queue_capacity(2).dedicated())
        .unwrap();

    let (entered_tx, entered_rx) = bounded(1);
    let (gate_tx, gate_rx) = bounded(1);
    journal
        .tell(JournalMsg::Hold {
            entered: entered_tx,
            gate: gate_rx,
        })
        .unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    journal.try_tell(JournalMsg::Record { producer: 0, seq: 0 }).unwrap();
    journal.try_tell(JournalMsg::Record { producer: 0, seq: 1 }).unwrap();
    let err = journal
        .try_tell(JournalMsg::Record { producer: 0, seq: 2 })
        .unwrap_err();
    assert!(matches!(err, ActorError::MailboxFull { .. }));
    assert_eq!(journal.status().mailbox_len, 2);

    gate_tx.send(()).unwrap();
    let entries = journal.ask(JournalMsg::Entries).await_result(WAIT).unwrap();
    assert_eq!(entries, vec![(0, 0), (0, 1)]);
    scheduler.shutdown();
}

#[test_log::test]
fn test_remote_call_carries_correlation_token() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let journal = scheduler.spawn(Journal::new()).unwrap();

    let reply = Future::new();
    scheduler
        .enqueue_call_from_remote(
            CorrelationToken::new(vec![0xca, 0xfe]),
            None,
            &journal,
            JournalMsg::Correlation(reply.clone()),
            Lane::Mailbox,
        )
        .unwrap();
    assert_eq!(reply.await_result(WAIT), Ok(Some(vec![0xca, 0xfe])));

    let local = journal.ask(JournalMsg::Correlation).await_result(WAIT);
    assert_eq!(local, Ok(None));
    scheduler.shutdown();
}

#[test_log::test]
fn test_sender_identity_follows_the_calling_actor() {
    let scheduler = scheduler(DispatcherPolicyKind::Elastic);
    let journal = scheduler.spawn(Journal::new()).unwrap();
    let relay = scheduler.spawn(Relay).unwrap();

    let external = journal.ask(JournalMsg::Sender).await_result(WAIT);
    assert_eq!(external, Ok(None));

    let reply = Future::new();
    relay
        .tell(RelayMsg::AskSender {
            to: journal.clone(),
            reply: reply.clone(),
        })
        .unwrap();
    assert_eq!(reply.await_result(WAIT), Ok(Some(relay.id())));

    let current = journal.ask(JournalMsg::Current).await_result(WAIT);
    assert_eq!(current, Ok(Some(journal.id())));
    assert_eq!(current_actor(), None);
    scheduler.shutdown();
}

#[test_log::test]
fn test_priority_lane_is_served_first() {
    let scheduler = scheduler(DispatcherPolicyKind::Elastic);
    let journal = scheduler.spawn_with(Journal::new(), SpawnOptions::default().dedicated()).unwrap();

    let (entered_tx, entered_rx) = bounded(1);
    let (gate_tx, gate_rx) = bounded(1);
    journal
        .tell(JournalMsg::Hold {
            entered: entered_tx,
            gate: gate_rx,
        })
        .unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    journal.tell(JournalMsg::Record { producer: 0, seq: 0 }).unwrap();
    journal.tell_priority(JournalMsg::Record { producer: 1, seq: 0 }).unwrap();
    gate_tx.send(()).unwrap();

    let entries = journal.ask(JournalMsg::Entries).await_result(WAIT).unwrap();
    assert_eq!(entries, vec![(1, 0), (0, 0)]);
    scheduler.shutdown();
}

#[test_log::test]
fn test_status_snapshot_serializes() {
    let scheduler = scheduler(DispatcherPolicyKind::Single);
    let first = scheduler.spawn(Journal::new()).unwrap();
    let _second = scheduler.spawn(Journal::new()).unwrap();
    first.ask(JournalMsg::Entries).await_result(WAIT).unwrap();

    let status = scheduler.status();
    assert_eq!(status.dispatcher_count, 1);
    assert_eq!(status.actor_count, 2);
    assert_eq!(status.default_queue_capacity, 8192);
    assert_eq!(status.stats.actors_spawned, 2);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["dispatchers"][0]["actor_count"], 2);
    assert_eq!(json["dispatchers"][0]["state"], "running");

    let actor = first.status();
    assert_eq!(actor.dispatcher, status.dispatchers[0].id);
    assert!(!actor.stopped);
    assert_eq!(first.clone(), first);
    scheduler.shutdown();
}
