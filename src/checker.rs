//! Book validation.
//!
//! Two checks compare a real-time book with an independent rebuild of it:
//!
//! - **Snapshot** ([`OrderBookChecker`]): request a one-shot snapshot of the
//!   same instrument and compare it with the real-time book when it
//!   arrives. If the sequence numbers differ the real-time book has moved
//!   on and the result is inconclusive.
//! - **Apply delta** ([`DeltaChecker`]): aggregate every delta the listener
//!   delivers into a private book and compare it with the listener's full
//!   book after each event.
//!
//! Results go to a [`CheckerHandler`] and to shared [`CheckCounters`].
//! Scheduling is the caller's: [`CheckSchedule`] only computes delays.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::book::OrderBook;
use crate::error::Result;
use crate::listener::{
    ListenerConfig, ListenerEvent, ListenerView, OrderBookHandler, OrderBookListener,
};
use crate::message::Message;
use crate::subscription::BookSubscription;
use crate::types::MsgType;

/// Which check produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckType {
    Snapshot,
    ApplyDelta,
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckType::Snapshot => f.write_str("snapshot"),
            CheckType::ApplyDelta => f.write_str("apply delta"),
        }
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    /// The books could not be compared meaningfully
    Inconclusive(String),
    /// The books differ
    Failure(String),
}

/// Receives check results.
pub trait CheckerHandler {
    fn on_success(&mut self, check_type: CheckType, realtime_book: &OrderBook);

    fn on_inconclusive(&mut self, check_type: CheckType, reason: &str);

    /// `check_book` is the book the real-time book was compared with.
    fn on_failure(
        &mut self,
        check_type: CheckType,
        reason: &str,
        msg: &Message,
        realtime_book: &OrderBook,
        check_book: &OrderBook,
    );
}

/// Issues one-shot snapshot subscriptions.
///
/// Implemented by whatever owns subscriptions; the checker only asks for
/// a snapshot and retires it once the image has been compared.
pub trait SnapshotRequester {
    /// Start a snapshot subscription. Its messages must be fed to
    /// [`OrderBookChecker::on_snapshot_msg`].
    fn request_snapshot(&mut self, sub: &BookSubscription) -> Result<()>;

    /// Whether a requested snapshot is still outstanding.
    fn is_active(&self) -> bool;

    /// Retire the current snapshot subscription.
    fn deactivate(&mut self);
}

/// Check result counters, shareable across threads.
#[derive(Debug, Default)]
pub struct CheckCounters {
    success: AtomicU64,
    inconclusive: AtomicU64,
    failure: AtomicU64,
}

impl CheckCounters {
    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn inconclusive_count(&self) -> u64 {
        self.inconclusive.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &CheckOutcome) {
        let counter = match outcome {
            CheckOutcome::Success => &self.success,
            CheckOutcome::Inconclusive(_) => &self.inconclusive,
            CheckOutcome::Failure(_) => &self.failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Delays between snapshot checks.
///
/// The first delay is drawn uniformly from `[1, interval]` seconds so that
/// many checkers started together spread their requests; every later delay
/// is the interval itself. An interval of zero disables periodic checks.
#[derive(Debug, Clone)]
pub struct CheckSchedule {
    interval: Duration,
    first_delay: Duration,
    first_fired: bool,
}

impl CheckSchedule {
    pub fn new(interval_secs: u64) -> Self {
        Self::with_rng(interval_secs, &mut rand::thread_rng())
    }

    /// Like [`new`](Self::new) with a caller-supplied random source.
    pub fn with_rng(interval_secs: u64, rng: &mut impl Rng) -> Self {
        let first = if interval_secs == 0 {
            0
        } else {
            rng.gen_range(1..=interval_secs)
        };
        Self {
            interval: Duration::from_secs(interval_secs),
            first_delay: Duration::from_secs(first),
            first_fired: false,
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay until the next check, or `None` if checks are disabled.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.interval.is_zero() {
            return None;
        }
        if self.first_fired {
            Some(self.interval)
        } else {
            self.first_fired = true;
            Some(self.first_delay)
        }
    }
}

fn report(
    handler: Option<&mut Box<dyn CheckerHandler + Send>>,
    counters: &CheckCounters,
    check_type: CheckType,
    outcome: &CheckOutcome,
    msg: &Message,
    realtime_book: &OrderBook,
    check_book: &OrderBook,
) {
    counters.record(outcome);
    match outcome {
        CheckOutcome::Success => {
            log::debug!("{check_type} check succeeded for {}", realtime_book.symbol());
            if let Some(handler) = handler {
                handler.on_success(check_type, realtime_book);
            }
        }
        CheckOutcome::Inconclusive(reason) => {
            log::info!("{check_type} check inconclusive for {}: {reason}", realtime_book.symbol());
            if let Some(handler) = handler {
                handler.on_inconclusive(check_type, reason);
            }
        }
        CheckOutcome::Failure(reason) => {
            log::warn!("{check_type} check failed for {}: {reason}", realtime_book.symbol());
            log::debug!("Real-time book:\n{}", realtime_book.dump());
            log::debug!("Check book:\n{}", check_book.dump());
            if let Some(handler) = handler {
                handler.on_failure(check_type, reason, msg, realtime_book, check_book);
            }
        }
    }
}

/// Compares a real-time book with snapshots of the same instrument.
pub struct OrderBookChecker<R: SnapshotRequester> {
    realtime_sub: BookSubscription,
    snapshot_sub: BookSubscription,
    snapshot_listener: OrderBookListener,
    requester: R,
    handler: Option<Box<dyn CheckerHandler + Send>>,
    counters: Arc<CheckCounters>,
    schedule: CheckSchedule,
}

impl<R: SnapshotRequester> OrderBookChecker<R> {
    /// Create a checker for `realtime_sub`. Snapshots are read with
    /// `config`, which always keeps a full book.
    pub fn new(realtime_sub: BookSubscription, requester: R, config: ListenerConfig) -> Self {
        let snapshot_sub = realtime_sub.as_snapshot();
        Self {
            realtime_sub,
            snapshot_sub,
            snapshot_listener: OrderBookListener::with_config(config.with_full_book(true)),
            requester,
            handler: None,
            counters: Arc::default(),
            schedule: CheckSchedule::new(0),
        }
    }

    /// Check periodically every `interval_secs` seconds.
    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.schedule = CheckSchedule::new(interval_secs);
        self
    }

    pub fn with_handler(mut self, handler: impl CheckerHandler + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// An apply-delta checker sharing this checker's counters. Register it
    /// on the real-time listener.
    pub fn delta_checker(&self) -> DeltaChecker {
        DeltaChecker::new(Arc::clone(&self.counters))
    }

    pub fn counters(&self) -> Arc<CheckCounters> {
        Arc::clone(&self.counters)
    }

    pub fn success_count(&self) -> u64 {
        self.counters.success_count()
    }

    pub fn inconclusive_count(&self) -> u64 {
        self.counters.inconclusive_count()
    }

    pub fn failure_count(&self) -> u64 {
        self.counters.failure_count()
    }

    pub fn requester(&self) -> &R {
        &self.requester
    }

    pub fn snapshot_subscription(&self) -> &BookSubscription {
        &self.snapshot_sub
    }

    /// Delay until the next scheduled check.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.schedule.next_delay()
    }

    /// Timer callback: request a snapshot and return the delay until the
    /// next one.
    pub fn on_timer(&mut self) -> Result<Option<Duration>> {
        self.check_snapshot_now()?;
        Ok(self.schedule.next_delay())
    }

    /// Request a snapshot now, unless one is still outstanding.
    pub fn check_snapshot_now(&mut self) -> Result<()> {
        if self.requester.is_active() {
            log::debug!("{}: snapshot request already outstanding", self.realtime_sub);
            return Ok(());
        }
        log::debug!("{}: sending snapshot request", self.realtime_sub);
        self.snapshot_listener.reset();
        self.requester.request_snapshot(&self.snapshot_sub)
    }

    /// Feed a message from the snapshot subscription.
    ///
    /// Returns the outcome once the snapshot image is complete, after
    /// which the snapshot subscription is retired.
    pub fn on_snapshot_msg(
        &mut self,
        realtime: &OrderBookListener,
        msg: &Message,
        msg_type: MsgType,
    ) -> Result<Option<CheckOutcome>> {
        let event = match self.snapshot_listener.on_msg(&self.snapshot_sub, msg, msg_type) {
            Ok(event) => event,
            Err(err) => {
                self.finish_snapshot();
                return Err(err);
            }
        };
        if event != ListenerEvent::Recap {
            return Ok(None);
        }

        let snapped_seq = self.snapshot_listener.seq_num();
        let realtime_seq = realtime.seq_num();
        log::debug!(
            "{}: received snapshot, snapped seq {snapped_seq}, real-time seq {realtime_seq}",
            self.realtime_sub
        );

        let realtime_book = realtime.deep_book_snapshot().unwrap_or_default();
        let mut check_book = self.snapshot_listener.book_snapshot().unwrap_or_default();

        let outcome = if snapped_seq != realtime_seq {
            CheckOutcome::Inconclusive(format!(
                "sequence numbers differ ({snapped_seq} != {realtime_seq})"
            ))
        } else {
            check_book.set_symbol(realtime_book.symbol());
            match check_book.assert_equal(&realtime_book) {
                Ok(()) => CheckOutcome::Success,
                Err(err) => CheckOutcome::Failure(err.to_string()),
            }
        };

        report(
            self.handler.as_mut(),
            &self.counters,
            CheckType::Snapshot,
            &outcome,
            msg,
            &realtime_book,
            &check_book,
        );
        self.finish_snapshot();
        Ok(Some(outcome))
    }

    fn finish_snapshot(&mut self) {
        self.snapshot_listener.reset();
        self.requester.deactivate();
    }
}

impl<R: SnapshotRequester> fmt::Debug for OrderBookChecker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBookChecker")
            .field("realtime_sub", &self.realtime_sub)
            .field("counters", &self.counters)
            .field("schedule", &self.schedule)
            .finish()
    }
}

/// Handler that rebuilds the full book from deltas and compares it with
/// the listener's full book after every event.
pub struct DeltaChecker {
    agg_book: OrderBook,
    counters: Arc<CheckCounters>,
    handler: Option<Box<dyn CheckerHandler + Send>>,
}

impl DeltaChecker {
    pub fn new(counters: Arc<CheckCounters>) -> Self {
        Self {
            agg_book: OrderBook::new(),
            counters,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: impl CheckerHandler + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// The aggregated book.
    pub fn book(&self) -> &OrderBook {
        &self.agg_book
    }

    fn compare(&mut self, view: &ListenerView<'_>, msg: &Message, applied: Result<()>) {
        let Some(full_book) = view.full_book() else {
            return;
        };
        self.agg_book.set_symbol(full_book.symbol());
        let outcome = match applied.and_then(|()| self.agg_book.assert_equal(full_book)) {
            Ok(()) => CheckOutcome::Success,
            Err(err) => CheckOutcome::Failure(err.to_string()),
        };
        report(
            self.handler.as_mut(),
            &self.counters,
            CheckType::ApplyDelta,
            &outcome,
            msg,
            full_book,
            &self.agg_book,
        );
    }
}

impl OrderBookHandler for DeltaChecker {
    fn on_book_recap(
        &mut self,
        _sub: &BookSubscription,
        view: &ListenerView<'_>,
        msg: &Message,
        book: &OrderBook,
    ) {
        self.agg_book.copy(book);
        self.compare(view, msg, Ok(()));
    }

    fn on_book_delta(
        &mut self,
        _sub: &BookSubscription,
        view: &ListenerView<'_>,
        msg: &Message,
        delta: &OrderBook,
    ) {
        let applied = self.agg_book.apply(delta);
        self.compare(view, msg, applied);
    }

    fn on_book_clear(
        &mut self,
        _sub: &BookSubscription,
        view: &ListenerView<'_>,
        msg: &Message,
        _delta: &OrderBook,
    ) {
        self.agg_book.clear();
        self.compare(view, msg, Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{BookWriter, Entry, PriceLevel};
    use crate::fields::BookFields;
    use crate::message::FieldValue;
    use crate::types::{EntryAction, LevelAction, Price, Side};
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default, Clone)]
    struct Requester {
        requests: Arc<Mutex<Vec<BookSubscription>>>,
        active: bool,
    }

    impl SnapshotRequester for Requester {
        fn request_snapshot(&mut self, sub: &BookSubscription) -> Result<()> {
            self.requests.lock().push(sub.clone());
            self.active = true;
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn deactivate(&mut self) {
            self.active = false;
        }
    }

    #[derive(Default, Clone)]
    struct Results(Arc<Mutex<Vec<String>>>);

    impl CheckerHandler for Results {
        fn on_success(&mut self, check_type: CheckType, _: &OrderBook) {
            self.0.lock().push(format!("{check_type} success"));
        }

        fn on_inconclusive(&mut self, check_type: CheckType, reason: &str) {
            self.0.lock().push(format!("{check_type} inconclusive: {reason}"));
        }

        fn on_failure(
            &mut self,
            check_type: CheckType,
            _: &str,
            _: &Message,
            _: &OrderBook,
            check_book: &OrderBook,
        ) {
            self.0
                .lock()
                .push(format!("{check_type} failure {}", check_book.total_num_levels()));
        }
    }

    fn sub() -> BookSubscription {
        BookSubscription::new("SRC", "IBM")
    }

    fn image(extra: bool) -> OrderBook {
        let mut book = OrderBook::with_symbol("IBM");
        book.add_level(
            PriceLevel::new(Price::from_f64(50.0), Side::Bid)
                .with_size(10)
                .with_num_entries(1)
                .with_entry(Entry::new("a", 10, EntryAction::Add)),
        );
        if extra {
            book.add_level(PriceLevel::new(Price::from_f64(51.0), Side::Ask).with_size(4));
        }
        book
    }

    fn message(book: &OrderBook, seq: i64) -> Message {
        let fields = BookFields::default();
        let mut msg = BookWriter::new(fields.clone()).write(book).unwrap();
        msg.set(fields.seq_num, FieldValue::I64(seq));
        msg
    }

    fn realtime_at(seq: i64) -> OrderBookListener {
        let mut listener = OrderBookListener::new();
        listener
            .on_msg(&sub(), &message(&image(false), seq), MsgType::Initial)
            .unwrap();
        listener
    }

    fn checker() -> (OrderBookChecker<Requester>, Results) {
        let results = Results::default();
        let checker = OrderBookChecker::new(sub(), Requester::default(), ListenerConfig::default())
            .with_handler(results.clone());
        (checker, results)
    }

    #[test]
    fn test_schedule() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut schedule = CheckSchedule::with_rng(5, &mut rng);
            let first = schedule.next_delay().unwrap();
            assert!(first >= Duration::from_secs(1) && first <= Duration::from_secs(5));
            assert_eq!(schedule.next_delay(), Some(Duration::from_secs(5)));
            assert_eq!(schedule.next_delay(), Some(Duration::from_secs(5)));
        }
        assert_eq!(CheckSchedule::new(0).next_delay(), None);
    }

    #[test]
    fn test_snapshot_success() {
        let (mut checker, results) = checker();
        let realtime = realtime_at(5);

        checker.check_snapshot_now().unwrap();
        let requests = checker.requester().requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_snapshot());
        assert_eq!(requests[0].symbol(), "IBM");

        let outcome = checker
            .on_snapshot_msg(&realtime, &message(&image(false), 5), MsgType::Snapshot)
            .unwrap();
        assert_eq!(outcome, Some(CheckOutcome::Success));
        assert_eq!(checker.success_count(), 1);
        assert!(!checker.requester().is_active());
        assert_eq!(*results.0.lock(), vec!["snapshot success"]);
    }

    #[test]
    fn test_snapshot_inconclusive_on_sequence_mismatch() {
        let (mut checker, results) = checker();
        let realtime = realtime_at(5);
        checker.check_snapshot_now().unwrap();

        let outcome = checker
            .on_snapshot_msg(&realtime, &message(&image(true), 4), MsgType::Snapshot)
            .unwrap()
            .unwrap();
        match outcome {
            CheckOutcome::Inconclusive(reason) => {
                assert!(reason.contains('4'));
                assert!(reason.contains('5'));
            }
            other => panic!("expected inconclusive, got {other:?}"),
        }
        assert_eq!(checker.inconclusive_count(), 1);
        assert_eq!(checker.failure_count(), 0);
        assert!(results.0.lock()[0].starts_with("snapshot inconclusive"));
        assert!(!checker.requester().is_active());
    }

    #[test]
    fn test_snapshot_failure() {
        let (mut checker, results) = checker();
        let realtime = realtime_at(5);
        checker.check_snapshot_now().unwrap();

        let outcome = checker
            .on_snapshot_msg(&realtime, &message(&image(true), 5), MsgType::Snapshot)
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, CheckOutcome::Failure(_)));
        assert_eq!(checker.failure_count(), 1);
        assert_eq!(*results.0.lock(), vec!["snapshot failure 2"]);
    }

    #[test]
    fn test_outstanding_request_is_not_repeated() {
        let (mut checker, _) = checker();
        checker.check_snapshot_now().unwrap();
        checker.check_snapshot_now().unwrap();
        assert_eq!(checker.requester().requests.lock().len(), 1);
    }

    #[test]
    fn test_on_timer_uses_schedule() {
        let (checker, _) = checker();
        let mut checker = checker.with_interval(3);
        let first = checker.next_delay().unwrap();
        assert!(first <= Duration::from_secs(3));
        assert_eq!(checker.on_timer().unwrap(), Some(Duration::from_secs(3)));
        assert_eq!(checker.requester().requests.lock().len(), 1);
    }

    #[test]
    fn test_delta_checker_follows_listener() {
        let (checker, results) = checker();
        let mut listener = OrderBookListener::new();
        listener.add_handler(checker.delta_checker().with_handler(results.clone()));
        let s = sub();

        listener.on_msg(&s, &message(&image(true), 1), MsgType::Initial).unwrap();

        let mut delta = OrderBook::new();
        delta.add_level(
            PriceLevel::new(Price::from_f64(50.0), Side::Bid)
                .with_action(LevelAction::Update)
                .with_size(15)
                .with_num_entries(2)
                .with_entry(Entry::new("b", 5, EntryAction::Add)),
        );
        delta.add_level(
            PriceLevel::new(Price::from_f64(51.0), Side::Ask).with_action(LevelAction::Delete),
        );
        listener.on_msg(&s, &message(&delta, 2), MsgType::Update).unwrap();
        listener.on_msg(&s, &Message::new(), MsgType::Clear).unwrap();

        assert_eq!(checker.success_count(), 3);
        assert_eq!(checker.failure_count(), 0);
        assert_eq!(
            *results.0.lock(),
            vec!["apply delta success", "apply delta success", "apply delta success"]
        );
    }
}
