//! Aggregate contract for event-sourced domain models.

use crate::id::AggregateId;

/// What persistence needs from an aggregate root.
///
/// Kept small so domain modules decide how they model state transitions;
/// repositories only read the identity, the version, and the buffer of
/// events raised since the last save.
pub trait AggregateRoot: Send + Sync {
    /// Event type this aggregate raises and replays.
    type Event: Clone + core::fmt::Debug + Send + Sync + 'static;

    /// Returns the aggregate identifier (also the stream id).
    fn id(&self) -> &AggregateId;

    /// Count of events ever applied to this instance (replayed or raised).
    ///
    /// Never decreases. After a successful save it equals the stream version.
    fn version(&self) -> u64;

    /// Events raised since the last successful save, oldest first.
    fn uncommitted_changes(&self) -> &[Self::Event];

    /// Clear the uncommitted buffer after the events were persisted.
    fn mark_changes_as_committed(&mut self);
}

/// Identity, version and uncommitted buffer shared by every event-sourced aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBase<E> {
    id: AggregateId,
    version: u64,
    uncommitted: Vec<E>,
}

impl<E> AggregateBase<E> {
    /// A fresh base at version 0 with nothing buffered.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            version: 0,
            uncommitted: Vec::new(),
        }
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn uncommitted(&self) -> &[E] {
        &self.uncommitted
    }

    /// Whether events were raised since the last save.
    pub fn is_dirty(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    pub fn mark_committed(&mut self) {
        self.uncommitted.clear();
    }

    pub(crate) fn record_replayed(&mut self) {
        self.version += 1;
    }

    pub(crate) fn record_raised(&mut self, event: E) {
        self.version += 1;
        self.uncommitted.push(event);
    }
}

/// Event application semantics.
///
/// - **Replay** (`replay`): history loaded from the store; advances the version
///   without buffering.
/// - **Raise** (`raise`): a new fact decided by the aggregate; applied, then
///   buffered for the next save.
///
/// `apply` must be deterministic and must not perform IO. It only mutates
/// domain fields; version tracking lives in [`AggregateBase`].
pub trait EventSourced: Sized {
    type Event: Clone + core::fmt::Debug + Send + Sync + 'static;

    fn base(&self) -> &AggregateBase<Self::Event>;

    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event>;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Apply a newly decided event and buffer it as uncommitted.
    fn raise(&mut self, event: Self::Event) {
        self.apply(&event);
        self.base_mut().record_raised(event);
    }

    /// Apply a historical event without buffering it.
    fn replay(&mut self, event: &Self::Event) {
        self.apply(event);
        self.base_mut().record_replayed();
    }

    fn replay_all<I>(&mut self, history: I)
    where
        I: IntoIterator<Item = Self::Event>,
    {
        for event in history {
            self.replay(&event);
        }
    }
}

impl<T> AggregateRoot for T
where
    T: EventSourced + Send + Sync,
{
    type Event = <T as EventSourced>::Event;

    fn id(&self) -> &AggregateId {
        self.base().id()
    }

    fn version(&self) -> u64 {
        self.base().version()
    }

    fn uncommitted_changes(&self) -> &[<T as EventSourced>::Event] {
        self.base().uncommitted()
    }

    fn mark_changes_as_committed(&mut self) {
        self.base_mut().mark_committed();
    }
}
