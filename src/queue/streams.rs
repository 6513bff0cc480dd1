//! Ordered queue plus active "in-flight" slot (component C).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::Level;

use crate::crawler::Cursor;
use crate::error::QueueError;
use crate::ids::{ListId, OurStreamId, StreamIdAllocator};
use crate::metadata::MetaDataSet;

use super::stream::{QueuedStream, StreamLifecycle, StreamLinks};

/// Ordered queue of [`QueuedStream`]s plus the single slot the player
/// transport currently holds as its active item.
///
/// Invariants (asserted by [`QueuedStreams::log`] and upheld by every public
/// method): population = queue length + (1 if in-flight is valid); in-flight
/// is never also present in the queue; every id reachable through the queue
/// or the in-flight slot has an entry in `streams`, and vice versa.
pub struct QueuedStreams {
    allocator: StreamIdAllocator,
    streams: HashMap<OurStreamId, QueuedStream>,
    queue: VecDeque<OurStreamId>,
    in_flight: Option<OurStreamId>,
    on_remove: Box<dyn FnMut(&QueuedStream) + Send>,
}

impl QueuedStreams {
    pub fn new(population_cap: usize, on_remove: Box<dyn FnMut(&QueuedStream) + Send>) -> Self {
        QueuedStreams {
            allocator: StreamIdAllocator::new(population_cap),
            streams: HashMap::new(),
            queue: VecDeque::new(),
            in_flight: None,
            on_remove,
        }
    }

    pub fn is_full(&self) -> bool {
        self.allocator.is_full()
    }

    pub fn in_flight(&self) -> Option<OurStreamId> {
        self.in_flight
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_none()
    }

    /// Allocates an id and queues a new record at the tail. Returns the
    /// invalid id if the population cap has been reached.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        stream_key: Vec<u8>,
        metadata: MetaDataSet,
        links: StreamLinks,
        list_id: ListId,
        originating_cursor: Arc<dyn Cursor>,
    ) -> OurStreamId {
        let id = self.allocator.allocate();
        if !id.is_valid() {
            tracing::warn!("too many streams queued, cannot queue more");
            return id;
        }

        self.streams.insert(
            id,
            QueuedStream {
                id,
                lifecycle: StreamLifecycle::Floating,
                stream_key,
                metadata,
                links,
                list_id,
                originating_cursor,
            },
        );
        self.queue.push_back(id);
        id
    }

    fn erase(&mut self, id: OurStreamId) -> QueuedStream {
        let mut record = self.streams.remove(&id).expect("id present in streams map");
        (self.on_remove)(&record);
        self.allocator.free(id);
        record.lifecycle = StreamLifecycle::AboutToDie;
        record
    }

    /// Removes whichever of (queue head, in-flight) is present in `ids`.
    /// Errors loudly if both are occupied but neither is in the drop set, or
    /// if the container is entirely empty.
    pub fn remove_front(
        &mut self,
        ids: &mut HashSet<OurStreamId>,
    ) -> Result<Option<QueuedStream>, QueueError> {
        if self.queue.is_empty() && self.in_flight.is_none() {
            return Ok(None);
        }

        let head = self.queue.front().copied();
        let in_flight = self.in_flight;

        let (target, from_queue) = if head.is_some_and(|h| ids.contains(&h)) {
            (head.unwrap(), true)
        } else if in_flight.is_some_and(|f| ids.contains(&f)) {
            (in_flight.unwrap(), false)
        } else {
            return Err(QueueError::RemoveFrontMismatch { in_flight, head });
        };

        ids.remove(&target);
        let record = self.erase(target);

        if from_queue {
            self.queue.pop_front();
        } else {
            self.in_flight = None;
        }

        Ok(Some(record))
    }

    /// Removes `id` from the queue only; refuses to touch the in-flight slot
    /// (doing so would indicate a bug in the caller).
    pub fn remove_anywhere(&mut self, id: OurStreamId) -> Option<QueuedStream> {
        if Some(id) == self.in_flight {
            tracing::warn!(?id, "refusing to remove in-flight stream via remove_anywhere");
            return None;
        }

        let position = self.queue.iter().position(|&qid| qid == id)?;
        let record = self.erase(id);
        self.queue.remove(position);
        Some(record)
    }

    /// Promotes the queue head into the in-flight slot. No-op if in-flight
    /// already holds `expected_next_id`. A mismatch against both the current
    /// in-flight id and the queue head is a hard error (desync with player).
    pub fn shift(
        &mut self,
        expected_next_id: OurStreamId,
    ) -> Result<Option<QueuedStream>, QueueError> {
        let next_id = self.queue.front().copied();

        if next_id != Some(expected_next_id) && self.in_flight != Some(expected_next_id) {
            return Err(QueueError::ShiftMismatch {
                expected: expected_next_id,
                in_flight: self.in_flight,
                head: next_id,
            });
        }

        Ok(self.shift_if_not_flying_to(expected_next_id))
    }

    /// Non-strict variant of [`Self::shift`]: promotes the queue head
    /// regardless of `id`, unless `id` is already in-flight.
    pub fn shift_if_not_flying_to(&mut self, id: OurStreamId) -> Option<QueuedStream> {
        if id.is_valid() && Some(id) == self.in_flight {
            return None;
        }

        let removed = self.in_flight.map(|prev| self.erase(prev));

        self.in_flight = self.queue.pop_front();
        if let Some(current) = self.in_flight {
            self.mark_lifecycle(current, StreamLifecycle::Current);
        }

        removed
    }

    /// Promotes the queue head into the in-flight slot only if the slot is
    /// currently empty. Returns whether a promotion happened.
    pub fn shift_if_not_flying(&mut self) -> bool {
        if self.in_flight.is_some() {
            return false;
        }

        match self.queue.pop_front() {
            Some(id) => {
                self.in_flight = Some(id);
                self.mark_lifecycle(id, StreamLifecycle::Current);
                true
            }
            None => false,
        }
    }

    pub fn copy_all_stream_ids(&self) -> Vec<OurStreamId> {
        let mut result = Vec::with_capacity(self.queue.len() + 1);
        if let Some(id) = self.in_flight {
            result.push(id);
        }
        result.extend(self.queue.iter().copied());
        result
    }

    pub fn get_stream_by_id(&self, id: OurStreamId) -> Option<&QueuedStream> {
        self.streams.get(&id)
    }

    /// Moves a still-live record to a new lifecycle stage. No-op if `id` has
    /// already been erased.
    pub fn mark_lifecycle(&mut self, id: OurStreamId, lifecycle: StreamLifecycle) {
        if let Some(record) = self.streams.get_mut(&id) {
            record.lifecycle = lifecycle;
        }
    }

    /// Drops every record, invoking `on_remove` for each. Returns the
    /// removed records so a caller layered on top (e.g. [`crate::player_data`])
    /// can run its own per-record bookkeeping, such as releasing list
    /// reference counts.
    pub fn clear(&mut self) -> Vec<QueuedStream> {
        let ids: Vec<_> = self.streams.keys().copied().collect();
        let removed = ids.into_iter().map(|id| self.erase(id)).collect();
        self.queue.clear();
        self.in_flight = None;
        removed
    }

    /// Drops every record matching `pred`, invoking `on_remove` for each.
    /// Returns the removed records, see [`Self::clear`].
    pub fn clear_if(&mut self, mut pred: impl FnMut(&QueuedStream) -> bool) -> Vec<QueuedStream> {
        let to_remove: Vec<_> = self
            .streams
            .iter()
            .filter(|(_, record)| pred(record))
            .map(|(id, _)| *id)
            .collect();

        let removed: Vec<_> = to_remove.iter().map(|id| self.erase(*id)).collect();

        self.queue.retain(|id| !to_remove.contains(id));
        if self.in_flight.is_some_and(|id| to_remove.contains(&id)) {
            self.in_flight = None;
        }

        removed
    }

    /// Diagnostic dump; also asserts the container invariants (population
    /// count, no duplicate ids, in-flight disjoint from queue).
    pub fn log(&self, prefix: &str, level: Level) {
        let population = self.queue.len() + usize::from(self.in_flight.is_some());
        debug_assert_eq!(population, self.streams.len(), "{prefix}: population mismatch");
        debug_assert!(
            self.in_flight.is_none_or(|f| !self.queue.contains(&f)),
            "{prefix}: in-flight id also present in queue"
        );

        let mut seen = HashSet::new();
        for id in &self.queue {
            debug_assert!(seen.insert(*id), "{prefix}: duplicate id {id:?} in queue");
        }

        match level {
            Level::TRACE | Level::DEBUG => tracing::debug!(
                prefix,
                in_flight = ?self.in_flight,
                queue = ?self.queue,
                "queued streams"
            ),
            _ => tracing::info!(prefix, count = population, "queued streams"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::FakeCursor;

    fn cursor() -> Arc<dyn Cursor> {
        Arc::new(FakeCursor(ListId(1)))
    }

    fn fresh() -> QueuedStreams {
        QueuedStreams::new(20, Box::new(|_| {}))
    }

    fn push(qs: &mut QueuedStreams) -> OurStreamId {
        qs.append(
            vec![],
            MetaDataSet::new(),
            StreamLinks::Direct(vec!["u".into()]),
            ListId(1),
            cursor(),
        )
    }

    #[test]
    fn append_then_shift_then_remove_front() {
        let mut qs = fresh();
        let a = push(&mut qs);
        assert_eq!(qs.queue_len(), 1);

        let shifted = qs.shift(a).unwrap();
        assert!(shifted.is_none());
        assert_eq!(qs.in_flight(), Some(a));
        assert_eq!(qs.queue_len(), 0);

        let mut drop_set = HashSet::from([a]);
        let removed = qs.remove_front(&mut drop_set).unwrap().unwrap();
        assert_eq!(removed.id, a);
        assert!(qs.is_empty());
    }

    #[test]
    fn shift_mismatch_is_an_error() {
        let mut qs = fresh();
        let a = push(&mut qs);
        let bogus = OurStreamId::from_generic(crate::ids::StreamId::from_raw(0x8000_2a2a)).unwrap();
        let err = qs.shift(bogus).unwrap_err();
        assert!(matches!(err, QueueError::ShiftMismatch { .. }));
        // queue is untouched
        assert_eq!(qs.queue_len(), 1);
        let _ = a;
    }

    #[test]
    fn remove_front_errors_when_neither_matches() {
        let mut qs = fresh();
        let _a = push(&mut qs);
        let mut drop_set = HashSet::new();
        let err = qs.remove_front(&mut drop_set).unwrap_err();
        assert!(matches!(err, QueueError::RemoveFrontMismatch { .. }));
    }

    #[test]
    fn remove_anywhere_refuses_in_flight() {
        let mut qs = fresh();
        let a = push(&mut qs);
        qs.shift(a).unwrap();
        assert!(qs.remove_anywhere(a).is_none());
        assert_eq!(qs.in_flight(), Some(a));
    }

    #[test]
    fn clear_invokes_callback_for_every_record() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let mut qs = QueuedStreams::new(
            20,
            Box::new(move |_| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        push(&mut qs);
        push(&mut qs);
        let removed = qs.clear();
        assert_eq!(removed.len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(qs.is_empty());
    }

    #[test]
    fn lifecycle_transitions_through_queued_and_current() {
        let mut qs = fresh();
        let a = push(&mut qs);
        assert_eq!(qs.get_stream_by_id(a).unwrap().lifecycle, StreamLifecycle::Floating);

        qs.mark_lifecycle(a, StreamLifecycle::Queued);
        assert_eq!(qs.get_stream_by_id(a).unwrap().lifecycle, StreamLifecycle::Queued);

        qs.shift(a).unwrap();
        assert_eq!(qs.get_stream_by_id(a).unwrap().lifecycle, StreamLifecycle::Current);
    }

    #[test]
    fn population_equals_queue_plus_in_flight() {
        let mut qs = fresh();
        let a = push(&mut qs);
        push(&mut qs);
        qs.shift(a).unwrap();
        assert_eq!(qs.copy_all_stream_ids().len(), 2);
    }
}
