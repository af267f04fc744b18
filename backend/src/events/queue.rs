//! Frame-ordered event queue

use super::types::{Priority, ScheduledEvent, SimEvent};
use super::SchedulerError;
use crate::core::ids::EventId;
use std::collections::{BTreeMap, HashMap};

/// Position of an event in the total order
type OrderKey = (u64, Priority, u64);

/// Pending events in `(frame, priority, insertion)` order
///
/// # Example
/// ```
/// use battle_sim_core_rs::events::{EventQueue, Priority};
///
/// let mut queue: EventQueue<&str> = EventQueue::new();
/// queue.insert(2, Priority::Normal, "late").unwrap();
/// queue.insert(1, Priority::Low, "low").unwrap();
/// queue.insert(1, Priority::High, "high").unwrap();
///
/// let frame1: Vec<&str> = queue.drain(1).unwrap().into_iter().map(|e| e.payload).collect();
/// assert_eq!(frame1, vec!["high", "low"]);
/// assert_eq!(queue.len(), 1);
/// assert!(queue.insert(1, Priority::Normal, "past").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EventQueue<P = SimEvent> {
    pending: BTreeMap<OrderKey, ScheduledEvent<P>>,
    keys: HashMap<EventId, OrderKey>,
    next_seq: u64,
    current_frame: u64,
    last_drained: Option<u64>,
}

impl<P> Default for EventQueue<P> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
            keys: HashMap::new(),
            next_seq: 0,
            current_frame: 0,
            last_drained: None,
        }
    }
}

impl<P> EventQueue<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `payload` for `execute_frame`
    ///
    /// # Errors
    /// `PastFrame` if `execute_frame` precedes the current frame. The event
    /// is dropped.
    pub fn insert(
        &mut self,
        execute_frame: u64,
        priority: Priority,
        payload: P,
    ) -> Result<EventId, SchedulerError> {
        if execute_frame < self.current_frame {
            return Err(SchedulerError::PastFrame {
                execute_frame,
                current_frame: self.current_frame,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = EventId(seq);
        let key = (execute_frame, priority, seq);
        self.pending.insert(
            key,
            ScheduledEvent {
                id,
                execute_frame,
                priority,
                payload,
            },
        );
        self.keys.insert(id, key);
        Ok(id)
    }

    /// Remove a pending event; returns false if unknown or already drained
    pub fn cancel(&mut self, id: EventId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => self.pending.remove(&key).is_some(),
            None => false,
        }
    }

    /// Remove and return every event scheduled for exactly `frame`, in order
    ///
    /// Events of earlier frames that were never drained stay pending.
    /// Afterwards the scheduler's current frame is `frame + 1`: nothing more
    /// can be inserted for `frame`.
    ///
    /// # Errors
    /// `FrameAlreadyDrained` if `frame` is not after the last drained frame.
    pub fn drain(&mut self, frame: u64) -> Result<Vec<ScheduledEvent<P>>, SchedulerError> {
        if matches!(self.last_drained, Some(last) if frame <= last) {
            return Err(SchedulerError::FrameAlreadyDrained { frame });
        }
        let due: Vec<OrderKey> = self
            .pending
            .range((frame, Priority::Critical, 0)..=(frame, Priority::Low, u64::MAX))
            .map(|(key, _)| *key)
            .collect();
        let mut events = Vec::with_capacity(due.len());
        for key in due {
            if let Some(event) = self.pending.remove(&key) {
                self.keys.remove(&event.id);
                events.push(event);
            }
        }
        self.last_drained = Some(frame);
        self.current_frame = self.current_frame.max(frame.saturating_add(1));
        Ok(events)
    }

    /// Frame of the earliest pending event
    pub fn peek_frame(&self) -> Option<u64> {
        self.pending.keys().next().map(|(frame, _, _)| *frame)
    }

    /// Earliest frame that still accepts inserts
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Pending events in drain order
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent<P>> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
