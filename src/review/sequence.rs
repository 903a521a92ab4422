//! Monotonic request tickets.
//!
//! Every remote call issued by a state machine carries a [`Ticket`]. Issuing a
//! new ticket for a slot supersedes the previous one, and a reset invalidates
//! all of them, so a late response can be recognized and dropped instead of
//! overwriting newer state.

use std::collections::HashMap;

/// Independent in-flight slots. One ticket per slot is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Process,
    Enhance,
    SaveText,
    LoadEntities,
    SaveEntities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    slot: Slot,
    seq: u64,
}

impl Ticket {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Default)]
pub struct Sequencer {
    counter: u64,
    current: HashMap<Slot, u64>,
}

impl Sequencer {
    pub fn issue(&mut self, slot: Slot) -> Ticket {
        self.counter += 1;
        self.current.insert(slot, self.counter);
        Ticket {
            slot,
            seq: self.counter,
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current.get(&ticket.slot) == Some(&ticket.seq)
    }

    /// Retire a ticket once its response has been applied.
    pub fn retire(&mut self, ticket: Ticket) {
        if self.is_current(ticket) {
            self.current.remove(&ticket.slot);
        }
    }

    pub fn invalidate(&mut self, slot: Slot) {
        self.current.remove(&slot);
    }

    pub fn invalidate_all(&mut self) {
        self.current.clear();
    }

    pub fn in_flight(&self, slot: Slot) -> bool {
        self.current.contains_key(&slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket_supersedes_old() {
        let mut seq = Sequencer::default();
        let first = seq.issue(Slot::Enhance);
        let second = seq.issue(Slot::Enhance);
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
        assert!(second.seq() > first.seq());
    }

    #[test]
    fn test_slots_are_independent() {
        let mut seq = Sequencer::default();
        let enhance = seq.issue(Slot::Enhance);
        let save = seq.issue(Slot::SaveText);
        assert!(seq.is_current(enhance));
        assert!(seq.is_current(save));

        seq.invalidate(Slot::SaveText);
        assert!(seq.is_current(enhance));
        assert!(!seq.in_flight(Slot::SaveText));
    }

    #[test]
    fn test_retire_and_invalidate_all() {
        let mut seq = Sequencer::default();
        let t = seq.issue(Slot::Process);
        seq.retire(t);
        assert!(!seq.is_current(t));

        let a = seq.issue(Slot::LoadEntities);
        let b = seq.issue(Slot::SaveEntities);
        seq.invalidate_all();
        assert!(!seq.is_current(a));
        assert!(!seq.is_current(b));
    }
}
