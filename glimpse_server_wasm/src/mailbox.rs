//! Long-polled connection handle
//!
//! WASI HTTP has no WebSocket upgrade, so a "connection" is a queue of
//! serialized envelopes that the client drains with `GET /ws/poll`. Every
//! poll or inbound frame stamps the mailbox; one left unstamped for longer
//! than the idle timeout is treated as a dropped connection.

use crate::error::SignalingError;
use crate::registry::ConnectionHandle;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch. Activity stamps must stay
/// comparable across instances restored from a snapshot.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct MailboxState {
    /// Pending events to be delivered to this user
    events: VecDeque<String>,
    buffered_bytes: usize,
    last_seen_ms: u64,
    closed: bool,
}

/// Pending events for one connected user
#[derive(Debug)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
    max_buffered_bytes: usize,
}

impl Mailbox {
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self::restore(max_buffered_bytes, Vec::new(), now_millis())
    }

    /// Rebuild a mailbox from a snapshot
    pub fn restore(max_buffered_bytes: usize, events: Vec<String>, last_seen_ms: u64) -> Self {
        let buffered_bytes = events.iter().map(String::len).sum();
        Self {
            state: Mutex::new(MailboxState {
                events: events.into(),
                buffered_bytes,
                last_seen_ms,
                closed: false,
            }),
            max_buffered_bytes,
        }
    }

    /// Take every pending event, oldest first
    pub fn drain(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.buffered_bytes = 0;
        state.events.drain(..).collect()
    }

    /// Copy of the pending events, left in place
    pub fn pending(&self) -> Vec<String> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Record client activity at `now_ms`
    pub fn touch(&self, now_ms: u64) {
        let mut state = self.state.lock();
        state.last_seen_ms = state.last_seen_ms.max(now_ms);
    }

    pub fn last_seen_ms(&self) -> u64 {
        self.state.lock().last_seen_ms
    }

    /// Milliseconds between the last activity and `now_ms`
    pub fn idle_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms())
    }
}

impl ConnectionHandle for Mailbox {
    fn send(&self, text: String) -> Result<(), SignalingError> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        if state.buffered_bytes.saturating_add(text.len()) > self.max_buffered_bytes {
            return Err(SignalingError::SendError(format!(
                "mailbox holds {} bytes, limit is {}",
                state.buffered_bytes, self.max_buffered_bytes
            )));
        }
        state.buffered_bytes += text.len();
        state.events.push_back(text);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.events.clear();
        state.buffered_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_order() {
        let mailbox = Mailbox::new(64);
        mailbox.send("a".into()).unwrap();
        mailbox.send("b".into()).unwrap();
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn refuses_events_past_buffer_limit() {
        let mailbox = Mailbox::new(8);
        mailbox.send("12345".into()).unwrap();
        let err = mailbox.send("6789".into()).unwrap_err();
        assert!(matches!(err, SignalingError::SendError(_)));

        // polling frees the budget again
        assert_eq!(mailbox.drain().len(), 1);
        mailbox.send("6789".into()).unwrap();
    }

    #[test]
    fn unbounded_mailbox_accepts_sends() {
        let mailbox = Mailbox::new(usize::MAX);
        mailbox.send("a".into()).unwrap();
        mailbox.send("b".into()).unwrap();
        assert_eq!(mailbox.len(), 2);
    }

    #[test]
    fn send_after_close_is_a_no_op() {
        let mailbox = Mailbox::new(64);
        mailbox.send("pending".into()).unwrap();
        mailbox.close();

        assert!(mailbox.is_closed());
        assert!(mailbox.send("late".into()).is_ok());
        assert!(mailbox.drain().is_empty());
    }

    #[test]
    fn restored_events_count_against_the_limit() {
        let mailbox = Mailbox::restore(8, vec!["12345".into()], 0);
        assert_eq!(mailbox.pending(), vec!["12345".to_string()]);
        assert!(mailbox.send("6789".into()).is_err());
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn idle_time_runs_from_the_last_touch() {
        let mailbox = Mailbox::restore(64, Vec::new(), 1_000);
        assert_eq!(mailbox.idle_for(4_000), 3_000);

        mailbox.touch(3_500);
        assert_eq!(mailbox.idle_for(4_000), 500);

        // stamps never move backwards
        mailbox.touch(2_000);
        assert_eq!(mailbox.last_seen_ms(), 3_500);
        assert_eq!(mailbox.idle_for(0), 0);
    }
}
