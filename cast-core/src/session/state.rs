//! The per-connection read-cycle state machine.
//!
//! ```text
//!  AwaitingAuthentication ──► Authenticated
//!                              ExpectHeader ⇄ ExpectBody
//! ```
//!
//! Authentication gates everything: until the handshake result arrives,
//! the only read the session requests is the fixed-size result header.
//! Once authenticated, the session alternates between a 9-byte header
//! read and a body read whose size the header declared. A body read is
//! never requested without a pending header.

use crate::header::{HEADER_SIZE, MessageHeader};
use crate::message::SessionType;

// ── ReadPhase ────────────────────────────────────────────────────

/// What the next exactly-sized read will be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPhase {
    /// Pre-authentication: the next 9 bytes are the handshake result.
    AuthResult,
    /// The next 9 bytes are a message header.
    Header,
    /// The next read completes the pending message's body.
    Body,
}

// ── SessionState ─────────────────────────────────────────────────

/// State owned by one connection session. Never shared.
#[derive(Debug)]
pub struct SessionState {
    session_type: SessionType,
    authenticated: bool,
    phase: ReadPhase,
    expected: usize,
    pending: Option<MessageHeader>,
    streaming: bool,
    input_started: bool,
}

impl SessionState {
    /// Fresh state: unauthenticated, waiting for the handshake result.
    pub fn new(session_type: SessionType) -> Self {
        Self {
            session_type,
            authenticated: false,
            phase: ReadPhase::AuthResult,
            expected: HEADER_SIZE,
            pending: None,
            streaming: false,
            input_started: false,
        }
    }

    /// The traffic class this session authenticated for. Immutable.
    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn phase(&self) -> ReadPhase {
        self.phase
    }

    /// Bytes the demultiplexer should deliver next.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Record a successful handshake and move to the header cycle.
    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
        self.expect_header();
    }

    /// Request the next 9-byte header read, clearing any pending header.
    pub fn expect_header(&mut self) {
        self.phase = ReadPhase::Header;
        self.expected = HEADER_SIZE;
        self.pending = None;
    }

    /// Request the body declared by `header`.
    ///
    /// Taking the header by value is what keeps the invariant: a body
    /// read cannot be requested without a pending header.
    pub fn expect_body(&mut self, header: MessageHeader) {
        self.expected = header.content_length() as usize;
        self.pending = Some(header);
        self.phase = ReadPhase::Body;
    }

    /// Claim the pending header, leaving none behind.
    pub fn take_pending(&mut self) -> Option<MessageHeader> {
        self.pending.take()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub fn input_started(&self) -> bool {
        self.input_started
    }

    pub fn set_input_started(&mut self, started: bool) {
        self.input_started = started;
    }

    /// Teardown: authentication and session flags drop; the state is
    /// back to its pre-handshake shape.
    pub fn reset_for_teardown(&mut self) {
        self.authenticated = false;
        self.streaming = false;
        self.input_started = false;
        self.pending = None;
        self.phase = ReadPhase::AuthResult;
        self.expected = HEADER_SIZE;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageCode;

    #[test]
    fn fresh_state_awaits_auth_result() {
        let state = SessionState::new(SessionType::ScreenCapture);
        assert!(!state.is_authenticated());
        assert_eq!(state.phase(), ReadPhase::AuthResult);
        assert_eq!(state.expected(), HEADER_SIZE);
    }

    #[test]
    fn header_body_alternation() {
        let mut state = SessionState::new(SessionType::ScreenCapture);
        state.mark_authenticated();
        assert_eq!(state.phase(), ReadPhase::Header);
        assert_eq!(state.expected(), HEADER_SIZE);

        let header = MessageHeader::new(MessageCode::InputSend as u8, 16);
        state.expect_body(header);
        assert_eq!(state.phase(), ReadPhase::Body);
        assert_eq!(state.expected(), 16);

        let pending = state.take_pending().unwrap();
        assert_eq!(pending.content_length(), 16);
        assert!(state.take_pending().is_none());

        state.expect_header();
        assert_eq!(state.phase(), ReadPhase::Header);
    }

    #[test]
    fn expect_header_clears_pending() {
        let mut state = SessionState::new(SessionType::Movie);
        state.mark_authenticated();
        state.expect_body(MessageHeader::new(10, 4));
        state.expect_header();
        assert!(state.take_pending().is_none());
    }

    #[test]
    fn zero_length_body_expected() {
        let mut state = SessionState::new(SessionType::ScreenCapture);
        state.mark_authenticated();
        state.expect_body(MessageHeader::new(MessageCode::ScreenNewFrame as u8, 0));
        assert_eq!(state.expected(), 0);
        assert!(state.take_pending().is_some());
    }

    #[test]
    fn teardown_resets_everything() {
        let mut state = SessionState::new(SessionType::InputCapture);
        state.mark_authenticated();
        state.set_streaming(true);
        state.set_input_started(true);
        state.expect_body(MessageHeader::new(42, 16));

        state.reset_for_teardown();
        assert!(!state.is_authenticated());
        assert!(!state.is_streaming());
        assert!(!state.input_started());
        assert!(state.take_pending().is_none());
        assert_eq!(state.phase(), ReadPhase::AuthResult);
        assert_eq!(state.expected(), HEADER_SIZE);
    }
}
