//! The connection lifecycle state machine for the notification stream.
//!
//! All reconnect and keepalive policy lives here, as a pure function of (state, input) so it can be tested
//! without opening sockets. The driver in [`client`](super::client) feeds inputs in and executes the returned
//! actions.
//!
//! Invariants encoded here:
//! * At most one reconnect timer exists at any time. Repeated connection losses while a reconnect is already
//!   scheduled do not schedule another.
//! * A connect request while already connecting or connected is a no-op.
//! * A ping that goes unanswered by the next ping tick means the connection is dead, and forces a reconnect
//!   even though the socket has not reported an error.
//! * A disconnect request wins over everything and cancels any pending reconnect.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No connection and none wanted yet.
    Idle,
    /// A dial is in flight.
    Connecting,
    /// The websocket is open and subscribed.
    Open,
    /// The connection is down and a single reconnect timer is pending.
    AwaitingReconnect,
    /// Shut down for good. No input leaves this state.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamInput {
    ConnectRequested,
    ConnectionEstablished,
    ConnectionLost,
    /// The keepalive interval elapsed.
    PingDue,
    PongReceived,
    /// The reconnect timer fired.
    ReconnectDue,
    DisconnectRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    /// Open a new websocket connection.
    Dial,
    /// Send the subscribe frame for all events.
    Subscribe,
    SendPing,
    /// Start the (single) reconnect timer.
    ScheduleReconnect,
    /// Close the socket if one is open. The ping went unanswered or a disconnect was requested.
    CloseConnection,
    Nothing,
}

#[derive(Debug)]
pub struct StreamLifecycle {
    state: StreamState,
    /// Set when a ping has been sent and no pong has come back yet.
    awaiting_pong: bool,
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamLifecycle {
    pub fn new() -> Self {
        Self { state: StreamState::Idle, awaiting_pong: false }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Advance the state machine. Returns the single action the driver must carry out.
    pub fn handle(&mut self, input: StreamInput) -> StreamAction {
        use StreamAction::*;
        use StreamInput::*;
        use StreamState::*;
        match (self.state, input) {
            (_, DisconnectRequested) => {
                self.state = Stopped;
                self.awaiting_pong = false;
                CloseConnection
            },
            (Stopped, _) => Nothing,
            (Idle | AwaitingReconnect, ConnectRequested) => {
                self.state = Connecting;
                Dial
            },
            // Already connecting or connected; duplicate connect requests change nothing.
            (Connecting | Open, ConnectRequested) => Nothing,
            (Connecting, ConnectionEstablished) => {
                self.state = Open;
                self.awaiting_pong = false;
                Subscribe
            },
            (Connecting | Open, ConnectionLost) => {
                self.state = AwaitingReconnect;
                self.awaiting_pong = false;
                ScheduleReconnect
            },
            // The timer is already pending. This is the single-timer invariant.
            (AwaitingReconnect, ConnectionLost) => Nothing,
            (Open, PingDue) => {
                if self.awaiting_pong {
                    // The previous ping was never answered. The connection is dead even if the socket is not.
                    self.state = AwaitingReconnect;
                    self.awaiting_pong = false;
                    CloseConnection
                } else {
                    self.awaiting_pong = true;
                    SendPing
                }
            },
            (Open, PongReceived) => {
                self.awaiting_pong = false;
                Nothing
            },
            (AwaitingReconnect, ReconnectDue) => {
                self.state = Connecting;
                Dial
            },
            (_, _) => Nothing,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{StreamAction::*, StreamInput::*, StreamState::*, *};

    fn open_stream() -> StreamLifecycle {
        let mut lc = StreamLifecycle::new();
        assert_eq!(lc.handle(ConnectRequested), Dial);
        assert_eq!(lc.handle(ConnectionEstablished), Subscribe);
        assert_eq!(lc.state(), Open);
        lc
    }

    #[test]
    fn happy_path_connects_and_subscribes() {
        open_stream();
    }

    #[test]
    fn duplicate_connect_requests_are_no_ops() {
        let mut lc = StreamLifecycle::new();
        assert_eq!(lc.handle(ConnectRequested), Dial);
        assert_eq!(lc.handle(ConnectRequested), Nothing);
        assert_eq!(lc.handle(ConnectionEstablished), Subscribe);
        assert_eq!(lc.handle(ConnectRequested), Nothing);
        assert_eq!(lc.state(), Open);
    }

    #[test]
    fn repeated_losses_schedule_exactly_one_reconnect() {
        let mut lc = open_stream();
        assert_eq!(lc.handle(ConnectionLost), ScheduleReconnect);
        // Further loss reports while the timer is pending must not start a second timer.
        assert_eq!(lc.handle(ConnectionLost), Nothing);
        assert_eq!(lc.handle(ConnectionLost), Nothing);
        assert_eq!(lc.state(), AwaitingReconnect);
        assert_eq!(lc.handle(ReconnectDue), Dial);
        assert_eq!(lc.state(), Connecting);
    }

    #[test]
    fn failed_dial_schedules_a_reconnect() {
        let mut lc = StreamLifecycle::new();
        assert_eq!(lc.handle(ConnectRequested), Dial);
        assert_eq!(lc.handle(ConnectionLost), ScheduleReconnect);
        assert_eq!(lc.handle(ReconnectDue), Dial);
    }

    #[test]
    fn answered_pings_keep_the_connection_open() {
        let mut lc = open_stream();
        for _ in 0..3 {
            assert_eq!(lc.handle(PingDue), SendPing);
            assert_eq!(lc.handle(PongReceived), Nothing);
        }
        assert_eq!(lc.state(), Open);
    }

    #[test]
    fn missed_pong_forces_a_reconnect() {
        let mut lc = open_stream();
        assert_eq!(lc.handle(PingDue), SendPing);
        // No pong before the next tick: the connection is considered dead.
        assert_eq!(lc.handle(PingDue), CloseConnection);
        assert_eq!(lc.state(), AwaitingReconnect);
        // The driver reports the socket close; still only one timer.
        assert_eq!(lc.handle(ConnectionLost), Nothing);
        assert_eq!(lc.handle(ReconnectDue), Dial);
    }

    #[test]
    fn reconnected_stream_starts_with_a_clean_pong_slate() {
        let mut lc = open_stream();
        assert_eq!(lc.handle(PingDue), SendPing);
        assert_eq!(lc.handle(ConnectionLost), ScheduleReconnect);
        assert_eq!(lc.handle(ReconnectDue), Dial);
        assert_eq!(lc.handle(ConnectionEstablished), Subscribe);
        // The unanswered ping from the previous connection does not count against the new one.
        assert_eq!(lc.handle(PingDue), SendPing);
    }

    #[test]
    fn disconnect_cancels_everything() {
        let mut lc = open_stream();
        assert_eq!(lc.handle(ConnectionLost), ScheduleReconnect);
        assert_eq!(lc.handle(DisconnectRequested), CloseConnection);
        assert_eq!(lc.state(), Stopped);
        // A pending timer firing after shutdown must not dial.
        assert_eq!(lc.handle(ReconnectDue), Nothing);
        assert_eq!(lc.handle(ConnectRequested), Nothing);
        assert_eq!(lc.handle(ConnectionLost), Nothing);
    }
}
