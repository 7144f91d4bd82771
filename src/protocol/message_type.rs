//! Well-known message type tags exchanged with the test host.

/// First message the peer sends after connecting.
pub const SESSION_CONNECTED: &str = "TestSession.Connected";

/// Human-readable name for the handshake tag, used in protocol errors.
pub const SESSION_CONNECTED_NAME: &str = "SessionConnected";

/// Protocol version negotiation, in both directions.
pub const PROTOCOL_VERSION: &str = "ProtocolVersion";

/// Ask the peer to discover tests in a set of sources.
pub const TEST_DISCOVERY_START: &str = "TestDiscovery.Start";

/// Cancel the current run.
pub const TEST_EXECUTION_CANCEL: &str = "TestExecution.Cancel";

/// Ask the peer to end the session and exit.
pub const SESSION_END: &str = "TestSession.Terminate";
