/// Pinned strings of the external interface. These values are part of the
/// wire contract with backend applications; changing them breaks deployed
/// callbacks.

/// `result` value for successful admin responses.
pub const RESULT_OK: &str = "OK";

/// `result` value for rejected admin responses.
pub const RESULT_NG: &str = "NG";

/// Default name of the header carrying the session key, both on admin
/// requests and on callback requests/responses.
pub const DEFAULT_SESSION_HEADER: &str = "X-Kuiperbelt-Session";

/// Header announcing this gateway's endpoint to backend callbacks.
pub const ENDPOINT_HEADER: &str = "X-Kuiperbelt-Endpoint";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9180;

/// Content types used to pick the WebSocket frame type.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Issuer claim on generated signed session keys.
pub const SESSION_KEY_ISSUER: &str = "cometgate";

/// Deadline for draining sessions at shutdown, seconds.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Sleep between stats polls while waiting for sessions to drain, millis.
pub const SHUTDOWN_POLL_INTERVAL_MS: u64 = 100;

/// Connection pool tuning for the callback client.
pub const CALLBACK_POOL_LIMIT: usize = 32;
pub const CALLBACK_KEEP_ALIVE_SECS: u64 = 10;

/// Window of the leaky timer that forces a fresh upstream connection on
/// connect callbacks, seconds.
pub const CALLBACK_RECONNECT_WINDOW_SECS: u64 = 10;
