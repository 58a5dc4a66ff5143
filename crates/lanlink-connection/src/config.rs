use std::time::Duration;

/// Default capacity for the receive and send buffers.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Default keep-alive timer interval.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed delay between client reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Per-connection tuning shared by both connection roles.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the inbound buffer; a receiver that lets it fill up
    /// loses the connection with an overrun.
    pub receive_buffer_capacity: usize,
    /// Capacity of the outbound buffer.
    pub send_buffer_capacity: usize,
    /// Cadence of the keep-alive timer.
    pub keep_alive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            receive_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            send_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
        }
    }
}

/// Client-side configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    /// Retry failed connect attempts after [`RECONNECT_DELAY`].
    pub auto_reconnect: bool,
    /// Upper bound on connect attempts; -1 means unbounded.
    pub max_reconnect_attempts: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            auto_reconnect: true,
            max_reconnect_attempts: -1,
        }
    }
}

/// Server configuration: bind port plus the defaults handed to every
/// accepted connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on; 0 lets the OS assign one.
    pub port: u16,
    pub connection: ConnectionConfig,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connection: ConnectionConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
