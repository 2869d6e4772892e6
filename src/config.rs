use std::time::Duration;

/// Vendor-assigned command port
pub const DEFAULT_PORT: u16 = 1255;

/// Settings for a [`HeosClient`](crate::HeosClient) session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP port of both channels
    pub port: u16,
    /// Limit on establishing each TCP connection
    pub connect_timeout: Duration,
    /// Limit on a single socket read attempt
    pub read_timeout: Duration,
    /// Budget for receiving an acceptable response. Restarted by every
    /// "command under process" notice.
    pub message_timeout: Duration,
    /// Drop repeated identical frames on the command channel
    pub deduplicate_commands: bool,
    /// Drop repeated identical frames on the event channel
    pub deduplicate_events: bool,
    /// Open the event channel and start the event pump on connect
    pub enable_events: bool,
    /// Capacity of the queue between event listener and dispatcher
    pub event_queue_capacity: usize,
    /// Pause between a queue mutation and the next queue listing.
    ///
    /// The device acknowledges queue edits before a listing reflects them.
    /// There is no documented minimum; tune per installation.
    pub queue_settle_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
            message_timeout: Duration::from_secs(1),
            deduplicate_commands: false,
            deduplicate_events: true,
            enable_events: true,
            event_queue_capacity: 32,
            queue_settle_delay: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeouts(mut self, read_timeout: Duration, message_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.message_timeout = message_timeout;
        self
    }

    pub fn with_events(mut self, enable: bool) -> Self {
        self.enable_events = enable;
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_queue_settle_delay(mut self, delay: Duration) -> Self {
        self.queue_settle_delay = delay;
        self
    }

    pub fn with_command_deduplication(mut self, enable: bool) -> Self {
        self.deduplicate_commands = enable;
        self
    }

    /// Reader options for the command channel
    pub(crate) fn command_reader(&self) -> ReaderOptions {
        ReaderOptions {
            deduplicate: self.deduplicate_commands,
            read_timeout: self.read_timeout,
            message_timeout: self.message_timeout,
        }
    }

    /// Reader options for the event channel
    pub(crate) fn event_reader(&self) -> ReaderOptions {
        ReaderOptions {
            deduplicate: self.deduplicate_events,
            read_timeout: self.read_timeout,
            message_timeout: self.message_timeout,
        }
    }
}

/// How a frame reader treats one channel
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub deduplicate: bool,
    pub read_timeout: Duration,
    pub message_timeout: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ClientConfig::default().command_reader()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 1255);
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert!(!config.command_reader().deduplicate);
        assert!(config.event_reader().deduplicate);
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_port(2000)
            .with_events(false)
            .with_event_queue_capacity(0)
            .with_queue_settle_delay(Duration::ZERO);

        assert_eq!(config.port, 2000);
        assert!(!config.enable_events);
        assert_eq!(config.event_queue_capacity, 1);
        assert_eq!(config.queue_settle_delay, Duration::ZERO);
    }
}
