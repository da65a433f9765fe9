use tokio::sync::broadcast;

/// Capacity of the log feed; slow subscribers skip what they missed.
pub const LOG_FEED_CAPACITY: usize = 256;

/// One forwarded log event, relayed to clients as `debugLog`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub message: String,
    pub timestamp: String,
}

pub fn log_feed() -> broadcast::Sender<LogLine> {
    broadcast::channel(LOG_FEED_CAPACITY).0
}

/// A tracing layer that copies WARN and ERROR events into the log feed
pub struct BroadcastLayer {
    sender: broadcast::Sender<LogLine>,
}

impl BroadcastLayer {
    pub fn new(sender: broadcast::Sender<LogLine>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        // No subscribers means no open connections; skip the formatting
        if self.sender.receiver_count() == 0 {
            return;
        }

        let mut message = format!("[{}] ", level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let _ = self.sender.send(LogLine {
            message,
            timestamp: chrono::Local::now().to_rfc3339(),
        });
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}
