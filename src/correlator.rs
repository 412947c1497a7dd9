//! Command correlator: finds who caused a roll result.
//!
//! Slash commands carry their author on the reply, so most results are
//! attributed for free. Text commands (`$wa`) do not: the result is matched
//! against roll commands seen shortly before it. The search starts with a
//! window of `timeout` and widens to `timeout * k` up to `max_multiplier`.
//! Nothing older than that ceiling is ever matched.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::channels::{ChatHistory, ChatMessage, Identity};
use crate::config::CorrelationConfig;
use crate::error::CorrelationError;
use crate::mudae::RollCommand;
use crate::mudae::command::parse_roll_command;

/// Where candidate roll commands come from.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// A roll command issued in `[before - within, before]`, if any.
    async fn find_recent_command(
        &self,
        before: DateTime<Utc>,
        within: Duration,
    ) -> Result<Option<RollCommand>, CorrelationError>;

    /// Offer a freshly observed command. Sources that read history ignore it.
    async fn observe(&self, _command: RollCommand) {}
}

// ── Queue source ────────────────────────────────────────────────────

/// Bounded FIFO of observed roll commands.
///
/// A match consumes the oldest command inside the window together with
/// everything queued ahead of it, so each command owns at most one result.
pub struct CommandQueue {
    commands: Mutex<VecDeque<RollCommand>>,
    capacity: usize,
    max_age: Duration,
}

impl CommandQueue {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            commands: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            max_age,
        }
    }

    pub fn from_config(config: &CorrelationConfig) -> Self {
        Self::new(config.queue_capacity, config.ceiling())
    }

    pub async fn len(&self) -> usize {
        self.commands.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.commands.lock().await.is_empty()
    }
}

#[async_trait]
impl CommandSource for CommandQueue {
    async fn find_recent_command(
        &self,
        before: DateTime<Utc>,
        within: Duration,
    ) -> Result<Option<RollCommand>, CorrelationError> {
        let earliest = before - to_chrono(within);
        let mut commands = self.commands.lock().await;

        let Some(pos) = commands
            .iter()
            .position(|c| c.issued_at >= earliest && c.issued_at <= before)
        else {
            return Ok(None);
        };

        let stale = commands.drain(..pos).count();
        if stale > 0 {
            debug!(stale, "Discarded unmatched roll commands");
        }
        Ok(commands.pop_front())
    }

    async fn observe(&self, command: RollCommand) {
        let mut commands = self.commands.lock().await;

        let horizon = command.issued_at - to_chrono(self.max_age);
        while commands.front().is_some_and(|c| c.issued_at < horizon) {
            commands.pop_front();
        }
        if commands.len() >= self.capacity {
            commands.pop_front();
        }
        commands.push_back(command);
    }
}

// ── History source ──────────────────────────────────────────────────

/// Scans channel history for the latest roll command before the result.
pub struct HistoryCommandSource {
    history: Arc<dyn ChatHistory>,
    channel_id: u64,
}

impl HistoryCommandSource {
    pub fn new(history: Arc<dyn ChatHistory>, channel_id: u64) -> Self {
        Self {
            history,
            channel_id,
        }
    }
}

#[async_trait]
impl CommandSource for HistoryCommandSource {
    async fn find_recent_command(
        &self,
        before: DateTime<Utc>,
        within: Duration,
    ) -> Result<Option<RollCommand>, CorrelationError> {
        let after = before - to_chrono(within);
        let messages = self.history.history(self.channel_id, after, before).await?;
        Ok(messages
            .iter()
            .filter_map(parse_roll_command)
            .max_by_key(|c| c.issued_at))
    }
}

// ── Correlator ──────────────────────────────────────────────────────

pub struct Correlator {
    source: Arc<dyn CommandSource>,
    config: CorrelationConfig,
}

impl Correlator {
    pub fn new(source: Arc<dyn CommandSource>, config: CorrelationConfig) -> Self {
        Self { source, config }
    }

    /// Record a roll command so later results can be matched to it.
    pub async fn observe(&self, command: RollCommand) {
        self.source.observe(command).await;
    }

    /// Resolve the owner of a result message.
    pub async fn correlate(&self, msg: &ChatMessage) -> Result<Identity, CorrelationError> {
        if let Some(user) = &msg.interaction_user {
            return Ok(user.clone());
        }

        let timeout = self.config.timeout();
        let max_multiplier = self.config.max_multiplier.max(1);

        for multiplier in 1..=max_multiplier {
            let within = timeout * multiplier;
            if let Some(command) = self
                .source
                .find_recent_command(msg.created_at, within)
                .await?
            {
                debug!(
                    message_id = msg.id,
                    owner = %command.owner,
                    command = %command.command,
                    window_ms = within.as_millis() as u64,
                    "Correlated result to roll command"
                );
                return Ok(command.owner);
            }
            if multiplier < max_multiplier {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        let searched = timeout * max_multiplier;
        warn!(
            message_id = msg.id,
            searched_ms = searched.as_millis() as u64,
            "No roll command found for result"
        );
        Err(CorrelationError::OwnerNotFound {
            message_id: msg.id,
            searched,
        })
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    fn command(owner: u64, ms: i64) -> RollCommand {
        RollCommand {
            owner: Identity::new(owner, format!("user{owner}")),
            issued_at: at(ms),
            command: "$wa".into(),
            message_id: owner * 1000 + ms as u64,
        }
    }

    fn result_at(ms: i64) -> ChatMessage {
        ChatMessage::text(77, 10, Identity::new(9, "Mudae"), "", at(ms))
    }

    fn strict(timeout_ms: u64) -> CorrelationConfig {
        CorrelationConfig {
            timeout_ms,
            max_multiplier: 1,
            retry_delay_ms: Some(0),
            queue_capacity: 16,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_reference_wins() {
        let queue = Arc::new(CommandQueue::new(16, Duration::from_secs(2)));
        let correlator = Correlator::new(queue, strict(500));
        let msg = result_at(0).with_interaction_user(Identity::new(5, "Slash"));
        assert_eq!(correlator.correlate(&msg).await.unwrap().id, 5);
    }

    #[tokio::test]
    async fn matches_within_timeout() {
        let queue = Arc::new(CommandQueue::new(16, Duration::from_secs(2)));
        let correlator = Correlator::new(queue.clone(), strict(500));
        correlator.observe(command(1, 0)).await;

        let owner = correlator.correlate(&result_at(400)).await.unwrap();
        assert_eq!(owner.id, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn fails_past_timeout() {
        let queue = Arc::new(CommandQueue::new(16, Duration::from_secs(2)));
        let correlator = Correlator::new(queue.clone(), strict(500));
        correlator.observe(command(1, 0)).await;

        let err = correlator.correlate(&result_at(600)).await.unwrap_err();
        assert!(matches!(err, CorrelationError::OwnerNotFound { message_id: 77, .. }));
        // Unmatched command stays queued.
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn widening_finds_late_match_within_ceiling() {
        let queue = Arc::new(CommandQueue::new(16, Duration::from_secs(2)));
        let config = CorrelationConfig {
            timeout_ms: 250,
            max_multiplier: 4,
            retry_delay_ms: Some(0),
            queue_capacity: 16,
            ..Default::default()
        };
        let correlator = Correlator::new(queue, config);
        correlator.observe(command(3, 0)).await;

        // 700ms is outside 250 and 500 but inside 750.
        assert_eq!(correlator.correlate(&result_at(700)).await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn never_matches_beyond_ceiling() {
        let queue = Arc::new(CommandQueue::new(16, Duration::from_secs(10)));
        let config = CorrelationConfig {
            timeout_ms: 250,
            max_multiplier: 2,
            retry_delay_ms: Some(0),
            queue_capacity: 16,
            ..Default::default()
        };
        let correlator = Correlator::new(queue, config);
        correlator.observe(command(3, 0)).await;
        assert!(correlator.correlate(&result_at(600)).await.is_err());
    }

    #[tokio::test]
    async fn queue_consumes_fifo_and_drops_skipped() {
        let queue = CommandQueue::new(16, Duration::from_secs(10));
        queue.observe(command(1, 0)).await;
        queue.observe(command(2, 100)).await;
        queue.observe(command(3, 2000)).await;

        // Window [1900, 2100] skips the two early commands and discards them.
        let found = queue
            .find_recent_command(at(2100), Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.owner.id, 3);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn queue_prefers_oldest_fresh_command() {
        let queue = CommandQueue::new(16, Duration::from_secs(10));
        queue.observe(command(1, 0)).await;
        queue.observe(command(2, 100)).await;

        let first = queue
            .find_recent_command(at(300), Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.owner.id, 1);
        let second = queue
            .find_recent_command(at(350), Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.owner.id, 2);
    }

    #[tokio::test]
    async fn queue_ignores_commands_after_result() {
        let queue = CommandQueue::new(16, Duration::from_secs(10));
        queue.observe(command(1, 500)).await;
        assert!(
            queue
                .find_recent_command(at(400), Duration::from_millis(500))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn queue_is_bounded_and_prunes_old_entries() {
        let queue = CommandQueue::new(2, Duration::from_secs(1));
        queue.observe(command(1, 0)).await;
        queue.observe(command(2, 100)).await;
        queue.observe(command(3, 200)).await;
        assert_eq!(queue.len().await, 2);

        queue.observe(command(4, 5000)).await;
        assert_eq!(queue.len().await, 1);
    }

    struct FixedHistory(Vec<ChatMessage>);

    #[async_trait]
    impl ChatHistory for FixedHistory {
        async fn history(
            &self,
            channel_id: u64,
            after: DateTime<Utc>,
            before: DateTime<Utc>,
        ) -> Result<Vec<ChatMessage>, ChannelError> {
            Ok(self
                .0
                .iter()
                .filter(|m| m.channel_id == channel_id && m.created_at > after && m.created_at < before)
                .cloned()
                .collect())
        }
    }

    fn typed(owner: u64, content: &str, ms: i64) -> ChatMessage {
        ChatMessage::text(ms as u64, 10, Identity::new(owner, "u"), content, at(ms))
    }

    #[tokio::test]
    async fn history_source_returns_most_recent_command() {
        let history = Arc::new(FixedHistory(vec![
            typed(1, "$wa", 0),
            typed(2, "hello", 50),
            typed(3, "$wg", 100),
        ]));
        let source = HistoryCommandSource::new(history, 10);
        let found = source
            .find_recent_command(at(200), Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.owner.id, 3);
    }

    #[tokio::test]
    async fn history_correlation_widens() {
        let history = Arc::new(FixedHistory(vec![typed(1, "$wa", 0)]));
        let source = Arc::new(HistoryCommandSource::new(history, 10));
        let config = CorrelationConfig {
            timeout_ms: 250,
            max_multiplier: 7,
            retry_delay_ms: Some(0),
            queue_capacity: 16,
            ..Default::default()
        };
        let correlator = Correlator::new(source, config);
        assert_eq!(correlator.correlate(&result_at(1200)).await.unwrap().id, 1);
        assert!(correlator.correlate(&result_at(1800)).await.is_err());
    }
}
