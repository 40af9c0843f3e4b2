use std::sync::atomic::{AtomicBool, Ordering};
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use kujo_core::config::GatewayConfig;
use kujo_core::tickets::messages;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::{
    CommandReply, DiscordEnvelope, DiscordEvent, EventContext, EventDispatcher, HandlerResult,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("interaction response failed: {0}")]
    Respond(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl From<&GatewayConfig> for ReconnectPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Shared connected flag, read by the health endpoint.
#[derive(Clone, Debug, Default)]
pub struct GatewayStatus {
    connected: Arc<AtomicBool>,
}

impl GatewayStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<DiscordEnvelope>, TransportError>;
    async fn respond(&self, envelope_id: &str, reply: &CommandReply) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
    status: GatewayStatus,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
        status: GatewayStatus,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), reconnect_policy, status }
    }

    pub fn status(&self) -> GatewayStatus {
        self.status.clone()
    }

    /// Runs sessions until `max_retries` consecutive connects have failed.
    /// A session that connected resets the count, whether it ended on a read
    /// error or a closed stream.
    pub async fn start(&self) -> Result<()> {
        let mut failed_connects = 0_u32;

        loop {
            info!(attempt = failed_connects, "opening discord gateway connection");
            if let Err(connect_error) = self.transport.connect().await {
                warn!(
                    event_name = "gateway.transport_failed",
                    attempt = failed_connects,
                    max_retries = self.reconnect_policy.max_retries,
                    error = %connect_error,
                    "discord gateway connect failed"
                );

                if failed_connects >= self.reconnect_policy.max_retries {
                    warn!(
                        event_name = "gateway.retries_exhausted",
                        max_retries = self.reconnect_policy.max_retries,
                        "gateway retries exhausted; continuing process without crash"
                    );
                    return Ok(());
                }

                let delay = self.reconnect_policy.backoff(failed_connects);
                failed_connects += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            failed_connects = 0;
            self.status.set_connected(true);
            info!(event_name = "gateway.connected", "discord gateway connected");

            let session = self.run_session().await;
            self.status.set_connected(false);

            match session {
                Ok(()) => info!(
                    event_name = "gateway.session_closed",
                    "discord gateway stream closed; reconnecting"
                ),
                Err(session_error) => warn!(
                    event_name = "gateway.transport_failed",
                    error = %session_error,
                    "discord gateway session failed; reconnecting"
                ),
            }

            let delay = self.reconnect_policy.backoff(0);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn run_session(&self) -> Result<(), TransportError> {
        let mut in_flight = JoinSet::new();
        let pumped = self.pump(&mut in_flight).await;

        while in_flight.join_next().await.is_some() {}

        if let Err(disconnect_error) = self.transport.disconnect().await {
            warn!(
                event_name = "gateway.disconnect_failed",
                error = %disconnect_error,
                "discord gateway disconnect failed"
            );
        }
        pumped
    }

    async fn pump(&self, in_flight: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!("discord gateway stream closed");
                return Ok(());
            };

            let guild_id = guild_field(&envelope.event);
            info!(
                event_name = "ingress.discord.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                guild_id = guild_id.as_deref().unwrap_or("unknown"),
                "received discord event"
            );

            // Each event gets its own task so a ticket waiting out its close
            // delay does not hold up unrelated events.
            let transport = Arc::clone(&self.transport);
            let dispatcher = Arc::clone(&self.dispatcher);
            in_flight.spawn(async move {
                process_envelope(transport.as_ref(), &dispatcher, envelope).await;
            });
        }
    }
}

async fn process_envelope(
    transport: &dyn GatewayTransport,
    dispatcher: &EventDispatcher,
    envelope: DiscordEnvelope,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    let reply = match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(reply)) => Some(reply),
        Ok(result) => {
            debug!(
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                result = ?result,
                "discord event handled"
            );
            unanswered_command_reply(&envelope.event)
        }
        Err(error) => {
            warn!(
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "event dispatch failed; continuing gateway loop"
            );
            unanswered_command_reply(&envelope.event)
        }
    };

    let Some(reply) = reply else {
        return;
    };
    if let Err(error) = transport.respond(&envelope.envelope_id, &reply).await {
        warn!(
            event_name = "egress.discord.reply_sent",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            error = %error,
            "failed to reply to discord interaction"
        );
    } else {
        debug!(
            event_name = "egress.discord.reply_sent",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            "replied to discord interaction"
        );
    }
}

/// Every slash command must be answered, or the interaction stays pending.
fn unanswered_command_reply(event: &DiscordEvent) -> Option<CommandReply> {
    match event {
        DiscordEvent::SlashCommand(_) => {
            Some(CommandReply { content: messages::command_failed(), ephemeral: true })
        }
        DiscordEvent::ReactionAdded(_) | DiscordEvent::Unsupported { .. } => None,
    }
}

fn guild_field(event: &DiscordEvent) -> Option<String> {
    match event {
        DiscordEvent::ReactionAdded(reaction) => Some(reaction.guild_id.to_string()),
        DiscordEvent::SlashCommand(payload) => payload.guild_id.map(|id| id.to_string()),
        DiscordEvent::Unsupported { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use kujo_core::config::GatewayConfig;
    use kujo_core::domain::ids::{ChannelId, GuildId, UserId};
    use kujo_core::tickets::messages;
    use tokio::sync::Mutex;

    use super::{GatewayRunner, GatewayStatus, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::events::{
        CommandReply, DiscordEnvelope, DiscordEvent, DiscordEventType, EventContext,
        EventDispatcher, EventHandler, EventHandlerError, HandlerResult, SlashCommandPayload,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<DiscordEnvelope>, TransportError>>,
        connect_attempts: usize,
        replies: Vec<(String, CommandReply)>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<DiscordEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn replies(&self) -> Vec<(String, CommandReply)> {
            self.state.lock().await.replies.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state
                .connect_results
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".to_owned())))
        }

        async fn next_envelope(&self) -> Result<Option<DiscordEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn respond(
            &self,
            envelope_id: &str,
            reply: &CommandReply,
        ) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.replies.push((envelope_id.to_owned(), reply.clone()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    /// Replies with the command name after an optional delay and records
    /// completion order.
    struct EchoHandler {
        slow_command: &'static str,
        completed: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for EchoHandler {
        fn event_type(&self) -> DiscordEventType {
            DiscordEventType::SlashCommand
        }

        async fn handle(
            &self,
            envelope: &DiscordEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            let DiscordEvent::SlashCommand(payload) = &envelope.event else {
                return Ok(HandlerResult::Ignored);
            };
            if payload.name == self.slow_command {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.completed.lock().await.push(payload.name.clone());
            Ok(HandlerResult::Responded(CommandReply {
                content: payload.name.clone(),
                ephemeral: true,
            }))
        }
    }

    struct ComplaintOnlyHandler;

    #[async_trait]
    impl EventHandler for ComplaintOnlyHandler {
        fn event_type(&self) -> DiscordEventType {
            DiscordEventType::SlashCommand
        }

        async fn handle(
            &self,
            envelope: &DiscordEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            match &envelope.event {
                DiscordEvent::SlashCommand(payload) if payload.name != "complaint" => {
                    Err(EventHandlerError::UnknownCommand(payload.name.clone()))
                }
                _ => Ok(HandlerResult::Ignored),
            }
        }
    }

    fn command_envelope(id: &str, name: &str) -> DiscordEnvelope {
        DiscordEnvelope {
            envelope_id: id.to_owned(),
            event: DiscordEvent::SlashCommand(SlashCommandPayload {
                name: name.to_owned(),
                guild_id: Some(GuildId(1)),
                channel_id: ChannelId(2),
                user_id: UserId(3),
            }),
        }
    }

    fn immediate_retries(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(DiscordEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: DiscordEvent::Unsupported { event_type: "typing_start".to_owned() },
                })),
                Ok(None),
            ],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            immediate_retries(1),
            GatewayStatus::default(),
        );

        runner.start().await.expect("runner should not fail");

        // failed, connected, then two refused reconnects after the stream closed
        assert_eq!(transport.connect_attempts().await, 4);
        assert_eq!(transport.disconnect_calls().await, 1);
        assert!(!runner.status().is_connected());
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            immediate_retries(2),
            GatewayStatus::default(),
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(transport.disconnect_calls().await, 0);
    }

    #[tokio::test]
    async fn receive_failure_triggers_reconnect() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![Err(TransportError::Receive("socket reset".to_owned())), Ok(None)],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            immediate_retries(0),
            GatewayStatus::default(),
        );

        runner.start().await.expect("runner should recover");
        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(transport.disconnect_calls().await, 2);
    }

    #[tokio::test]
    async fn successful_sessions_do_not_use_up_the_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(()), Ok(())],
            vec![
                Err(TransportError::Receive("reset-1".to_owned())),
                Err(TransportError::Receive("reset-2".to_owned())),
                Err(TransportError::Receive("reset-3".to_owned())),
                Ok(None),
            ],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            immediate_retries(1),
            GatewayStatus::default(),
        );

        runner.start().await.expect("runner should keep reconnecting");

        // four sessions, then two consecutive refused connects exhaust max_retries = 1
        assert_eq!(transport.connect_attempts().await, 6);
        assert_eq!(transport.disconnect_calls().await, 4);
        assert!(!runner.status().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_events_do_not_block_later_events() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register(EchoHandler { slow_command: "slow", completed: Arc::clone(&completed) });
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(command_envelope("env-slow", "slow"))),
                Ok(Some(command_envelope("env-fast", "fast"))),
                Ok(None),
            ],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            dispatcher,
            immediate_retries(0),
            GatewayStatus::default(),
        );
        runner.start().await.expect("runner");

        assert_eq!(*completed.lock().await, vec!["fast".to_owned(), "slow".to_owned()]);
        let replied: Vec<String> =
            transport.replies().await.into_iter().map(|(envelope_id, _)| envelope_id).collect();
        assert_eq!(replied, vec!["env-fast".to_owned(), "env-slow".to_owned()]);
    }

    #[tokio::test]
    async fn unhandled_commands_still_get_an_ephemeral_reply() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(ComplaintOnlyHandler);
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(command_envelope("env-stale", "quote"))),
                Ok(Some(DiscordEnvelope {
                    envelope_id: "env-typing".to_owned(),
                    event: DiscordEvent::Unsupported { event_type: "typing_start".to_owned() },
                })),
                Ok(None),
            ],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            dispatcher,
            immediate_retries(0),
            GatewayStatus::default(),
        );
        runner.start().await.expect("runner");

        let replies = transport.replies().await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, "env-stale");
        assert_eq!(replies[0].1.content, messages::command_failed());
        assert!(replies[0].1.ephemeral);
    }

    #[test]
    fn backoff_doubles_and_caps_at_max_delay() {
        let policy = ReconnectPolicy::from(&GatewayConfig {
            max_retries: 5,
            base_delay_ms: 250,
            max_delay_ms: 1_000,
        });

        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(9), Duration::from_millis(1_000));
    }

    #[test]
    fn status_is_shared_between_clones() {
        let status = GatewayStatus::default();
        let observer = status.clone();

        status.set_connected(true);
        assert!(observer.is_connected());
    }
}
