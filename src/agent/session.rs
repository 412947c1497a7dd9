//! Session: the running agent for one channel.
//!
//! Owns every piece of state in an `Arc<SessionContext>` handed to each task:
//! - inbound: filters the channel, classifies, records roll commands, applies
//!   status reports and queues results for attribution
//! - attribution: resolves owners and routes results to the two pipelines
//! - claim / kakera: one consumer per queue, so each roll is decided once
//! - roll: spends the roll budget
//! - heartbeat: hourly status refresh

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actuator::Actuator;
use crate::agent::heartbeat::{spawn_heartbeat, status_schedule};
use crate::budget::BudgetTracker;
use crate::channels::{ChatClient, ChatHistory, ChatMessage, Identity};
use crate::config::{AppConfig, CorrelationSource};
use crate::correlator::{CommandQueue, CommandSource, Correlator, HistoryCommandSource};
use crate::engine::{Action, DecisionEngine};
use crate::error::{Error, SessionError};
use crate::mudae::{
    Classifier, ClassifierContext, ClaimableRoll, Event, KakeraRoll, RouletteLimited, TimerStatus,
};

/// Capacity of each result queue.
const QUEUE_CAPACITY: usize = 64;

/// Shared state of a running session.
pub struct SessionContext {
    pub config: AppConfig,
    pub me: Identity,
    pub classifier: Classifier,
    pub correlator: Correlator,
    pub budget: BudgetTracker,
    pub engine: Mutex<DecisionEngine>,
    pub actuator: Actuator,
    rolls_executed: AtomicU32,
}

impl SessionContext {
    pub fn rolls_executed(&self) -> u32 {
        self.rolls_executed.load(Ordering::SeqCst)
    }
}

pub struct Session {
    ctx: Arc<SessionContext>,
    client: Arc<dyn ChatClient>,
}

impl Session {
    pub fn new(
        config: AppConfig,
        client: Arc<dyn ChatClient>,
        source: Arc<dyn CommandSource>,
    ) -> Self {
        let me = client.self_identity();
        let classifier = Classifier::new(ClassifierContext {
            me: me.clone(),
            game_bot_id: config.chat.game_bot_id,
        });
        let correlator = Correlator::new(source, config.correlation.clone());
        let engine = DecisionEngine::new(
            me.clone(),
            config.claim.clone(),
            config.kakera_react.clone(),
        );
        let actuator = Actuator::new(Arc::clone(&client), &config.limits);

        let ctx = SessionContext {
            config,
            me,
            classifier,
            correlator,
            budget: BudgetTracker::new(),
            engine: Mutex::new(engine),
            actuator,
            rolls_executed: AtomicU32::new(0),
        };

        Self {
            ctx: Arc::new(ctx),
            client,
        }
    }

    /// Build a session whose command source follows `config.correlation.source`.
    pub fn from_config(
        config: AppConfig,
        client: Arc<dyn ChatClient>,
        history: Arc<dyn ChatHistory>,
    ) -> Self {
        let source: Arc<dyn CommandSource> = match config.correlation.source {
            CorrelationSource::Queue => Arc::new(CommandQueue::from_config(&config.correlation)),
            CorrelationSource::History => Arc::new(HistoryCommandSource::new(
                history,
                config.chat.channel_id,
            )),
        };
        Self::new(config, client, source)
    }

    pub fn context(&self) -> Arc<SessionContext> {
        Arc::clone(&self.ctx)
    }

    /// Run until the inbound stream ends or Ctrl+C.
    pub async fn run(self) -> Result<(), Error> {
        let schedule = status_schedule(self.ctx.config.roll.reset_minute_offset)?;
        let mut inbound = self.client.start().await?;

        let (result_tx, result_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (claim_tx, claim_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (kakera_tx, kakera_rx) = mpsc::channel(QUEUE_CAPACITY);

        let tasks: Vec<JoinHandle<()>> = vec![
            spawn_attribution_loop(self.context(), result_rx, claim_tx, kakera_tx),
            spawn_claim_loop(self.context(), claim_rx),
            spawn_kakera_loop(self.context(), kakera_rx),
            spawn_roll_loop(self.context()),
            spawn_heartbeat(self.context(), schedule),
        ];

        info!(
            channel = self.client.name(),
            me = %self.ctx.me,
            channel_id = self.ctx.config.chat.channel_id,
            "Session ready and listening"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = inbound.next() => match msg {
                    Some(m) => m,
                    None => {
                        info!("Inbound stream ended, shutting down...");
                        break;
                    }
                },
            };

            if let Err(e) = handle_inbound(&self.ctx, message, &result_tx).await {
                error!(error = %e, "Inbound handling stopped");
                break;
            }
        }

        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

async fn handle_inbound(
    ctx: &SessionContext,
    msg: ChatMessage,
    results: &mpsc::Sender<(ChatMessage, Event)>,
) -> Result<(), SessionError> {
    if msg.channel_id != ctx.config.chat.channel_id {
        return Ok(());
    }

    let Some(event) = ctx.classifier.classify(&msg) else {
        return Ok(());
    };
    debug!(event = event.label(), message_id = msg.id, "Classified");

    match event {
        Event::RollCommand(command) => {
            debug!(owner = %command.owner, command = %command.command, "Roll command");
            ctx.correlator.observe(command).await;
        }
        Event::TimerStatus(status) => apply_status(ctx, status).await,
        result => results
            .send((msg, result))
            .await
            .map_err(|_| SessionError::QueueClosed("results"))?,
    }
    Ok(())
}

/// A fresh status report starts a new batch.
async fn apply_status(ctx: &SessionContext, status: TimerStatus) {
    ctx.budget.update(status).await;
    ctx.rolls_executed.store(0, Ordering::SeqCst);

    let mut engine = ctx.engine.lock().await;
    engine.begin_batch();
    let decision = engine.finalize(&status, Utc::now());
    drop(engine);

    for action in decision.into_actions() {
        perform(ctx, action).await;
    }
}

// ── Attribution ─────────────────────────────────────────────────────

fn spawn_attribution_loop(
    ctx: Arc<SessionContext>,
    mut results: mpsc::Receiver<(ChatMessage, Event)>,
    claims: mpsc::Sender<ClaimableRoll>,
    kakera: mpsc::Sender<KakeraRoll>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((msg, event)) = results.recv().await {
            let event = if event.needs_owner() {
                match ctx.correlator.correlate(&msg).await {
                    Ok(owner) => event.attribute(owner),
                    Err(e) => {
                        warn!(error = %e, event = event.label(), "Dropping unattributed result");
                        continue;
                    }
                }
            } else {
                event
            };

            let routed = match event {
                Event::ClaimableRoll(roll) => claims.send(roll).await.is_ok(),
                Event::KakeraRoll(roll) => kakera.send(roll).await.is_ok(),
                Event::RouletteLimited(limited) => {
                    on_roulette_limited(&ctx, &limited).await;
                    true
                }
                Event::RollCommand(_) | Event::TimerStatus(_) => true,
            };
            if !routed {
                error!("Pipeline queue closed, attribution stopped");
                return;
            }
        }
    })
}

async fn on_roulette_limited(ctx: &SessionContext, limited: &RouletteLimited) {
    if limited.owner.as_ref() != Some(&ctx.me) {
        debug!(actor = %limited.actor, "Someone else hit the roll limit");
        return;
    }
    info!(
        minutes_left = limited.minutes_left,
        uses_per_hour = limited.uses_per_hour,
        "Roll limit reached, refreshing status"
    );
    if let Err(e) = ctx.actuator.request_status().await {
        warn!(error = %e, "Status request failed");
    }
}

// ── Pipelines ───────────────────────────────────────────────────────

fn spawn_claim_loop(
    ctx: Arc<SessionContext>,
    mut rolls: mpsc::Receiver<ClaimableRoll>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(roll) = rolls.recv().await {
            let mine = roll.is_owned_by(&ctx.me);
            decide(&ctx, mine, |engine, status, now| {
                engine.observe_claimable(roll, status, now)
            })
            .await;
        }
    })
}

fn spawn_kakera_loop(
    ctx: Arc<SessionContext>,
    mut rolls: mpsc::Receiver<KakeraRoll>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(roll) = rolls.recv().await {
            let mine = roll.is_owned_by(&ctx.me);
            decide(&ctx, mine, |engine, status, now| {
                engine.observe_kakera(roll, status, now)
            })
            .await;
        }
    })
}

/// Run one pipeline step plus the finalizer under the engine lock, then act.
async fn decide<F>(ctx: &SessionContext, mine: bool, observe: F)
where
    F: FnOnce(&mut DecisionEngine, &TimerStatus, DateTime<Utc>) -> Option<Action>,
{
    let status = ctx.budget.status().await;
    let now = Utc::now();

    let mut engine = ctx.engine.lock().await;
    let action = observe(&mut *engine, &status, now);
    let decision = engine.finalize(&status, now);
    let remaining = status.rolls_available.saturating_sub(engine.rolls_handled());
    let exhausted = engine.batch_exhausted(&status) && !engine.has_pending();
    drop(engine);

    for action in action.into_iter().chain(decision.into_actions()) {
        perform(ctx, action).await;
    }
    if mine {
        info!(remaining, "ROLL PROCESSING COMPLETE");
        if exhausted {
            info!("Batch complete");
        }
    }
}

async fn perform(ctx: &SessionContext, action: Action) {
    match action {
        Action::Claim(roll) => {
            let reaction_s = reaction_secs(&roll.observed_at);
            match ctx.actuator.claim(&roll).await {
                Ok(()) => {
                    ctx.budget.record_claim().await;
                    info!(character = %roll.character, reaction_s, "Claim sent");
                }
                Err(e) => warn!(error = %e, character = %roll.character, "Claim failed"),
            }
        }
        Action::KakeraReact(roll) => {
            let reaction_s = reaction_secs(&roll.observed_at);
            match ctx.actuator.kakera_react(&roll).await {
                Ok(()) => {
                    ctx.budget.record_kakera_react().await;
                    info!(kakera = roll.kakera_value, reaction_s, "Kakera react sent");
                }
                Err(e) => warn!(error = %e, "Kakera react failed"),
            }
        }
    }
}

fn reaction_secs(observed_at: &DateTime<Utc>) -> f64 {
    (Utc::now() - *observed_at).num_milliseconds() as f64 / 1000.0
}

// ── Rolling ─────────────────────────────────────────────────────────

fn spawn_roll_loop(ctx: Arc<SessionContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let roll_config = &ctx.config.roll;
        loop {
            ctx.budget.wait_for_rolls().await;
            let since = ctx.budget.generation();
            let status = ctx.budget.status().await;

            if ctx.rolls_executed() >= status.rolls_available {
                debug!(
                    executed = ctx.rolls_executed(),
                    available = status.rolls_available,
                    "Rolls spent, refreshing status"
                );
                if let Err(e) = ctx.actuator.request_status().await {
                    warn!(error = %e, "Status request failed");
                }
                ctx.budget.wait_for_update(since).await;
                continue;
            }

            if roll_config.do_not_roll_when_cannot_claim && !status.can_claim {
                info!("ROLL SKIPPED: cannot claim, waiting for next status");
                ctx.budget.wait_for_update(since).await;
                continue;
            }
            if roll_config.do_not_roll_when_cannot_kakera_react && !status.can_kakera_react {
                info!("ROLL SKIPPED: cannot react to kakera, waiting for next status");
                ctx.budget.wait_for_update(since).await;
                continue;
            }

            match ctx.actuator.send_command(&roll_config.command).await {
                Ok(()) => {
                    let executed = ctx.rolls_executed.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(executed, command = %roll_config.command, "Rolled");
                }
                Err(e) => warn!(error = %e, "Roll command failed"),
            }
        }
    })
}
