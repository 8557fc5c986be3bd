//! Async battle host
//!
//! Runs one `BattleState` on a tokio task at a fixed tick interval. Commands
//! arrive over an mpsc channel and are applied before the next tick;
//! outbound events fan out to any number of subscribers.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::battle::{BattleResult, BattleState, Command, OutboundEvent};
use crate::core::error::CommandError;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

/// Messages from a transport to the battle task
#[derive(Debug)]
enum HostMessage {
    Command {
        command: Command,
        reply: Option<oneshot::Sender<Result<(), CommandError>>>,
    },
    Join {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a battle running on its own task
#[derive(Debug)]
pub struct BattleHandle {
    commands: mpsc::Sender<HostMessage>,
    events: broadcast::Sender<OutboundEvent>,
    result: oneshot::Receiver<BattleResult>,
    task: JoinHandle<()>,
}

impl BattleHandle {
    /// Queue a command without waiting for validation
    pub async fn send(&self, command: Command) -> bool {
        self.commands
            .send(HostMessage::Command { command, reply: None })
            .await
            .is_ok()
    }

    /// Queue a command and wait for the validation verdict.
    /// Returns `BattleFinished` if the battle task has already stopped.
    pub async fn submit(&self, command: Command) -> Result<(), CommandError> {
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send(HostMessage::Command {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| CommandError::BattleFinished)?;
        verdict.await.unwrap_or(Err(CommandError::BattleFinished))
    }

    /// Subscribe to outbound events and request a `joined` snapshot
    pub async fn join(&self) -> broadcast::Receiver<OutboundEvent> {
        let receiver = self.events.subscribe();
        let (reply, done) = oneshot::channel();
        if self.commands.send(HostMessage::Join { reply }).await.is_ok() {
            let _ = done.await;
        }
        receiver
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.events.subscribe()
    }

    /// Wait for the battle to end
    pub async fn finish(self) -> Option<BattleResult> {
        let result = self.result.await.ok();
        if let Err(err) = self.task.await {
            warn!(%err, "battle task did not shut down cleanly");
        }
        result
    }
}

/// Run `state` on the current tokio runtime, ticking every `tick_interval`.
/// A zero interval runs as fast as the scheduler allows.
pub fn spawn_battle(state: BattleState, tick_interval: Duration) -> BattleHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
    let (result_tx, result_rx) = oneshot::channel();

    let task = tokio::spawn(run_battle(state, tick_interval, command_rx, event_tx.clone(), result_tx));

    BattleHandle {
        commands: command_tx,
        events: event_tx,
        result: result_rx,
        task,
    }
}

async fn run_battle(
    mut state: BattleState,
    tick_interval: Duration,
    mut commands: mpsc::Receiver<HostMessage>,
    events: broadcast::Sender<OutboundEvent>,
    result_tx: oneshot::Sender<BattleResult>,
) {
    info!(battle = %state.battle_id(), ?tick_interval, "battle host started");
    let mut ticker = (!tick_interval.is_zero()).then(|| tokio::time::interval(tick_interval));

    while !state.is_finished() {
        match ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => tokio::task::yield_now().await,
        }

        // Everything received since the last tick lands in this one
        loop {
            match commands.try_recv() {
                Ok(message) => handle_message(&mut state, message),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }

        state.tick();
        publish(&mut state, &events);
    }

    if let Some(result) = state.result().cloned() {
        info!(battle = %result.battle_id, ticks = result.ticks, outcome = ?result.outcome, "battle host finished");
        if result_tx.send(result).is_err() {
            debug!("result receiver dropped");
        }
    }

    // Late commands get a definite answer
    commands.close();
    while let Some(message) = commands.recv().await {
        handle_message(&mut state, message);
    }
    publish(&mut state, &events);
}

fn handle_message(state: &mut BattleState, message: HostMessage) {
    match message {
        HostMessage::Command { command, reply } => {
            let verdict = state.submit(command);
            if let Some(reply) = reply {
                let _ = reply.send(verdict);
            }
        }
        HostMessage::Join { reply } => {
            state.join(None);
            let _ = reply.send(());
        }
    }
}

fn publish(state: &mut BattleState, events: &broadcast::Sender<OutboundEvent>) {
    for event in state.drain_events() {
        // No subscribers is fine; observers are optional
        let _ = events.send(event);
    }
}
