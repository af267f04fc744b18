//! Engine worker thread
//!
//! The engine runs on its own thread and shares nothing with the
//! controller: commands go in over one channel, envelopes come out over
//! another. Commands are only looked at between frame steps.
//!
//! ```text
//!            Start            Pause
//!   Idle ──────────▶ Running ───────▶ Paused
//!                      ▲                │
//!                      └──── Start ─────┘
//!   any ── Stop (or controller gone) ──▶ Stopped
//! ```
//!
//! `Step(n)` runs exactly `n` frames without changing the state.

use super::message::{EngineState, Envelope, MessageKind, StateTransition};
use super::outbox::Outbox;
use super::TransportError;
use crate::orchestrator::Engine;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Envelopes buffered before the worker waits for the controller
const MESSAGE_BUFFER: usize = 4096;

/// Controller-to-engine command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Pause,
    Step(u64),
    Stop,
}

/// Controller side of a running engine
pub struct EngineHandle {
    commands: Sender<ControlCommand>,
    messages: Receiver<Envelope>,
    task_id: String,
    join: Option<JoinHandle<Engine>>,
}

/// Move `engine` onto a worker thread
///
/// The session gets a fresh task id which tags every envelope.
///
/// # Errors
/// `Spawn` if the OS refuses to start the thread.
pub fn spawn_engine(mut engine: Engine) -> Result<EngineHandle, TransportError> {
    let task_id = uuid::Uuid::new_v4().to_string();
    engine.set_task_id(task_id.clone());

    let (command_tx, command_rx) = mpsc::channel();
    let (message_tx, message_rx) = mpsc::sync_channel(MESSAGE_BUFFER);
    let worker_task = task_id.clone();

    let join = thread::Builder::new()
        .name(format!("battle-engine-{}", &task_id[..8]))
        .spawn(move || {
            let mut worker = Worker {
                engine,
                state: EngineState::Idle,
                messages: message_tx,
                task_id: worker_task,
            };
            worker.run(command_rx);
            worker.engine
        })
        .map_err(|e| TransportError::Spawn(e.to_string()))?;

    tracing::info!(task_id = %task_id, "engine worker started");
    Ok(EngineHandle {
        commands: command_tx,
        messages: message_rx,
        task_id,
        join: Some(join),
    })
}

impl EngineHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// # Errors
    /// `Disconnected` once the worker has stopped.
    pub fn send(&self, command: ControlCommand) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::Disconnected)
    }

    /// Next envelope, promoted to its controller-side form
    ///
    /// # Errors
    /// `Timeout` if nothing arrives within `timeout`, `Disconnected` once
    /// the worker has stopped and every envelope was received.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Envelope, TransportError> {
        self.messages
            .recv_timeout(timeout)
            .map(Envelope::promote)
            .map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => TransportError::Timeout,
                mpsc::RecvTimeoutError::Disconnected => TransportError::Disconnected,
            })
    }

    /// Every envelope already waiting, promoted
    pub fn drain(&self) -> Vec<Envelope> {
        self.messages.try_iter().map(Envelope::promote).collect()
    }

    /// Stop the worker and take the engine back
    ///
    /// Envelopes not yet received are discarded.
    ///
    /// # Errors
    /// `WorkerPanicked` if the engine thread panicked.
    pub fn shutdown(mut self) -> Result<Engine, TransportError> {
        // The worker may already be gone; joining reports the outcome
        let _ = self.commands.send(ControlCommand::Stop);
        let join = self.join.take().ok_or(TransportError::Disconnected)?;
        // Keep draining so a worker blocked on a full buffer can see Stop
        while !join.is_finished() {
            if let Err(mpsc::RecvTimeoutError::Disconnected) =
                self.messages.recv_timeout(Duration::from_millis(10))
            {
                break;
            }
        }
        join.join().map_err(|_| TransportError::WorkerPanicked)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.commands.send(ControlCommand::Stop);
        }
    }
}

struct Worker {
    engine: Engine,
    state: EngineState,
    messages: SyncSender<Envelope>,
    task_id: String,
}

impl Worker {
    fn run(&mut self, commands: Receiver<ControlCommand>) {
        loop {
            let command = if self.state == EngineState::Running {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => Some(ControlCommand::Stop),
                }
            } else {
                Some(commands.recv().unwrap_or(ControlCommand::Stop))
            };

            let delivered = match command {
                Some(ControlCommand::Start) => self.transition(EngineState::Running),
                Some(ControlCommand::Pause) => self.transition(EngineState::Paused),
                Some(ControlCommand::Step(frames)) => self.step_frames(frames),
                Some(ControlCommand::Stop) => {
                    self.transition(EngineState::Stopped);
                    break;
                }
                None => true,
            };
            if !delivered {
                tracing::info!(task_id = %self.task_id, "controller gone, worker stopping");
                break;
            }

            if self.state == EngineState::Running && !self.step_frames(1) {
                break;
            }
        }
        tracing::info!(
            task_id = %self.task_id,
            frame = self.engine.current_frame(),
            "engine worker stopped"
        );
    }

    /// Returns false once the controller stopped listening
    fn step_frames(&mut self, frames: u64) -> bool {
        for _ in 0..frames {
            let result = self.engine.step();
            for envelope in result.messages {
                if self.messages.send(envelope).is_err() {
                    return false;
                }
            }
        }
        true
    }

    fn transition(&mut self, to: EngineState) -> bool {
        if self.state == to {
            return true;
        }
        let payload = StateTransition {
            from: self.state,
            to,
            frame_number: self.engine.current_frame(),
        };
        tracing::debug!(from = ?payload.from, to = ?to, "engine state changed");
        self.state = to;

        let mut outbox = Outbox::new();
        outbox.set_task_id(self.task_id.clone());
        outbox.push(MessageKind::EngineStateMachine, &payload);
        outbox
            .take()
            .into_iter()
            .all(|envelope| self.messages.send(envelope).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "rng_seed": 3,
        "archetypes": {"dummy": {"attributes": [{"path": "hp.current", "base": 10}]}},
        "members": [{"id": "a", "team": "red", "archetype": "dummy"}]
    }"#;

    fn recv(handle: &EngineHandle) -> Envelope {
        handle.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_step_runs_exact_frames() {
        let handle = spawn_engine(Engine::from_json(SCENARIO).unwrap()).unwrap();
        handle.send(ControlCommand::Step(3)).unwrap();

        let frames: Vec<u64> = (0..3)
            .map(|_| {
                let envelope = recv(&handle);
                assert_eq!(envelope.kind, MessageKind::EngineTelemetry);
                assert_eq!(envelope.task_id.as_deref(), Some(handle.task_id()));
                envelope.data["frameNumber"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(frames, vec![0, 1, 2]);

        let engine = handle.shutdown().unwrap();
        assert_eq!(engine.current_frame(), 3);
    }

    #[test]
    fn test_start_pause_report_transitions() {
        let handle = spawn_engine(Engine::from_json(SCENARIO).unwrap()).unwrap();
        handle.send(ControlCommand::Start).unwrap();

        let started = recv(&handle);
        assert_eq!(started.kind, MessageKind::EngineStateMachine);
        assert_eq!(started.data["from"], "idle");
        assert_eq!(started.data["to"], "running");

        handle.send(ControlCommand::Pause).unwrap();
        let paused = loop {
            let envelope = recv(&handle);
            if envelope.kind == MessageKind::EngineStateMachine {
                break envelope;
            }
        };
        assert_eq!(paused.data["to"], "paused");

        let engine = handle.shutdown().unwrap();
        assert!(engine.current_frame() >= 1);
    }

    #[test]
    fn test_dropping_handle_stops_worker() {
        let handle = spawn_engine(Engine::from_json(SCENARIO).unwrap()).unwrap();
        handle.send(ControlCommand::Start).unwrap();
        drop(handle);
    }
}
