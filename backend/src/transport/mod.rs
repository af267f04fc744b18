//! Transport - engine/controller message contract
//!
//! Every outbound message is an [`Envelope`] `{type, data, belongToTaskId}`.
//! Within one frame the engine emits, in order:
//!
//! 1. `render_cmd` for every cast region sampled this frame
//! 2. `domain_event_batch` (only when the frame produced domain events)
//! 3. `engine_telemetry`
//! 4. `frame_snapshot` (every `snapshot_interval` frames)
//!
//! A frame's messages are handed over as one batch before the next frame
//! starts. Payloads that fail to encode are replaced by a `system_event`.
//!
//! # Architecture
//!
//! - **message**: Message kinds, envelope, typed payloads
//! - **outbox**: Per-frame buffer that encodes payloads as they are pushed
//! - **worker**: Engine thread driven by `ControlCommand`s

pub mod message;
pub mod outbox;
pub mod worker;

pub use message::{
    DomainEventBatch, EngineState, Envelope, MessageKind, StateTransition, SystemNotice,
    TelemetryData,
};
pub use outbox::Outbox;
pub use worker::{spawn_engine, ControlCommand, EngineHandle};

use thiserror::Error;

/// Controller-side transport failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Engine worker could not be started: {0}")]
    Spawn(String),

    #[error("Engine worker is no longer running")]
    Disconnected,

    #[error("No message within the timeout")]
    Timeout,

    #[error("Engine worker panicked")]
    WorkerPanicked,
}
