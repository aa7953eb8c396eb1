//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`StreamClient`]: the actor that owns all client state
//! - [`ConnectionSupervisor`]: connection state machine and reconnects
//! - [`ScheduledTask`]: cancellable deferred work
//! - [`ChannelObserver`], [`SharedView`]: stock observers

mod client;
mod observers;
mod supervisor;
mod timer;

pub use client::{
    ClientError, ClientSnapshot, DEFAULT_THROUGHPUT_INTERVAL, StreamClient, StreamClientConfig,
};
pub use observers::{ChannelObserver, SharedView, StreamEvent};
pub use supervisor::{ConnectionSupervisor, DEFAULT_FRAME_BUFFER, SupervisorEvent, SupervisorUpdate};
pub use timer::ScheduledTask;
