//! tandem-pty: pseudo-terminal process management for Tandem.
//!
//! # Architecture
//!
//! - [`ProcessAdapter`] / [`ProcessHandle`]: the spawn/write/resize/kill
//!   contract the session layer is written against.
//! - [`PtyAdapter`]: the `portable-pty` implementation. One reader thread per
//!   process pushes [`ProcessEvent`]s onto a channel drained by the control
//!   thread.
//! - [`Subscription`] / [`SubscriptionSet`] / [`Gate`]: RAII release guards for
//!   event forwarding.

pub mod adapter;
pub mod pty;
pub mod subscription;

pub use adapter::{
    event_channel, EnvMap, ProcessAdapter, ProcessEvent, ProcessEventReceiver,
    ProcessEventSender, ProcessHandle, ProcessId, SpawnError, SpawnRequest,
};
pub use pty::{PtyAdapter, PtyProcess};
pub use subscription::{Gate, Subscription, SubscriptionSet};
