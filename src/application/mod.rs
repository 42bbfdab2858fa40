//! Application Layer
//!
//! Coordination services built on the domain state machine and registry:
//! heartbeat supervision, presence aggregation, and event dispatch.

pub mod dispatch;
pub mod heartbeat;
pub mod presence;

pub use dispatch::{run_event_pump, DeliveryReport, EventDispatchRouter};
pub use heartbeat::{HeartbeatSupervisor, SupervisorHandle};
pub use presence::PresenceCoordinator;
