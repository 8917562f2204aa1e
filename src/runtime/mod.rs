//! Engine runtime: the actor that owns round state, its mailbox, and the
//! lifecycle controller that starts and halts it.

pub mod actor;
pub mod ingress;
pub mod lifecycle;

pub use actor::EngineActor;
pub use ingress::{EngineEvent, EngineHandle};
pub use lifecycle::LifecycleController;
