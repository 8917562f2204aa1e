//! Session Lifecycle Controller
//!
//! Runs the engine only while somebody is connected. The population count
//! and the Start/Halt it triggers share one lock, so concurrent connects and
//! disconnects cannot double-start or halt spuriously.

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::game::error::RoundError;
use crate::runtime::ingress::EngineHandle;

/// Tracks connected participants and starts/halts the engine on 0<->1 edges.
#[derive(Debug)]
pub struct LifecycleController {
    engine: EngineHandle,
    population: Mutex<usize>,
}

impl LifecycleController {
    /// Create a controller with nobody connected.
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            population: Mutex::new(0),
        }
    }

    /// Record a connection. Starts the engine on the first one.
    ///
    /// Returns the new population.
    pub async fn connect(&self) -> Result<usize, RoundError> {
        let mut population = self.population.lock().await;
        *population += 1;

        if *population == 1 {
            info!("First participant connected, starting engine");
            self.engine.start().await?;
        }
        Ok(*population)
    }

    /// Record a disconnection. Halts the engine when the last one leaves.
    ///
    /// Returns the new population.
    pub async fn disconnect(&self) -> Result<usize, RoundError> {
        let mut population = self.population.lock().await;
        if *population == 0 {
            warn!("Disconnect with no participants recorded");
            return Ok(0);
        }
        *population -= 1;

        if *population == 0 {
            info!("Last participant left, halting engine");
            self.engine.halt().await?;
        }
        Ok(*population)
    }

    /// Current population.
    pub async fn population(&self) -> usize {
        *self.population.lock().await
    }
}
