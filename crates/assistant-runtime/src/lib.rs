//! # Assistant Runtime
//!
//! Hosts the broadcast assistant engine on tokio.
//!
//! - `runtime` - the serial actor, its cloneable [`AssistantHandle`] and
//!   watch-channel shutdown
//! - `command` - one [`Command`] per inbound call of the engine
//! - `timers` - the `TimerScheduler` port on `tokio::time`
//! - `config` - [`RuntimeConfig`] loading from JSON and `BASS_*` variables
//!
//! ## Usage
//!
//! ```ignore
//! let config = load_config(None)?;
//! let _telemetry = init_telemetry(&config.telemetry)?;
//! let bus = Arc::new(config.event_bus());
//! let runtime = AssistantRuntime::start(config, ports, bus.clone())?;
//!
//! let handle = runtime.handle();
//! handle.start_searching(Vec::new()).await?;
//! let mut found = bus.subscribe(EventFilter::topics(vec![EventTopic::Discovery]));
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod command;
pub mod config;
pub mod errors;
mod metrics;
pub mod runtime;
pub mod timers;

pub use command::Command;
pub use config::{load_config, RuntimeConfig, DEFAULT_COMMAND_QUEUE_CAPACITY};
pub use errors::RuntimeError;
pub use runtime::{AssistantHandle, AssistantRuntime, RuntimePorts};
pub use timers::TokioTimerScheduler;
