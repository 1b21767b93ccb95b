//! # Hierarchical Statechart
//!
//! A hierarchical state machine runtime in Rust with composite states,
//! history, guarded transitions and interchangeable drivers.
//!
//! ## Features
//!
//! - 🏗️ **Hierarchical States**: Composite states with initial sub-states; events bubble up to super-states
//! - 🕰️ **History**: None, shallow and deep history when re-entering composite states
//! - 🛡️ **Guards and Actions**: Fallible callbacks; failures are reported, never fatal
//! - 🧵 **Drivers**: Dispatch on the caller's thread or on a dedicated worker thread
//! - 💾 **Snapshots**: Passivate a machine, persist it with serde and activate it elsewhere
//! - 📊 **PlantUML Export**: State diagram generation (debug builds only)
//!
//! ## Quick Start
//!
//! ```rust
//! use hierarchical_statechart::prelude::*;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum State { Off, On, Fm, Am }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Event { TogglePower, ToggleMode }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let definition = StateMachineBuilder::<State, Event, (), ()>::new("radio")
//!     .define_hierarchy(State::On, State::Fm, HistoryMode::Deep, [State::Fm, State::Am])?
//!     .transition(State::Off, Event::TogglePower, |t| t.to(State::On))
//!     .transition(State::On, Event::TogglePower, |t| t.to(State::Off))
//!     .transition(State::Fm, Event::ToggleMode, |t| t.to(State::Am))
//!     .transition(State::Am, Event::ToggleMode, |t| t.to(State::Fm))
//!     .initial_state(State::Off)
//!     .build();
//!
//! let mut radio = definition.create_synchronous("kitchen", ());
//! radio.start()?;
//! radio.fire(Event::TogglePower, ());
//! radio.fire(Event::ToggleMode, ());
//! radio.fire(Event::TogglePower, ());
//! radio.fire(Event::TogglePower, ());
//!
//! // Deep history brings the radio back to AM.
//! assert_eq!(radio.current_state(), Some(State::Am));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

use std::fmt::Debug;
use std::hash::Hash;

mod builder;
mod definition;
pub mod driver;
mod error;
mod interpreter;
mod notification;
mod snapshot;
pub mod state;
pub mod transition;
mod traversal;

#[cfg(all(feature = "plantuml", debug_assertions))]
mod plantuml;

pub use builder::{StateMachineBuilder, TransitionBuilder};
pub use definition::StateMachineDefinition;
pub use driver::{
    DriverConfig, EventQueue, Lifecycle, StateMachine, SynchronousDriver, ThreadedDriver,
};
pub use error::{BoxError, Error, Failure, Result, SharedError};
pub use interpreter::{Interpreter, Outcome};
pub use notification::{Notification, Observer, TransitionContext};
pub use snapshot::Snapshot;
pub use state::HistoryMode;
pub use traversal::Record;

#[cfg(feature = "tokio-integration")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-integration")))]
pub use tokio::time::Duration;

#[cfg(not(feature = "tokio-integration"))]
pub use std::time::Duration;

/// Bounds required of state ids
pub trait StateId: Clone + Debug + Eq + Hash + Send + Sync + 'static {}

impl<T> StateId for T where T: Clone + Debug + Eq + Hash + Send + Sync + 'static {}

/// Bounds required of event ids
pub trait EventId: Clone + Debug + Eq + Hash + Send + Sync + 'static {}

impl<T> EventId for T where T: Clone + Debug + Eq + Hash + Send + Sync + 'static {}

/// Bounds required of event arguments
pub trait EventArgs: Clone + Debug + Send + 'static {}

impl<T> EventArgs for T where T: Clone + Debug + Send + 'static {}

pub mod prelude {
    //! Prelude module for convenient imports
    pub use crate::{
        BoxError, Error, HistoryMode, Lifecycle, Notification, Observer, Snapshot, StateMachine,
        StateMachineBuilder, StateMachineDefinition,
    };
    pub use std::time::Duration;
}
