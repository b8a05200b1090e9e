//! Control-plane runtime for the resources of automotive network interface
//! controllers (INIC).
//!
//! The crate is built around a cooperative, run-to-completion event
//! scheduler. Everything that waits for a device answer is a scheduler
//! service; answers arrive through publish/subscribe subjects and are turned
//! back into service events. No operation ever blocks.
//!
//! ## Configuration
//!
//! The runtime is configured with a [crate::prelude::StackConfig] and a
//! [crate::prelude::ResourceCatalog]. Both can be read from YAML, or from
//! `postcard` data produced by `inic-core-cfg`, when the `serde` feature is
//! enabled. Both can also be constructed using their builders, which check
//! every construction step.
//!
//! ## Building Resource Lists
//!
//! A resource list names the ports, sockets and connections one connection
//! needs, in build order. [crate::prelude::Runtime::process] builds a list on
//! a device, creating only what does not exist yet. Resources shared with
//! other lists are reference counted and only destroyed with their last
//! user. Every accepted request ends in exactly one
//! [crate::prelude::JobReport].
//!
//! ## Adding a Controller Driver
//!
//! Only [`prelude::Controller`] has to be implemented. Its methods queue a
//! command and return; the driver passes the answers back through the
//! `complete_*` methods of the runtime.

#![no_std]
#![warn(
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]

#[macro_use]
mod macros;

mod config;
mod endpoint;
mod error;
mod fsm;
mod handle;
mod inic;
mod job;
mod list;
mod manager;
mod report;
mod resource;
mod runtime;
mod scheduler;
mod subject;
mod timer;

/// Standard prelude to be used by applications and controller drivers.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::endpoint::{Endpoint, EndpointError, EndpointKind, EndpointState, JobControl};
    pub use crate::error::Error;
    pub use crate::fsm::{
        Action, Fsm, FsmError, FsmIndex, FsmStatus, Transition, TransitionTable,
    };
    pub use crate::inic::*;
    pub use crate::list::{DlList, NodeRef};
    pub use crate::manager::{ResourceManager, XrmContext, XrmError};
    pub use crate::report::*;
    pub use crate::resource::*;
    pub use crate::runtime::Runtime;
    pub use crate::scheduler::{
        EventMask, InvalidTimeError, Priority, ScheduleError, Scheduler, ServiceId, TimeSource,
    };
    pub use crate::subject::{
        MaskedSubject, SingleSubject, Subject, SubjectAdd, SubjectError, SubjectRemove, MASK_ALL,
    };
    pub use crate::timer::{TimerId, Timers};
}
