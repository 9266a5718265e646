//! Target Refresh
//!
//! Keeps each probing engine's address set in line with DNS. Every configured
//! hostname is a [`PingTarget`]; hostnames of one configuration group form a
//! [`TargetGroup`] sharing an engine. [`RefreshScheduler`] runs one repeated
//! job per group that re-resolves all of its hostnames concurrently.
//!
//! A failing or slow resolution only affects its own hostname: the addresses
//! registered for it stay in place until a later tick succeeds.

mod resolver;
mod scheduler;
mod target;

pub use resolver::{ResolveError, Resolver, SystemResolver};
pub use scheduler::{
    DEFAULT_REFRESH_INTERVAL, DEFAULT_RESOLVE_TIMEOUT, JobInfo, RefreshReport, RefreshScheduler,
    SchedulerError, TargetGroup,
};
pub use target::{PingTarget, REGISTRATION_STAGGER, Reconciliation};
