//! nebula-fleet: a pool of per-credential compute workers.
//!
//! Each worker owns one bearer credential and loops forever: verify or
//! refresh the credential, pull a matrix task from the remote service,
//! compute the deterministic result, submit it, sleep, repeat. Failures
//! recover locally through bounded retries with backoff, a
//! consecutive-failure circuit breaker, and indefinite refresh retries, so
//! the fleet keeps running without operator intervention.
//!
//! Module map:
//! - [`compute`]: the deterministic matrix work unit.
//! - [`token`]: claims inspection, encryption at rest, the durable store,
//!   and the refresh handshake.
//! - [`client`]: the remote task client and its retry policy.
//! - [`worker`]: the per-credential supervisor state machine.
//! - [`fleet`]: coordinator, refresh sweep, statistics, shutdown.

pub mod cli;
pub mod client;
pub mod compute;
pub mod error;
pub mod fleet;
pub mod settings;
pub mod shutdown;
pub mod token;
pub mod worker;
