//! Agent pool
//!
//! Routes a query to an available backend and protects each backend from
//! concurrent overload:
//! - Members advertise the models they serve (probed at registration)
//! - A member holds at most one outstanding request
//! - Each dispatch is bounded by a per-request timeout
//! - Member selection is delegated to a pluggable `SelectionStrategy`

mod config;
mod member;
mod pool_impl;
mod strategy;


pub use config::PoolConfig;
pub use member::{MemberSnapshot, MemberStatus};
pub use pool_impl::{AgentPool, PoolHealth, PoolRequest};
pub use strategy::{FirstAvailable, SelectionStrategy};
