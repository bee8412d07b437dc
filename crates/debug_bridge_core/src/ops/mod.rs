//! The eight debug operations exposed to protocol clients.

pub mod breakpoints;
pub mod evaluate;
pub mod session;
pub mod status;
pub mod step;
