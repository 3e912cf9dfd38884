//! Export contents of `mot` folder
mod anomaly;
mod builder;
mod config;
mod edge_queue;
mod identity_state;
mod pipeline;
mod resolver;
mod store;

pub use self::{
    anomaly::*,
    builder::*,
    config::*,
    edge_queue::*,
    identity_state::*,
    pipeline::*,
    resolver::*,
    store::*,
};
