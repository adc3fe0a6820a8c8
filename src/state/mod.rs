// Observable bot state shared with presentation layers
pub mod ring;
pub mod store;

pub use ring::BoundedRing;
pub use store::{BotSnapshot, CycleUpdate, StateStore, LOG_CAPACITY, SIGNAL_CAPACITY};
