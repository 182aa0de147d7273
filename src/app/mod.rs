//! Application layer: port traits, the wire command/snapshot types, and
//! the [`BoardService`](service::BoardService) control core.

pub mod commands;
pub mod ports;
pub mod service;
pub mod snapshot;
