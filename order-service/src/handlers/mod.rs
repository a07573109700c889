//! HTTP handlers for the ordering workflow.

pub mod carts;
pub mod orders;
pub mod payments;
