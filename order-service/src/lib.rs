//! Order Service - cart checkout, payment initiation and gateway-outcome reconciliation.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
