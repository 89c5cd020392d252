//! API handlers for Greenroom.
//!
//! This module organizes the service's route handlers: the auth subsystem,
//! self-service endpoints, and the role-gated staff/admin surfaces.

pub mod audit;
pub mod auth;
pub mod board;
pub mod builds;
pub mod health;
pub mod me;
pub mod root;
pub mod toggles;
pub mod users;
