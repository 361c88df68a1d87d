//! TaskMate: a personal task tracker.
//!
//! The server side is an axum JSON API over an ownership-checked task
//! store; the client side is an HTTP wrapper plus a terminal dashboard.

pub mod access;
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod kanban_board;
pub mod server;
pub mod store;
pub mod task;
pub mod task_form;
pub mod ui;
