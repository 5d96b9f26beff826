//! State management module
//!
//! This module handles all application state, including:
//! - The SQLite media index and its queries (catalog.rs)
//! - Shared data structures (data.rs)
//! - Media access permission (permission.rs)
//! - The last query result used to resolve single entries (store.rs)
//! - List and player screen reducers (list.rs, player.rs)
//! - Navigation destinations (route.rs)

pub mod catalog;
pub mod data;
pub mod list;
pub mod permission;
pub mod player;
pub mod route;
pub mod store;
