//! API endpoint modules organized by category.
//!
//! Each module provides typed methods for a group of related endpoints.

pub mod eventsub;
