//! Delivery policies
//!
//! Policies decide *what happens next* after an attempt; they never touch the
//! network themselves.

pub mod retry;
