//! Registry operations. Every write runs in a single sqlx transaction.

pub mod address;
pub mod groups;
pub mod import;
pub mod roles;
pub mod seed;
pub mod users;
