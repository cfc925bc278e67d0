pub mod expense;
pub mod rule;
pub mod user;
