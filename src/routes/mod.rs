pub mod auth;
pub mod health;
pub mod rma;
pub mod users;
