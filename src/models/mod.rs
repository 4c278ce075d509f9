pub mod rma;
pub mod user;
