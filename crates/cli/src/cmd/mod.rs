pub mod extract;
pub mod sign;
