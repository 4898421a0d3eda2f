pub mod application;
pub mod form;
pub mod identity;
