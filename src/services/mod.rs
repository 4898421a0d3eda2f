pub mod dashboard;
pub mod export;
pub mod payload;
pub mod pdf;
pub mod submission;
pub mod validation;
