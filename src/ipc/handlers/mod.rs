pub mod audit;
pub mod core;
pub mod courses;
pub mod grades;
pub mod profiles;
pub mod reports;
