pub mod excel;
pub mod reports;
pub mod tagging;
