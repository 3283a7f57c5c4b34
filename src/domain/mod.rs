// Domain layer - Pipeline models with no I/O
pub mod category;
pub mod classification;
pub mod dashboard;
pub mod error;
pub mod placeholder;
pub mod tenant;
