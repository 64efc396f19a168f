pub mod fake_processor;
pub mod helpers;
