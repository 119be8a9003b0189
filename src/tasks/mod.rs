pub mod queue;
pub mod scanner;
pub mod worker;
