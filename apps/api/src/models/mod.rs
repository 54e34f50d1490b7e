pub mod feedback;
pub mod interview;
pub mod progress;
pub mod session;
pub mod transcript;
