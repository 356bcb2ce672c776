pub mod subsystem;
pub mod thread_guard;
