//! Pure coordination logic: machines and commands. No I/O.

pub mod commands;
pub mod session_machine;
pub mod turn_machine;
