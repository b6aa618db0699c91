pub mod bios;
pub mod error;
pub mod host;
pub mod loader;
pub mod utils;
pub mod vm;

#[cfg(test)]
mod cpu_tests;
