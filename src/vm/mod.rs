pub mod cpu;
pub mod flags;
pub mod instructions;
pub mod memory;
pub mod modrm;
pub mod registers;
pub mod runtime;
