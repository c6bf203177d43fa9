//! Architecture-specific trap and context-transition layer.

pub mod x86_64;
