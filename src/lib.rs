//! Pattern Engine: a deterministic interpreter for a procedural text
//! markup language.
//!
//! Patterns mix literal text with blocks, tags, dictionary queries and
//! subroutines. A run walks the compiled token stream on an explicit frame
//! stack, draws from a branchable seeded RNG, and writes into a set of named
//! output channels.

pub mod core;
