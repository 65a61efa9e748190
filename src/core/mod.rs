pub mod block;
pub mod channel;
pub mod config;
mod dispatch;
pub mod engine;
pub mod error;
pub mod expr;
pub mod format;
pub mod frame;
pub mod functions;
pub mod interpreter;
pub mod lexer;
pub mod limits;
pub mod lint;
pub mod output;
pub mod reader;
pub mod replacer;
pub mod rng;
pub mod subroutine;
pub mod sync;
pub mod token;
pub mod vocabulary;
