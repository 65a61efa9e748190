/// The umbrella run error.

use std::fmt;
use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::lexer::LexError;
use crate::core::limits::Resource;
use crate::core::reader::ScopeError;
use crate::core::token::Position;

/// What kind of name failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Tag,
    Subroutine,
    Argument,
    Flag,
    Synchronizer,
    Marker,
    Hook,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NameKind::Tag => "tag",
            NameKind::Subroutine => "subroutine",
            NameKind::Argument => "argument",
            NameKind::Flag => "flag",
            NameKind::Synchronizer => "synchronizer",
            NameKind::Marker => "marker",
            NameKind::Hook => "hook",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Scope(#[from] ScopeError),
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{pattern}:{position}: unknown {kind} '{name}'")]
    Name {
        kind: NameKind,
        name: String,
        pattern: String,
        position: Position,
    },
    #[error("{pattern}:{position}: no signature of '{name}' takes {count} argument(s)")]
    Arity {
        name: String,
        count: usize,
        pattern: String,
        position: Position,
    },
    #[error("{pattern}:{position}: {resource} exceeded (limit {limit})")]
    ResourceExceeded {
        resource: Resource,
        limit: u64,
        pattern: String,
        position: Position,
    },
    #[error("{pattern}:{position}: invalid argument to '{name}': {message}")]
    InvalidArgument {
        name: String,
        message: String,
        pattern: String,
        position: Position,
    },
    #[error("{pattern}:{position}: query failed: {message}")]
    ExternalQuery {
        message: String,
        pattern: String,
        position: Position,
    },
}

impl EngineError {
    /// Source position, when the error has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            EngineError::Scope(e) => e.position(),
            EngineError::Lex(
                LexError::UnterminatedLiteral(p)
                | LexError::InvalidEscape(p)
                | LexError::UnterminatedRegex(p),
            ) => Some(*p),
            EngineError::Config(_) => None,
            EngineError::Name { position, .. }
            | EngineError::Arity { position, .. }
            | EngineError::ResourceExceeded { position, .. }
            | EngineError::InvalidArgument { position, .. }
            | EngineError::ExternalQuery { position, .. } => Some(*position),
        }
    }

    pub fn resource(&self) -> Option<Resource> {
        match self {
            EngineError::ResourceExceeded { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
