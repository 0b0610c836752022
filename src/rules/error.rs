use crate::source_manager::SourceLoc;

/// Recoverable errors while parsing a nacro rule.
#[derive(Debug, thiserror::Error)]
pub enum NacroError {
    #[error("expected identifier")]
    ExpectedIdentifier { location: SourceLoc },
    #[error("expected '{expected}'")]
    ExpectedToken { expected: &'static str, location: SourceLoc },
    #[error("unknown replacement kind '{found}', expected $expr or $stmt")]
    UnknownReplacementKind { found: String, location: SourceLoc },
    #[error("unexpected end of rule")]
    UnexpectedEnd,
    #[error("variadic parameter must be the last formal parameter")]
    VariadicNotLast { location: SourceLoc },
    #[error("nested $loop is not supported")]
    NestedLoop { location: SourceLoc },
}

impl NacroError {
    pub fn location(&self) -> Option<SourceLoc> {
        match self {
            NacroError::ExpectedIdentifier { location }
            | NacroError::ExpectedToken { location, .. }
            | NacroError::UnknownReplacementKind { location, .. }
            | NacroError::VariadicNotLast { location }
            | NacroError::NestedLoop { location } => Some(*location),
            NacroError::UnexpectedEnd => None,
        }
    }
}
