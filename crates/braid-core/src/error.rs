use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    EmptyComposition,
    NotComposable,
    MissingKeyField,
    MissingKey,
    MisalignedBatch,
    MisalignedCandidates,
    NotAnObject,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::EmptyComposition => "E2001",
            Self::NotComposable => "E2002",
            Self::MissingKeyField => "E2003",
            Self::MissingKey => "E3001",
            Self::MisalignedBatch => "E3002",
            Self::MisalignedCandidates => "E3003",
            Self::NotAnObject => "E3004",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::EmptyComposition => "Composition has no operands",
            Self::NotComposable => "Stage cannot be composed this way",
            Self::MissingKeyField => "No identity field for composition",
            Self::MissingKey => "Document is missing its key",
            Self::MisalignedBatch => "Operand result not aligned with query batch",
            Self::MisalignedCandidates => "Candidate sets not aligned with query batch",
            Self::NotAnObject => "Document is not a JSON object",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in braid.toml and retry."),
            Self::EmptyComposition => Some("Pass at least one operand to the composition."),
            Self::NotComposable => {
                Some("Document maps may only appear as non-leading pipeline stages.")
            }
            Self::MissingKeyField => {
                Some("Include at least one operand that declares its identity field.")
            }
            Self::MissingKey => Some("Every document must carry the identity field."),
            Self::MisalignedBatch => {
                Some("Operands must return exactly one result list per query.")
            }
            Self::MisalignedCandidates => {
                Some("Pass one candidate set per query, or a single shared set.")
            }
            Self::NotAnObject => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Configuration and contract errors raised by the fusion layer itself.
///
/// Operand failures never become a `FusionError`; they travel through
/// `anyhow::Error` untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FusionError {
    #[error("{family} requires at least one operand")]
    EmptyComposition { family: &'static str },

    #[error("{stage} cannot be composed into a {family}")]
    NotComposable {
        stage: &'static str,
        family: &'static str,
    },

    #[error("{family} has no identity field: no operand declares a key")]
    MissingKeyField { family: &'static str },

    #[error("document from {source_name} has no `{field}` field")]
    MissingKey { source_name: String, field: String },

    #[error("{operand} returned {actual} result lists for a batch of {expected} queries")]
    MisalignedBatch {
        operand: String,
        expected: usize,
        actual: usize,
    },

    #[error("{actual} candidate sets supplied for {expected} queries")]
    MisalignedCandidates { expected: usize, actual: usize },

    #[error("document is not a JSON object")]
    NotAnObject,
}

impl FusionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyComposition { .. } => ErrorCode::EmptyComposition,
            Self::NotComposable { .. } => ErrorCode::NotComposable,
            Self::MissingKeyField { .. } => ErrorCode::MissingKeyField,
            Self::MissingKey { .. } => ErrorCode::MissingKey,
            Self::MisalignedBatch { .. } => ErrorCode::MisalignedBatch,
            Self::MisalignedCandidates { .. } => ErrorCode::MisalignedCandidates,
            Self::NotAnObject => ErrorCode::NotAnObject,
        }
    }

    /// `true` for errors raised while building a composition, as opposed to
    /// contract violations detected during a call.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyComposition { .. } | Self::NotComposable { .. } | Self::MissingKeyField { .. }
        )
    }
}
