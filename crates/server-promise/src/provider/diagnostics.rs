use serde::Serialize;

/// Non-fatal findings recorded while rendering beneath a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Client render found no cached value. Usually the server promise
    /// rejected, or the identifiers of the two renders do not match.
    ClientMiss { id: String },
    /// The same identifier was used twice in one render pass.
    DuplicateIdentifier { id: String, pass: u64 },
}

impl Diagnostic {
    pub fn id(&self) -> &str {
        match self {
            Self::ClientMiss { id } | Self::DuplicateIdentifier { id, .. } => id,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientMiss { id } => write!(
                f,
                "no cached value for {id}. Looks like a server promise was rejected"
            ),
            Self::DuplicateIdentifier { id, pass } => {
                write!(f, "identifier {id} used more than once in render pass {pass}")
            }
        }
    }
}
