use crate::cypher::{split_statements, CypherSyntaxError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A declarative graph-mutation script in openCypher text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphScript(String);

impl GraphScript {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn statements(&self) -> Result<Vec<String>, CypherSyntaxError> {
        split_statements(&self.0)
    }
}

impl fmt::Display for GraphScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GraphScript {
    fn from(text: String) -> Self {
        Self(text)
    }
}
