//! Static check that a script can be executed repeatedly without duplicating
//! or drifting data. Statements must also parse in the merge dialect, so SET
//! values are literals and never read the current graph state.

use crate::cypher::{tokenize, CypherSyntaxError, Token};
use crate::script::GraphScript;
use crate::statement::{parse_statement, ParseError};
use ragraph_core::error::{ErrorCode, RagraphError};
use thiserror::Error;

const FORBIDDEN: [&str; 4] = ["DELETE", "DETACH", "REMOVE", "DROP"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdempotencyError {
    #[error("script contains no statements")]
    EmptyScript,
    #[error("script is not valid openCypher: {0}")]
    Syntax(#[from] CypherSyntaxError),
    #[error("statement {index} is not idempotent ({reason}): {statement}")]
    NonIdempotentScript {
        index: usize,
        statement: String,
        reason: &'static str,
    },
    #[error("statement {index} is outside the merge dialect ({source}): {statement}")]
    OutsideDialect {
        index: usize,
        statement: String,
        #[source]
        source: ParseError,
    },
}

impl RagraphError for IdempotencyError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::UpstreamInvalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    Schema,
    Data,
}

fn classify(tokens: &[Token]) -> Result<StatementKind, &'static str> {
    let Some(first) = tokens.first() else {
        return Err("empty statement");
    };

    if first.is_keyword("CREATE") {
        let is_schema = tokens
            .get(1)
            .is_some_and(|t| t.is_keyword("CONSTRAINT") || t.is_keyword("INDEX"));
        if !is_schema {
            return Err("CREATE always inserts new data");
        }
        let guarded = tokens.windows(3).any(|w| {
            w[0].is_keyword("IF") && w[1].is_keyword("NOT") && w[2].is_keyword("EXISTS")
        });
        if !guarded {
            return Err("schema statements need IF NOT EXISTS");
        }
        return Ok(StatementKind::Schema);
    }

    if !first.is_keyword("MERGE") && !first.is_keyword("MATCH") {
        return Err("only MERGE or MATCH ... MERGE statements are allowed");
    }

    let mut has_merge = false;
    for (i, token) in tokens.iter().enumerate() {
        if FORBIDDEN.iter().any(|kw| token.is_keyword(kw)) {
            return Err("statement removes data");
        }
        if token.is_keyword("CREATE") {
            // `ON CREATE SET` belongs to MERGE and stays idempotent.
            let after_on = i > 0 && tokens[i - 1].is_keyword("ON");
            if !after_on {
                return Err("CREATE always inserts new data");
            }
        }
        if token.is_keyword("MERGE") {
            has_merge = true;
        }
    }

    if !has_merge {
        return Err("MATCH without MERGE does not write the graph");
    }
    Ok(StatementKind::Data)
}

/// Every data statement is `MERGE` or `MATCH ... MERGE`; schema statements use
/// `IF NOT EXISTS` and come before any data statement.
pub fn validate_idempotent(script: &GraphScript) -> Result<(), IdempotencyError> {
    let statements = script.statements()?;
    if statements.is_empty() {
        return Err(IdempotencyError::EmptyScript);
    }

    let mut seen_data = false;
    for (index, statement) in statements.iter().enumerate() {
        let tokens = tokenize(statement)?;
        let reject = |reason| IdempotencyError::NonIdempotentScript {
            index,
            statement: statement.clone(),
            reason,
        };

        let kind = classify(&tokens).map_err(reject)?;
        parse_statement(statement).map_err(|source| IdempotencyError::OutsideDialect {
            index,
            statement: statement.clone(),
            source,
        })?;

        match kind {
            StatementKind::Schema if seen_data => {
                return Err(reject("schema statements must precede data statements"))
            }
            StatementKind::Schema => {}
            StatementKind::Data => seen_data = true,
        }
    }
    Ok(())
}
