//! Parser for the merge dialect produced by [`crate::render`]: schema statements,
//! `MERGE` of a single node pattern and `MATCH ... MERGE` of one relationship,
//! each optionally followed by `ON CREATE SET`, `ON MATCH SET` and `SET` clauses.

use crate::cypher::{tokenize, CypherSyntaxError, Token};
use ragraph_core::graph::{Properties, Scalar};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] CypherSyntaxError),
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
    #[error("unsupported statement: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub var: Option<String>,
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub var: Option<String>,
    pub from: String,
    pub to: String,
    pub edge_type: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `var += {map}`
    Merge { var: String, properties: Properties },
    /// `var.key = value`
    Property {
        var: String,
        key: String,
        value: Scalar,
    },
}

impl Assignment {
    pub fn var(&self) -> &str {
        match self {
            Assignment::Merge { var, .. } | Assignment::Property { var, .. } => var,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetClauses {
    pub on_create: Vec<Assignment>,
    pub on_match: Vec<Assignment>,
    pub always: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Constraint { label: String, property: String },
    Index { label: String, property: String },
    MergeNode { pattern: NodePattern, sets: SetClauses },
    MergeEdge {
        matches: Vec<NodePattern>,
        rel: RelPattern,
        sets: SetClauses,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of statement".to_string(),
        Some(Token::Ident { name, .. }) => format!("`{name}`"),
        Some(other) => format!("{other:?}"),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError::Expected {
            expected: expected.to_string(),
            found: describe(self.peek()),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident { name, .. }) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("a name")),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn scalar(&mut self) -> Result<Scalar, ParseError> {
        let value = match self.peek() {
            Some(Token::Str(v)) => Scalar::Text(v.clone()),
            Some(Token::Integer(v)) => Scalar::Integer(*v),
            Some(Token::Float(v)) => Scalar::Float(*v),
            Some(t) if t.is_keyword("true") => Scalar::Bool(true),
            Some(t) if t.is_keyword("false") => Scalar::Bool(false),
            Some(t) if t.is_keyword("null") => {
                return Err(ParseError::Unsupported("null property values"))
            }
            Some(Token::Param(_)) => return Err(ParseError::Unsupported("query parameters")),
            Some(Token::LBracket) => return Err(ParseError::Unsupported("list literals")),
            _ => return Err(self.error("a literal value")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn map_literal(&mut self) -> Result<Properties, ParseError> {
        self.expect(Token::LBrace, "`{`")?;
        let mut properties = Properties::new();
        if self.peek() == Some(&Token::RBrace) {
            self.pos += 1;
            return Ok(properties);
        }
        loop {
            let key = match self.peek() {
                Some(Token::Str(key)) => {
                    let key = key.clone();
                    self.pos += 1;
                    key
                }
                _ => self.name()?,
            };
            self.expect(Token::Colon, "`:`")?;
            if self.peek() == Some(&Token::LBrace) {
                return Err(ParseError::Unsupported("nested maps"));
            }
            properties.insert(key, self.scalar()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBrace) => return Ok(properties),
                other => {
                    return Err(ParseError::Expected {
                        expected: "`,` or `}`".to_string(),
                        found: describe(other.as_ref()),
                    })
                }
            }
        }
    }

    fn node_pattern(&mut self) -> Result<NodePattern, ParseError> {
        self.expect(Token::LParen, "`(`")?;
        let mut pattern = NodePattern::default();
        if matches!(self.peek(), Some(Token::Ident { .. })) {
            pattern.var = Some(self.name()?);
        }
        while self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            pattern.labels.insert(self.name()?);
        }
        if self.peek() == Some(&Token::LBrace) {
            pattern.properties = self.map_literal()?;
        }
        self.expect(Token::RParen, "`)`")?;
        Ok(pattern)
    }

    fn bare_var(&mut self) -> Result<String, ParseError> {
        let pattern = self.node_pattern()?;
        match pattern.var {
            Some(var) if pattern.labels.is_empty() && pattern.properties.is_empty() => Ok(var),
            _ => Err(ParseError::Unsupported(
                "relationship endpoints must be bound MATCH variables",
            )),
        }
    }

    fn rel_pattern(&mut self) -> Result<RelPattern, ParseError> {
        let from = self.bare_var()?;
        match self.peek() {
            Some(Token::Dash) => self.pos += 1,
            Some(Token::LeftArrow) => {
                return Err(ParseError::Unsupported("left-pointing relationships"))
            }
            _ => return Err(self.error("`-`")),
        }
        self.expect(Token::LBracket, "`[`")?;
        let var = match self.peek() {
            Some(Token::Ident { .. }) => Some(self.name()?),
            _ => None,
        };
        self.expect(Token::Colon, "a relationship type")?;
        let edge_type = self.name()?;
        let properties = if self.peek() == Some(&Token::LBrace) {
            self.map_literal()?
        } else {
            Properties::new()
        };
        self.expect(Token::RBracket, "`]`")?;
        match self.peek() {
            Some(Token::Arrow) => self.pos += 1,
            Some(Token::Dash) => return Err(ParseError::Unsupported("undirected relationships")),
            _ => return Err(self.error("`->`")),
        }
        let to = self.bare_var()?;
        Ok(RelPattern {
            var,
            from,
            to,
            edge_type,
            properties,
        })
    }

    fn assignments(&mut self) -> Result<Vec<Assignment>, ParseError> {
        let mut out = Vec::new();
        loop {
            let var = self.name()?;
            match self.advance() {
                Some(Token::PlusEq) => out.push(Assignment::Merge {
                    var,
                    properties: self.map_literal()?,
                }),
                Some(Token::Dot) => {
                    let key = self.name()?;
                    self.expect(Token::Eq, "`=`")?;
                    out.push(Assignment::Property {
                        var,
                        key,
                        value: self.scalar()?,
                    });
                }
                Some(Token::Eq) => return Err(ParseError::Unsupported("replacing all properties")),
                other => {
                    return Err(ParseError::Expected {
                        expected: "`+=` or `.`".to_string(),
                        found: describe(other.as_ref()),
                    })
                }
            }
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                return Ok(out);
            }
        }
    }

    fn set_clauses(&mut self) -> Result<SetClauses, ParseError> {
        let mut sets = SetClauses::default();
        while !self.at_end() {
            if self.eat_keyword("ON") {
                if self.eat_keyword("CREATE") {
                    self.expect_keyword("SET")?;
                    sets.on_create.extend(self.assignments()?);
                } else if self.eat_keyword("MATCH") {
                    self.expect_keyword("SET")?;
                    sets.on_match.extend(self.assignments()?);
                } else {
                    return Err(self.error("CREATE or MATCH"));
                }
            } else if self.eat_keyword("SET") {
                sets.always.extend(self.assignments()?);
            } else {
                return Err(self.error("SET, ON CREATE SET or ON MATCH SET"));
            }
        }
        Ok(sets)
    }

    fn schema(&mut self) -> Result<Statement, ParseError> {
        let is_constraint = if self.eat_keyword("CONSTRAINT") {
            true
        } else if self.eat_keyword("INDEX") {
            false
        } else {
            return Err(ParseError::Unsupported("CREATE of data"));
        };

        // Optional schema object name before IF NOT EXISTS / FOR.
        if !self.peek().is_some_and(|t| t.is_keyword("IF") || t.is_keyword("FOR")) {
            self.name()?;
        }
        if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
        }
        self.expect_keyword("FOR")?;
        let pattern = self.node_pattern()?;
        let mut labels = pattern.labels.into_iter();
        let (Some(label), None) = (labels.next(), labels.next()) else {
            return Err(ParseError::Unsupported("schema statements over several labels"));
        };

        let property = if is_constraint {
            self.expect_keyword("REQUIRE")?;
            self.name()?;
            self.expect(Token::Dot, "`.`")?;
            let property = self.name()?;
            self.expect_keyword("IS")?;
            self.expect_keyword("UNIQUE")?;
            property
        } else {
            self.expect_keyword("ON")?;
            self.expect(Token::LParen, "`(`")?;
            self.name()?;
            self.expect(Token::Dot, "`.`")?;
            let property = self.name()?;
            self.expect(Token::RParen, "`)`")?;
            property
        };

        if !self.at_end() {
            return Err(self.error("end of statement"));
        }
        Ok(if is_constraint {
            Statement::Constraint { label, property }
        } else {
            Statement::Index { label, property }
        })
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        if self.eat_keyword("CREATE") {
            return self.schema();
        }

        if self.eat_keyword("MERGE") {
            let pattern = self.node_pattern()?;
            if matches!(self.peek(), Some(Token::Dash | Token::Arrow | Token::LeftArrow)) {
                return Err(ParseError::Unsupported("MERGE of a whole path"));
            }
            let sets = self.set_clauses()?;
            return Ok(Statement::MergeNode { pattern, sets });
        }

        if self.eat_keyword("MATCH") {
            let mut matches = vec![self.node_pattern()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                matches.push(self.node_pattern()?);
            }
            if self.peek().is_some_and(|t| t.is_keyword("WHERE")) {
                return Err(ParseError::Unsupported("WHERE clauses"));
            }
            self.expect_keyword("MERGE")?;
            let rel = self.rel_pattern()?;
            let sets = self.set_clauses()?;
            return Ok(Statement::MergeEdge { matches, rel, sets });
        }

        Err(ParseError::Unsupported("only CREATE CONSTRAINT/INDEX, MERGE and MATCH ... MERGE"))
    }
}

pub fn parse_statement(text: &str) -> Result<Statement, ParseError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
    };
    parser.statement()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_merge_with_set() {
        let statement =
            parse_statement("MERGE (n:Person:Employee {name: 'Alice'}) SET n += {age: 41}, n.active = true")
                .unwrap();
        let Statement::MergeNode { pattern, sets } = statement else {
            panic!("expected node merge");
        };
        assert_eq!(pattern.var.as_deref(), Some("n"));
        assert_eq!(pattern.labels.len(), 2);
        assert_eq!(pattern.properties["name"], Scalar::Text("Alice".to_string()));
        assert_eq!(sets.always.len(), 2);
    }

    #[test]
    fn parses_relationship_merge() {
        let statement = parse_statement(
            "MATCH (a:Person {name: 'Alice'}), (b:Company {name: 'Acme'}) \
             MERGE (a)-[r:WORKS_FOR {since: 2019}]->(b) ON CREATE SET r.new = true",
        )
        .unwrap();
        let Statement::MergeEdge { matches, rel, sets } = statement else {
            panic!("expected relationship merge");
        };
        assert_eq!(matches.len(), 2);
        assert_eq!(rel.from, "a");
        assert_eq!(rel.to, "b");
        assert_eq!(rel.edge_type, "WORKS_FOR");
        assert_eq!(rel.properties["since"], Scalar::Integer(2019));
        assert_eq!(sets.on_create.len(), 1);
    }

    #[test]
    fn parses_schema_statements() {
        assert_eq!(
            parse_statement("CREATE CONSTRAINT person_name IF NOT EXISTS FOR (n:Person) REQUIRE n.name IS UNIQUE")
                .unwrap(),
            Statement::Constraint {
                label: "Person".to_string(),
                property: "name".to_string()
            }
        );
        assert!(matches!(
            parse_statement("CREATE INDEX IF NOT EXISTS FOR (n:Doc) ON (n.id)").unwrap(),
            Statement::Index { .. }
        ));
    }

    #[test]
    fn rejects_statements_outside_the_dialect() {
        assert!(matches!(
            parse_statement("MERGE (a:A {id: 1})-[:R]->(b:B {id: 2})"),
            Err(ParseError::Unsupported(_))
        ));
        assert!(matches!(
            parse_statement("CREATE (n:A)"),
            Err(ParseError::Unsupported(_))
        ));
        assert!(matches!(
            parse_statement("MERGE (n:A {id: $id})"),
            Err(ParseError::Unsupported(_))
        ));
        assert!(matches!(
            parse_statement("MERGE (n:A {id: 1}) RETURN n"),
            Err(ParseError::Expected { .. })
        ));
    }
}
