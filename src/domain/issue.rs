//! Non-fatal problems recorded during a run.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Unknown indicator type, malformed rule, unresolvable series reference.
    Configuration,
    /// Price data missing or unusable for a ticker.
    Data,
    /// An indicator failed for one ticker.
    Computation,
    /// Cache or aggregate store read/write failed.
    Store,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueKind::Configuration => "configuration",
            IssueKind::Data => "data",
            IssueKind::Computation => "computation",
            IssueKind::Store => "store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            ticker: None,
            instance_id: None,
            rule: None,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(IssueKind::Configuration, message)
    }

    pub fn data(ticker: &str, message: impl Into<String>) -> Self {
        Self::new(IssueKind::Data, message).with_ticker(ticker)
    }

    pub fn computation(ticker: &str, instance_id: &str, message: impl Into<String>) -> Self {
        Self::new(IssueKind::Computation, message)
            .with_ticker(ticker)
            .with_instance(instance_id)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(IssueKind::Store, message)
    }

    pub fn with_ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.to_string());
        self
    }

    pub fn with_instance(mut self, instance_id: &str) -> Self {
        self.instance_id = Some(instance_id.to_string());
        self
    }

    pub fn with_rule(mut self, rule: &str) -> Self {
        self.rule = Some(rule.to_string());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(ticker) = &self.ticker {
            write!(f, " {}", ticker)?;
        }
        if let Some(instance) = &self.instance_id {
            write!(f, " instance={}", instance)?;
        }
        if let Some(rule) = &self.rule {
            write!(f, " rule={}", rule)?;
        }
        write!(f, ": {}", self.message)
    }
}
