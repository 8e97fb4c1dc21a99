//! Statement descriptors
//!
//! Immutable descriptions of what to execute, produced by an out-of-scope
//! SQL-generation layer. Pure data: the coordinator dispatches on the
//! variant and never rewrites a descriptor in place.

use crate::error::{Error, Result};
use crate::types::ParamGroup;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Declared expectation on the affected-row count of a modifying statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowSemantics {
    /// Exactly one row must be affected; zero rows is treated as a lost
    /// update and fails like an optimistic-lock violation.
    ExactlyOne,
    /// The driver-reported count is returned as-is.
    #[default]
    RowCount,
    /// No expectation at all.
    Unconstrained,
}

/// Which result column carries a server-generated identity, and how many
/// rows are expected to report one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedKeySpec {
    pub column_index: usize,
    pub expected_rows: usize,
}

/// Which member of a pair targets the child table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairOrder {
    /// The first member targets the parent table (insert order).
    ParentFirst,
    /// The first member targets the child table (delete order).
    ChildFirst,
}

/// One SQL text with one parameter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleStatement {
    pub sql: String,
    pub params: ParamGroup,
    pub optimistic_lock: bool,
    pub row_semantics: RowSemantics,
    pub generated_keys: Option<GeneratedKeySpec>,
    /// Deadline for the whole descriptor execution this statement is part of.
    pub timeout: Option<Duration>,
}

impl SimpleStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            optimistic_lock: false,
            row_semantics: RowSemantics::default(),
            generated_keys: None,
            timeout: None,
        }
    }

    pub fn with_params(mut self, params: ParamGroup) -> Self {
        self.params = params;
        self
    }

    pub fn with_optimistic_lock(mut self) -> Self {
        self.optimistic_lock = true;
        self
    }

    pub fn with_row_semantics(mut self, semantics: RowSemantics) -> Self {
        self.row_semantics = semantics;
        self
    }

    pub fn with_generated_keys(mut self, spec: GeneratedKeySpec) -> Self {
        self.generated_keys = Some(spec);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One SQL text with an ordered list of parameter groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatement {
    pub sql: String,
    pub param_groups: Vec<ParamGroup>,
    pub optimistic_lock: bool,
    pub row_semantics: RowSemantics,
    pub generated_keys: Option<GeneratedKeySpec>,
    pub timeout: Option<Duration>,
}

impl BatchStatement {
    pub fn new(sql: impl Into<String>, param_groups: Vec<ParamGroup>) -> Self {
        Self {
            sql: sql.into(),
            param_groups,
            optimistic_lock: false,
            row_semantics: RowSemantics::default(),
            generated_keys: None,
            timeout: None,
        }
    }

    pub fn with_optimistic_lock(mut self) -> Self {
        self.optimistic_lock = true;
        self
    }

    pub fn with_generated_keys(mut self, spec: GeneratedKeySpec) -> Self {
        self.generated_keys = Some(spec);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.param_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.param_groups.is_empty()
    }
}

/// Ordered pair of simple statements backing one logical row.
///
/// Both members target the same logical row set; the coordinator executes
/// them strictly in order and reconciles their affected-row counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedStatement {
    pub first: SimpleStatement,
    pub second: SimpleStatement,
    pub order: PairOrder,
    /// Upsert-style pairs tolerate the first member affecting zero rows;
    /// the second member is then skipped entirely.
    pub conflict_tolerant: bool,
    /// Position in the second member's parameter group that receives the
    /// first member's generated key before the second member executes.
    pub key_param_index: Option<usize>,
}

impl PairedStatement {
    pub fn new(first: SimpleStatement, second: SimpleStatement, order: PairOrder) -> Self {
        Self {
            first,
            second,
            order,
            conflict_tolerant: false,
            key_param_index: None,
        }
    }

    pub fn conflict_tolerant(mut self) -> Self {
        self.conflict_tolerant = true;
        self
    }

    pub fn with_key_param_index(mut self, index: usize) -> Self {
        self.key_param_index = Some(index);
        self
    }
}

/// Ordered pair of batch statements backing one logical row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedBatchStatement {
    pub first: BatchStatement,
    pub second: BatchStatement,
    pub order: PairOrder,
    pub conflict_tolerant: bool,
    pub key_param_index: Option<usize>,
}

impl PairedBatchStatement {
    pub fn new(first: BatchStatement, second: BatchStatement, order: PairOrder) -> Self {
        Self {
            first,
            second,
            order,
            conflict_tolerant: false,
            key_param_index: None,
        }
    }

    pub fn conflict_tolerant(mut self) -> Self {
        self.conflict_tolerant = true;
        self
    }

    pub fn with_key_param_index(mut self, index: usize) -> Self {
        self.key_param_index = Some(index);
        self
    }
}

/// What to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementDescriptor {
    Simple(SimpleStatement),
    Paired(PairedStatement),
    Batch(BatchStatement),
    PairedBatch(PairedBatchStatement),
}

impl StatementDescriptor {
    /// Check structural invariants before execution.
    pub fn validate(&self) -> Result<()> {
        match self {
            StatementDescriptor::PairedBatch(pb) => {
                let first = pb.first.param_groups.len();
                let second = pb.second.param_groups.len();
                if first != second {
                    return Err(Error::InvalidDescriptor(format!(
                        "paired batch members must have equal sizes: first {}, second {}",
                        first, second
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// The deadline for executing this descriptor, carried on the (first)
    /// member statement.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            StatementDescriptor::Simple(s) => s.timeout,
            StatementDescriptor::Paired(p) => p.first.timeout,
            StatementDescriptor::Batch(b) => b.timeout,
            StatementDescriptor::PairedBatch(pb) => pb.first.timeout,
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(
            self,
            StatementDescriptor::Paired(_) | StatementDescriptor::PairedBatch(_)
        )
    }
}
