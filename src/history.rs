//! Append-only operation log, indexed by document version.
//!
//! The log never forgets: transforming against old base versions and
//! replaying remote deltas both need the full sequence. A side table marks
//! operations that were later canceled by an inverse, which the
//! transformation context consults to suppress stale effects.

use std::collections::BTreeMap;

use crate::model::{ModelError, Result};
use crate::operation::Operation;

#[derive(Debug, Clone, Default)]
pub struct History {
    operations: Vec<Operation>,
    /// undone version -> version of the operation that undid it
    undone: BTreeMap<u64, u64>,
}

impl History {
    pub fn new() -> History {
        History::default()
    }

    /// The version the next recorded operation must be based on.
    pub fn version(&self) -> u64 {
        self.operations.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Appends an operation at the next version. A skipped or repeated
    /// version is a sequencing bug in the caller, never corrected here.
    pub fn record(&mut self, op: Operation) -> Result<()> {
        let expected = self.version();
        if op.base_version() != expected {
            return Err(ModelError::VersionMismatch {
                operation: op.base_version(),
                document: expected,
            });
        }
        self.operations.push(op);
        Ok(())
    }

    /// Operations in the inclusive-exclusive version range `from..to`.
    pub fn get_operations(&self, from: u64, to: u64) -> Result<&[Operation]> {
        if from > to || to > self.version() {
            return Err(ModelError::HistoryGap { from, to });
        }
        Ok(&self.operations[from as usize..to as usize])
    }

    pub fn operation_at(&self, version: u64) -> Option<&Operation> {
        self.operations.get(version as usize)
    }

    /// Whether the operation recorded at this version was later undone.
    pub fn is_undone(&self, version: u64) -> bool {
        self.undone.contains_key(&version)
    }

    pub fn mark_undone(&mut self, undone_version: u64, undoing_version: u64) {
        self.undone.insert(undone_version, undoing_version);
    }

    /// The version of the inverse that undid the given operation, if any.
    pub fn undoing_version_of(&self, version: u64) -> Option<u64> {
        self.undone.get(&version).copied()
    }

    /// The version of the operation that the inverse recorded at this version
    /// undid, if this version is such an inverse.
    pub fn undone_version_of(&self, undoing_version: u64) -> Option<u64> {
        self.undone
            .iter()
            .find(|&(_, &undoing)| undoing == undoing_version)
            .map(|(&undone, _)| undone)
    }
}
