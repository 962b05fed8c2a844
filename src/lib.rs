//! doc-ot: Operational transformation engine for collaborative tree documents.
//!
//! This crate implements the model layer of a collaborative editor: an
//! attributed tree document, an algebra of invertible operations over it,
//! pairwise operational transformation with intention preservation, and a
//! multi-client synchronization harness. It includes:
//!
//! - **Tree model** - elements, attributed text, offset-path positions and
//!   flat ranges, with a graveyard root keeping removed content addressable
//! - **Operation algebra** - nine operation kinds, each carrying its base
//!   version and enough state to build its exact inverse
//! - **Transform engine** - pairwise and set-level transformation satisfying
//!   the convergence diamond, with strength and relation tie-breaks
//! - **Change sessions** - a writer API batching edits for selective undo
//! - **Synchronization** - a client harness exchanging operations through a
//!   JSON wire format
//!
//! # Quick Start
//!
//! ```rust
//! use doc_ot::{Document, Position, MAIN_ROOT};
//!
//! let mut doc = Document::new();
//! doc.change(|writer| {
//!     writer.insert_element(&Position::new(MAIN_ROOT, vec![0]), "paragraph")?;
//!     writer.insert_text(&Position::new(MAIN_ROOT, vec![0, 0]), "Hello")
//! })
//! .unwrap();
//!
//! assert_eq!(doc.version(), 2);
//! doc.undo_last().unwrap();
//! ```

// Tree model, positions, document aggregate
pub mod model;

// Append-only operation log
pub mod history;

// The operation algebra
pub mod operation;

// Pairwise and set-level transformation
pub mod transform;

// Change sessions, writer API, undo
pub mod batch;

// Multi-client synchronization harness
pub mod sync;

pub use batch::{Batch, BatchSpec, Writer};
pub use history::History;
pub use model::{
    Attributes, ChangeEvent, Document, Element, GRAVEYARD, MAIN_ROOT, ModelError, Node, Position,
    PositionRelation, Range, Text, nodes_offset_size,
};
pub use operation::Operation;
pub use sync::{Client, Collaboration};
pub use transform::{Relation, TransformContext, TransformSetsOptions, transform, transform_sets};
