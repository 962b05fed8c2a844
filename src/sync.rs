//! Multi-client synchronization: collects each client's pending operations,
//! ships them through the wire format and rebases them onto every other
//! client's timeline.
//!
//! Clients are totally ordered by registration; when two concurrent
//! operations tie, the earlier-registered client yields. Every receiver
//! transforms an incoming set against everything it has applied since the
//! last sync, in sender order, so all clients evaluate the same diamonds and
//! converge on the same content.

use std::collections::HashMap;

use tracing::debug;

use crate::batch::{BatchSpec, Writer};
use crate::model::{Document, Result};
use crate::operation::Operation;
use crate::transform::{TransformSetsOptions, transform_sets};

pub struct Client {
    name: String,
    doc: Document,
    /// Document version up to which this client's history has been shared.
    synced_version: u64,
}

impl Client {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn synced_version(&self) -> u64 {
        self.synced_version
    }
}

/// A set of clients editing the same logical document.
#[derive(Default)]
pub struct Collaboration {
    clients: Vec<Client>,
}

impl Collaboration {
    pub fn new() -> Collaboration {
        Collaboration::default()
    }

    /// Registers a client and returns its index. Later-registered clients
    /// win transformation ties against earlier ones.
    pub fn add_client(&mut self, name: &str) -> usize {
        self.clients.push(Client {
            name: name.to_string(),
            doc: Document::new(),
            synced_version: 0,
        });
        self.clients.len() - 1
    }

    pub fn client(&self, index: usize) -> &Client {
        &self.clients[index]
    }

    pub fn document(&self, index: usize) -> &Document {
        &self.clients[index].doc
    }

    /// Applies the same initial content to every client, outside the shared
    /// timeline: seeding stands in for loading a stored document, so it is
    /// neither undoable nor sent to other clients.
    pub fn seed(&mut self, build: impl Fn(&mut Writer<'_>) -> Result<()>) -> Result<()> {
        for client in &mut self.clients {
            client.doc.change_with(BatchSpec::transparent(), &build)?;
            client.synced_version = client.doc.version();
        }
        Ok(())
    }

    /// Runs a local change session on one client.
    pub fn edit(
        &mut self,
        index: usize,
        build: impl FnOnce(&mut Writer<'_>) -> Result<()>,
    ) -> Result<()> {
        self.clients[index].doc.change(build)
    }

    pub fn undo(&mut self, index: usize) -> Result<()> {
        self.clients[index].doc.undo_last()
    }

    /// Exchanges all pending operations between all clients.
    pub fn sync(&mut self) -> Result<()> {
        let mut pending: Vec<Vec<Operation>> = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            let ops = client
                .doc
                .history()
                .get_operations(client.synced_version, client.doc.version())?
                .to_vec();
            debug!(client = %client.name, pending = ops.len(), "collecting pending operations");
            pending.push(ops);
        }
        for receiver in 0..self.clients.len() {
            // everything the receiver applied since its last sync, grouped by
            // the client that originated each block; ties between two blocks
            // go to the later-registered originator, no matter who receives
            let mut blocks: Vec<(usize, Vec<Operation>)> =
                vec![(receiver, pending[receiver].clone())];
            for sender in 0..self.clients.len() {
                if sender == receiver || pending[sender].is_empty() {
                    continue;
                }
                let mut remote = Vec::with_capacity(pending[sender].len());
                for op in &pending[sender] {
                    remote.push(Operation::from_json(op.to_json()?)?);
                }
                let sender_history = self.clients[sender].doc.history().clone();
                let snapshot = self.clients[receiver].doc.history().clone();
                for (index, (owner, block)) in blocks.iter_mut().enumerate() {
                    let (remote_t, block_t) = transform_sets(
                        remote,
                        std::mem::take(block),
                        &TransformSetsOptions {
                            a_is_strong: sender > *owner,
                            pad_with_no_ops: true,
                            relations: HashMap::new(),
                            // sender-side undone flags are meaningful only
                            // while the remote set still carries its original
                            // base versions
                            history_a: (index == 0).then_some(&sender_history),
                            history_b: Some(&snapshot),
                        },
                    );
                    remote = remote_t;
                    *block = block_t;
                }
                let mut applied = Vec::with_capacity(remote.len());
                for mut op in remote {
                    op.set_base_version(self.clients[receiver].doc.version());
                    self.clients[receiver].doc.apply(&op)?;
                    applied.push(op);
                }
                blocks.push((sender, applied));
            }
            self.clients[receiver].synced_version = self.clients[receiver].doc.version();
        }
        Ok(())
    }

    /// Whether every client has shared all of its history and all visible
    /// content is structurally equal. Graveyard layout may differ between
    /// clients and does not count.
    pub fn converged(&self) -> bool {
        self.clients
            .iter()
            .all(|client| client.synced_version == client.doc.version())
            && self
                .clients
                .windows(2)
                .all(|pair| pair[0].doc.content_equals(&pair[1].doc))
    }
}
