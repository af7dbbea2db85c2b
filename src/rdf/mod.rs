//! JSON-LD to N-Quads conversion.

mod context;
mod loader;
mod nquads;
mod to_rdf;

use serde_json::Value;

pub use context::{Context, MAX_CONTEXT_DEPTH};
pub use loader::{ContextLoader, HttpContextLoader, StaticContextLoader};
pub use nquads::{Quad, Term, is_absolute_iri, serialize};

use crate::error::MirrorError;
use to_rdf::Emitter;

pub trait RdfConverter: Send + Sync {
    /// Serializes a JSON-LD document as N-Quads. Identical input yields
    /// byte-identical output.
    fn to_nquads(&self, document: &Value) -> Result<String, MirrorError>;
}

pub struct JsonLdConverter<L: ContextLoader> {
    loader: L,
}

impl<L: ContextLoader> JsonLdConverter<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    pub fn to_quads(&self, document: &Value) -> Result<Vec<Quad>, MirrorError> {
        let mut emitter = Emitter::new(&self.loader);
        emitter.document(document)?;
        Ok(emitter.into_quads())
    }
}

impl<L: ContextLoader> RdfConverter for JsonLdConverter<L> {
    fn to_nquads(&self, document: &Value) -> Result<String, MirrorError> {
        Ok(serialize(&self.to_quads(document)?))
    }
}
