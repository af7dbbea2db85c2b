//! Active-context processing for the JSON-LD subset the feed uses.

use std::collections::HashMap;

use serde_json::{Map, Value};
use url::Url;

use super::loader::ContextLoader;
use super::nquads::is_absolute_iri;
use crate::error::MirrorError;

/// Maximum nesting of remote context references.
pub const MAX_CONTEXT_DEPTH: usize = 16;

const KEYWORDS: &[&str] = &[
    "@base",
    "@container",
    "@context",
    "@direction",
    "@graph",
    "@id",
    "@import",
    "@included",
    "@index",
    "@json",
    "@language",
    "@list",
    "@nest",
    "@none",
    "@prefix",
    "@propagate",
    "@protected",
    "@reverse",
    "@set",
    "@type",
    "@value",
    "@version",
    "@vocab",
];

pub fn is_keyword(value: &str) -> bool {
    KEYWORDS.contains(&value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    List,
    Set,
    Language,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeMapping {
    Id,
    Vocab,
    Json,
    Datatype(String),
}

#[derive(Debug, Clone, Default)]
pub struct TermDefinition {
    /// `None` for a term explicitly mapped to null.
    pub iri: Option<String>,
    pub reverse: bool,
    pub type_mapping: Option<TypeMapping>,
    pub container: Vec<Container>,
    /// `Some(None)` clears the default language for this term.
    pub language: Option<Option<String>>,
    pub scoped: Option<Value>,
}

impl TermDefinition {
    pub fn has_container(&self, container: &Container) -> bool {
        self.container.contains(container)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub base: Option<Url>,
    original_base: Option<Url>,
    pub vocab: Option<String>,
    pub language: Option<String>,
    terms: HashMap<String, TermDefinition>,
}

impl Context {
    pub fn new(base: Option<Url>) -> Self {
        Self {
            original_base: base.clone(),
            base,
            ..Self::default()
        }
    }

    pub fn term(&self, term: &str) -> Option<&TermDefinition> {
        self.terms.get(term)
    }

    /// Returns a new active context with `local` applied on top of this one.
    pub fn process(&self, local: &Value, loader: &dyn ContextLoader) -> Result<Context, MirrorError> {
        let mut remote = Vec::new();
        self.process_inner(local, loader, &mut remote, false)
    }

    fn process_inner(
        &self,
        local: &Value,
        loader: &dyn ContextLoader,
        remote: &mut Vec<String>,
        from_remote: bool,
    ) -> Result<Context, MirrorError> {
        let mut result = self.clone();
        let items = match local {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };

        for item in items {
            result = match item {
                Value::Null => Context::new(result.original_base.clone()),
                Value::String(reference) => result.process_remote(reference, loader, remote)?,
                Value::Object(map) => result.process_object(map, from_remote)?,
                other => {
                    return Err(MirrorError::Conversion(format!("invalid local context: {other}")));
                }
            };
        }
        Ok(result)
    }

    fn process_remote(
        &self,
        reference: &str,
        loader: &dyn ContextLoader,
        remote: &mut Vec<String>,
    ) -> Result<Context, MirrorError> {
        let url = match &self.base {
            Some(base) => base
                .join(reference)
                .map_err(|err| MirrorError::Conversion(format!("context reference {reference}: {err}")))?
                .to_string(),
            None if is_absolute_iri(reference) => reference.to_string(),
            None => {
                return Err(MirrorError::Conversion(format!(
                    "relative context reference {reference} without a base"
                )));
            }
        };
        if remote.contains(&url) {
            return Err(MirrorError::Conversion(format!("recursive context inclusion: {url}")));
        }
        if remote.len() >= MAX_CONTEXT_DEPTH {
            return Err(MirrorError::Conversion(format!(
                "context nesting deeper than {MAX_CONTEXT_DEPTH} at {url}"
            )));
        }

        let document = loader.load(&url)?;
        let nested = document
            .get("@context")
            .ok_or_else(|| MirrorError::ContextLoad {
                url: url.clone(),
                message: "document has no @context".to_string(),
            })?;

        remote.push(url);
        let result = self.process_inner(nested, loader, remote, true);
        remote.pop();
        result
    }

    fn process_object(
        mut self,
        local: &Map<String, Value>,
        from_remote: bool,
    ) -> Result<Context, MirrorError> {
        if let Some(base) = local.get("@base")
            && !from_remote
        {
            self.base = match base {
                Value::Null => None,
                Value::String(value) => Some(self.resolve_base(value)?),
                other => return Err(MirrorError::Conversion(format!("invalid @base: {other}"))),
            };
        }

        if let Some(vocab) = local.get("@vocab") {
            self.vocab = match vocab {
                Value::Null => None,
                Value::String(value) => self.expand_iri(value, true, true),
                other => return Err(MirrorError::Conversion(format!("invalid @vocab: {other}"))),
            };
        }

        if let Some(language) = local.get("@language") {
            self.language = match language {
                Value::Null => None,
                Value::String(value) => Some(value.to_lowercase()),
                other => {
                    return Err(MirrorError::Conversion(format!("invalid @language: {other}")));
                }
            };
        }

        let mut defined = HashMap::new();
        for term in local.keys() {
            self.create_term(local, term, &mut defined)?;
        }
        Ok(self)
    }

    fn resolve_base(&self, value: &str) -> Result<Url, MirrorError> {
        let resolved = match &self.base {
            Some(base) => base.join(value),
            None => Url::parse(value),
        };
        resolved.map_err(|err| MirrorError::Conversion(format!("invalid @base {value}: {err}")))
    }

    fn create_term(
        &mut self,
        local: &Map<String, Value>,
        term: &str,
        defined: &mut HashMap<String, bool>,
    ) -> Result<(), MirrorError> {
        match defined.get(term) {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(MirrorError::Conversion(format!("cyclic IRI mapping for term {term}")));
            }
            None => {}
        }
        if term.starts_with('@') {
            return Ok(());
        }
        let Some(value) = local.get(term) else {
            return Ok(());
        };
        defined.insert(term.to_string(), false);
        self.terms.remove(term);

        let definition = match value {
            Value::Null => TermDefinition::default(),
            Value::String(id) => TermDefinition {
                iri: self.expand_defining(id, local, defined)?,
                ..TermDefinition::default()
            },
            Value::Object(map) => self.expanded_definition(term, map, local, defined)?,
            other => {
                return Err(MirrorError::Conversion(format!(
                    "invalid term definition for {term}: {other}"
                )));
            }
        };

        self.terms.insert(term.to_string(), definition);
        defined.insert(term.to_string(), true);
        Ok(())
    }

    fn expanded_definition(
        &mut self,
        term: &str,
        map: &Map<String, Value>,
        local: &Map<String, Value>,
        defined: &mut HashMap<String, bool>,
    ) -> Result<TermDefinition, MirrorError> {
        let mut definition = TermDefinition::default();

        if let Some(reverse) = map.get("@reverse") {
            let Value::String(reverse) = reverse else {
                return Err(MirrorError::Conversion(format!("invalid @reverse for {term}")));
            };
            definition.iri = self.expand_defining(reverse, local, defined)?;
            definition.reverse = true;
        } else {
            match map.get("@id") {
                Some(Value::Null) => {}
                Some(Value::String(id)) if id != term => {
                    definition.iri = self.expand_defining(id, local, defined)?;
                }
                Some(Value::String(_)) | None => {
                    definition.iri = Some(self.default_term_iri(term, local, defined)?);
                }
                Some(other) => {
                    return Err(MirrorError::Conversion(format!("invalid @id for {term}: {other}")));
                }
            }
        }

        if let Some(mapping) = map.get("@type") {
            let Value::String(mapping) = mapping else {
                return Err(MirrorError::Conversion(format!("invalid @type mapping for {term}")));
            };
            definition.type_mapping = match mapping.as_str() {
                "@id" => Some(TypeMapping::Id),
                "@vocab" => Some(TypeMapping::Vocab),
                "@json" => Some(TypeMapping::Json),
                "@none" => None,
                other => self
                    .expand_defining(other, local, defined)?
                    .map(TypeMapping::Datatype),
            };
        }

        if let Some(container) = map.get("@container") {
            let values = match container {
                Value::Array(values) => values.as_slice(),
                other => std::slice::from_ref(other),
            };
            definition.container = values
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|value| match value {
                    "@list" => Some(Container::List),
                    "@set" => Some(Container::Set),
                    "@language" => Some(Container::Language),
                    "@index" => Some(Container::Index),
                    _ => None,
                })
                .collect();
        }

        if let Some(language) = map.get("@language") {
            definition.language = match language {
                Value::Null => Some(None),
                Value::String(value) => Some(Some(value.to_lowercase())),
                other => {
                    return Err(MirrorError::Conversion(format!(
                        "invalid @language for {term}: {other}"
                    )));
                }
            };
        }

        definition.scoped = map.get("@context").cloned();
        Ok(definition)
    }

    /// IRI of a term definition that does not name one: the term itself when it is
    /// a compact or absolute IRI, otherwise the term appended to `@vocab`.
    fn default_term_iri(
        &mut self,
        term: &str,
        local: &Map<String, Value>,
        defined: &mut HashMap<String, bool>,
    ) -> Result<String, MirrorError> {
        if let Some((prefix, suffix)) = term.split_once(':') {
            if !suffix.starts_with("//") && local.contains_key(prefix) {
                self.create_term(local, prefix, defined)?;
            }
            if let Some(iri) = self.expand_iri(term, false, false) {
                return Ok(iri);
            }
        }
        match &self.vocab {
            Some(vocab) => Ok(format!("{vocab}{term}")),
            None => Err(MirrorError::Conversion(format!(
                "term {term} has no IRI mapping and no @vocab is set"
            ))),
        }
    }

    /// IRI expansion while a local context is being processed: terms and prefixes
    /// that are defined later in the same context are created first.
    fn expand_defining(
        &mut self,
        value: &str,
        local: &Map<String, Value>,
        defined: &mut HashMap<String, bool>,
    ) -> Result<Option<String>, MirrorError> {
        if is_keyword(value) {
            return Ok(Some(value.to_string()));
        }
        if local.contains_key(value) && defined.get(value) != Some(&false) {
            self.create_term(local, value, defined)?;
        }
        if let Some((prefix, suffix)) = value.split_once(':')
            && !suffix.starts_with("//")
            && local.contains_key(prefix)
        {
            self.create_term(local, prefix, defined)?;
        }
        Ok(self.expand_iri(value, true, false))
    }

    /// Expands a term, compact IRI or relative reference.
    ///
    /// `vocab` allows term and `@vocab` resolution (property names, types);
    /// `document_relative` resolves against `@base` (node identifiers).
    pub fn expand_iri(&self, value: &str, vocab: bool, document_relative: bool) -> Option<String> {
        if is_keyword(value) {
            return Some(value.to_string());
        }
        if value.starts_with('@') && value[1..].bytes().all(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        if vocab && let Some(definition) = self.terms.get(value) {
            return definition.iri.clone();
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if prefix == "_" || suffix.starts_with("//") {
                return Some(value.to_string());
            }
            if let Some(iri) = self
                .terms
                .get(prefix)
                .filter(|definition| !definition.reverse)
                .and_then(|definition| definition.iri.as_deref())
            {
                return Some(format!("{iri}{suffix}"));
            }
            if is_absolute_iri(value) {
                return Some(value.to_string());
            }
        }
        if vocab && let Some(prefix) = &self.vocab {
            return Some(format!("{prefix}{value}"));
        }
        if document_relative && let Some(base) = &self.base {
            return base.join(value).ok().map(String::from);
        }
        Some(value.to_string())
    }
}
