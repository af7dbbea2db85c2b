//! Walks a compacted JSON-LD document under its active context and emits quads.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use super::context::{Container, Context, TermDefinition, TypeMapping};
use super::loader::ContextLoader;
use super::nquads::{
    Quad, RDF_FIRST, RDF_JSON, RDF_NIL, RDF_REST, RDF_TYPE, Term, XSD_BOOLEAN, XSD_DOUBLE,
    XSD_INTEGER, XSD_STRING,
};
use crate::error::MirrorError;

/// Contexts in effect for the value of one property.
struct Scope<'c> {
    /// Used for literals and value objects.
    values: &'c Context,
    /// Used for nested node objects; type-scoped contexts do not reach them.
    nodes: &'c Context,
}

pub(crate) struct Emitter<'a> {
    loader: &'a dyn ContextLoader,
    quads: Vec<Quad>,
    blank_labels: HashMap<String, String>,
    next_blank: usize,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(loader: &'a dyn ContextLoader) -> Self {
        Self {
            loader,
            quads: Vec::new(),
            blank_labels: HashMap::new(),
            next_blank: 0,
        }
    }

    pub(crate) fn into_quads(self) -> Vec<Quad> {
        self.quads
    }

    pub(crate) fn document(&mut self, document: &Value) -> Result<(), MirrorError> {
        let ctx = Context::default();
        match document {
            Value::Object(map) => {
                self.node(map, &ctx, None, true)?;
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        self.node(map, &ctx, None, true)?;
                    }
                }
            }
            _ => {
                return Err(MirrorError::Conversion(
                    "document is not a JSON-LD object or array".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Emits the statements of one node object and returns its subject, or `None`
    /// when the object only wraps a default-graph `@graph`.
    fn node(
        &mut self,
        map: &Map<String, Value>,
        ctx: &Context,
        graph: Option<&Term>,
        top_level: bool,
    ) -> Result<Option<Term>, MirrorError> {
        let outer = match map.get("@context") {
            Some(local) => ctx.process(local, self.loader)?,
            None => ctx.clone(),
        };

        let mut types = Vec::new();
        for (key, value) in map {
            if outer.expand_iri(key, true, false).as_deref() == Some("@type") {
                types.extend(strings(value));
            }
        }
        types.sort();

        let mut active = outer.clone();
        for kind in &types {
            if let Some(scoped) = outer.term(kind).and_then(|def| def.scoped.as_ref()) {
                active = active.process(scoped, self.loader)?;
            }
        }

        let expanded: Vec<(String, &String, &Value)> = map
            .iter()
            .filter(|(key, _)| key.as_str() != "@context")
            .filter_map(|(key, value)| {
                active
                    .expand_iri(key, true, false)
                    .map(|iri| (iri, key, value))
            })
            .collect();

        if expanded.iter().any(|(iri, _, _)| iri == "@value" || iri == "@list" || iri == "@set") {
            return Ok(None);
        }

        if top_level && !expanded.is_empty() && expanded.iter().all(|(iri, _, _)| iri == "@graph") {
            for (_, _, value) in &expanded {
                self.graph_members(value, &active, graph)?;
            }
            return Ok(None);
        }

        let subject = match expanded.iter().find(|(iri, _, _)| iri == "@id") {
            Some((_, _, Value::String(id))) => self.resource(&active, id, false),
            _ => self.fresh_blank(),
        };

        for kind in &types {
            let object = self.resource(&outer, kind, true);
            self.emit(&subject, Term::Iri(RDF_TYPE.to_string()), object, graph);
        }

        for (iri, key, value) in &expanded {
            match iri.as_str() {
                "@id" | "@type" | "@index" | "@language" | "@direction" => {}
                "@graph" => {
                    let named = subject.clone();
                    self.graph_members(value, &outer, Some(&named))?;
                }
                "@included" => self.graph_members(value, &outer, graph)?,
                "@reverse" => {
                    if let Value::Object(reverse) = value {
                        for (property, values) in reverse {
                            let Some(predicate) = active.expand_iri(property, true, false) else {
                                continue;
                            };
                            self.reverse(&subject, predicate, values, &active, &outer, property, graph)?;
                        }
                    }
                }
                other if other.starts_with('@') => {}
                _ => {
                    let definition = active.term(key);
                    if definition.is_some_and(|def| def.reverse) {
                        self.reverse(&subject, iri.clone(), value, &active, &outer, key, graph)?;
                        continue;
                    }
                    let (values_ctx, nodes_ctx) = self.scoped(&active, &outer, key)?;
                    let scope = Scope {
                        values: &values_ctx,
                        nodes: &nodes_ctx,
                    };
                    let definition = values_ctx.term(key).or(definition).cloned();
                    for object in self.values(value, &scope, definition.as_ref(), graph)? {
                        self.emit(&subject, Term::Iri(iri.clone()), object, graph);
                    }
                }
            }
        }
        Ok(Some(subject))
    }

    fn graph_members(
        &mut self,
        value: &Value,
        ctx: &Context,
        graph: Option<&Term>,
    ) -> Result<(), MirrorError> {
        for item in one_or_many(value) {
            if let Value::Object(map) = item {
                self.node(map, ctx, graph, false)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn reverse(
        &mut self,
        subject: &Term,
        predicate: String,
        value: &Value,
        active: &Context,
        outer: &Context,
        key: &str,
        graph: Option<&Term>,
    ) -> Result<(), MirrorError> {
        let (values_ctx, nodes_ctx) = self.scoped(active, outer, key)?;
        let scope = Scope {
            values: &values_ctx,
            nodes: &nodes_ctx,
        };
        let definition = TermDefinition {
            type_mapping: Some(TypeMapping::Id),
            ..TermDefinition::default()
        };
        for object in self.values(value, &scope, Some(&definition), graph)? {
            if matches!(object, Term::Iri(_) | Term::Blank(_)) {
                self.emit(&object, Term::Iri(predicate.clone()), subject.clone(), graph);
            }
        }
        Ok(())
    }

    /// Applies the property-scoped context of `key`, if any.
    fn scoped(
        &self,
        active: &Context,
        outer: &Context,
        key: &str,
    ) -> Result<(Context, Context), MirrorError> {
        match active.term(key).and_then(|def| def.scoped.as_ref()) {
            Some(scoped) => Ok((
                active.process(scoped, self.loader)?,
                outer.process(scoped, self.loader)?,
            )),
            None => Ok((active.clone(), outer.clone())),
        }
    }

    fn values(
        &mut self,
        value: &Value,
        scope: &Scope<'_>,
        definition: Option<&TermDefinition>,
        graph: Option<&Term>,
    ) -> Result<Vec<Term>, MirrorError> {
        if let Some(def) = definition {
            if def.type_mapping == Some(TypeMapping::Json) {
                return Ok(vec![json_literal(value)?]);
            }
            if def.has_container(&Container::List) && !is_list_object(value, scope.values) {
                let list = self.list(one_or_many(value), scope, definition, graph)?;
                return Ok(vec![list]);
            }
            if def.has_container(&Container::Language)
                && let Value::Object(map) = value
            {
                return Ok(language_map(map, scope.values));
            }
        }
        self.plain_values(value, scope, definition, graph)
    }

    fn plain_values(
        &mut self,
        value: &Value,
        scope: &Scope<'_>,
        definition: Option<&TermDefinition>,
        graph: Option<&Term>,
    ) -> Result<Vec<Term>, MirrorError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.plain_values(item, scope, definition, graph)?);
                }
                Ok(out)
            }
            Value::Object(map) => self.object_value(map, scope, definition, graph),
            scalar => Ok(self.scalar(scalar, scope.values, definition).into_iter().collect()),
        }
    }

    fn object_value(
        &mut self,
        map: &Map<String, Value>,
        scope: &Scope<'_>,
        definition: Option<&TermDefinition>,
        graph: Option<&Term>,
    ) -> Result<Vec<Term>, MirrorError> {
        let ctx = scope.values;
        if let Some(literal) = keyword_value(map, ctx, "@value") {
            let kind = keyword_value(map, ctx, "@type").and_then(Value::as_str);
            let language = keyword_value(map, ctx, "@language").and_then(Value::as_str);
            return value_object(literal, kind, language, ctx);
        }
        if let Some(items) = keyword_value(map, ctx, "@list") {
            let list = self.list(one_or_many(items), scope, definition, graph)?;
            return Ok(vec![list]);
        }
        if let Some(items) = keyword_value(map, ctx, "@set") {
            return self.plain_values(items, scope, definition, graph);
        }
        Ok(self
            .node(map, scope.nodes, graph, false)?
            .into_iter()
            .collect())
    }

    fn list(
        &mut self,
        items: &[Value],
        scope: &Scope<'_>,
        definition: Option<&TermDefinition>,
        graph: Option<&Term>,
    ) -> Result<Term, MirrorError> {
        let mut members = Vec::new();
        for item in items {
            members.extend(self.plain_values(item, scope, definition, graph)?);
        }
        if members.is_empty() {
            return Ok(Term::Iri(RDF_NIL.to_string()));
        }

        let cells: Vec<Term> = members.iter().map(|_| self.fresh_blank()).collect();
        for (index, member) in members.into_iter().enumerate() {
            let rest = cells
                .get(index + 1)
                .cloned()
                .unwrap_or_else(|| Term::Iri(RDF_NIL.to_string()));
            self.emit(&cells[index], Term::Iri(RDF_FIRST.to_string()), member, graph);
            self.emit(&cells[index], Term::Iri(RDF_REST.to_string()), rest, graph);
        }
        Ok(cells[0].clone())
    }

    fn scalar(
        &mut self,
        value: &Value,
        ctx: &Context,
        definition: Option<&TermDefinition>,
    ) -> Option<Term> {
        let mapping = definition.and_then(|def| def.type_mapping.as_ref());
        let datatype = match mapping {
            Some(TypeMapping::Datatype(datatype)) => Some(datatype.as_str()),
            _ => None,
        };
        match value {
            Value::String(text) => match mapping {
                Some(TypeMapping::Id) => Some(self.resource(ctx, text, false)),
                Some(TypeMapping::Vocab) => Some(self.resource(ctx, text, true)),
                Some(TypeMapping::Datatype(datatype)) => Some(Term::literal(text, datatype)),
                _ => {
                    let language = match definition.and_then(|def| def.language.as_ref()) {
                        Some(language) => language.clone(),
                        None => ctx.language.clone(),
                    };
                    Some(match language {
                        Some(language) => Term::lang_string(text, language),
                        None => Term::literal(text, XSD_STRING),
                    })
                }
            },
            Value::Bool(flag) => Some(Term::literal(flag.to_string(), datatype.unwrap_or(XSD_BOOLEAN))),
            Value::Number(number) => Some(number_literal(number, datatype)),
            _ => None,
        }
    }

    /// Term for a node reference; `_:` labels are relabelled in order of appearance.
    fn resource(&mut self, ctx: &Context, value: &str, vocab: bool) -> Term {
        let iri = ctx
            .expand_iri(value, vocab, true)
            .unwrap_or_else(|| value.to_string());
        match iri.strip_prefix("_:") {
            Some(label) => {
                let next = &mut self.next_blank;
                let label = self
                    .blank_labels
                    .entry(label.to_string())
                    .or_insert_with(|| {
                        let fresh = format!("b{next}");
                        *next += 1;
                        fresh
                    })
                    .clone();
                Term::Blank(label)
            }
            None => Term::Iri(iri),
        }
    }

    fn fresh_blank(&mut self) -> Term {
        let label = format!("b{}", self.next_blank);
        self.next_blank += 1;
        Term::Blank(label)
    }

    fn emit(&mut self, subject: &Term, predicate: Term, object: Term, graph: Option<&Term>) {
        let quad = Quad {
            subject: subject.clone(),
            predicate,
            object,
            graph: graph.cloned(),
        };
        if quad.is_well_formed() {
            self.quads.push(quad);
        }
    }
}

fn value_object(
    literal: &Value,
    kind: Option<&str>,
    language: Option<&str>,
    ctx: &Context,
) -> Result<Vec<Term>, MirrorError> {
    let datatype = kind.and_then(|kind| ctx.expand_iri(kind, true, true));
    if datatype.as_deref() == Some("@json") {
        return Ok(vec![json_literal(literal)?]);
    }
    let term = match literal {
        Value::Null => return Ok(Vec::new()),
        Value::String(text) => match (language, datatype) {
            (Some(language), _) => Term::lang_string(text, language.to_lowercase()),
            (None, Some(datatype)) => Term::literal(text, datatype),
            (None, None) => Term::literal(text, XSD_STRING),
        },
        Value::Bool(flag) => Term::literal(
            flag.to_string(),
            datatype.unwrap_or_else(|| XSD_BOOLEAN.to_string()),
        ),
        Value::Number(number) => number_literal(number, datatype.as_deref()),
        other => {
            return Err(MirrorError::Conversion(format!("invalid @value: {other}")));
        }
    };
    Ok(vec![term])
}

fn language_map(map: &Map<String, Value>, ctx: &Context) -> Vec<Term> {
    let mut out = Vec::new();
    for (language, value) in map {
        let none = ctx.expand_iri(language, true, false).as_deref() == Some("@none");
        for text in strings(value) {
            out.push(if none {
                Term::literal(text, XSD_STRING)
            } else {
                Term::lang_string(text, language.to_lowercase())
            });
        }
    }
    out
}

fn json_literal(value: &Value) -> Result<Term, MirrorError> {
    let text = serde_json::to_string(value).map_err(|err| MirrorError::Conversion(err.to_string()))?;
    Ok(Term::literal(text, RDF_JSON))
}

/// Integral values become `xsd:integer`, everything else canonical `xsd:double`.
fn number_literal(number: &Number, datatype: Option<&str>) -> Term {
    let integral = if let Some(value) = number.as_i64() {
        Some(value.to_string())
    } else if let Some(value) = number.as_u64() {
        Some(value.to_string())
    } else {
        number
            .as_f64()
            .filter(|value| value.fract() == 0.0 && value.abs() < 1e21)
            .map(|value| format!("{value:.0}"))
    };
    match integral {
        Some(text) if datatype != Some(XSD_DOUBLE) => {
            Term::literal(text, datatype.unwrap_or(XSD_INTEGER))
        }
        _ => {
            let value = number.as_f64().unwrap_or_default();
            Term::literal(canonical_double(value), datatype.unwrap_or(XSD_DOUBLE))
        }
    }
}

/// `1.1E0`, `1.0E21`, `-5.0E-7`.
pub(crate) fn canonical_double(value: f64) -> String {
    let formatted = format!("{value:E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => format!("{mantissa}.0E{exponent}"),
        _ => formatted,
    }
}

/// Value of the member whose key expands to `keyword`, aliases included.
fn keyword_value<'m>(map: &'m Map<String, Value>, ctx: &Context, keyword: &str) -> Option<&'m Value> {
    map.iter()
        .find(|(key, _)| ctx.expand_iri(key, true, false).as_deref() == Some(keyword))
        .map(|(_, value)| value)
}

fn is_list_object(value: &Value, ctx: &Context) -> bool {
    value
        .as_object()
        .is_some_and(|map| keyword_value(map, ctx, "@list").is_some())
}

fn one_or_many(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    }
}

fn strings(value: &Value) -> Vec<String> {
    one_or_many(value)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
