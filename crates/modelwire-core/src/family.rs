//! Schema of a family description: the data the compiler turns into routes.
//!
//! Everything here is `const`-constructible so family tables live in
//! statics and are never built at runtime.

use serde_json::{Map, Value};

use crate::graph::{Element, Graph};
use crate::kind::ElementKind;
use crate::validate::FieldType;

/// Which object a field is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Model,
    /// Style field, written to every view of the element.
    View,
}

/// One allowed request field: wire name, underlying property and type.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub wire: &'static str,
    pub prop: &'static str,
    pub ty: FieldType,
    pub target: FieldTarget,
    /// Closed set of accepted values, empty when open.
    pub choices: &'static [&'static str],
    /// Kind the referenced element must have, for `FieldType::Reference`.
    pub refers_to: Option<ElementKind>,
}

impl FieldSpec {
    const fn new(wire: &'static str, ty: FieldType) -> Self {
        FieldSpec {
            wire,
            prop: wire,
            ty,
            target: FieldTarget::Model,
            choices: &[],
            refers_to: None,
        }
    }

    pub const fn string(wire: &'static str) -> Self {
        Self::new(wire, FieldType::String)
    }

    pub const fn number(wire: &'static str) -> Self {
        Self::new(wire, FieldType::Number)
    }

    pub const fn boolean(wire: &'static str) -> Self {
        Self::new(wire, FieldType::Boolean)
    }

    pub const fn object(wire: &'static str) -> Self {
        Self::new(wire, FieldType::Object)
    }

    pub const fn nullable(wire: &'static str) -> Self {
        Self::new(wire, FieldType::NullableString)
    }

    pub const fn reference(wire: &'static str, kind: ElementKind) -> Self {
        FieldSpec {
            refers_to: Some(kind),
            ..Self::new(wire, FieldType::Reference)
        }
    }

    /// Reference to an element of any kind.
    pub const fn reference_any(wire: &'static str) -> Self {
        Self::new(wire, FieldType::Reference)
    }

    pub const fn renamed(self, prop: &'static str) -> Self {
        FieldSpec { prop, ..self }
    }

    pub const fn choices(self, choices: &'static [&'static str]) -> Self {
        FieldSpec { choices, ..self }
    }

    pub const fn on_view(self) -> Self {
        FieldSpec {
            target: FieldTarget::View,
            ..self
        }
    }
}

/// Fixed initializer merged in when a surface type is an alias.
#[derive(Debug, Clone, Copy)]
pub enum Seed {
    Bool(&'static str, bool),
    Str(&'static str, &'static str),
}

impl Seed {
    pub fn apply(&self, init: &mut Map<String, Value>) {
        match *self {
            Seed::Bool(prop, value) => {
                init.insert(prop.to_string(), Value::Bool(value));
            }
            Seed::Str(prop, value) => {
                init.insert(prop.to_string(), Value::String(value.to_string()));
            }
        }
    }
}

/// A type tag accepted on create and the constructor it maps to.
#[derive(Debug, Clone, Copy)]
pub struct CreateType {
    pub tag: &'static str,
    pub kind: ElementKind,
    pub seed: &'static [Seed],
}

impl CreateType {
    pub const fn plain(kind: ElementKind) -> Self {
        CreateType {
            tag: kind.tag(),
            kind,
            seed: &[],
        }
    }

    pub const fn alias(tag: &'static str, kind: ElementKind, seed: &'static [Seed]) -> Self {
        CreateType { tag, kind, seed }
    }
}

/// Parent handed to the factory on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The diagram's owning element.
    DiagramParent,
    /// The diagram itself; the factory resolves the real owner.
    Diagram,
}

/// Extra response fields, merged over the default serialization.
pub type Serializer = fn(&Graph, &Element) -> Map<String, Value>;

#[derive(Debug, Clone, Copy)]
pub struct ChildSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ElementKind,
    /// Collection on the parent the child is created in.
    pub field: &'static str,
    pub create_fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    pub name: &'static str,
    /// Used in not-found messages.
    pub label: &'static str,
    pub create_types: &'static [CreateType],
    /// Kinds listed and accepted by get/update/delete; defaults to the create kinds.
    pub model_kinds: &'static [ElementKind],
    pub create_fields: &'static [FieldSpec],
    pub update_fields: &'static [FieldSpec],
    pub serializer: Option<Serializer>,
    pub children: &'static [ChildSpec],
    pub owner: Owner,
}

impl ResourceSpec {
    pub fn model_kinds(&self) -> Vec<ElementKind> {
        if !self.model_kinds.is_empty() {
            return self.model_kinds.to_vec();
        }
        let mut kinds: Vec<ElementKind> = Vec::new();
        for t in self.create_types {
            if !kinds.contains(&t.kind) {
                kinds.push(t.kind);
            }
        }
        kinds
    }

    pub fn create_type(&self, tag: &str) -> Option<&CreateType> {
        self.create_types.iter().find(|t| t.tag == tag)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelationSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ElementKind,
    pub model_kind: Option<ElementKind>,
    /// Whether the relation carries structured `end1`/`end2` objects.
    pub ends: bool,
    pub end_fields: &'static [FieldSpec],
    pub create_fields: &'static [FieldSpec],
    pub update_fields: &'static [FieldSpec],
    pub serializer: Option<Serializer>,
}

impl RelationSpec {
    pub fn model_kind(&self) -> ElementKind {
        self.model_kind.unwrap_or(self.kind)
    }
}

/// One family: a URL prefix, its diagram kinds, resources and relations.
#[derive(Debug, Clone, Copy)]
pub struct FamilyConfig {
    pub prefix: &'static str,
    pub label: &'static str,
    pub diagram_kinds: &'static [ElementKind],
    pub resources: &'static [ResourceSpec],
    pub relations: &'static [RelationSpec],
}

fn duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = Vec::new();
    for name in names {
        if seen.contains(&name) {
            return Some(name);
        }
        seen.push(name);
    }
    None
}

impl FamilyConfig {
    /// Structural checks run once at startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.diagram_kinds.iter().any(|k| !k.is_diagram()) {
            return Err(format!("family '{}' lists a non-diagram kind", self.prefix));
        }
        let names = self
            .resources
            .iter()
            .map(|r| r.name)
            .chain(self.relations.iter().map(|r| r.name));
        if let Some(name) = duplicates(names) {
            return Err(format!("family '{}' declares '{}' twice", self.prefix, name));
        }
        for r in self.resources {
            if r.create_types.is_empty() {
                return Err(format!("resource '{}/{}' has no create type", self.prefix, r.name));
            }
            if let Some(tag) = duplicates(r.create_types.iter().map(|t| t.tag)) {
                return Err(format!("resource '{}/{}' accepts '{}' twice", self.prefix, r.name, tag));
            }
            if let Some(child) = duplicates(r.children.iter().map(|c| c.name)) {
                return Err(format!("resource '{}/{}' declares child '{}' twice", self.prefix, r.name, child));
            }
            for fields in [r.create_fields, r.update_fields] {
                if let Some(wire) = duplicates(fields.iter().map(|f| f.wire)) {
                    return Err(format!("resource '{}/{}' repeats field '{}'", self.prefix, r.name, wire));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::string("name"),
        FieldSpec::string("dataType").renamed("type"),
        FieldSpec::string("fillColor").on_view(),
    ];

    #[test]
    fn const_builders_compose() {
        assert_eq!(FIELDS[1].wire, "dataType");
        assert_eq!(FIELDS[1].prop, "type");
        assert_eq!(FIELDS[2].target, FieldTarget::View);
        let r = FieldSpec::reference("referenceTo", ElementKind::ErdColumn);
        assert_eq!(r.ty, FieldType::Reference);
        assert_eq!(r.refers_to, Some(ElementKind::ErdColumn));
    }

    #[test]
    fn duplicate_resource_names_are_rejected() {
        static RESOURCES: &[ResourceSpec] = &[
            ResourceSpec {
                name: "things",
                label: "Thing",
                create_types: &[CreateType::plain(ElementKind::Class)],
                model_kinds: &[],
                create_fields: &[],
                update_fields: &[],
                serializer: None,
                children: &[],
                owner: Owner::DiagramParent,
            },
            ResourceSpec {
                name: "things",
                label: "Thing",
                create_types: &[CreateType::plain(ElementKind::Interface)],
                model_kinds: &[],
                create_fields: &[],
                update_fields: &[],
                serializer: None,
                children: &[],
                owner: Owner::DiagramParent,
            },
        ];
        let family = FamilyConfig {
            prefix: "dup",
            label: "Duplicates",
            diagram_kinds: &[ElementKind::ClassDiagram],
            resources: RESOURCES,
            relations: &[],
        };
        assert_eq!(family.validate().unwrap_err(), "family 'dup' declares 'things' twice");
    }

    #[test]
    fn model_kinds_default_to_create_kinds() {
        const CREATE_TYPES: &[CreateType] = &[
            CreateType::plain(ElementKind::FlowchartTerminal),
            CreateType::alias("Start", ElementKind::FlowchartTerminal, &[Seed::Str("terminalKind", "start")]),
            CreateType::plain(ElementKind::FlowchartProcess),
        ];
        let r = ResourceSpec {
            name: "nodes",
            label: "Node",
            create_types: CREATE_TYPES,
            model_kinds: &[],
            create_fields: &[],
            update_fields: &[],
            serializer: None,
            children: &[],
            owner: Owner::DiagramParent,
        };
        assert_eq!(
            r.model_kinds(),
            vec![ElementKind::FlowchartTerminal, ElementKind::FlowchartProcess]
        );
        assert!(r.create_type("Start").is_some());
    }
}
