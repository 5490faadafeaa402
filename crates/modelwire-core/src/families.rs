//! The registered families. Pure data plus a few response serializers.

use serde_json::{Map, Value};

use crate::family::{
    ChildSpec, CreateType, FamilyConfig, FieldSpec, Owner, RelationSpec, ResourceSpec, Seed,
};
use crate::graph::{Element, Graph};
use crate::kind::ElementKind;

/// Closed set of families, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Class,
    Erd,
    UseCase,
    Sequence,
    Timing,
    Flowchart,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Class,
        Family::Erd,
        Family::UseCase,
        Family::Sequence,
        Family::Timing,
        Family::Flowchart,
    ];

    pub fn config(self) -> &'static FamilyConfig {
        match self {
            Family::Class => &CLASS,
            Family::Erd => &ERD,
            Family::UseCase => &USE_CASE,
            Family::Sequence => &SEQUENCE,
            Family::Timing => &TIMING,
            Family::Flowchart => &FLOWCHART,
        }
    }
}

// --- Shared fields ---

const NAME: FieldSpec = FieldSpec::string("name");
const DOC: FieldSpec = FieldSpec::nullable("documentation");
const FILL: FieldSpec = FieldSpec::string("fillColor").on_view();
const LINE: FieldSpec = FieldSpec::string("lineColor").on_view();
const FONT: FieldSpec = FieldSpec::string("fontColor").on_view();
const VISIBILITY: FieldSpec =
    FieldSpec::string("visibility").choices(&["public", "protected", "private", "package"]);
const STEREOTYPE: FieldSpec = FieldSpec::nullable("stereotype");

const NODE_FIELDS: &[FieldSpec] = &[NAME, DOC, FILL, LINE, FONT];
const EDGE_FIELDS: &[FieldSpec] = &[NAME, DOC, LINE];

const TAG_FIELDS: &[FieldSpec] = &[
    NAME,
    FieldSpec::string("value"),
    FieldSpec::reference_any("reference"),
];

const TAGS: ChildSpec = ChildSpec {
    name: "tags",
    label: "Tag",
    kind: ElementKind::Tag,
    field: "tags",
    create_fields: TAG_FIELDS,
};

const OPERATIONS: ChildSpec = ChildSpec {
    name: "operations",
    label: "Operation",
    kind: ElementKind::Operation,
    field: "operations",
    create_fields: &[
        NAME,
        DOC,
        VISIBILITY,
        FieldSpec::string("returnType"),
        FieldSpec::boolean("isAbstract"),
        FieldSpec::boolean("isStatic"),
    ],
};

// --- Class ---

const CLASS_FIELDS: &[FieldSpec] = &[
    NAME,
    DOC,
    VISIBILITY,
    STEREOTYPE,
    FieldSpec::boolean("isAbstract"),
    FILL,
    LINE,
    FONT,
];

const MULTIPLICITY: &[&str] = &["0..1", "1", "0..*", "1..*", "*"];

const ASSOCIATION_END: &[FieldSpec] = &[
    NAME,
    FieldSpec::boolean("navigable"),
    FieldSpec::string("multiplicity").choices(MULTIPLICITY),
    FieldSpec::string("aggregation").choices(&["none", "shared", "composite"]),
];

static CLASS: FamilyConfig = FamilyConfig {
    prefix: "class",
    label: "Class diagram",
    diagram_kinds: &[ElementKind::ClassDiagram],
    resources: &[
        ResourceSpec {
            name: "classes",
            label: "Class",
            create_types: &[
                CreateType::plain(ElementKind::Class),
                CreateType::alias("AbstractClass", ElementKind::Class, &[Seed::Bool("isAbstract", true)]),
            ],
            model_kinds: &[],
            create_fields: CLASS_FIELDS,
            update_fields: CLASS_FIELDS,
            serializer: Some(class_members),
            children: &[
                ChildSpec {
                    name: "attributes",
                    label: "Attribute",
                    kind: ElementKind::Attribute,
                    field: "attributes",
                    create_fields: &[
                        NAME,
                        DOC,
                        VISIBILITY,
                        FieldSpec::string("dataType").renamed("type"),
                        FieldSpec::nullable("defaultValue"),
                        FieldSpec::boolean("isStatic"),
                    ],
                },
                OPERATIONS,
                ChildSpec {
                    name: "ports",
                    label: "Port",
                    kind: ElementKind::Port,
                    field: "ports",
                    create_fields: &[NAME, DOC, FieldSpec::boolean("isBehavior")],
                },
                TAGS,
            ],
            owner: Owner::DiagramParent,
        },
        ResourceSpec {
            name: "interfaces",
            label: "Interface",
            create_types: &[CreateType::plain(ElementKind::Interface)],
            model_kinds: &[],
            create_fields: CLASS_FIELDS,
            update_fields: CLASS_FIELDS,
            serializer: Some(class_members),
            children: &[OPERATIONS, TAGS],
            owner: Owner::DiagramParent,
        },
        ResourceSpec {
            name: "enumerations",
            label: "Enumeration",
            create_types: &[CreateType::plain(ElementKind::Enumeration)],
            model_kinds: &[],
            create_fields: NODE_FIELDS,
            update_fields: NODE_FIELDS,
            serializer: Some(enumeration_literals),
            children: &[ChildSpec {
                name: "literals",
                label: "EnumerationLiteral",
                kind: ElementKind::EnumerationLiteral,
                field: "literals",
                create_fields: &[NAME, DOC],
            }],
            owner: Owner::DiagramParent,
        },
        ResourceSpec {
            name: "packages",
            label: "Package",
            create_types: &[CreateType::plain(ElementKind::Package)],
            model_kinds: &[],
            create_fields: NODE_FIELDS,
            update_fields: NODE_FIELDS,
            serializer: None,
            children: &[],
            owner: Owner::DiagramParent,
        },
    ],
    relations: &[
        RelationSpec {
            name: "associations",
            label: "Association",
            kind: ElementKind::Association,
            model_kind: None,
            ends: true,
            end_fields: ASSOCIATION_END,
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
        RelationSpec {
            name: "generalizations",
            label: "Generalization",
            kind: ElementKind::Generalization,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
        RelationSpec {
            name: "dependencies",
            label: "Dependency",
            kind: ElementKind::Dependency,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
        RelationSpec {
            name: "realizations",
            label: "InterfaceRealization",
            kind: ElementKind::InterfaceRealization,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
    ],
};

// --- ERD ---

const ENTITY_FIELDS: &[FieldSpec] = &[NAME, DOC, FieldSpec::nullable("physicalName"), FILL, LINE, FONT];

static ERD: FamilyConfig = FamilyConfig {
    prefix: "erd",
    label: "Entity-relationship diagram",
    diagram_kinds: &[ElementKind::ErdDiagram],
    resources: &[ResourceSpec {
        name: "entities",
        label: "Entity",
        create_types: &[CreateType::plain(ElementKind::ErdEntity)],
        model_kinds: &[],
        create_fields: ENTITY_FIELDS,
        update_fields: ENTITY_FIELDS,
        serializer: Some(entity_columns),
        children: &[
            ChildSpec {
                name: "columns",
                label: "Column",
                kind: ElementKind::ErdColumn,
                field: "columns",
                create_fields: &[
                    NAME,
                    DOC,
                    FieldSpec::string("dataType").renamed("type"),
                    FieldSpec::number("length"),
                    FieldSpec::boolean("primaryKey"),
                    FieldSpec::boolean("foreignKey"),
                    FieldSpec::boolean("nullable"),
                    FieldSpec::boolean("unique"),
                    FieldSpec::reference("referenceTo", ElementKind::ErdColumn),
                ],
            },
            TAGS,
        ],
        owner: Owner::DiagramParent,
    }],
    relations: &[RelationSpec {
        name: "relationships",
        label: "Relationship",
        kind: ElementKind::ErdRelationship,
        model_kind: None,
        ends: true,
        end_fields: &[
            NAME,
            FieldSpec::string("cardinality").choices(&["0..1", "1", "0..*", "1..*"]),
        ],
        create_fields: &[NAME, DOC, LINE, FieldSpec::boolean("identifying")],
        update_fields: &[NAME, DOC, LINE, FieldSpec::boolean("identifying")],
        serializer: Some(relation_ends),
    }],
};

// --- Use case ---

static USE_CASE: FamilyConfig = FamilyConfig {
    prefix: "usecase",
    label: "Use case diagram",
    diagram_kinds: &[ElementKind::UseCaseDiagram],
    resources: &[
        ResourceSpec {
            name: "actors",
            label: "Actor",
            create_types: &[CreateType::plain(ElementKind::Actor)],
            model_kinds: &[],
            create_fields: NODE_FIELDS,
            update_fields: NODE_FIELDS,
            serializer: None,
            children: &[TAGS],
            owner: Owner::DiagramParent,
        },
        ResourceSpec {
            name: "use-cases",
            label: "UseCase",
            create_types: &[CreateType::plain(ElementKind::UseCase)],
            model_kinds: &[],
            create_fields: NODE_FIELDS,
            update_fields: NODE_FIELDS,
            serializer: None,
            children: &[TAGS],
            owner: Owner::DiagramParent,
        },
        ResourceSpec {
            name: "subjects",
            label: "UseCaseSubject",
            create_types: &[CreateType::plain(ElementKind::UseCaseSubject)],
            model_kinds: &[],
            create_fields: NODE_FIELDS,
            update_fields: NODE_FIELDS,
            serializer: None,
            children: &[],
            owner: Owner::DiagramParent,
        },
    ],
    relations: &[
        RelationSpec {
            name: "associations",
            label: "Association",
            kind: ElementKind::Association,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
        RelationSpec {
            name: "includes",
            label: "Include",
            kind: ElementKind::Include,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
        RelationSpec {
            name: "extends",
            label: "Extend",
            kind: ElementKind::Extend,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: &[NAME, DOC, LINE, FieldSpec::nullable("condition")],
            update_fields: &[NAME, DOC, LINE, FieldSpec::nullable("condition")],
            serializer: Some(relation_ends),
        },
        RelationSpec {
            name: "generalizations",
            label: "Generalization",
            kind: ElementKind::Generalization,
            model_kind: None,
            ends: false,
            end_fields: &[],
            create_fields: EDGE_FIELDS,
            update_fields: EDGE_FIELDS,
            serializer: Some(relation_ends),
        },
    ],
};

// --- Sequence ---

const MESSAGE_FIELDS: &[FieldSpec] = &[
    NAME,
    DOC,
    LINE,
    FieldSpec::string("messageSort").choices(&[
        "synchCall",
        "asynchCall",
        "asynchSignal",
        "reply",
        "createMessage",
        "deleteMessage",
    ]),
    FieldSpec::string("arguments"),
    FieldSpec::nullable("guard"),
];

static SEQUENCE: FamilyConfig = FamilyConfig {
    prefix: "sequence",
    label: "Sequence diagram",
    diagram_kinds: &[ElementKind::SequenceDiagram],
    resources: &[ResourceSpec {
        name: "lifelines",
        label: "Lifeline",
        create_types: &[CreateType::plain(ElementKind::Lifeline)],
        model_kinds: &[],
        create_fields: &[NAME, DOC, FieldSpec::nullable("selector"), FILL, LINE, FONT],
        update_fields: &[NAME, DOC, FieldSpec::nullable("selector"), FILL, LINE, FONT],
        serializer: Some(lifeline_represent),
        children: &[],
        owner: Owner::Diagram,
    }],
    relations: &[RelationSpec {
        name: "messages",
        label: "Message",
        kind: ElementKind::Message,
        model_kind: None,
        ends: false,
        end_fields: &[],
        create_fields: MESSAGE_FIELDS,
        update_fields: MESSAGE_FIELDS,
        serializer: Some(relation_ends),
    }],
};

// --- Timing ---

static TIMING: FamilyConfig = FamilyConfig {
    prefix: "timing",
    label: "Timing diagram",
    diagram_kinds: &[ElementKind::TimingDiagram],
    resources: &[ResourceSpec {
        name: "lifelines",
        label: "TimingLifeline",
        create_types: &[CreateType::plain(ElementKind::TimingLifeline)],
        model_kinds: &[],
        create_fields: NODE_FIELDS,
        update_fields: NODE_FIELDS,
        serializer: Some(timing_states),
        children: &[ChildSpec {
            name: "states",
            label: "TimingState",
            kind: ElementKind::TimingState,
            field: "states",
            create_fields: &[NAME, DOC],
        }],
        owner: Owner::Diagram,
    }],
    relations: &[],
};

// --- Flowchart ---

const TERMINAL_KIND: FieldSpec = FieldSpec::string("terminalKind").choices(&["start", "end"]);

static FLOWCHART: FamilyConfig = FamilyConfig {
    prefix: "flowchart",
    label: "Flowchart",
    diagram_kinds: &[ElementKind::FlowchartDiagram],
    resources: &[ResourceSpec {
        name: "nodes",
        label: "FlowchartNode",
        create_types: &[
            CreateType::alias("Process", ElementKind::FlowchartProcess, &[]),
            CreateType::alias("Decision", ElementKind::FlowchartDecision, &[]),
            CreateType::alias("Terminal", ElementKind::FlowchartTerminal, &[]),
            CreateType::alias("Data", ElementKind::FlowchartData, &[]),
            CreateType::alias(
                "Start",
                ElementKind::FlowchartTerminal,
                &[Seed::Str("terminalKind", "start")],
            ),
            CreateType::alias(
                "End",
                ElementKind::FlowchartTerminal,
                &[Seed::Str("terminalKind", "end")],
            ),
        ],
        model_kinds: &[],
        create_fields: &[NAME, DOC, TERMINAL_KIND, FILL, LINE, FONT],
        update_fields: &[NAME, DOC, TERMINAL_KIND, FILL, LINE, FONT],
        serializer: None,
        children: &[],
        owner: Owner::DiagramParent,
    }],
    relations: &[RelationSpec {
        name: "flows",
        label: "Flow",
        kind: ElementKind::FlowchartFlow,
        model_kind: None,
        ends: false,
        end_fields: &[],
        create_fields: &[NAME, DOC, LINE, FieldSpec::nullable("guard")],
        update_fields: &[NAME, DOC, LINE, FieldSpec::nullable("guard")],
        serializer: Some(relation_ends),
    }],
};

// --- Serializers ---

fn rows(graph: &Graph, parent: &Element, kind: ElementKind, props: &[(&str, &str)]) -> Value {
    let rows: Vec<Value> = graph
        .children_of(&parent.id)
        .into_iter()
        .filter(|c| c.kind == kind)
        .map(|c| {
            let mut row = Map::new();
            row.insert("id".to_string(), Value::String(c.id.clone()));
            row.insert("name".to_string(), Value::String(c.name.clone()));
            for (wire, prop) in props {
                if let Some(value) = c.prop(prop) {
                    row.insert(wire.to_string(), value.clone());
                }
            }
            Value::Object(row)
        })
        .collect();
    Value::Array(rows)
}

fn class_members(graph: &Graph, element: &Element) -> Map<String, Value> {
    let mut out = Map::new();
    if element.kind == ElementKind::Class {
        out.insert(
            "attributes".to_string(),
            rows(
                graph,
                element,
                ElementKind::Attribute,
                &[("dataType", "type"), ("visibility", "visibility"), ("isStatic", "isStatic")],
            ),
        );
        out.insert(
            "ports".to_string(),
            rows(graph, element, ElementKind::Port, &[("isBehavior", "isBehavior")]),
        );
    }
    out.insert(
        "operations".to_string(),
        rows(
            graph,
            element,
            ElementKind::Operation,
            &[("returnType", "returnType"), ("visibility", "visibility")],
        ),
    );
    out.insert(
        "tags".to_string(),
        rows(graph, element, ElementKind::Tag, &[("value", "value"), ("reference", "reference")]),
    );
    out
}

fn enumeration_literals(graph: &Graph, element: &Element) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(
        "literals".to_string(),
        rows(graph, element, ElementKind::EnumerationLiteral, &[]),
    );
    out
}

fn entity_columns(graph: &Graph, element: &Element) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(
        "columns".to_string(),
        rows(
            graph,
            element,
            ElementKind::ErdColumn,
            &[
                ("dataType", "type"),
                ("length", "length"),
                ("primaryKey", "primaryKey"),
                ("foreignKey", "foreignKey"),
                ("nullable", "nullable"),
                ("referenceTo", "referenceTo"),
            ],
        ),
    );
    out
}

fn relation_ends(_graph: &Graph, element: &Element) -> Map<String, Value> {
    let mut out = Map::new();
    for (wire, prop) in [("sourceId", "source"), ("targetId", "target")] {
        let value = element.prop(prop).cloned().unwrap_or(Value::Null);
        out.insert(wire.to_string(), value);
    }
    for end in ["end1", "end2"] {
        if let Some(value) = element.prop(end) {
            out.insert(end.to_string(), value.clone());
        }
    }
    out
}

fn lifeline_represent(graph: &Graph, element: &Element) -> Map<String, Value> {
    let mut out = Map::new();
    let represent = element.reference("represent");
    out.insert(
        "representId".to_string(),
        represent.map(|r| Value::String(r.to_string())).unwrap_or(Value::Null),
    );
    if let Some(attr) = represent.and_then(|r| graph.get_by_id(r)) {
        out.insert("representType".to_string(), attr.prop("type").cloned().unwrap_or(Value::Null));
    }
    out
}

fn timing_states(graph: &Graph, element: &Element) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("states".to_string(), rows(graph, element, ElementKind::TimingState, &[]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_family_is_well_formed() {
        for family in Family::ALL {
            family.config().validate().unwrap();
        }
    }

    #[test]
    fn prefixes_are_unique() {
        let prefixes: HashSet<&str> = Family::ALL.iter().map(|f| f.config().prefix).collect();
        assert_eq!(prefixes.len(), Family::ALL.len());
    }

    #[test]
    fn every_create_type_is_placeable_on_its_family_diagram() {
        for family in Family::ALL {
            let config = family.config();
            for resource in config.resources {
                for t in resource.create_types {
                    assert!(
                        config.diagram_kinds.iter().any(|d| t.kind.placeable_on(*d)),
                        "{}/{} type {}",
                        config.prefix,
                        resource.name,
                        t.tag
                    );
                }
            }
            for relation in config.relations {
                assert!(config.diagram_kinds.iter().any(|d| relation.kind.placeable_on(*d)));
            }
        }
    }

    #[test]
    fn abstract_class_alias_seeds_flag() {
        let classes = &Family::Class.config().resources[0];
        let alias = classes.create_type("AbstractClass").unwrap();
        assert_eq!(alias.kind, ElementKind::Class);
        let mut init = Map::new();
        for seed in alias.seed {
            seed.apply(&mut init);
        }
        assert_eq!(init["isAbstract"], Value::Bool(true));
    }
}
