//! Turns a [`FamilyConfig`] into its CRUD route table.
//!
//! No handler here knows about a specific family: everything is driven by the
//! resource, child and relation specs captured in each route's closure.

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::families::Family;
use crate::family::{ChildSpec, FamilyConfig, FieldSpec, FieldTarget, Owner, RelationSpec, ResourceSpec, Serializer};
use crate::geometry::{auto_expand_frame, clear_edge_waypoints};
use crate::graph::{Element, ElementId, Graph, HostError, Placement, Rect, Target};
use crate::integrity;
use crate::kind::{ElementKind, ViewKind};
use crate::response::{Method, Outcome, Reply};
use crate::router::{Call, Route};
use crate::validate::{self, Body, FieldType};
use crate::Workspace;

const COORDINATES: [&str; 4] = ["x1", "y1", "x2", "y2"];

/// Everything get/update/delete/serialize need about one resource shape.
#[derive(Debug, Clone)]
struct Surface {
    label: &'static str,
    kinds: Vec<ElementKind>,
    create_fields: &'static [FieldSpec],
    update_fields: &'static [FieldSpec],
    end_fields: Option<&'static [FieldSpec]>,
    serializer: Option<Serializer>,
}

impl Surface {
    fn resource(spec: &ResourceSpec) -> Self {
        Surface {
            label: spec.label,
            kinds: spec.model_kinds(),
            create_fields: spec.create_fields,
            update_fields: spec.update_fields,
            end_fields: None,
            serializer: spec.serializer,
        }
    }

    fn relation(spec: &RelationSpec) -> Self {
        Surface {
            label: spec.label,
            kinds: vec![spec.model_kind()],
            create_fields: spec.create_fields,
            update_fields: spec.update_fields,
            end_fields: spec.ends.then_some(spec.end_fields),
            serializer: spec.serializer,
        }
    }

    fn child(spec: &ChildSpec) -> Self {
        Surface {
            label: spec.label,
            kinds: vec![spec.kind],
            create_fields: spec.create_fields,
            update_fields: spec.create_fields,
            end_fields: None,
            serializer: None,
        }
    }
}

// --- Compilation ---

/// Compile one family into its routes: list/create and get/update/delete
/// per resource and relation, plus list/create per child.
pub fn compile(family: &'static FamilyConfig) -> Vec<Route> {
    let mut routes = Vec::new();
    let base = format!("/api/{}", family.prefix);

    for spec in family.resources {
        let collection = format!("{}/{}", base, spec.name);
        let item = format!("{}/{{id}}", collection);
        let surface = Surface::resource(spec);

        let s = surface.clone();
        routes.push(Route::new(Method::Get, collection.clone(), move |ws, call| {
            Reply::from(list(&ws.graph, family, &s, call))
        }));
        routes.push(Route::new(Method::Post, collection, move |ws, call| {
            Reply::from(create_resource(ws, family, spec, call))
        }));

        for child in spec.children {
            let path = format!("{}/{}", item, child.name);
            let s = surface.clone();
            routes.push(Route::new(Method::Get, path.clone(), move |ws, call| {
                Reply::from(list_children(&ws.graph, &s, child, call))
            }));
            let s = surface.clone();
            routes.push(Route::new(Method::Post, path, move |ws, call| {
                Reply::from(create_child(ws, &s, child, call))
            }));
        }
        push_item_routes(&mut routes, &item, surface);
    }

    for spec in family.relations {
        let collection = format!("{}/{}", base, spec.name);
        let item = format!("{}/{{id}}", collection);
        let surface = Surface::relation(spec);

        let s = surface.clone();
        routes.push(Route::new(Method::Get, collection.clone(), move |ws, call| {
            Reply::from(list(&ws.graph, family, &s, call))
        }));
        routes.push(Route::new(Method::Post, collection, move |ws, call| {
            Reply::from(create_relation(ws, family, spec, call))
        }));
        push_item_routes(&mut routes, &item, surface);
    }

    debug!(prefix = family.prefix, routes = routes.len(), "family compiled");
    routes
}

fn push_item_routes(routes: &mut Vec<Route>, item: &str, surface: Surface) {
    let s = surface.clone();
    routes.push(Route::new(Method::Get, item, move |ws, call| {
        Reply::from(get(&ws.graph, &s, call))
    }));
    let s = surface.clone();
    routes.push(Route::new(Method::Put, item, move |ws, call| {
        Reply::from(update(ws, &s, call))
    }));
    routes.push(Route::new(Method::Delete, item, move |ws, call| {
        Reply::from(delete(ws, &surface, call))
    }));
}

// --- Serialization ---

/// Default serialization (id, type, name, documentation, parent and the
/// declared model fields) with the surface's serializer merged over it.
fn serialize(graph: &Graph, element: &Element, surface: &Surface) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), json!(element.id));
    out.insert("type".to_string(), json!(element.kind.tag()));
    out.insert("name".to_string(), json!(element.name));
    if let Some(doc) = element.documentation() {
        out.insert("documentation".to_string(), json!(doc));
    }
    out.insert(
        "parentId".to_string(),
        element.parent.clone().map(Value::String).unwrap_or(Value::Null),
    );
    let declared = surface.create_fields.iter().chain(surface.update_fields);
    for field in declared.filter(|f| f.target == FieldTarget::Model) {
        if matches!(field.wire, "name" | "documentation") || out.contains_key(field.wire) {
            continue;
        }
        if let Some(value) = element.prop(field.prop) {
            out.insert(field.wire.to_string(), value.clone());
        }
    }
    if let Some(extra) = surface.serializer {
        out.extend(extra(graph, element));
    }
    Value::Object(out)
}

// --- Validation helpers ---

fn field_types(body: &Body, fields: &[FieldSpec]) -> Option<String> {
    fields
        .iter()
        .find_map(|f| validate::check_type(body, f.wire, f.ty))
}

fn field_values(body: &Body, fields: &[FieldSpec]) -> Option<String> {
    fields.iter().find_map(|f| {
        if f.wire == "name" {
            if let Some(err) = validate::non_empty_string(body, f.wire) {
                return Some(err);
            }
        }
        if f.choices.is_empty() {
            None
        } else {
            validate::one_of(body, f.wire, f.choices)
        }
    })
}

fn coordinate_types(body: &Body) -> Option<String> {
    COORDINATES
        .iter()
        .find_map(|c| validate::check_type(body, c, FieldType::Number))
}

fn end_checks(body: &Body, end_fields: &[FieldSpec]) -> Option<String> {
    let allowed: Vec<&str> = end_fields.iter().map(|f| f.wire).collect();
    ["end1", "end2"].iter().find_map(|end| {
        let value = body.get(*end)?.as_object()?;
        validate::unknown_fields(value, &allowed)
            .or_else(|| field_types(value, end_fields))
            .or_else(|| field_values(value, end_fields))
            .map(|err| format!("{}: {}", end, err))
    })
}

fn wires(fields: &[FieldSpec]) -> Vec<&'static str> {
    fields.iter().map(|f| f.wire).collect()
}

/// Reference-typed fields must name an existing element of the declared kind.
fn check_references(graph: &Graph, body: &Body, fields: &[FieldSpec]) -> Result<(), ApiError> {
    for field in fields.iter().filter(|f| f.ty == FieldType::Reference) {
        let Some(id) = body.get(field.wire).and_then(Value::as_str) else {
            continue;
        };
        let target = graph.get_by_id(id);
        let kind_ok = match (target, field.refers_to) {
            (Some(t), Some(kind)) => t.kind == kind,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !kind_ok {
            let label = field.refers_to.map(ElementKind::tag).unwrap_or("Element");
            return Err(ApiError::not_found(label, id));
        }
    }
    Ok(())
}

// --- Raw property writes ---

/// Model-targeted field declarations for `kind` across every family, keyed
/// by property path. Relation end fields appear as `end1.<prop>`/`end2.<prop>`.
pub fn declared_fields(kind: ElementKind) -> Vec<(String, &'static FieldSpec)> {
    let mut out: Vec<(String, &'static FieldSpec)> = Vec::new();
    let mut push = |path: String, field: &'static FieldSpec| {
        if field.target == FieldTarget::Model && !out.iter().any(|(p, _)| *p == path) {
            out.push((path, field));
        }
    };
    for family in Family::ALL {
        let config = family.config();
        for spec in config.resources {
            if spec.model_kinds().contains(&kind) {
                for field in spec.create_fields.iter().chain(spec.update_fields) {
                    push(field.prop.to_string(), field);
                }
            }
            for child in spec.children.iter().filter(|c| c.kind == kind) {
                for field in child.create_fields {
                    push(field.prop.to_string(), field);
                }
            }
        }
        for spec in config.relations.iter().filter(|r| r.model_kind() == kind) {
            for field in spec.create_fields.iter().chain(spec.update_fields) {
                push(field.prop.to_string(), field);
            }
            if spec.ends {
                for end in ["end1", "end2"] {
                    for field in spec.end_fields {
                        push(format!("{}.{}", end, field.prop), field);
                    }
                }
            }
        }
    }
    out
}

/// Check one raw `properties` write against the element's reference fields
/// and any declared field type or value set.
pub fn check_property_write(graph: &Graph, element: &Element, path: &str, value: &Value) -> Result<(), ApiError> {
    let kind = element.kind;
    if kind.reference_fields().contains(&path) {
        if kind.is_relation() {
            return Err(ApiError::Validation(format!(
                "Field '{}' is a relation endpoint; use PUT /api/views/{{id}}/reconnect",
                path
            )));
        }
        if value.is_null() && kind.linked_field() != Some(path) {
            return Ok(());
        }
        let Some(target) = value.as_str() else {
            return Err(ApiError::Validation(format!("Field '{}' must be an element id", path)));
        };
        let required = kind.reference_kind(path);
        return match graph.get_by_id(target) {
            Some(t) if required.map_or(true, |k| t.kind == k) => Ok(()),
            _ => Err(ApiError::not_found(required.map(ElementKind::tag).unwrap_or("Element"), target)),
        };
    }

    let declared = declared_fields(kind);
    let Some((_, field)) = declared.iter().find(|(p, _)| p == path) else {
        if path.starts_with("end1.") || path.starts_with("end2.") {
            return Err(ApiError::Validation(format!("Field '{}' is not declared for {}", path, kind)));
        }
        return Ok(());
    };
    let mut body = Body::new();
    body.insert(path.to_string(), value.clone());
    let check = validate::check_type(&body, path, field.ty)
        .or_else(|| {
            if field.wire == "name" {
                validate::non_empty_string(&body, path)
            } else {
                None
            }
        })
        .or_else(|| {
            if field.choices.is_empty() {
                None
            } else {
                validate::one_of(&body, path, field.choices)
            }
        });
    match check {
        Some(message) => Err(ApiError::Validation(message)),
        None => Ok(()),
    }
}

// --- Lookup helpers ---

fn find<'g>(graph: &'g Graph, surface: &Surface, id: &str) -> Result<&'g Element, ApiError> {
    graph
        .get_by_id(id)
        .filter(|e| surface.kinds.contains(&e.kind))
        .ok_or_else(|| ApiError::not_found(surface.label, id))
}

fn resolve_diagram<'g>(graph: &'g Graph, family: &FamilyConfig, id: &str) -> Result<&'g Element, ApiError> {
    graph
        .get_by_id(id)
        .filter(|d| family.diagram_kinds.contains(&d.kind))
        .ok_or_else(|| ApiError::not_found("Diagram", id))
}

fn string_field<'b>(body: &'b Body, field: &str) -> Option<&'b str> {
    body.get(field).and_then(Value::as_str)
}

/// Placement from x1/y1/x2/y2, else the next auto-layout cell.
fn placement_rect(ws: &Workspace, diagram: &str, body: &Body, view_kind: ViewKind) -> Rect {
    let layout = &ws.layout;
    let number = |key: &str| body.get(key).and_then(Value::as_f64);

    if view_kind.is_frame_tracking() {
        let frame = ws.graph.frame_of(diagram);
        let left = frame.map(|f| f.left).unwrap_or(0.0);
        let width = frame.map(|f| f.width).unwrap_or(layout.frame_width);
        let next_top = ws
            .graph
            .views_on(diagram)
            .into_iter()
            .filter(|v| v.kind.is_frame_tracking())
            .map(|v| v.top + v.height)
            .fold(frame.map(|f| f.top + layout.frame_margin).unwrap_or(0.0), f64::max);
        return Rect {
            left,
            top: number("y1").unwrap_or(next_top),
            width,
            height: layout.lane_height,
        };
    }

    match (number("x1"), number("y1")) {
        (Some(x1), Some(y1)) => {
            let (x2, y2) = (
                number("x2").unwrap_or(x1 + layout.node_width),
                number("y2").unwrap_or(y1 + layout.node_height),
            );
            Rect {
                left: x1.min(x2),
                top: y1.min(y2),
                width: (x2 - x1).abs(),
                height: (y2 - y1).abs(),
            }
        }
        _ => {
            let placed = ws
                .graph
                .views_on(diagram)
                .iter()
                .filter(|v| matches!(v.kind, ViewKind::Node | ViewKind::Note))
                .count();
            let (left, top) = layout.grid_position(placed);
            Rect {
                left,
                top,
                width: layout.node_width,
                height: layout.node_height,
            }
        }
    }
}

/// Apply declared fields present in `body`; unchanged values are skipped by
/// the graph.
fn apply_fields(graph: &mut Graph, id: &str, body: &Body, fields: &[FieldSpec]) -> Result<(), HostError> {
    for field in fields {
        let Some(value) = body.get(field.wire) else {
            continue;
        };
        match field.target {
            FieldTarget::Model => graph.set_property(Target::Element(id), field.prop, value.clone())?,
            FieldTarget::View => {
                let views: Vec<String> = graph.views_of(id).iter().map(|v| v.id.clone()).collect();
                for view in views {
                    graph.set_property(Target::View(&view), field.prop, value.clone())?;
                }
            }
        }
    }
    Ok(())
}

fn apply_ends(graph: &mut Graph, id: &str, body: &Body, end_fields: &[FieldSpec]) -> Result<(), HostError> {
    for end in ["end1", "end2"] {
        let Some(values) = body.get(end).and_then(Value::as_object) else {
            continue;
        };
        for field in end_fields {
            if let Some(value) = values.get(field.wire) {
                let path = format!("{}.{}", end, field.prop);
                graph.set_property(Target::Element(id), &path, value.clone())?;
            }
        }
    }
    Ok(())
}

fn model_init(body: &Body) -> Map<String, Value> {
    let mut init = Map::new();
    if let Some(name) = string_field(body, "name") {
        init.insert("name".to_string(), Value::String(name.to_string()));
    }
    init
}

// --- Handlers ---

fn list(graph: &Graph, family: &FamilyConfig, surface: &Surface, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let diagram = match call.query("diagramId") {
        Some(id) => Some(resolve_diagram(graph, family, id)?.id.clone()),
        None => None,
    };
    let items: Vec<Value> = surface
        .kinds
        .iter()
        .flat_map(|kind| graph.select_by_kind(*kind))
        .filter(|e| {
            diagram
                .as_deref()
                .map_or(true, |d| graph.find_view_on_diagram(d, &e.id).is_some())
        })
        .map(|e| serialize(graph, e, surface))
        .collect();
    Ok(Outcome::data(Value::Array(items)))
}

fn get(graph: &Graph, surface: &Surface, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let element = find(graph, surface, call.param("id"))?;
    Ok(Outcome::data(serialize(graph, element, surface)))
}

fn create_resource(
    ws: &mut Workspace,
    family: &FamilyConfig,
    spec: &ResourceSpec,
    call: &Call<'_>,
) -> Result<Outcome, ApiError> {
    let body = validate::body_object(call.body)?;
    let mut allowed = wires(spec.create_fields);
    allowed.extend(["diagramId", "x1", "y1", "x2", "y2"]);
    let tags: Vec<&str> = spec.create_types.iter().map(|t| t.tag).collect();
    if tags.len() > 1 {
        allowed.push("type");
    }
    validate::run(
        &body,
        &[
            &|b: &Body| validate::unknown_fields(b, &allowed),
            &|b: &Body| validate::required(b, "diagramId"),
            &|b: &Body| validate::check_type(b, "diagramId", FieldType::String),
            &|b: &Body| validate::check_type(b, "type", FieldType::String),
            &coordinate_types,
            &|b: &Body| field_types(b, spec.create_fields),
            &|b: &Body| validate::one_of(b, "type", &tags),
            &|b: &Body| field_values(b, spec.create_fields),
        ],
    )?;

    let diagram_id = string_field(&body, "diagramId").unwrap_or_default();
    let diagram = resolve_diagram(&ws.graph, family, diagram_id)?.clone();
    let create_type = match string_field(&body, "type") {
        Some(tag) => spec.create_type(tag),
        None => spec.create_types.first(),
    }
    .ok_or_else(|| ApiError::Validation(format!("No create type for {}", spec.name)))?;
    let view_kind = create_type.kind.view_kind().ok_or_else(|| {
        ApiError::Construction(format!("Type {} has no diagram view", create_type.tag))
    })?;
    check_references(&ws.graph, &body, spec.create_fields)?;

    let parent = match spec.owner {
        Owner::Diagram => diagram.id.clone(),
        Owner::DiagramParent => diagram
            .parent
            .clone()
            .ok_or_else(|| ApiError::Construction(format!("Diagram {} has no owner", diagram.id)))?,
    };
    let rect = placement_rect(ws, &diagram.id, &body, view_kind);
    let mut init = model_init(&body);
    for seed in create_type.seed {
        seed.apply(&mut init);
    }
    let margin = ws.layout.frame_margin;

    let id = ws.graph.batch(|g| -> Result<ElementId, ApiError> {
        let (id, _view) = g.create_model_and_view(create_type.kind, &parent, &diagram.id, Placement::at(rect), &init)?;
        apply_fields(g, &id, &body, spec.create_fields)?;
        auto_expand_frame(g, &diagram.id, margin)?;
        Ok(id)
    })?;

    info!(family = family.prefix, resource = spec.name, id = %id, "element created");
    let surface = Surface::resource(spec);
    let element = find(&ws.graph, &surface, &id)?;
    let message = format!("Created {} '{}' ({})", spec.label, element.name, id);
    Ok(Outcome::data(serialize(&ws.graph, element, &surface)).with_message(message))
}

fn create_relation(
    ws: &mut Workspace,
    family: &FamilyConfig,
    spec: &RelationSpec,
    call: &Call<'_>,
) -> Result<Outcome, ApiError> {
    let body = validate::body_object(call.body)?;
    let mut allowed = wires(spec.create_fields);
    allowed.extend(["diagramId", "sourceId", "targetId"]);
    if spec.ends {
        allowed.extend(["end1", "end2"]);
    }
    validate::run(
        &body,
        &[
            &|b: &Body| validate::unknown_fields(b, &allowed),
            &|b: &Body| validate::required(b, "diagramId"),
            &|b: &Body| validate::required(b, "sourceId"),
            &|b: &Body| validate::required(b, "targetId"),
            &|b: &Body| {
                ["diagramId", "sourceId", "targetId"]
                    .iter()
                    .find_map(|f| validate::check_type(b, f, FieldType::String))
            },
            &|b: &Body| validate::check_type(b, "end1", FieldType::Object),
            &|b: &Body| validate::check_type(b, "end2", FieldType::Object),
            &|b: &Body| field_types(b, spec.create_fields),
            &|b: &Body| field_values(b, spec.create_fields),
            &|b: &Body| end_checks(b, spec.end_fields),
        ],
    )?;

    let diagram = resolve_diagram(&ws.graph, family, string_field(&body, "diagramId").unwrap_or_default())?.clone();
    let endpoint = |field: &str| -> Result<String, ApiError> {
        let id = string_field(&body, field).unwrap_or_default();
        ws.graph
            .find_view_by_any_id(&diagram.id, id)
            .map(|v| v.id.clone())
            .ok_or_else(|| ApiError::not_found("View", id))
    };
    let tail = endpoint("sourceId")?;
    let head = endpoint("targetId")?;
    check_references(&ws.graph, &body, spec.create_fields)?;

    let parent = diagram
        .parent
        .clone()
        .ok_or_else(|| ApiError::Construction(format!("Diagram {} has no owner", diagram.id)))?;
    let init = model_init(&body);
    let margin = ws.layout.frame_margin;

    let id = ws.graph.batch(|g| -> Result<ElementId, ApiError> {
        let (id, view) = g.create_model_and_view(spec.kind, &parent, &diagram.id, Placement::between(&tail, &head), &init)?;
        apply_fields(g, &id, &body, spec.create_fields)?;
        if spec.ends {
            apply_ends(g, &id, &body, spec.end_fields)?;
        }
        clear_edge_waypoints(g, &view)?;
        auto_expand_frame(g, &diagram.id, margin)?;
        Ok(id)
    })?;

    info!(family = family.prefix, relation = spec.name, id = %id, "relation created");
    let surface = Surface::relation(spec);
    let element = find(&ws.graph, &surface, &id)?;
    let message = format!("Created {} '{}' ({})", spec.label, element.name, id);
    Ok(Outcome::data(serialize(&ws.graph, element, &surface)).with_message(message))
}

fn update(ws: &mut Workspace, surface: &Surface, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let body = validate::body_object(call.body)?;
    let mut allowed = wires(surface.update_fields);
    if surface.end_fields.is_some() {
        allowed.extend(["end1", "end2"]);
    }
    if body.is_empty() {
        return Err(ApiError::Validation(format!(
            "Update body must contain at least one field. Allowed fields: {}",
            allowed.join(", ")
        )));
    }
    let end_fields = surface.end_fields.unwrap_or(&[]);
    validate::run(
        &body,
        &[
            &|b: &Body| validate::unknown_fields(b, &allowed),
            &|b: &Body| field_types(b, surface.update_fields),
            &|b: &Body| validate::check_type(b, "end1", FieldType::Object),
            &|b: &Body| validate::check_type(b, "end2", FieldType::Object),
            &|b: &Body| field_values(b, surface.update_fields),
            &|b: &Body| end_checks(b, end_fields),
        ],
    )?;

    let id = find(&ws.graph, surface, call.param("id"))?.id.clone();
    check_references(&ws.graph, &body, surface.update_fields)?;
    ws.graph.batch(|g| -> Result<(), HostError> {
        apply_fields(g, &id, &body, surface.update_fields)?;
        apply_ends(g, &id, &body, end_fields)
    })?;

    info!(id = %id, fields = body.len(), "element updated");
    let element = find(&ws.graph, surface, &id)?;
    Ok(Outcome::data(serialize(&ws.graph, element, surface)).with_message(format!("Updated {} {}", surface.label, id)))
}

fn delete(ws: &mut Workspace, surface: &Surface, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let element = find(&ws.graph, surface, call.param("id"))?;
    let (id, name) = (element.id.clone(), element.name.clone());
    let removed = integrity::delete_element(&mut ws.graph, &id)?;
    Ok(Outcome::data(json!({
        "id": id,
        "deletedElements": removed.elements,
        "deletedViews": removed.views,
    }))
    .with_message(format!("Deleted {} '{}' ({})", surface.label, name, id)))
}

fn list_children(graph: &Graph, parent: &Surface, child: &ChildSpec, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let owner = find(graph, parent, call.param("id"))?;
    let surface = Surface::child(child);
    let items: Vec<Value> = graph
        .children_of(&owner.id)
        .into_iter()
        .filter(|c| c.kind == child.kind)
        .map(|c| serialize(graph, c, &surface))
        .collect();
    Ok(Outcome::data(Value::Array(items)))
}

/// Model-only construction first; kinds that need a view are anchored on a
/// view of the parent instead.
fn create_child(ws: &mut Workspace, parent: &Surface, child: &ChildSpec, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let body = validate::body_object(call.body)?;
    let mut allowed = wires(child.create_fields);
    allowed.extend(["diagramId", "x1", "y1", "x2", "y2"]);
    validate::run(
        &body,
        &[
            &|b: &Body| validate::unknown_fields(b, &allowed),
            &|b: &Body| validate::check_type(b, "diagramId", FieldType::String),
            &coordinate_types,
            &|b: &Body| field_types(b, child.create_fields),
            &|b: &Body| field_values(b, child.create_fields),
        ],
    )?;
    let owner = find(&ws.graph, parent, call.param("id"))?.id.clone();
    check_references(&ws.graph, &body, child.create_fields)?;
    let init = model_init(&body);

    let model_only = ws.graph.batch(|g| -> Result<Option<ElementId>, ApiError> {
        match g.create_model(child.kind, &owner, Some(child.field), &init) {
            Ok(id) => {
                apply_fields(g, &id, &body, child.create_fields)?;
                Ok(Some(id))
            }
            Err(HostError::ViewRequired(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    })?;
    let id = match model_only {
        Some(id) => id,
        None => anchored_child(ws, &owner, child, &body, &init)?,
    };

    info!(parent = %owner, child = child.name, id = %id, "child created");
    let surface = Surface::child(child);
    let element = find(&ws.graph, &surface, &id)?;
    let message = format!("Created {} '{}' ({})", child.label, element.name, id);
    Ok(Outcome::data(serialize(&ws.graph, element, &surface)).with_message(message))
}

fn anchored_child(
    ws: &mut Workspace,
    owner: &str,
    child: &ChildSpec,
    body: &Body,
    init: &Map<String, Value>,
) -> Result<ElementId, ApiError> {
    let host = match string_field(body, "diagramId") {
        Some(diagram) => ws
            .graph
            .find_view_on_diagram(diagram, owner)
            .ok_or_else(|| ApiError::not_found("View", format!("{} on {}", owner, diagram)))?,
        None => ws
            .graph
            .views_of(owner)
            .into_iter()
            .find(|v| !v.kind.is_frame())
            .ok_or_else(|| {
                ApiError::Construction(format!(
                    "{} needs a view of {} on a diagram; pass diagramId",
                    child.label, owner
                ))
            })?,
    }
    .clone();

    let number = |key: &str| body.get(key).and_then(Value::as_f64);
    let size = 20.0;
    let rect = Rect {
        left: number("x1").unwrap_or(host.left - size / 2.0),
        top: number("y1").unwrap_or(host.top + size),
        width: size,
        height: size,
    };
    let placement = Placement {
        rect,
        host: Some(host.id.clone()),
        ..Default::default()
    };
    let margin = ws.layout.frame_margin;
    ws.graph.batch(|g| -> Result<ElementId, ApiError> {
        let (id, _) = g.create_model_and_view(child.kind, owner, &host.diagram, placement, init)?;
        apply_fields(g, &id, body, child.create_fields)?;
        auto_expand_frame(g, &host.diagram, margin)?;
        Ok(id)
    })
}
