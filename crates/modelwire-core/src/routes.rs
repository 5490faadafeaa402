//! Hand-written cross-cutting routes: generic element, diagram and view
//! operations, search, undo/redo, layout, alignment, export and project I/O.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::compiler::check_property_write;
use crate::config::modelwire_dir;
use crate::error::ApiError;
use crate::geometry::{auto_expand_frame, bounds, clear_edge_waypoints, fit_frame_to_views, reroute_edges_of};
use crate::graph::{Element, Graph, HostError, Rect, Target, View};
use crate::integrity;
use crate::kind::{ElementKind, ViewKind};
use crate::response::{Method, Outcome, Reply};
use crate::router::{Call, Route};
use crate::validate::{self, FieldType};
use crate::Workspace;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateElementRequest {
    /// New name
    pub name: Option<String>,
    /// New documentation; null clears it
    #[serde(default, deserialize_with = "nullable")]
    #[schemars(with = "Option<String>")]
    pub documentation: Option<Option<String>>,
    /// Raw property writes, keyed by property path (e.g. "end1.multiplicity")
    pub properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiagramRequest {
    /// Diagram type tag, e.g. "ClassDiagram" or "SequenceDiagram"
    #[serde(rename = "type")]
    pub diagram_type: String,
    /// Owning element. Default: the root model.
    pub parent_id: Option<String>,
    /// Display name. Default: type tag plus a counter.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct BatchDeleteRequest {
    /// Diagram ids deleted together; orphans are judged after the whole batch
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDiagramRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schemars(with = "Option<String>")]
    pub documentation: Option<Option<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddViewRequest {
    /// Existing element to place on the diagram
    pub model_id: String,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NoteRequest {
    /// Note text
    pub text: String,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlignRequest {
    /// Views to align; view ids or element ids on this diagram
    pub view_ids: Vec<String>,
    /// "left", "right", "top", "bottom", "center" or "middle"
    pub mode: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveViewRequest {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fill_color: Option<String>,
    pub line_color: Option<String>,
    pub font_color: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    /// New tail endpoint (view id or element id on the edge's diagram)
    pub source_id: Option<String>,
    /// New head endpoint (view id or element id on the edge's diagram)
    pub target_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ProjectFileRequest {
    /// Project file path. Save defaults to the last used path.
    pub path: Option<String>,
}

/// Distinguishes an explicit `null` (clear) from an absent field.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

const ALIGN_MODES: &[&str] = &["left", "right", "top", "bottom", "center", "middle"];

/// JSON schemas of the request bodies above, for the status route.
pub fn schemas() -> Value {
    json!({
        "updateElement": schemars::schema_for!(UpdateElementRequest),
        "createDiagram": schemars::schema_for!(CreateDiagramRequest),
        "deleteDiagrams": schemars::schema_for!(BatchDeleteRequest),
        "updateDiagram": schemars::schema_for!(UpdateDiagramRequest),
        "addView": schemars::schema_for!(AddViewRequest),
        "addNote": schemars::schema_for!(NoteRequest),
        "align": schemars::schema_for!(AlignRequest),
        "moveView": schemars::schema_for!(MoveViewRequest),
        "reconnect": schemars::schema_for!(ReconnectRequest),
        "projectFile": schemars::schema_for!(ProjectFileRequest),
    })
}

// --- Table ---

type SyncHandler = fn(&mut Workspace, &Call<'_>) -> Result<Outcome, ApiError>;

fn sync(method: Method, pattern: &str, handler: SyncHandler) -> Route {
    Route::new(method, pattern, move |ws, call| Reply::from(handler(ws, call)))
}

pub fn cross_cutting() -> Vec<Route> {
    vec![
        sync(Method::Get, "/api/elements/{id}", get_element),
        sync(Method::Get, "/api/elements/{id}/views", element_views),
        sync(Method::Put, "/api/elements/{id}", update_element),
        sync(Method::Delete, "/api/elements/{id}", delete_element),
        sync(Method::Get, "/api/search", search),
        sync(Method::Post, "/api/undo", undo),
        sync(Method::Post, "/api/redo", redo),
        sync(Method::Get, "/api/diagrams", list_diagrams),
        sync(Method::Post, "/api/diagrams", create_diagram),
        sync(Method::Delete, "/api/diagrams", delete_diagrams),
        sync(Method::Get, "/api/diagrams/{id}", get_diagram),
        sync(Method::Put, "/api/diagrams/{id}", update_diagram),
        sync(Method::Delete, "/api/diagrams/{id}", delete_diagram),
        sync(Method::Get, "/api/diagrams/{id}/views", diagram_views),
        sync(Method::Post, "/api/diagrams/{id}/views", add_view),
        sync(Method::Post, "/api/diagrams/{id}/notes", add_note),
        sync(Method::Post, "/api/diagrams/{id}/layout", layout),
        sync(Method::Post, "/api/diagrams/{id}/fit-frame", fit_frame),
        sync(Method::Post, "/api/diagrams/{id}/align", align),
        sync(Method::Get, "/api/diagrams/{id}/export", export),
        sync(Method::Put, "/api/views/{id}", move_view),
        sync(Method::Put, "/api/views/{id}/reconnect", reconnect),
        sync(Method::Delete, "/api/views/{id}", delete_view),
        Route::new(Method::Post, "/api/project/save", save_project),
        Route::new(Method::Post, "/api/project/open", open_project),
    ]
}

// --- Helpers ---

/// Reject unknown keys first, then let serde check the shape.
fn parse<T: DeserializeOwned>(call: &Call<'_>, allowed: &[&str]) -> Result<T, ApiError> {
    let body = validate::body_object(call.body)?;
    validate::run(&body, &[&|b: &validate::Body| validate::unknown_fields(b, allowed)])?;
    serde_json::from_value(Value::Object(body)).map_err(|e| ApiError::Validation(e.to_string()))
}

fn element_json(graph: &Graph, e: &Element) -> Value {
    let children: Vec<&str> = graph.children_of(&e.id).iter().map(|c| c.id.as_str()).collect();
    json!({
        "id": e.id,
        "type": e.kind.tag(),
        "name": e.name,
        "documentation": e.documentation(),
        "parentId": e.parent,
        "ownerField": e.owner_field,
        "properties": e.props,
        "childIds": children,
    })
}

fn summary(e: &Element) -> Value {
    json!({"id": e.id, "type": e.kind.tag(), "name": e.name, "parentId": e.parent})
}

fn view_json(view: &View) -> Value {
    serde_json::to_value(view).unwrap_or(Value::Null)
}

fn diagram<'g>(graph: &'g Graph, id: &str) -> Result<&'g Element, ApiError> {
    graph
        .get_by_id(id)
        .filter(|d| d.kind.is_diagram())
        .ok_or_else(|| ApiError::not_found("Diagram", id))
}

fn view_on<'g>(graph: &'g Graph, diagram: &str, id: &str) -> Result<&'g View, ApiError> {
    graph
        .find_view_by_any_id(diagram, id)
        .ok_or_else(|| ApiError::not_found("View", id))
}

fn rect_from(layout_w: f64, layout_h: f64, fallback: (f64, f64), corners: [Option<f64>; 4]) -> Rect {
    let [x1, y1, x2, y2] = corners;
    let left = x1.unwrap_or(fallback.0);
    let top = y1.unwrap_or(fallback.1);
    let right = x2.unwrap_or(left + layout_w);
    let bottom = y2.unwrap_or(top + layout_h);
    Rect {
        left: left.min(right),
        top: top.min(bottom),
        width: (right - left).abs(),
        height: (bottom - top).abs(),
    }
}

fn next_grid_cell(ws: &Workspace, diagram: &str) -> (f64, f64) {
    let placed = ws
        .graph
        .views_on(diagram)
        .iter()
        .filter(|v| matches!(v.kind, ViewKind::Node | ViewKind::Note))
        .count();
    ws.layout.grid_position(placed)
}

/// Re-route edges attached to `views`. Failures are logged and returned
/// as a note for the response message; they never fail the caller.
fn reroute_best_effort(graph: &mut Graph, views: &[String]) -> Option<String> {
    let mut failures = Vec::new();
    for view in views {
        if let Err(err) = reroute_edges_of(graph, view) {
            warn!(view = %view, error = %err, "edge re-route failed");
            failures.push(format!("{}: {}", view, err));
        }
    }
    if failures.is_empty() {
        None
    } else {
        Some(format!("edge re-route failed for {}", failures.join("; ")))
    }
}

fn with_note(message: String, note: Option<String>) -> String {
    match note {
        Some(note) => format!("{} ({})", message, note),
        None => message,
    }
}

/// Ports anchored on `host` follow it by (dx, dy). Returns the moved ports.
fn drag_ports(graph: &mut Graph, host: &str, dx: f64, dy: f64) -> Result<Vec<String>, HostError> {
    if dx == 0.0 && dy == 0.0 {
        return Ok(Vec::new());
    }
    let ports: Vec<(String, f64, f64)> = graph
        .views()
        .iter()
        .filter(|v| v.host.as_deref() == Some(host))
        .map(|v| (v.id.clone(), v.left, v.top))
        .collect();
    for (id, left, top) in &ports {
        graph.set_property(Target::View(id), "left", json!(left + dx))?;
        graph.set_property(Target::View(id), "top", json!(top + dy))?;
    }
    Ok(ports.into_iter().map(|(id, _, _)| id).collect())
}

// --- Elements ---

fn get_element(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = call.param("id");
    let element = ws
        .graph
        .get_by_id(id)
        .ok_or_else(|| ApiError::not_found("Element", id))?;
    Ok(Outcome::data(element_json(&ws.graph, element)))
}

fn element_views(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = call.param("id");
    if ws.graph.get_by_id(id).is_none() {
        return Err(ApiError::not_found("Element", id));
    }
    let views: Vec<Value> = ws.graph.views_of(id).into_iter().map(view_json).collect();
    Ok(Outcome::data(Value::Array(views)))
}

fn update_element(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: UpdateElementRequest = parse(call, &["name", "documentation", "properties"])?;
    let id = call.param("id").to_string();
    if ws.graph.get_by_id(&id).is_none() {
        return Err(ApiError::not_found("Element", &id));
    }
    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Field 'name' must be a non-empty string".into()));
        }
    }
    if request.name.is_none() && request.documentation.is_none() && request.properties.is_none() {
        return Err(ApiError::Validation(
            "Update body must contain at least one field. Allowed fields: name, documentation, properties".into(),
        ));
    }
    let properties = request.properties.unwrap_or_default();
    if let Some(element) = ws.graph.get_by_id(&id) {
        for (path, value) in &properties {
            check_property_write(&ws.graph, element, path, value)?;
        }
    }
    ws.graph.batch(|g| -> Result<(), HostError> {
        if let Some(name) = request.name {
            g.set_property(Target::Element(&id), "name", Value::String(name))?;
        }
        if let Some(doc) = request.documentation {
            g.set_property(Target::Element(&id), "documentation", doc.map(Value::String).unwrap_or(Value::Null))?;
        }
        for (path, value) in properties {
            g.set_property(Target::Element(&id), &path, value)?;
        }
        Ok(())
    })?;
    info!(id = %id, "element updated");
    let element = ws
        .graph
        .get_by_id(&id)
        .ok_or_else(|| ApiError::not_found("Element", &id))?;
    Ok(Outcome::data(element_json(&ws.graph, element)))
}

fn delete_element(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = call.param("id");
    let removed = integrity::delete_element(&mut ws.graph, id)?;
    Ok(Outcome::data(json!({
        "id": id,
        "deletedElements": removed.elements,
        "deletedViews": removed.views,
    }))
    .with_message(format!("Deleted {}", id)))
}

fn search(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let keyword = call
        .query("keyword")
        .ok_or_else(|| ApiError::Validation("Missing required query parameter: keyword".into()))?;
    let kind = match call.query("type") {
        Some(tag) => Some(
            ElementKind::from_tag(tag)
                .ok_or_else(|| ApiError::Validation(format!("Unknown element type: {}", tag)))?,
        ),
        None => None,
    };
    let found: Vec<Value> = ws.graph.search(keyword, kind).into_iter().map(summary).collect();
    let message = format!("{} match(es) for '{}'", found.len(), keyword);
    Ok(Outcome::data(Value::Array(found)).with_message(message))
}

fn undo(ws: &mut Workspace, _call: &Call<'_>) -> Result<Outcome, ApiError> {
    if ws.graph.undo() {
        Ok(Outcome::message("Undone"))
    } else {
        Err(ApiError::BadRequest("Nothing to undo".into()))
    }
}

fn redo(ws: &mut Workspace, _call: &Call<'_>) -> Result<Outcome, ApiError> {
    if ws.graph.redo() {
        Ok(Outcome::message("Redone"))
    } else {
        Err(ApiError::BadRequest("Nothing to redo".into()))
    }
}

// --- Diagrams ---

fn diagram_json(graph: &Graph, d: &Element) -> Value {
    let frame = graph.frame_of(&d.id).map(|f| bounds(f));
    json!({
        "id": d.id,
        "type": d.kind.tag(),
        "name": d.name,
        "documentation": d.documentation(),
        "parentId": d.parent,
        "frame": frame,
        "viewCount": graph.views_on(&d.id).len(),
    })
}

fn list_diagrams(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let filter = match call.query("type") {
        Some(tag) => Some(
            ElementKind::from_tag(tag)
                .filter(|k| k.is_diagram())
                .ok_or_else(|| ApiError::Validation(format!("Unknown diagram type: {}", tag)))?,
        ),
        None => None,
    };
    let items: Vec<Value> = ws
        .graph
        .elements()
        .iter()
        .filter(|e| e.kind.is_diagram() && filter.map_or(true, |k| e.kind == k))
        .map(|d| diagram_json(&ws.graph, d))
        .collect();
    Ok(Outcome::data(Value::Array(items)))
}

fn create_diagram(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: CreateDiagramRequest = parse(call, &["type", "parentId", "name"])?;
    let kind = ElementKind::from_tag(&request.diagram_type)
        .filter(|k| k.is_diagram())
        .ok_or_else(|| ApiError::Validation(format!("Unknown diagram type: {}", request.diagram_type)))?;
    let parent = match request.parent_id {
        Some(parent) => parent,
        None => ws
            .graph
            .root_model()
            .map(|m| m.id.clone())
            .ok_or_else(|| ApiError::Internal("project has no root model".into()))?,
    };
    let frame = Rect {
        left: 0.0,
        top: 0.0,
        width: ws.layout.frame_width,
        height: ws.layout.frame_height,
    };
    let id = ws
        .graph
        .batch(|g| g.create_diagram(kind, &parent, request.name.as_deref(), frame))?;
    info!(id = %id, kind = %kind, "diagram created");
    let d = diagram(&ws.graph, &id)?;
    let message = format!("Created {} '{}' ({})", kind, d.name, id);
    Ok(Outcome::data(diagram_json(&ws.graph, d)).with_message(message))
}

fn cascade_json(outcome: &integrity::CascadeOutcome) -> Value {
    json!({
        "diagrams": outcome.plan.diagrams,
        "models": outcome.plan.models,
        "containers": outcome.plan.containers,
        "retained": outcome.plan.retained,
        "deletedElements": outcome.removed.elements,
        "deletedViews": outcome.removed.views,
    })
}

fn delete_diagrams(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: BatchDeleteRequest = parse(call, &["ids"])?;
    if request.ids.is_empty() {
        return Err(ApiError::Validation("Field 'ids' must list at least one diagram".into()));
    }
    let outcome = integrity::delete_diagrams(&mut ws.graph, &request.ids)?;
    let message = format!("Deleted {} diagram(s)", outcome.plan.diagrams.len());
    Ok(Outcome::data(cascade_json(&outcome)).with_message(message))
}

fn get_diagram(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let d = diagram(&ws.graph, call.param("id"))?;
    let mut data = diagram_json(&ws.graph, d);
    let views: Vec<Value> = ws.graph.views_on(&d.id).into_iter().map(view_json).collect();
    data["views"] = Value::Array(views);
    Ok(Outcome::data(data))
}

fn update_diagram(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: UpdateDiagramRequest = parse(call, &["name", "documentation"])?;
    let id = diagram(&ws.graph, call.param("id"))?.id.clone();
    if request.name.is_none() && request.documentation.is_none() {
        return Err(ApiError::Validation(
            "Update body must contain at least one field. Allowed fields: name, documentation".into(),
        ));
    }
    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::Validation("Field 'name' must be a non-empty string".into()));
    }
    ws.graph.batch(|g| -> Result<(), HostError> {
        if let Some(name) = request.name {
            g.set_property(Target::Element(&id), "name", Value::String(name))?;
        }
        if let Some(doc) = request.documentation {
            g.set_property(Target::Element(&id), "documentation", doc.map(Value::String).unwrap_or(Value::Null))?;
        }
        Ok(())
    })?;
    let d = diagram(&ws.graph, &id)?;
    Ok(Outcome::data(diagram_json(&ws.graph, d)))
}

fn delete_diagram(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = call.param("id").to_string();
    let outcome = integrity::delete_diagrams(&mut ws.graph, &[id.clone()])?;
    Ok(Outcome::data(cascade_json(&outcome)).with_message(format!("Deleted diagram {}", id)))
}

fn diagram_views(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let d = diagram(&ws.graph, call.param("id"))?;
    let views: Vec<Value> = ws.graph.views_on(&d.id).into_iter().map(view_json).collect();
    Ok(Outcome::data(Value::Array(views)))
}

fn add_view(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: AddViewRequest = parse(call, &["modelId", "x1", "y1", "x2", "y2"])?;
    let id = diagram(&ws.graph, call.param("id"))?.id.clone();
    let rect = rect_from(
        ws.layout.node_width,
        ws.layout.node_height,
        next_grid_cell(ws, &id),
        [request.x1, request.y1, request.x2, request.y2],
    );
    let margin = ws.layout.frame_margin;
    let view = ws.graph.batch(|g| -> Result<String, HostError> {
        let view = g.create_view_of(&request.model_id, &id, rect)?;
        if g.view(&view).is_some_and(|v| v.kind.is_edge()) {
            clear_edge_waypoints(g, &view)?;
        }
        auto_expand_frame(g, &id, margin)?;
        Ok(view)
    })?;
    let data = ws.graph.view(&view).map(view_json).unwrap_or(Value::Null);
    Ok(Outcome::data(data).with_message(format!("Placed {} on {}", request.model_id, id)))
}

fn add_note(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: NoteRequest = parse(call, &["text", "x1", "y1", "x2", "y2"])?;
    let id = diagram(&ws.graph, call.param("id"))?.id.clone();
    let rect = rect_from(
        ws.layout.node_width,
        ws.layout.node_height,
        next_grid_cell(ws, &id),
        [request.x1, request.y1, request.x2, request.y2],
    );
    let margin = ws.layout.frame_margin;
    let view = ws.graph.batch(|g| -> Result<String, HostError> {
        let view = g.create_note(&id, rect, &request.text)?;
        auto_expand_frame(g, &id, margin)?;
        Ok(view)
    })?;
    let data = ws.graph.view(&view).map(view_json).unwrap_or(Value::Null);
    Ok(Outcome::data(data).with_message(format!("Added note {}", view)))
}

/// Grid pass over node and note views, then edge re-routing and a frame fit.
fn layout(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = diagram(&ws.graph, call.param("id"))?.id.clone();
    let layout = ws.layout.clone();
    let nodes: Vec<(String, f64, f64)> = ws
        .graph
        .views_on(&id)
        .into_iter()
        .filter(|v| matches!(v.kind, ViewKind::Node | ViewKind::Note))
        .map(|v| (v.id.clone(), v.left, v.top))
        .collect();
    let edges: Vec<String> = ws
        .graph
        .views_on(&id)
        .into_iter()
        .filter(|v| v.kind.is_edge())
        .map(|v| v.id.clone())
        .collect();

    let frame = ws.graph.batch(|g| -> Result<_, HostError> {
        for (index, (view, left, top)) in nodes.iter().enumerate() {
            let (x, y) = layout.grid_position(index);
            g.set_property(Target::View(view), "left", json!(x))?;
            g.set_property(Target::View(view), "top", json!(y))?;
            drag_ports(g, view, x - left, y - top)?;
        }
        for edge in &edges {
            clear_edge_waypoints(g, edge)?;
        }
        fit_frame_to_views(g, &id, layout.frame_margin)
    })?;
    info!(diagram = %id, nodes = nodes.len(), edges = edges.len(), "layout applied");
    Ok(Outcome::data(json!({"frame": frame, "nodes": nodes.len(), "edges": edges.len()}))
        .with_message(format!("Laid out {} view(s)", nodes.len())))
}

fn fit_frame(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = diagram(&ws.graph, call.param("id"))?.id.clone();
    let margin = ws.layout.frame_margin;
    let frame = ws.graph.batch(|g| fit_frame_to_views(g, &id, margin))?;
    Ok(Outcome::data(json!({"frame": frame})))
}

fn align(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let body = validate::body_object(call.body)?;
    validate::run(
        &body,
        &[
            &|b: &validate::Body| validate::unknown_fields(b, &["viewIds", "mode"]),
            &|b: &validate::Body| validate::required(b, "viewIds"),
            &|b: &validate::Body| validate::required(b, "mode"),
            &|b: &validate::Body| validate::check_type(b, "mode", FieldType::String),
            &|b: &validate::Body| validate::one_of(b, "mode", ALIGN_MODES),
        ],
    )?;
    let request: AlignRequest =
        serde_json::from_value(Value::Object(body)).map_err(|e| ApiError::Validation(e.to_string()))?;
    let id = diagram(&ws.graph, call.param("id"))?.id.clone();

    let mut targets: Vec<View> = Vec::new();
    for view_id in &request.view_ids {
        let view = view_on(&ws.graph, &id, view_id)?;
        if !matches!(view.kind, ViewKind::Node | ViewKind::Note) {
            return Err(ApiError::Validation(format!("View {} cannot be aligned", view.id)));
        }
        targets.push(view.clone());
    }
    let Some(anchor) = targets.first().map(bounds) else {
        return Err(ApiError::Validation("Field 'viewIds' must list at least one view".into()));
    };
    let all: Vec<_> = targets.iter().map(bounds).collect();
    let min_left = all.iter().map(|b| b.left).fold(f64::INFINITY, f64::min);
    let max_right = all.iter().map(|b| b.right).fold(f64::NEG_INFINITY, f64::max);
    let min_top = all.iter().map(|b| b.top).fold(f64::INFINITY, f64::min);
    let max_bottom = all.iter().map(|b| b.bottom).fold(f64::NEG_INFINITY, f64::max);

    let moved: Vec<String> = targets.iter().map(|v| v.id.clone()).collect();
    let margin = ws.layout.frame_margin;
    let note = ws.graph.batch(|g| -> Result<Option<String>, HostError> {
        for (view, b) in targets.iter().zip(&all) {
            let (left, top) = match request.mode.as_str() {
                "left" => (min_left, b.top),
                "right" => (max_right - b.width(), b.top),
                "top" => (b.left, min_top),
                "bottom" => (b.left, max_bottom - b.height()),
                "center" => (anchor.center().x - b.width() / 2.0, b.top),
                _ => (b.left, anchor.center().y - b.height() / 2.0),
            };
            g.set_property(Target::View(&view.id), "left", json!(left))?;
            g.set_property(Target::View(&view.id), "top", json!(top))?;
            drag_ports(g, &view.id, left - b.left, top - b.top)?;
        }
        let note = reroute_best_effort(g, &moved);
        auto_expand_frame(g, &id, margin)?;
        Ok(note)
    })?;
    let message = with_note(format!("Aligned {} view(s) {}", moved.len(), request.mode), note);
    Ok(Outcome::data(json!({"viewIds": moved})).with_message(message))
}

fn export(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let d = diagram(&ws.graph, call.param("id"))?;
    let views = ws.graph.views_on(&d.id);
    let mut models: Vec<&str> = Vec::new();
    for v in &views {
        if let Some(m) = v.model.as_deref().filter(|m| *m != d.id) {
            if !models.contains(&m) {
                models.push(m);
            }
        }
    }
    let elements: Vec<Value> = models
        .iter()
        .filter_map(|m| ws.graph.get_by_id(m))
        .map(|e| element_json(&ws.graph, e))
        .collect();
    Ok(Outcome::data(json!({
        "diagram": diagram_json(&ws.graph, d),
        "views": views.into_iter().map(view_json).collect::<Vec<_>>(),
        "elements": elements,
    })))
}

// --- Views ---

fn move_view(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: MoveViewRequest = parse(
        call,
        &["left", "top", "width", "height", "fillColor", "lineColor", "fontColor"],
    )?;
    let id = call.param("id");
    let view = ws
        .graph
        .view(id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("View", id))?;
    if view.kind.is_edge() {
        return Err(ApiError::Validation(format!(
            "View {} is an edge; use /api/views/{}/reconnect",
            id, id
        )));
    }
    let geometry = [
        ("left", request.left),
        ("top", request.top),
        ("width", request.width),
        ("height", request.height),
    ];
    let style = [
        ("fillColor", request.fill_color),
        ("lineColor", request.line_color),
        ("fontColor", request.font_color),
    ];
    if geometry.iter().all(|(_, v)| v.is_none()) && style.iter().all(|(_, v)| v.is_none()) {
        return Err(ApiError::Validation(
            "Update body must contain at least one field. Allowed fields: left, top, width, height, fillColor, lineColor, fontColor".into(),
        ));
    }
    let margin = ws.layout.frame_margin;
    let note = ws.graph.batch(|g| -> Result<Option<String>, HostError> {
        let mut moved = vec![view.id.clone()];
        for (field, value) in &geometry {
            if let Some(value) = value {
                g.set_property(Target::View(&view.id), field, json!(value))?;
            }
        }
        for (field, value) in style {
            if let Some(value) = value {
                g.set_property(Target::View(&view.id), field, Value::String(value))?;
            }
        }
        let dx = request.left.map_or(0.0, |l| l - view.left);
        let dy = request.top.map_or(0.0, |t| t - view.top);
        moved.extend(drag_ports(g, &view.id, dx, dy)?);
        let note = reroute_best_effort(g, &moved);
        auto_expand_frame(g, &view.diagram, margin)?;
        Ok(note)
    })?;
    let data = ws.graph.view(&view.id).map(view_json).unwrap_or(Value::Null);
    Ok(Outcome::data(data).with_message(with_note(format!("Updated view {}", view.id), note)))
}

fn reconnect(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let request: ReconnectRequest = parse(call, &["sourceId", "targetId"])?;
    let id = call.param("id");
    let edge = ws
        .graph
        .view(id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("View", id))?;
    if !edge.kind.is_edge() {
        return Err(ApiError::Validation(format!("View {} is not an edge", id)));
    }
    if request.source_id.is_none() && request.target_id.is_none() {
        return Err(ApiError::Validation("Provide sourceId, targetId or both".into()));
    }
    let mut ends: Vec<(&str, &str, View)> = Vec::new();
    for (end, prop, requested) in [
        ("tail", "source", &request.source_id),
        ("head", "target", &request.target_id),
    ] {
        if let Some(requested) = requested {
            let view = view_on(&ws.graph, &edge.diagram, requested)?.clone();
            if view.id == edge.id || view.kind.is_frame() {
                return Err(ApiError::Validation(format!("View {} cannot be an edge endpoint", view.id)));
            }
            ends.push((end, prop, view));
        }
    }
    let relation = edge
        .model
        .clone()
        .filter(|m| ws.graph.get_by_id(m).is_some_and(|e| e.kind.is_relation()));

    ws.graph.batch(|g| -> Result<(), HostError> {
        for (end, prop, view) in &ends {
            g.set_property(Target::View(&edge.id), end, Value::String(view.id.clone()))?;
            if let (Some(relation), Some(model)) = (&relation, &view.model) {
                g.set_property(Target::Element(relation), prop, Value::String(model.clone()))?;
            }
        }
        clear_edge_waypoints(g, &edge.id)
    })?;
    info!(edge = %edge.id, "edge reconnected");
    let data = ws.graph.view(&edge.id).map(view_json).unwrap_or(Value::Null);
    Ok(Outcome::data(data).with_message(format!("Reconnected {}", edge.id)))
}

fn delete_view(ws: &mut Workspace, call: &Call<'_>) -> Result<Outcome, ApiError> {
    let id = call.param("id");
    let view = ws.graph.view(id).ok_or_else(|| ApiError::not_found("View", id))?;
    if view.kind.is_frame() {
        return Err(ApiError::Validation(format!(
            "View {} is a diagram frame; delete the diagram instead",
            id
        )));
    }
    let removed = ws.graph.batch(|g| g.delete_elements(&[], &[id.to_string()]))?;
    Ok(Outcome::data(json!({"deletedViews": removed.views})).with_message(format!("Deleted view {}", id)))
}

// --- Project files ---

fn default_project_path(ws: &Workspace) -> PathBuf {
    ws.project_path
        .clone()
        .unwrap_or_else(|| modelwire_dir().join("project.json"))
}

fn save_project(ws: &mut Workspace, call: &Call<'_>) -> Reply {
    let request: ProjectFileRequest = match parse(call, &["path"]) {
        Ok(request) => request,
        Err(err) => return Reply::Ready(Err(err)),
    };
    let path = request
        .path
        .map(PathBuf::from)
        .unwrap_or_else(|| default_project_path(ws));
    let text = match serde_json::to_string_pretty(&ws.graph) {
        Ok(text) => text,
        Err(err) => return Reply::Ready(Err(ApiError::Internal(err.to_string()))),
    };
    let target = path.clone();
    Reply::Deferred {
        work: Box::pin(async move {
            if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Cannot create {}: {}", dir.display(), e)))?;
            }
            tokio::fs::write(&target, text)
                .await
                .map_err(|e| ApiError::BadRequest(format!("Cannot write {}: {}", target.display(), e)))?;
            Ok::<_, ApiError>(Value::String(target.display().to_string()))
        }),
        then: Box::new(move |ws: &mut Workspace, written: Value| {
            info!(path = %path.display(), "project saved");
            let message = format!("Saved project to {}", path.display());
            ws.project_path = Some(path);
            Ok(Outcome::data(json!({
                "path": written,
                "elements": ws.graph.elements().len(),
                "views": ws.graph.views().len(),
            }))
            .with_message(message))
        }),
    }
}

fn open_project(_ws: &mut Workspace, call: &Call<'_>) -> Reply {
    let request: ProjectFileRequest = match parse(call, &["path"]) {
        Ok(request) => request,
        Err(err) => return Reply::Ready(Err(err)),
    };
    let Some(path) = request.path.map(PathBuf::from) else {
        return Reply::Ready(Err(ApiError::Validation("Missing required field: path".into())));
    };
    let source = path.clone();
    Reply::Deferred {
        work: Box::pin(async move {
            tokio::fs::read_to_string(&source)
                .await
                .map(Value::String)
                .map_err(|e| ApiError::BadRequest(format!("Cannot read {}: {}", source.display(), e)))
        }),
        then: Box::new(move |ws: &mut Workspace, text: Value| {
            let graph: Graph = serde_json::from_str(text.as_str().unwrap_or_default())
                .map_err(|e| ApiError::Validation(format!("Not a project file: {}", e)))?;
            ws.graph = graph;
            ws.project_path = Some(path.clone());
            info!(path = %path.display(), "project opened");
            Ok(Outcome::data(json!({
                "path": path.display().to_string(),
                "elements": ws.graph.elements().len(),
                "views": ws.graph.views().len(),
            }))
            .with_message(format!("Opened project {}", path.display())))
        }),
    }
}
