//! In-memory model graph with an undo journal.
//!
//! This is the collaborator layer the rest of the crate is written against:
//! identity and lookup, element/view factories, journaled property writes and
//! deletions, undo/redo and search. Handlers never keep references into the
//! graph across requests; every call re-resolves ids.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::kind::{ElementKind, ViewKind};

pub type ElementId = String;
pub type ViewId = String;

/// Failures raised by the graph's factories and mutation primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("{kind} not found: {id}")]
    Missing { kind: &'static str, id: String },
    #[error("{0} cannot be created without a view of its parent")]
    ViewRequired(ElementKind),
    #[error("{0} has no view that can be placed on a diagram")]
    NoViewKind(ElementKind),
    #[error("{kind} cannot be placed on a {diagram}")]
    Unsupported {
        kind: ElementKind,
        diagram: ElementKind,
    },
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl HostError {
    pub fn missing(kind: &'static str, id: &str) -> Self {
        HostError::Missing {
            kind,
            id: id.to_string(),
        }
    }

    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        HostError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Placement rectangle in diagram coordinates (origin top-left, y down).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// A node in the model graph. Not drawable by itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ElementId>,
    /// Collection of the parent this element lives in, e.g. "attributes".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_field: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
}

impl Element {
    /// Read a property; `path` may address one nested level, e.g. "end1.name".
    pub fn prop(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            Some((head, rest)) => self.props.get(head)?.as_object()?.get(rest),
            None => self.props.get(path),
        }
    }

    pub fn reference(&self, field: &str) -> Option<&str> {
        self.prop(field).and_then(Value::as_str)
    }

    pub fn documentation(&self) -> Option<&str> {
        self.prop("documentation")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
    }

    fn read(&self, path: &str) -> Option<Value> {
        if path == "name" {
            return Some(Value::String(self.name.clone()));
        }
        self.prop(path).cloned()
    }

    fn write_raw(&mut self, path: &str, value: Option<Value>) {
        if path == "name" {
            if let Some(Value::String(name)) = value {
                self.name = name;
            }
            return;
        }
        match path.split_once('.') {
            Some((head, rest)) => {
                let slot = self
                    .props
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(map) = slot {
                    match value {
                        Some(v) => {
                            map.insert(rest.to_string(), v);
                        }
                        None => {
                            map.remove(rest);
                        }
                    }
                }
            }
            None => match value {
                Some(v) => {
                    self.props.insert(path.to_string(), v);
                }
                None => {
                    self.props.remove(path);
                }
            },
        }
    }
}

/// A diagram-scoped placement of an element, or a pure decoration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: ViewId,
    pub kind: ViewKind,
    pub diagram: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ElementId>,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<ViewId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<ViewId>,
    /// View this one is anchored on (ports).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<ViewId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub style: Map<String, Value>,
}

impl View {
    pub fn field(&self, name: &str) -> Value {
        match name {
            "left" => Value::from(self.left),
            "top" => Value::from(self.top),
            "width" => Value::from(self.width),
            "height" => Value::from(self.height),
            "points" => serde_json::to_value(&self.points).unwrap_or(Value::Null),
            "tail" => self.tail.clone().map(Value::String).unwrap_or(Value::Null),
            "head" => self.head.clone().map(Value::String).unwrap_or(Value::Null),
            _ => self.style.get(name).cloned().unwrap_or(Value::Null),
        }
    }

    fn validate_field(name: &str, value: &Value) -> Result<(), HostError> {
        match name {
            "left" | "top" => value
                .as_f64()
                .map(|_| ())
                .ok_or_else(|| HostError::invalid(name, "expected a number")),
            "width" | "height" => match value.as_f64() {
                Some(n) if n >= 0.0 => Ok(()),
                _ => Err(HostError::invalid(name, "expected a non-negative number")),
            },
            "points" => serde_json::from_value::<Vec<Point>>(value.clone())
                .map(|_| ())
                .map_err(|e| HostError::invalid(name, e.to_string())),
            "tail" | "head" => {
                if value.is_string() || value.is_null() {
                    Ok(())
                } else {
                    Err(HostError::invalid(name, "expected a view id"))
                }
            }
            "id" | "kind" | "diagram" | "model" | "host" => {
                Err(HostError::invalid(name, "field is read-only"))
            }
            _ => Ok(()),
        }
    }

    fn write_raw(&mut self, name: &str, value: Value) {
        match name {
            "left" => self.left = value.as_f64().unwrap_or(self.left),
            "top" => self.top = value.as_f64().unwrap_or(self.top),
            "width" => self.width = value.as_f64().unwrap_or(self.width),
            "height" => self.height = value.as_f64().unwrap_or(self.height),
            "points" => self.points = serde_json::from_value(value).unwrap_or_default(),
            "tail" => self.tail = value.as_str().map(str::to_string),
            "head" => self.head = value.as_str().map(str::to_string),
            _ => {
                if value.is_null() {
                    self.style.remove(name);
                } else {
                    self.style.insert(name.to_string(), value);
                }
            }
        }
    }
}

/// What a property write is aimed at.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Element(&'a str),
    View(&'a str),
}

/// Where and how a new view is placed.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub rect: Rect,
    pub tail: Option<ViewId>,
    pub head: Option<ViewId>,
    pub host: Option<ViewId>,
}

impl Placement {
    pub fn at(rect: Rect) -> Self {
        Placement {
            rect,
            ..Default::default()
        }
    }

    pub fn between(tail: &str, head: &str) -> Self {
        Placement {
            tail: Some(tail.to_string()),
            head: Some(head.to_string()),
            ..Default::default()
        }
    }
}

/// Elements and views removed by one `delete_elements` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Removed {
    pub elements: Vec<ElementId>,
    pub views: Vec<ViewId>,
}

// --- Journal ---

#[derive(Debug, Clone)]
enum Change {
    AddElement(Element),
    RemoveElement { element: Element, index: usize },
    AddView(View),
    RemoveView { view: View, index: usize },
    SetElement {
        id: ElementId,
        path: String,
        old: Option<Value>,
        new: Option<Value>,
    },
    SetView {
        id: ViewId,
        field: String,
        old: Value,
        new: Value,
    },
}

#[derive(Debug, Clone, Default)]
struct Journal {
    undo: Vec<Vec<Change>>,
    redo: Vec<Vec<Change>>,
    open: Vec<Change>,
    depth: usize,
}

/// Position of every element and view by id. Stale only while an undo or
/// redo unit is being replayed.
#[derive(Debug, Clone, Default)]
struct Index {
    elements: HashMap<ElementId, usize>,
    views: HashMap<ViewId, usize>,
    stale: bool,
}

// --- Graph ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredGraph")]
pub struct Graph {
    elements: Vec<Element>,
    views: Vec<View>,
    next_id: u64,
    #[serde(skip)]
    journal: Journal,
    #[serde(skip)]
    index: Index,
}

/// On-disk shape of a [`Graph`]; the index is rebuilt on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGraph {
    elements: Vec<Element>,
    views: Vec<View>,
    next_id: u64,
}

impl From<StoredGraph> for Graph {
    fn from(stored: StoredGraph) -> Self {
        let mut graph = Graph {
            elements: stored.elements,
            views: stored.views,
            next_id: stored.next_id,
            ..Graph::default()
        };
        graph.reindex();
        graph
    }
}

impl Graph {
    /// A fresh project with one root model, outside of the undo history.
    pub fn new() -> Self {
        let mut graph = Graph::default();
        let project = graph.allocate_id("el");
        let model = graph.allocate_id("el");
        graph.push_element(Element {
            id: project.clone(),
            kind: ElementKind::Project,
            parent: None,
            owner_field: None,
            name: "Untitled".to_string(),
            props: Map::new(),
        });
        graph.push_element(Element {
            id: model,
            kind: ElementKind::Model,
            parent: Some(project),
            owner_field: Some("ownedElements".to_string()),
            name: "Model".to_string(),
            props: Map::new(),
        });
        graph
    }

    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn reindex(&mut self) {
        self.index.elements = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        self.index.views = self
            .views
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id.clone(), i))
            .collect();
        self.index.stale = false;
    }

    fn push_element(&mut self, element: Element) {
        self.index.elements.insert(element.id.clone(), self.elements.len());
        self.elements.push(element);
    }

    fn push_view(&mut self, view: View) {
        self.index.views.insert(view.id.clone(), self.views.len());
        self.views.push(view);
    }

    fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.index.stale {
            self.reindex();
        }
        let at = *self.index.elements.get(id)?;
        self.elements.get_mut(at)
    }

    fn view_mut(&mut self, id: &str) -> Option<&mut View> {
        if self.index.stale {
            self.reindex();
        }
        let at = *self.index.views.get(id)?;
        self.views.get_mut(at)
    }

    // --- Lookup ---

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Element> {
        self.index
            .elements
            .get(id)
            .and_then(|&at| self.elements.get(at))
            .filter(|e| e.id == id)
    }

    pub fn view(&self, id: &str) -> Option<&View> {
        self.index
            .views
            .get(id)
            .and_then(|&at| self.views.get(at))
            .filter(|v| v.id == id)
    }

    /// `roots` plus everything they own, transitively.
    pub fn subtree<'a>(&self, roots: impl IntoIterator<Item = &'a ElementId>) -> HashSet<ElementId> {
        let mut owned: HashMap<&str, Vec<&str>> = HashMap::new();
        for e in &self.elements {
            if let Some(parent) = &e.parent {
                owned.entry(parent.as_str()).or_default().push(e.id.as_str());
            }
        }
        let mut set: HashSet<ElementId> = HashSet::new();
        let mut queue: Vec<String> = roots.into_iter().cloned().collect();
        while let Some(id) = queue.pop() {
            if let Some(children) = owned.get(id.as_str()) {
                queue.extend(children.iter().filter(|c| !set.contains(**c)).map(|c| c.to_string()));
            }
            set.insert(id);
        }
        set
    }

    pub fn select_by_kind(&self, kind: ElementKind) -> Vec<&Element> {
        self.elements.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn children_of(&self, id: &str) -> Vec<&Element> {
        self.elements
            .iter()
            .filter(|e| e.parent.as_deref() == Some(id))
            .collect()
    }

    pub fn views_on(&self, diagram: &str) -> Vec<&View> {
        self.views.iter().filter(|v| v.diagram == diagram).collect()
    }

    pub fn views_of(&self, model: &str) -> Vec<&View> {
        self.views
            .iter()
            .filter(|v| v.model.as_deref() == Some(model))
            .collect()
    }

    pub fn find_view_on_diagram(&self, diagram: &str, model: &str) -> Option<&View> {
        self.views
            .iter()
            .find(|v| v.diagram == diagram && v.model.as_deref() == Some(model) && !v.kind.is_frame())
    }

    /// Resolve either a view id or a model id to a view on `diagram`.
    pub fn find_view_by_any_id(&self, diagram: &str, id: &str) -> Option<&View> {
        self.views
            .iter()
            .find(|v| v.diagram == diagram && v.id == id)
            .or_else(|| self.find_view_on_diagram(diagram, id))
    }

    pub fn frame_of(&self, diagram: &str) -> Option<&View> {
        self.views
            .iter()
            .find(|v| v.diagram == diagram && v.kind.is_frame())
    }

    pub fn root_model(&self) -> Option<&Element> {
        self.elements.iter().find(|e| e.kind == ElementKind::Model)
    }

    /// Case-insensitive name search; glob patterns (`*`, `?`, `[`) are honored.
    pub fn search(&self, keyword: &str, kind: Option<ElementKind>) -> Vec<&Element> {
        let needle = keyword.to_lowercase();
        let pattern = if needle.contains(['*', '?', '[']) {
            glob::Pattern::new(&needle).ok()
        } else {
            None
        };
        self.elements
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .filter(|e| {
                let name = e.name.to_lowercase();
                match &pattern {
                    Some(p) => p.matches(&name),
                    None => {
                        name.contains(&needle)
                            || e.documentation()
                                .is_some_and(|d| d.to_lowercase().contains(&needle))
                    }
                }
            })
            .collect()
    }

    // --- Factories ---

    fn default_name(&self, kind: ElementKind, init: &Map<String, Value>) -> String {
        match init.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                let count = self.elements.iter().filter(|e| e.kind == kind).count();
                format!("{}{}", kind.tag(), count + 1)
            }
        }
    }

    fn insert_element(
        &mut self,
        kind: ElementKind,
        parent: Option<&str>,
        field: Option<&str>,
        init: &Map<String, Value>,
    ) -> ElementId {
        let name = self.default_name(kind, init);
        let mut props = init.clone();
        props.remove("name");
        let id = self.allocate_id("el");
        let element = Element {
            id: id.clone(),
            kind,
            parent: parent.map(str::to_string),
            owner_field: Some(field.unwrap_or("ownedElements").to_string()),
            name,
            props,
        };
        self.push_element(element.clone());
        self.record(Change::AddElement(element));
        id
    }

    fn insert_view(&mut self, mut view: View) -> ViewId {
        let id = self.allocate_id("view");
        view.id = id.clone();
        self.push_view(view.clone());
        self.record(Change::AddView(view));
        id
    }

    /// Parent handed to a factory, with diagrams resolved to their owner.
    fn resolve_parent(&self, parent: &str) -> Result<ElementId, HostError> {
        let element = self
            .get_by_id(parent)
            .ok_or_else(|| HostError::missing("Element", parent))?;
        if element.kind.is_diagram() {
            element
                .parent
                .clone()
                .ok_or_else(|| HostError::invalid("parent", "diagram has no owner"))
        } else {
            Ok(element.id.clone())
        }
    }

    fn diagram_kind(&self, diagram: &str) -> Result<ElementKind, HostError> {
        self.get_by_id(diagram)
            .filter(|d| d.kind.is_diagram())
            .map(|d| d.kind)
            .ok_or_else(|| HostError::missing("Diagram", diagram))
    }

    /// Model-only construction inside `parent`'s `field` collection.
    pub fn create_model(
        &mut self,
        kind: ElementKind,
        parent: &str,
        field: Option<&str>,
        init: &Map<String, Value>,
    ) -> Result<ElementId, HostError> {
        if kind.requires_view() {
            return Err(HostError::ViewRequired(kind));
        }
        let parent = self.resolve_parent(parent)?;
        Ok(self.insert_element(kind, Some(&parent), field, init))
    }

    /// Create an element together with its view on `diagram`.
    pub fn create_model_and_view(
        &mut self,
        kind: ElementKind,
        parent: &str,
        diagram: &str,
        placement: Placement,
        init: &Map<String, Value>,
    ) -> Result<(ElementId, ViewId), HostError> {
        let diagram_kind = self.diagram_kind(diagram)?;
        let view_kind = kind.view_kind().ok_or(HostError::NoViewKind(kind))?;
        if !kind.placeable_on(diagram_kind) {
            return Err(HostError::Unsupported {
                kind,
                diagram: diagram_kind,
            });
        }
        let parent = self.resolve_parent(parent)?;
        let mut init = init.clone();

        if kind.is_relation() {
            let (source, target) = self.endpoint_models(diagram, &placement)?;
            init.insert("source".to_string(), Value::String(source));
            init.insert("target".to_string(), Value::String(target));
        }
        if view_kind == ViewKind::Port {
            let host = placement
                .host
                .as_deref()
                .ok_or_else(|| HostError::invalid("host", "ports need a host view"))?;
            if self.view(host).map(|v| v.diagram.as_str()) != Some(diagram) {
                return Err(HostError::missing("View", host));
            }
        }
        if kind == ElementKind::Lifeline {
            let name = self.default_name(kind, &init);
            let owner = match self.get_by_id(&parent) {
                Some(p) if p.kind == ElementKind::Interaction => {
                    p.parent.clone().unwrap_or_else(|| parent.clone())
                }
                _ => parent.clone(),
            };
            let mut attr_init = Map::new();
            attr_init.insert("name".to_string(), Value::String(name.clone()));
            let attr = self.insert_element(
                ElementKind::Attribute,
                Some(&owner),
                Some("attributes"),
                &attr_init,
            );
            init.insert("name".to_string(), Value::String(name));
            init.insert("represent".to_string(), Value::String(attr));
        }

        let model = self.insert_element(kind, Some(&parent), None, &init);
        let view = self.insert_view(View {
            id: String::new(),
            kind: view_kind,
            diagram: diagram.to_string(),
            model: Some(model.clone()),
            left: placement.rect.left,
            top: placement.rect.top,
            width: placement.rect.width,
            height: placement.rect.height,
            points: Vec::new(),
            tail: placement.tail,
            head: placement.head,
            host: placement.host,
            style: Map::new(),
        });
        Ok((model, view))
    }

    fn endpoint_models(
        &self,
        diagram: &str,
        placement: &Placement,
    ) -> Result<(ElementId, ElementId), HostError> {
        let resolve = |field: &str, id: Option<&str>| -> Result<ElementId, HostError> {
            let id = id.ok_or_else(|| HostError::invalid(field, "relations need both endpoints"))?;
            let view = self
                .view(id)
                .filter(|v| v.diagram == diagram)
                .ok_or_else(|| HostError::missing("View", id))?;
            view.model
                .clone()
                .ok_or_else(|| HostError::invalid(field, "endpoint view has no model element"))
        };
        Ok((
            resolve("tail", placement.tail.as_deref())?,
            resolve("head", placement.head.as_deref())?,
        ))
    }

    /// Place an existing element on another diagram.
    pub fn create_view_of(
        &mut self,
        model: &str,
        diagram: &str,
        rect: Rect,
    ) -> Result<ViewId, HostError> {
        let diagram_kind = self.diagram_kind(diagram)?;
        let element = self
            .get_by_id(model)
            .ok_or_else(|| HostError::missing("Element", model))?;
        let kind = element.kind;
        let view_kind = kind.view_kind().ok_or(HostError::NoViewKind(kind))?;
        if !kind.placeable_on(diagram_kind) {
            return Err(HostError::Unsupported {
                kind,
                diagram: diagram_kind,
            });
        }
        if view_kind == ViewKind::Port {
            return Err(HostError::ViewRequired(kind));
        }
        if self.find_view_on_diagram(diagram, model).is_some() {
            return Err(HostError::invalid(
                "modelId",
                format!("{} already has a view on diagram {}", model, diagram),
            ));
        }
        let mut placement = Placement::at(rect);
        if kind.is_relation() {
            for (field, slot) in [("source", &mut placement.tail), ("target", &mut placement.head)] {
                let end = element
                    .reference(field)
                    .ok_or_else(|| HostError::invalid(field, "relation has no endpoint"))?;
                let end_view = self
                    .find_view_on_diagram(diagram, end)
                    .ok_or_else(|| HostError::missing("View", end))?;
                *slot = Some(end_view.id.clone());
            }
            placement.rect = Rect::default();
        }
        Ok(self.insert_view(View {
            id: String::new(),
            kind: view_kind,
            diagram: diagram.to_string(),
            model: Some(model.to_string()),
            left: placement.rect.left,
            top: placement.rect.top,
            width: placement.rect.width,
            height: placement.rect.height,
            points: Vec::new(),
            tail: placement.tail,
            head: placement.head,
            host: None,
            style: Map::new(),
        }))
    }

    /// A view-only note decoration.
    pub fn create_note(&mut self, diagram: &str, rect: Rect, text: &str) -> Result<ViewId, HostError> {
        self.diagram_kind(diagram)?;
        let mut style = Map::new();
        style.insert("text".to_string(), Value::String(text.to_string()));
        Ok(self.insert_view(View {
            id: String::new(),
            kind: ViewKind::Note,
            diagram: diagram.to_string(),
            model: None,
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
            points: Vec::new(),
            tail: None,
            head: None,
            host: None,
            style,
        }))
    }

    /// Create a diagram (plus its auto-created containers) and its frame view.
    pub fn create_diagram(
        &mut self,
        kind: ElementKind,
        parent: &str,
        name: Option<&str>,
        frame: Rect,
    ) -> Result<ElementId, HostError> {
        if !kind.is_diagram() {
            return Err(HostError::invalid("type", format!("{} is not a diagram type", kind)));
        }
        let mut owner = self.resolve_parent(parent)?;
        for container in kind.container_chain() {
            owner = self.insert_element(*container, Some(&owner), None, &Map::new());
        }
        let mut init = Map::new();
        if let Some(name) = name {
            init.insert("name".to_string(), Value::String(name.to_string()));
        }
        let diagram = self.insert_element(kind, Some(&owner), None, &init);
        self.insert_view(View {
            id: String::new(),
            kind: ViewKind::Frame,
            diagram: diagram.clone(),
            model: Some(diagram.clone()),
            left: frame.left,
            top: frame.top,
            width: frame.width,
            height: frame.height,
            points: Vec::new(),
            tail: None,
            head: None,
            host: None,
            style: Map::new(),
        });
        Ok(diagram)
    }

    // --- Mutation ---

    /// Journaled property write.
    pub fn set_property(&mut self, target: Target<'_>, path: &str, value: Value) -> Result<(), HostError> {
        match target {
            Target::Element(id) => {
                if path == "name" && !value.is_string() {
                    return Err(HostError::invalid(path, "expected a string"));
                }
                if matches!(path, "id" | "kind" | "parent" | "ownerField") {
                    return Err(HostError::invalid(path, "field is read-only"));
                }
                let element = self
                    .element_mut(id)
                    .ok_or_else(|| HostError::missing("Element", id))?;
                let old = element.read(path);
                if old.as_ref() == Some(&value) {
                    return Ok(());
                }
                element.write_raw(path, Some(value.clone()));
                let linked = match (path, element.kind.linked_field()) {
                    ("name", Some(field)) => element.reference(field).map(str::to_string),
                    _ => None,
                };
                self.record(Change::SetElement {
                    id: id.to_string(),
                    path: path.to_string(),
                    old,
                    new: Some(value.clone()),
                });
                if let Some(linked) = linked.filter(|l| self.get_by_id(l).is_some()) {
                    self.set_property(Target::Element(&linked), "name", value)?;
                }
            }
            Target::View(id) => {
                View::validate_field(path, &value)?;
                let view = self
                    .view_mut(id)
                    .ok_or_else(|| HostError::missing("View", id))?;
                let old = view.field(path);
                if old == value {
                    return Ok(());
                }
                view.write_raw(path, value.clone());
                self.record(Change::SetView {
                    id: id.to_string(),
                    field: path.to_string(),
                    old,
                    new: value,
                });
            }
        }
        Ok(())
    }

    /// Journaled removal of elements and views.
    ///
    /// Owned descendants go with their owner; views of removed elements, views
    /// on removed diagrams, ports on removed hosts and edges whose endpoints
    /// vanish are removed as well.
    pub fn delete_elements(&mut self, models: &[ElementId], views: &[ViewId]) -> Result<Removed, HostError> {
        for id in models {
            if self.get_by_id(id).is_none() {
                return Err(HostError::missing("Element", id));
            }
        }
        for id in views {
            if self.view(id).is_none() {
                return Err(HostError::missing("View", id));
            }
        }

        let doomed = self.subtree(models);

        let mut doomed_views: HashSet<ViewId> = views.iter().cloned().collect();
        for v in &self.views {
            let owned = v.model.as_ref().is_some_and(|m| doomed.contains(m));
            if owned || doomed.contains(&v.diagram) {
                doomed_views.insert(v.id.clone());
            }
        }
        let mut changed = true;
        while changed {
            changed = false;
            for v in &self.views {
                if doomed_views.contains(&v.id) {
                    continue;
                }
                let anchored = [&v.tail, &v.head, &v.host]
                    .into_iter()
                    .flatten()
                    .any(|other| doomed_views.contains(other));
                if anchored {
                    doomed_views.insert(v.id.clone());
                    changed = true;
                }
            }
        }

        let mut removed = Removed::default();
        for index in (0..self.views.len()).rev() {
            if doomed_views.contains(&self.views[index].id) {
                let view = self.views.remove(index);
                removed.views.push(view.id.clone());
                self.record(Change::RemoveView { view, index });
            }
        }
        for index in (0..self.elements.len()).rev() {
            if doomed.contains(&self.elements[index].id) {
                let element = self.elements.remove(index);
                removed.elements.push(element.id.clone());
                self.record(Change::RemoveElement { element, index });
            }
        }
        self.reindex();
        removed.elements.reverse();
        removed.views.reverse();
        Ok(removed)
    }

    /// Run `f` with every change it makes grouped into one undoable unit.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Graph) -> T) -> T {
        self.journal.depth += 1;
        let out = f(self);
        self.journal.depth -= 1;
        if self.journal.depth == 0 {
            self.commit();
        }
        out
    }

    fn record(&mut self, change: Change) {
        self.journal.open.push(change);
        if self.journal.depth == 0 {
            self.commit();
        }
    }

    fn commit(&mut self) {
        if self.journal.open.is_empty() {
            return;
        }
        let unit = std::mem::take(&mut self.journal.open);
        self.journal.undo.push(unit);
        self.journal.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.journal.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.journal.redo.is_empty()
    }

    /// Revert the last unit. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(unit) = self.journal.undo.pop() else {
            return false;
        };
        for change in unit.iter().rev() {
            self.apply(change, false);
        }
        self.reindex();
        self.journal.redo.push(unit);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(unit) = self.journal.redo.pop() else {
            return false;
        };
        for change in &unit {
            self.apply(change, true);
        }
        self.reindex();
        self.journal.undo.push(unit);
        true
    }

    fn apply(&mut self, change: &Change, forward: bool) {
        if matches!(
            change,
            Change::AddElement(_) | Change::RemoveElement { .. } | Change::AddView(_) | Change::RemoveView { .. }
        ) {
            self.index.stale = true;
        }
        match change {
            Change::AddElement(element) => {
                if forward {
                    self.elements.push(element.clone());
                } else {
                    self.elements.retain(|e| e.id != element.id);
                }
            }
            Change::RemoveElement { element, index } => {
                if forward {
                    self.elements.retain(|e| e.id != element.id);
                } else {
                    let at = (*index).min(self.elements.len());
                    self.elements.insert(at, element.clone());
                }
            }
            Change::AddView(view) => {
                if forward {
                    self.views.push(view.clone());
                } else {
                    self.views.retain(|v| v.id != view.id);
                }
            }
            Change::RemoveView { view, index } => {
                if forward {
                    self.views.retain(|v| v.id != view.id);
                } else {
                    let at = (*index).min(self.views.len());
                    self.views.insert(at, view.clone());
                }
            }
            Change::SetElement { id, path, old, new } => {
                let value = if forward { new } else { old };
                if let Some(element) = self.element_mut(id) {
                    element.write_raw(path, value.clone());
                }
            }
            Change::SetView { id, field, old, new } => {
                let value = if forward { new } else { old };
                if let Some(view) = self.view_mut(id) {
                    view.write_raw(field, value.clone());
                }
            }
        }
    }
}
