//! Referential integrity checks and the diagram deletion cascade.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::graph::{ElementId, Graph, Removed};

/// An element holding a reference into a set that is about to be deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Referrer {
    pub id: ElementId,
    pub kind: String,
    pub name: String,
    pub field: &'static str,
    pub target: ElementId,
}

/// `roots` and every element transitively owned by them.
pub fn closure<'a>(graph: &Graph, roots: impl IntoIterator<Item = &'a ElementId>) -> HashSet<ElementId> {
    graph.subtree(roots)
}

/// Elements outside `targets` whose reference fields point into `targets`.
pub fn referrers(graph: &Graph, targets: &HashSet<ElementId>) -> Vec<Referrer> {
    let mut found = Vec::new();
    for e in graph.elements() {
        if targets.contains(&e.id) {
            continue;
        }
        for field in e.kind.reference_fields() {
            if let Some(target) = e.reference(field).filter(|t| targets.contains(*t)) {
                found.push(Referrer {
                    id: e.id.clone(),
                    kind: e.kind.tag().to_string(),
                    name: e.name.clone(),
                    field,
                    target: target.to_string(),
                });
            }
        }
    }
    found
}

/// Refuse deletion of `id` while anything outside its subtree refers into it.
pub fn check_delete(graph: &Graph, id: &str) -> Result<(), ApiError> {
    let element = graph
        .get_by_id(id)
        .ok_or_else(|| ApiError::not_found("Element", id))?;
    let subtree = closure(graph, [&element.id]);
    let blocking = referrers(graph, &subtree);
    if blocking.is_empty() {
        return Ok(());
    }
    let listed: Vec<String> = blocking
        .iter()
        .map(|r| {
            let mut s = format!("{} '{}' ({}) via {}", r.kind, r.name, r.id, r.field);
            if r.target != element.id {
                s.push_str(&format!(" -> {}", r.target));
            }
            s
        })
        .collect();
    Err(ApiError::Integrity(format!(
        "Cannot delete {} '{}' ({}): referenced by {}",
        element.kind,
        element.name,
        element.id,
        listed.join(", ")
    )))
}

/// Delete one element with its views. Diagrams go through the cascade; a
/// linked element (a lifeline's represented attribute) goes too once nothing
/// else refers to it.
pub fn delete_element(graph: &mut Graph, id: &str) -> Result<Removed, ApiError> {
    let element = graph
        .get_by_id(id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Element", id))?;
    if element.kind.is_diagram() {
        return delete_diagrams(graph, &[element.id]).map(|outcome| outcome.removed);
    }
    check_delete(graph, id)?;

    let mut models = vec![element.id.clone()];
    if let Some(linked) = element
        .kind
        .linked_field()
        .and_then(|field| element.reference(field))
        .filter(|linked| graph.get_by_id(linked).is_some())
    {
        let doomed = closure(graph, &models);
        let linked_set = closure(graph, [&linked.to_string()]);
        let others = referrers(graph, &linked_set)
            .into_iter()
            .filter(|r| !doomed.contains(&r.id))
            .count();
        if others == 0 {
            models.push(linked.to_string());
        }
    }
    let views: Vec<String> = graph.views_of(id).iter().map(|v| v.id.clone()).collect();
    let removed = graph.batch(|g| g.delete_elements(&models, &views))?;
    info!(id, kind = %element.kind, elements = removed.elements.len(), views = removed.views.len(), "element deleted");
    Ok(removed)
}

// --- Diagram cascade ---

/// What deleting a batch of diagrams will remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadePlan {
    pub diagrams: Vec<ElementId>,
    /// Model elements whose only views were on the deleted diagrams.
    pub models: Vec<ElementId>,
    /// Auto-created containers left empty by the deletion.
    pub containers: Vec<ElementId>,
    /// Orphans kept because something outside the deletion still refers to them.
    pub retained: Vec<ElementId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeOutcome {
    pub plan: CascadePlan,
    pub removed: Removed,
}

/// Compute the cascade for deleting `ids` together. "Has a view elsewhere"
/// is judged against the state after the whole batch is gone.
pub fn plan_diagram_deletion(graph: &Graph, ids: &[ElementId]) -> Result<CascadePlan, ApiError> {
    let mut diagrams: Vec<ElementId> = Vec::new();
    for id in ids {
        match graph.get_by_id(id) {
            Some(d) if d.kind.is_diagram() => {
                if !diagrams.contains(id) {
                    diagrams.push(id.clone());
                }
            }
            _ => return Err(ApiError::not_found("Diagram", id)),
        }
    }
    let batch: HashSet<&str> = diagrams.iter().map(String::as_str).collect();

    let mut candidates: Vec<ElementId> = Vec::new();
    for view in graph.views() {
        if !batch.contains(view.diagram.as_str()) || view.kind.is_frame() {
            continue;
        }
        let Some(model) = view.model.as_ref() else {
            continue;
        };
        if candidates.contains(model) {
            continue;
        }
        let elsewhere = graph
            .views_of(model)
            .iter()
            .any(|v| !batch.contains(v.diagram.as_str()));
        if elsewhere {
            continue;
        }
        candidates.push(model.clone());
        let linked = graph.get_by_id(model).and_then(|e| {
            e.kind
                .linked_field()
                .and_then(|field| e.reference(field))
                .map(str::to_string)
        });
        if let Some(linked) = linked {
            let has_views = graph
                .views_of(&linked)
                .iter()
                .any(|v| !batch.contains(v.diagram.as_str()));
            if !has_views && !candidates.contains(&linked) && graph.get_by_id(&linked).is_some() {
                candidates.push(linked);
            }
        }
    }

    let mut retained = Vec::new();
    loop {
        let doomed = closure(graph, diagrams.iter().chain(candidates.iter()));
        let blocked: Vec<ElementId> = candidates
            .iter()
            .filter(|c| {
                let subtree = closure(graph, [*c]);
                referrers(graph, &subtree)
                    .iter()
                    .any(|r| !doomed.contains(&r.id))
            })
            .cloned()
            .collect();
        if blocked.is_empty() {
            break;
        }
        candidates.retain(|c| !blocked.contains(c));
        retained.extend(blocked);
    }

    let mut doomed = closure(graph, diagrams.iter().chain(candidates.iter()));
    let mut containers = Vec::new();
    let mut changed = true;
    while changed {
        changed = false;
        for diagram in &diagrams {
            let mut cursor = graph.get_by_id(diagram).and_then(|d| d.parent.clone());
            while let Some(id) = cursor {
                let Some(container) = graph.get_by_id(&id) else {
                    break;
                };
                if !container.kind.is_auto_container() {
                    break;
                }
                if doomed.contains(&id) {
                    cursor = container.parent.clone();
                    continue;
                }
                let emptied = graph
                    .children_of(&id)
                    .iter()
                    .all(|child| doomed.contains(&child.id));
                if !emptied {
                    break;
                }
                doomed.insert(id.clone());
                containers.push(id);
                changed = true;
                cursor = container.parent.clone();
            }
        }
    }

    let order = |ids: &mut Vec<ElementId>| {
        ids.sort_by_key(|id| graph.elements().iter().position(|e| &e.id == id));
    };
    order(&mut candidates);
    order(&mut retained);

    Ok(CascadePlan {
        diagrams,
        models: candidates,
        containers,
        retained,
    })
}

/// Delete a batch of diagrams with their views, orphaned model elements and
/// emptied auto-created containers, as one undoable unit.
pub fn delete_diagrams(graph: &mut Graph, ids: &[ElementId]) -> Result<CascadeOutcome, ApiError> {
    let plan = plan_diagram_deletion(graph, ids)?;
    for id in &plan.retained {
        warn!(id, "orphaned element kept: still referenced outside the deletion");
    }
    let models: Vec<ElementId> = plan
        .diagrams
        .iter()
        .chain(&plan.models)
        .chain(&plan.containers)
        .cloned()
        .collect();
    let views: Vec<String> = plan
        .diagrams
        .iter()
        .flat_map(|d| graph.views_on(d))
        .map(|v| v.id.clone())
        .collect();
    let removed = graph.batch(|g| g.delete_elements(&models, &views))?;
    info!(
        diagrams = plan.diagrams.len(),
        models = plan.models.len(),
        containers = plan.containers.len(),
        "diagrams deleted"
    );
    Ok(CascadeOutcome { plan, removed })
}
