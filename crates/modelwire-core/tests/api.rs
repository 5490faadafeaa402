use float_cmp::assert_approx_eq;
use modelwire_core::{ApiRequest, ApiResponse, LayoutConfig, Method, Router, Workspace};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct Harness {
    router: Router,
    ws: Workspace,
}

impl Harness {
    fn new() -> Self {
        Harness::with_layout(LayoutConfig::default())
    }

    fn with_layout(layout: LayoutConfig) -> Self {
        Harness {
            router: Router::standard().unwrap(),
            ws: Workspace::new(layout),
        }
    }

    async fn call(&mut self, method: Method, path: &str, body: Option<Value>) -> ApiResponse {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.router.handle(&mut self.ws, request).await
    }

    /// Call and insist on success; returns `data`.
    async fn ok(&mut self, method: Method, path: &str, body: Option<Value>) -> Value {
        let response = self.call(method, path, body).await;
        assert!(response.success, "{} {} failed: {:?}", method, path, response.error);
        response.data.unwrap_or(Value::Null)
    }

    async fn diagram(&mut self, kind: &str) -> String {
        let data = self
            .ok(Method::Post, "/api/diagrams", Some(json!({"type": kind})))
            .await;
        data["id"].as_str().unwrap().to_string()
    }

    async fn class(&mut self, diagram: &str, name: &str) -> String {
        let data = self
            .ok(
                Method::Post,
                "/api/class/classes",
                Some(json!({"diagramId": diagram, "name": name})),
            )
            .await;
        data["id"].as_str().unwrap().to_string()
    }
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn created_element_reads_back_identically() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let created = h
        .ok(
            Method::Post,
            "/api/class/classes",
            Some(json!({"diagramId": diagram, "name": "Order", "visibility": "public"})),
        )
        .await;
    let id = created["id"].as_str().unwrap();
    let fetched = h.ok(Method::Get, &format!("/api/class/classes/{}", id), None).await;
    assert_eq!(fetched, created);
    assert_eq!(fetched["type"], json!("Class"));
    assert_eq!(fetched["visibility"], json!("public"));
}

#[tokio::test]
async fn update_round_trips_through_get() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let id = h.class(&diagram, "Order").await;
    let path = format!("/api/class/classes/{}", id);
    let updated = h
        .ok(
            Method::Put,
            &path,
            Some(json!({"name": "PurchaseOrder", "isAbstract": true, "documentation": "A purchase"})),
        )
        .await;
    assert_eq!(updated["name"], json!("PurchaseOrder"));
    assert_eq!(updated["isAbstract"], json!(true));
    assert_eq!(h.ok(Method::Get, &path, None).await, updated);
}

#[tokio::test]
async fn abstract_class_alias_seeds_the_flag() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let data = h
        .ok(
            Method::Post,
            "/api/class/classes",
            Some(json!({"diagramId": diagram, "type": "AbstractClass", "name": "Shape"})),
        )
        .await;
    assert_eq!(data["type"], json!("Class"));
    assert_eq!(data["isAbstract"], json!(true));
}

#[tokio::test]
async fn unknown_field_is_rejected_with_allowed_list() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let response = h
        .call(
            Method::Post,
            "/api/class/classes",
            Some(json!({"diagramId": diagram, "foo": 1})),
        )
        .await;
    assert_eq!(response.status, 400);
    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.starts_with("Unknown field(s): foo. Allowed fields: "), "{}", error);
    assert!(error.contains("diagramId"));
    assert_eq!(response.request.body, Some(json!({"diagramId": diagram, "foo": 1})));
}

#[tokio::test]
async fn invalid_enum_value_is_rejected() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let response = h
        .call(
            Method::Post,
            "/api/class/classes",
            Some(json!({"diagramId": diagram, "visibility": "everyone"})),
        )
        .await;
    assert_eq!(response.status, 400);
    assert!(response.error.unwrap().starts_with("Invalid value for 'visibility'"));
}

#[tokio::test]
async fn deleting_a_missing_element_is_not_found() {
    let mut h = Harness::new();
    let response = h.call(Method::Delete, "/api/class/classes/el-999", None).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.error.as_deref(), Some("Class not found: el-999"));
}

#[tokio::test]
async fn wrong_family_diagram_is_not_found() {
    let mut h = Harness::new();
    let erd = h.diagram("ErdDiagram").await;
    let response = h
        .call(Method::Post, "/api/class/classes", Some(json!({"diagramId": erd})))
        .await;
    assert_eq!(response.status, 404);
    assert_eq!(response.error, Some(format!("Diagram not found: {}", erd)));
}

#[tokio::test]
async fn frame_grows_to_cover_new_element() {
    let mut h = Harness::with_layout(LayoutConfig {
        frame_width: 400.0,
        frame_height: 400.0,
        ..LayoutConfig::default()
    });
    let diagram = h.diagram("ClassDiagram").await;
    h.ok(
        Method::Post,
        "/api/class/classes",
        Some(json!({"diagramId": diagram, "x1": 500, "y1": 500, "x2": 700, "y2": 700})),
    )
    .await;
    let data = h.ok(Method::Get, &format!("/api/diagrams/{}", diagram), None).await;
    let frame = &data["frame"];
    assert_approx_eq!(f64, frame["left"].as_f64().unwrap(), 0.0);
    assert_approx_eq!(f64, frame["top"].as_f64().unwrap(), 0.0);
    assert!(frame["right"].as_f64().unwrap() >= 730.0);
    assert!(frame["bottom"].as_f64().unwrap() >= 730.0);
}

#[tokio::test]
async fn referenced_node_cannot_be_deleted_until_relation_is_gone() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let order = h.class(&diagram, "Order").await;
    let line = h.class(&diagram, "OrderLine").await;
    let assoc = h
        .ok(
            Method::Post,
            "/api/class/associations",
            Some(json!({"diagramId": diagram, "sourceId": order, "targetId": line})),
        )
        .await;
    let assoc = assoc["id"].as_str().unwrap().to_string();

    let refused = h.call(Method::Delete, &format!("/api/class/classes/{}", order), None).await;
    assert_eq!(refused.status, 400);
    let error = refused.error.unwrap();
    assert!(error.starts_with(&format!("Cannot delete Class 'Order' ({})", order)), "{}", error);
    assert!(error.contains(&assoc));
    assert!(h.ws.graph.get_by_id(&order).is_some());

    h.ok(Method::Delete, &format!("/api/class/associations/{}", assoc), None).await;
    let deleted = h.ok(Method::Delete, &format!("/api/class/classes/{}", order), None).await;
    assert_eq!(deleted["id"], json!(order));
    assert!(h.ws.graph.get_by_id(&order).is_none());
}

#[tokio::test]
async fn column_reference_blocks_entity_deletion() {
    let mut h = Harness::new();
    let diagram = h.diagram("ErdDiagram").await;
    let entity = |name: &'static str| {
        json!({"diagramId": diagram, "name": name})
    };
    let customer = h.ok(Method::Post, "/api/erd/entities", Some(entity("customer"))).await;
    let orders = h.ok(Method::Post, "/api/erd/entities", Some(entity("orders"))).await;
    let (customer, orders) = (
        customer["id"].as_str().unwrap().to_string(),
        orders["id"].as_str().unwrap().to_string(),
    );
    let pk = h
        .ok(
            Method::Post,
            &format!("/api/erd/entities/{}/columns", customer),
            Some(json!({"name": "id", "primaryKey": true})),
        )
        .await;
    let pk = pk["id"].as_str().unwrap().to_string();
    h.ok(
        Method::Post,
        &format!("/api/erd/entities/{}/columns", orders),
        Some(json!({"name": "customer_id", "referenceTo": pk})),
    )
    .await;

    let refused = h.call(Method::Delete, &format!("/api/erd/entities/{}", customer), None).await;
    assert_eq!(refused.status, 400);
    assert!(refused.error.unwrap().contains(&format!("via referenceTo -> {}", pk)));

    let missing = h
        .call(
            Method::Post,
            &format!("/api/erd/entities/{}/columns", orders),
            Some(json!({"name": "x", "referenceTo": orders})),
        )
        .await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.error, Some(format!("ErdColumn not found: {}", orders)));
}

#[tokio::test]
async fn diagram_deletion_keeps_elements_shown_elsewhere() {
    let mut h = Harness::new();
    let first = h.diagram("ClassDiagram").await;
    let second = h.diagram("ClassDiagram").await;
    let only_here = h.class(&first, "Draft").await;
    let shared = h.class(&first, "Customer").await;
    h.ok(
        Method::Post,
        &format!("/api/diagrams/{}/views", second),
        Some(json!({"modelId": shared})),
    )
    .await;

    let data = h.ok(Method::Delete, &format!("/api/diagrams/{}", first), None).await;
    assert_eq!(ids(&data["models"]), vec![only_here.clone()]);
    assert!(h.ws.graph.get_by_id(&only_here).is_none());
    assert!(h.ws.graph.get_by_id(&shared).is_some());
    assert!(h.ws.graph.get_by_id(&first).is_none());
}

#[tokio::test]
async fn batch_deletion_judges_views_after_the_whole_batch() {
    let mut h = Harness::new();
    let first = h.diagram("ClassDiagram").await;
    let second = h.diagram("ClassDiagram").await;
    let shared = h.class(&first, "Customer").await;
    h.ok(
        Method::Post,
        &format!("/api/diagrams/{}/views", second),
        Some(json!({"modelId": shared})),
    )
    .await;

    let data = h
        .ok(Method::Delete, "/api/diagrams", Some(json!({"ids": [first, second]})))
        .await;
    assert_eq!(ids(&data["models"]), vec![shared.clone()]);
    assert!(h.ws.graph.get_by_id(&shared).is_none());

    h.ok(Method::Post, "/api/undo", None).await;
    assert!(h.ws.graph.get_by_id(&shared).is_some());
    assert!(h.ws.graph.get_by_id(&first).is_some());
    assert!(h.ws.graph.get_by_id(&second).is_some());
}

#[tokio::test]
async fn undo_with_empty_history_is_a_bad_request() {
    let mut h = Harness::new();
    let response = h.call(Method::Post, "/api/undo", None).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.error.as_deref(), Some("Nothing to undo"));
}

#[tokio::test]
async fn search_supports_globs_and_type_filter() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    h.class(&diagram, "OrderService").await;
    h.class(&diagram, "OrderRepository").await;
    h.class(&diagram, "Customer").await;

    let data = h.ok(Method::Get, "/api/search?keyword=Order*&type=Class", None).await;
    assert_eq!(data.as_array().unwrap().len(), 2);
    let data = h.ok(Method::Get, "/api/search?keyword=custom", None).await;
    assert_eq!(data[0]["name"], json!("Customer"));

    let missing = h.call(Method::Get, "/api/search", None).await;
    assert_eq!(missing.status, 400);
}

#[tokio::test]
async fn moving_a_view_reroutes_attached_edges() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let a = h.class(&diagram, "A").await;
    let b = h.class(&diagram, "B").await;
    h.ok(
        Method::Post,
        "/api/class/dependencies",
        Some(json!({"diagramId": diagram, "sourceId": a, "targetId": b})),
    )
    .await;
    let view = h.ws.graph.find_view_on_diagram(&diagram, &a).unwrap().id.clone();

    let moved = h
        .ok(Method::Put, &format!("/api/views/{}", view), Some(json!({"left": 40, "top": 900})))
        .await;
    assert_approx_eq!(f64, moved["top"].as_f64().unwrap(), 900.0);

    let edge = h
        .ws
        .graph
        .views_on(&diagram)
        .into_iter()
        .find(|v| v.kind.is_edge())
        .cloned()
        .unwrap();
    let first = edge.points.first().unwrap();
    assert_approx_eq!(f64, first.x, 40.0 + 80.0);
    assert_approx_eq!(f64, first.y, 900.0 + 40.0);

    let frame = h.ws.graph.frame_of(&diagram).unwrap();
    assert!(frame.top + frame.height >= 900.0 + 80.0 + 30.0);
}

#[tokio::test]
async fn align_left_lines_views_up() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let a = h.class(&diagram, "A").await;
    let b = h.class(&diagram, "B").await;
    h.ok(
        Method::Post,
        &format!("/api/diagrams/{}/align", diagram),
        Some(json!({"viewIds": [a, b], "mode": "left"})),
    )
    .await;
    let left_a = h.ws.graph.find_view_on_diagram(&diagram, &a).unwrap().left;
    let left_b = h.ws.graph.find_view_on_diagram(&diagram, &b).unwrap().left;
    assert_approx_eq!(f64, left_a, left_b);

    let bad = h
        .call(
            Method::Post,
            &format!("/api/diagrams/{}/align", diagram),
            Some(json!({"viewIds": [a], "mode": "diagonal"})),
        )
        .await;
    assert_eq!(bad.status, 400);
}

#[tokio::test]
async fn sequence_lifeline_rename_follows_its_attribute() {
    let mut h = Harness::new();
    let diagram = h.diagram("SequenceDiagram").await;
    let lifeline = h
        .ok(
            Method::Post,
            "/api/sequence/lifelines",
            Some(json!({"diagramId": diagram, "name": "client"})),
        )
        .await;
    let id = lifeline["id"].as_str().unwrap().to_string();
    let represent = lifeline["representId"].as_str().unwrap().to_string();

    h.ok(
        Method::Put,
        &format!("/api/sequence/lifelines/{}", id),
        Some(json!({"name": "server"})),
    )
    .await;
    assert_eq!(h.ws.graph.get_by_id(&represent).unwrap().name, "server");

    h.ok(Method::Delete, &format!("/api/sequence/lifelines/{}", id), None).await;
    assert!(h.ws.graph.get_by_id(&represent).is_none());
}

#[tokio::test]
async fn malformed_percent_encoding_is_a_bad_request() {
    let mut h = Harness::new();
    let response = h.call(Method::Get, "/api/class/classes/%zz", None).await;
    assert_eq!(response.status, 400);
    assert!(response.error.unwrap().starts_with("Malformed percent-encoding in path"));

    let response = h.call(Method::Get, "/api/search?keyword=%E0%A4", None).await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn unmatched_route_is_not_found() {
    let mut h = Harness::new();
    let response = h.call(Method::Post, "/api/nowhere", None).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.error.as_deref(), Some("Route not found: POST /api/nowhere"));

    let status = h.ok(Method::Get, "/api/status", None).await;
    assert!(status["families"].is_array());
}

#[tokio::test]
async fn project_survives_save_and_open() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let id = h.class(&diagram, "Persisted").await;
    let path = std::env::temp_dir().join(format!("modelwire-{}-project.json", std::process::id()));
    let path_text = path.display().to_string();

    h.ok(Method::Post, "/api/project/save", Some(json!({"path": path_text}))).await;
    h.ok(Method::Delete, &format!("/api/class/classes/{}", id), None).await;
    assert!(h.ws.graph.get_by_id(&id).is_none());

    h.ok(Method::Post, "/api/project/open", Some(json!({"path": path_text}))).await;
    assert_eq!(h.ws.graph.get_by_id(&id).unwrap().name, "Persisted");
    assert!(!h.ws.graph.can_undo());
    assert_eq!(h.ws.project_path.as_deref(), Some(path.as_path()));

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn opening_a_missing_file_fails_cleanly() {
    let mut h = Harness::new();
    let response = h
        .call(
            Method::Post,
            "/api/project/open",
            Some(json!({"path": "/nonexistent/modelwire/project.json"})),
        )
        .await;
    assert_eq!(response.status, 400);
    assert!(response.error.unwrap().starts_with("Cannot read"));
}

#[tokio::test]
async fn moving_a_view_undoes_as_one_step() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let a = h.class(&diagram, "A").await;
    let b = h.class(&diagram, "B").await;
    h.ok(
        Method::Post,
        "/api/class/dependencies",
        Some(json!({"diagramId": diagram, "sourceId": a, "targetId": b})),
    )
    .await;
    let view = h.ws.graph.find_view_on_diagram(&diagram, &a).unwrap().clone();
    let edge_points = |h: &Harness| {
        h.ws.graph
            .views_on(&diagram)
            .into_iter()
            .find(|v| v.kind.is_edge())
            .map(|v| v.points.clone())
            .unwrap()
    };
    let before = edge_points(&h);
    let frame_before = h.ws.graph.frame_of(&diagram).unwrap().height;

    h.ok(Method::Put, &format!("/api/views/{}", view.id), Some(json!({"left": 40, "top": 900})))
        .await;
    assert!(h.ws.graph.frame_of(&diagram).unwrap().height > frame_before);

    h.ok(Method::Post, "/api/undo", None).await;
    let restored = h.ws.graph.view(&view.id).unwrap();
    assert_approx_eq!(f64, restored.left, view.left);
    assert_approx_eq!(f64, restored.top, 100.0);
    assert_eq!(edge_points(&h), before);
    assert_approx_eq!(f64, h.ws.graph.frame_of(&diagram).unwrap().height, frame_before);
}

#[tokio::test]
async fn aligning_views_undoes_as_one_step() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let a = h.class(&diagram, "A").await;
    let b = h.class(&diagram, "B").await;
    let left_b = h.ws.graph.find_view_on_diagram(&diagram, &b).unwrap().left;
    h.ok(
        Method::Post,
        &format!("/api/diagrams/{}/align", diagram),
        Some(json!({"viewIds": [a, b], "mode": "left"})),
    )
    .await;
    h.ok(Method::Post, "/api/undo", None).await;
    let restored = h.ws.graph.find_view_on_diagram(&diagram, &b).unwrap().left;
    assert_approx_eq!(f64, restored, left_b);
}

#[tokio::test]
async fn raw_properties_cannot_rewire_relation_endpoints() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let order = h.class(&diagram, "Order").await;
    let line = h.class(&diagram, "OrderLine").await;
    let assoc = h
        .ok(
            Method::Post,
            "/api/class/associations",
            Some(json!({"diagramId": diagram, "sourceId": order, "targetId": line})),
        )
        .await;
    let assoc = assoc["id"].as_str().unwrap().to_string();
    let path = format!("/api/elements/{}", assoc);

    let refused = h
        .call(Method::Put, &path, Some(json!({"properties": {"target": "el-9999"}})))
        .await;
    assert_eq!(refused.status, 400);
    assert!(refused.error.unwrap().contains("relation endpoint"));

    let bad_end = h
        .call(Method::Put, &path, Some(json!({"properties": {"end1.multiplicity": "banana"}})))
        .await;
    assert_eq!(bad_end.status, 400);
    assert!(bad_end
        .error
        .unwrap()
        .starts_with("Invalid value for 'end1.multiplicity'"));

    h.ok(Method::Put, &path, Some(json!({"properties": {"end1.multiplicity": "0..*"}})))
        .await;
    let stored = h.ws.graph.get_by_id(&assoc).unwrap();
    assert_eq!(stored.prop("end1.multiplicity"), Some(&json!("0..*")));
    assert_eq!(stored.reference("target"), Some(line.as_str()));

    let still_protected = h.call(Method::Delete, &format!("/api/class/classes/{}", line), None).await;
    assert_eq!(still_protected.status, 400);
}

#[tokio::test]
async fn raw_column_reference_must_name_a_column() {
    let mut h = Harness::new();
    let diagram = h.diagram("ErdDiagram").await;
    let entity = h
        .ok(Method::Post, "/api/erd/entities", Some(json!({"diagramId": diagram, "name": "customer"})))
        .await;
    let entity = entity["id"].as_str().unwrap().to_string();
    let column = h
        .ok(
            Method::Post,
            &format!("/api/erd/entities/{}/columns", entity),
            Some(json!({"name": "id"})),
        )
        .await;
    let column = column["id"].as_str().unwrap().to_string();

    let refused = h
        .call(
            Method::Put,
            &format!("/api/elements/{}", column),
            Some(json!({"properties": {"referenceTo": entity}})),
        )
        .await;
    assert_eq!(refused.status, 404);
    assert_eq!(refused.error, Some(format!("ErdColumn not found: {}", entity)));
    assert_eq!(h.ws.graph.get_by_id(&column).unwrap().prop("referenceTo"), None);
}

#[tokio::test]
async fn attributes_are_model_only_children() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let order = h.class(&diagram, "Order").await;
    let attr = h
        .ok(
            Method::Post,
            &format!("/api/class/classes/{}/attributes", order),
            Some(json!({"name": "total", "dataType": "int", "visibility": "private"})),
        )
        .await;
    let attr = attr["id"].as_str().unwrap().to_string();
    assert!(h.ws.graph.views_of(&attr).is_empty());
    assert_eq!(h.ws.graph.get_by_id(&attr).unwrap().parent.as_deref(), Some(order.as_str()));

    let class = h.ok(Method::Get, &format!("/api/class/classes/{}", order), None).await;
    assert_eq!(class["attributes"][0]["name"], json!("total"));
    assert_eq!(class["attributes"][0]["dataType"], json!("int"));

    let listed = h
        .ok(Method::Get, &format!("/api/class/classes/{}/attributes", order), None)
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn ports_anchor_on_the_class_view_and_follow_it() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let order = h.class(&diagram, "Order").await;
    let host = h.ws.graph.find_view_on_diagram(&diagram, &order).unwrap().clone();

    let port = h
        .ok(
            Method::Post,
            &format!("/api/class/classes/{}/ports", order),
            Some(json!({"name": "in", "isBehavior": true})),
        )
        .await;
    let port = port["id"].as_str().unwrap().to_string();
    let port_view = h.ws.graph.views_of(&port)[0].clone();
    assert_eq!(port_view.host.as_deref(), Some(host.id.as_str()));

    h.ok(
        Method::Put,
        &format!("/api/views/{}", host.id),
        Some(json!({"left": host.left + 50.0})),
    )
    .await;
    let dragged = h.ws.graph.view(&port_view.id).unwrap();
    assert_approx_eq!(f64, dragged.left, port_view.left + 50.0);
    assert_approx_eq!(f64, dragged.top, port_view.top);
}

#[tokio::test]
async fn association_ends_are_stored_and_serialized() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let order = h.class(&diagram, "Order").await;
    let line = h.class(&diagram, "OrderLine").await;
    let assoc = h
        .ok(
            Method::Post,
            "/api/class/associations",
            Some(json!({
                "diagramId": diagram,
                "sourceId": order,
                "targetId": line,
                "end1": {"multiplicity": "0..*", "navigable": true}
            })),
        )
        .await;
    assert_eq!(assoc["end1"], json!({"multiplicity": "0..*", "navigable": true}));
    assert_eq!(assoc["sourceId"], json!(order));

    let bad = h
        .call(
            Method::Post,
            "/api/class/associations",
            Some(json!({
                "diagramId": diagram,
                "sourceId": order,
                "targetId": line,
                "end2": {"multiplicity": "many"}
            })),
        )
        .await;
    assert_eq!(bad.status, 400);
}

#[tokio::test]
async fn flowchart_start_and_end_aliases_seed_terminal_kind() {
    let mut h = Harness::new();
    let diagram = h.diagram("FlowchartDiagram").await;
    for (alias, expected) in [("Start", "start"), ("End", "end")] {
        let node = h
            .ok(
                Method::Post,
                "/api/flowchart/nodes",
                Some(json!({"diagramId": diagram, "type": alias, "name": alias})),
            )
            .await;
        assert_eq!(node["type"], json!("FlowchartTerminal"));
        assert_eq!(node["terminalKind"], json!(expected));
    }
}

#[tokio::test]
async fn timing_lanes_stack_at_frame_width() {
    let mut h = Harness::new();
    let diagram = h.diagram("TimingDiagram").await;
    let mut lanes = Vec::new();
    for name in ["clock", "reset"] {
        let lane = h
            .ok(
                Method::Post,
                "/api/timing/lifelines",
                Some(json!({"diagramId": diagram, "name": name})),
            )
            .await;
        lanes.push(lane["id"].as_str().unwrap().to_string());
    }
    let first = h.ws.graph.find_view_on_diagram(&diagram, &lanes[0]).unwrap().clone();
    let second = h.ws.graph.find_view_on_diagram(&diagram, &lanes[1]).unwrap().clone();
    let frame = h.ws.graph.frame_of(&diagram).unwrap().clone();
    assert!(second.top >= first.top + first.height);
    assert_approx_eq!(f64, first.width, frame.width);
    assert_approx_eq!(f64, second.width, frame.width);

    h.ok(
        Method::Post,
        &format!("/api/timing/lifelines/{}/states", lanes[0]),
        Some(json!({"name": "high"})),
    )
    .await;
    let lane = h.ok(Method::Get, &format!("/api/timing/lifelines/{}", lanes[0]), None).await;
    assert_eq!(lane["states"][0]["name"], json!("high"));
}

#[tokio::test]
async fn layout_grids_views_and_fit_frame_covers_them() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let mut classes = Vec::new();
    for (name, x) in [("A", 1500.0), ("B", 1900.0)] {
        let class = h
            .ok(
                Method::Post,
                "/api/class/classes",
                Some(json!({"diagramId": diagram, "name": name, "x1": x, "y1": 1200.0})),
            )
            .await;
        classes.push(class["id"].as_str().unwrap().to_string());
    }

    let data = h.ok(Method::Post, &format!("/api/diagrams/{}/layout", diagram), None).await;
    assert_eq!(data["nodes"], json!(2));
    let first = h.ws.graph.find_view_on_diagram(&diagram, &classes[0]).unwrap();
    assert_approx_eq!(f64, first.left, 100.0);
    assert_approx_eq!(f64, first.top, 100.0);
    let second = h.ws.graph.find_view_on_diagram(&diagram, &classes[1]).unwrap();
    assert_approx_eq!(f64, second.left, 350.0);

    let data = h.ok(Method::Post, &format!("/api/diagrams/{}/fit-frame", diagram), None).await;
    assert!(data["frame"]["right"].as_f64().unwrap() >= 350.0 + 160.0 + 30.0);
    assert!(data["frame"]["bottom"].as_f64().unwrap() >= 100.0 + 80.0 + 30.0);
}

#[tokio::test]
async fn reconnect_moves_the_tail_and_undoes_as_one_step() {
    let mut h = Harness::new();
    let diagram = h.diagram("ClassDiagram").await;
    let a = h.class(&diagram, "A").await;
    let b = h.class(&diagram, "B").await;
    let c = h.class(&diagram, "C").await;
    let dep = h
        .ok(
            Method::Post,
            "/api/class/dependencies",
            Some(json!({"diagramId": diagram, "sourceId": a, "targetId": b})),
        )
        .await;
    let dep = dep["id"].as_str().unwrap().to_string();
    let edge = h.ws.graph.views_of(&dep)[0].clone();
    let view_a = h.ws.graph.find_view_on_diagram(&diagram, &a).unwrap().id.clone();
    let view_c = h.ws.graph.find_view_on_diagram(&diagram, &c).unwrap().id.clone();

    h.ok(
        Method::Put,
        &format!("/api/views/{}/reconnect", edge.id),
        Some(json!({"sourceId": c})),
    )
    .await;
    assert_eq!(h.ws.graph.view(&edge.id).unwrap().tail.as_deref(), Some(view_c.as_str()));
    assert_eq!(h.ws.graph.get_by_id(&dep).unwrap().reference("source"), Some(c.as_str()));

    h.ok(Method::Post, "/api/undo", None).await;
    let restored = h.ws.graph.view(&edge.id).unwrap();
    assert_eq!(restored.tail.as_deref(), Some(view_a.as_str()));
    assert_eq!(restored.points, edge.points);
    assert_eq!(h.ws.graph.get_by_id(&dep).unwrap().reference("source"), Some(a.as_str()));
}

#[tokio::test]
async fn deleting_one_diagram_leaves_its_sibling() {
    let mut h = Harness::new();
    let first = h.diagram("ClassDiagram").await;
    let second = h.diagram("ClassDiagram").await;
    let kept = h.class(&second, "Kept").await;

    h.ok(Method::Delete, &format!("/api/diagrams/{}", first), None).await;
    let listed = h.ok(Method::Get, "/api/diagrams", None).await;
    let listed: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec![second.as_str()]);
    assert!(h.ws.graph.get_by_id(&kept).is_some());
    assert_eq!(h.ws.graph.views_of(&kept).len(), 1);
}
