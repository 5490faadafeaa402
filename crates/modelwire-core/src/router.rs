//! Path normalization, matching and dispatch.
//!
//! Matching order: the cross-cutting table, each family's compiled table in
//! registration order, the status fallback, then a not-found failure.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::compiler::compile;
use crate::error::{ApiError, RouterError};
use crate::families::Family;
use crate::response::{ApiRequest, ApiResponse, Method, Outcome, Reply, RequestEcho};
use crate::routes;
use crate::Workspace;

pub type Handler = Box<dyn Fn(&mut Workspace, &Call<'_>) -> Reply + Send + Sync>;

/// First path segments owned by the cross-cutting table.
const RESERVED_PREFIXES: &[&str] = &["elements", "search", "undo", "redo", "diagrams", "views", "project", "status"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// One (method, pattern, handler) entry.
pub struct Route {
    pub method: Method,
    pub pattern: String,
    segments: Vec<Segment>,
    handler: Handler,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

impl Route {
    pub fn new<F>(method: Method, pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Workspace, &Call<'_>) -> Reply + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let segments = split(&pattern)
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Route {
            method,
            pattern,
            segments,
            handler: Box::new(handler),
        }
    }

    /// Names of the positional parameters, in order.
    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Method and pattern with parameter names erased, for collision checks.
    pub fn shape(&self) -> String {
        let path: Vec<&str> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.as_str(),
                Segment::Param(_) => "{}",
            })
            .collect();
        format!("{} /{}", self.method, path.join("/"))
    }

    fn matches(&self, method: Method, path: &[String]) -> Option<Vec<(String, String)>> {
        if self.method != method || self.segments.len() != path.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(l) if l == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), actual.clone())),
            }
        }
        Some(params)
    }
}

/// Matched parameters, query and body handed to a handler.
#[derive(Debug)]
pub struct Call<'a> {
    params: Vec<(String, String)>,
    query: &'a BTreeMap<String, String>,
    pub body: Option<&'a Value>,
}

impl<'a> Call<'a> {
    pub fn new(params: Vec<(String, String)>, query: &'a BTreeMap<String, String>, body: Option<&'a Value>) -> Self {
        Call { params, query, body }
    }

    /// A path parameter; patterns guarantee presence for declared names.
    pub fn param(&self, name: &str) -> &str {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

// --- Normalization ---

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Strip the query string and a trailing slash (except on root).
pub fn normalize(raw: &str) -> (String, Option<&str>) {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };
    let mut path = path.trim_end_matches('/').to_string();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    (path, query)
}

fn percent_decode(text: &str, what: &str) -> Result<String, ApiError> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(ApiError::BadRequest(format!(
                    "Malformed percent-encoding in {}: {}",
                    what, text
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(text)
        .map(|s| s.into_owned())
        .map_err(|_| ApiError::BadRequest(format!("Invalid UTF-8 in {}: {}", what, text)))
}

pub fn parse_query(query: &str) -> Result<BTreeMap<String, String>, ApiError> {
    let mut out = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(&key.replace('+', " "), "query")?;
        let value = percent_decode(&value.replace('+', " "), "query")?;
        out.insert(key, value);
    }
    Ok(out)
}

fn decode_path(path: &str) -> Result<Vec<String>, ApiError> {
    split(path).map(|s| percent_decode(s, "path")).collect()
}

// --- Router ---

#[derive(Debug)]
pub struct Router {
    cross: Vec<Route>,
    families: Vec<(Family, Vec<Route>)>,
}

impl Router {
    /// Compile `families` behind the cross-cutting table. Fails on invalid
    /// family declarations, duplicate prefixes or colliding routes.
    pub fn new(families: &[Family]) -> Result<Self, RouterError> {
        let mut prefixes = HashSet::new();
        for family in families {
            let config = family.config();
            config.validate().map_err(RouterError::InvalidFamily)?;
            if !prefixes.insert(config.prefix) {
                return Err(RouterError::DuplicatePrefix(config.prefix));
            }
            if RESERVED_PREFIXES.contains(&config.prefix) {
                return Err(RouterError::ReservedPrefix(config.prefix));
            }
        }
        let router = Router {
            cross: routes::cross_cutting(),
            families: families.iter().map(|f| (*f, compile(f.config()))).collect(),
        };
        let mut shapes = HashSet::new();
        for route in router.routes() {
            if !shapes.insert(route.shape()) {
                return Err(RouterError::Collision(route.shape()));
            }
        }
        Ok(router)
    }

    /// Every registered family, in the default order.
    pub fn standard() -> Result<Self, RouterError> {
        Self::new(&Family::ALL)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.cross
            .iter()
            .chain(self.families.iter().flat_map(|(_, routes)| routes.iter()))
    }

    pub fn family_routes(&self, family: Family) -> &[Route] {
        self.families
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, routes)| routes.as_slice())
            .unwrap_or(&[])
    }

    /// Handle one request to completion, awaiting deferred work.
    pub async fn handle(&self, ws: &mut Workspace, request: ApiRequest) -> ApiResponse {
        let (echo, reply) = self.dispatch(ws, &request);
        let result = match reply {
            Reply::Ready(result) => result,
            Reply::Deferred { work, then } => match work.await {
                Ok(value) => then(ws, value),
                Err(err) => Err(err),
            },
        };
        match result {
            Ok(outcome) => ApiResponse::ok(echo, outcome),
            Err(err) => {
                debug!(status = err.status(), error = %err, "request failed");
                ApiResponse::fail(echo, &err)
            }
        }
    }

    /// Synchronous part of request handling: normalize, match and run the handler.
    pub fn dispatch(&self, ws: &mut Workspace, request: &ApiRequest) -> (RequestEcho, Reply) {
        let (path, raw_query) = normalize(&request.path);
        debug!(method = %request.method, path = %path, "dispatch");
        let mut echo = RequestEcho {
            method: request.method.to_string(),
            path: path.clone(),
            query: None,
            body: request.body.clone(),
        };

        let parsed = raw_query.map(parse_query).transpose().and_then(|query| {
            let segments = decode_path(&path)?;
            Ok((query.unwrap_or_default(), segments))
        });
        let (query, segments) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => return (echo, Reply::Ready(Err(err))),
        };
        if !query.is_empty() {
            let map: Map<String, Value> = query
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            echo.query = Some(map);
        }

        for route in self.routes() {
            if let Some(params) = route.matches(request.method, &segments) {
                let call = Call::new(params, &query, request.body.as_ref());
                let reply = (route.handler)(ws, &call);
                return (echo, reply);
            }
        }

        let fallback = match (request.method, path.as_str()) {
            (Method::Get, "/" | "/api" | "/api/status") => Ok(Outcome::data(self.status(ws))),
            _ => Err(ApiError::not_found("Route", format!("{} {}", request.method, path))),
        };
        (echo, Reply::Ready(fallback))
    }

    fn status(&self, ws: &Workspace) -> Value {
        let families: Vec<Value> = self
            .families
            .iter()
            .map(|(family, routes)| {
                let config = family.config();
                json!({
                    "prefix": config.prefix,
                    "label": config.label,
                    "diagramTypes": config.diagram_kinds.iter().map(|k| k.tag()).collect::<Vec<_>>(),
                    "resources": config.resources.iter().map(|r| r.name).collect::<Vec<_>>(),
                    "relations": config.relations.iter().map(|r| r.name).collect::<Vec<_>>(),
                    "routes": routes.len(),
                })
            })
            .collect();
        json!({
            "name": "modelwire",
            "version": env!("CARGO_PKG_VERSION"),
            "families": families,
            "routes": self.routes().count(),
            "crossCuttingRoutes": self.cross.iter().map(|r| format!("{} {}", r.method, r.pattern)).collect::<Vec<_>>(),
            "graph": {
                "elements": ws.graph.elements().len(),
                "views": ws.graph.views().len(),
                "canUndo": ws.graph.can_undo(),
                "canRedo": ws.graph.can_redo(),
            },
            "schemas": routes::schemas(),
        })
    }
}
