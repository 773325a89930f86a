//! Route table: path matching followed by method and content negotiation.
//!
//! Resolution happens in three steps:
//!
//! 1. **Path**: entries are kept in specificity order (literal segments
//!    before constrained parameters before plain parameters, registration
//!    order on ties) and the first entry whose template matches wins.
//! 2. **Method**: routes of that entry registered for the method. `HEAD`
//!    falls back to `GET`; `OPTIONS` without an explicit route is answered
//!    with the entry's `Allow` set.
//! 3. **Media types**: the request `Content-Type` filters on declared
//!    consumes (415 when nothing is left), then the client's `Accept`
//!    ranks the survivors by declared produces (406 when nothing is
//!    acceptable).

use crate::media_type::{negotiate, Accept, MediaType};
use crate::path::{self, PathParams, PathTemplate};
use crate::route::Route;
use crate::{Error, HttpMethod, Result};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// All routes registered for one path, whatever their parameter names.
#[derive(Debug)]
pub struct PathEntry {
    template: PathTemplate,
    routes: Vec<Arc<Route>>,
}

impl PathEntry {
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Registered methods, plus `HEAD` when `GET` exists, plus `OPTIONS`.
    pub fn allowed_methods(&self) -> Vec<String> {
        let mut methods: BTreeSet<HttpMethod> = self.routes.iter().map(|r| r.method).collect();
        if methods.contains(&HttpMethod::GET) {
            methods.insert(HttpMethod::HEAD);
        }
        methods.insert(HttpMethod::OPTIONS);
        methods.iter().map(|m| m.as_str().to_string()).collect()
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    Route(RouteMatch),
    /// `OPTIONS` on a path without an explicit `OPTIONS` route.
    Options { allow: Vec<String> },
}

/// The route selected for a request and what negotiation decided.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: PathParams,
    /// Parsed request `Content-Type`, when one was sent.
    pub consumes: Option<MediaType>,
    /// Response media type, when the route declares produces.
    pub produces: Option<MediaType>,
}

/// Collects routes during assembly. Single writer; [`build`](Self::build)
/// freezes the result.
#[derive(Default)]
pub struct RouteTableBuilder {
    entries: Vec<PathEntry>,
    by_key: HashMap<String, usize>,
    count: usize,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) -> &mut Self {
        let key = route.template.key();
        let route = Arc::new(route);
        self.count += 1;

        match self.by_key.get(&key) {
            Some(&index) => self.entries[index].routes.push(route),
            None => {
                self.by_key.insert(key, self.entries.len());
                self.entries.push(PathEntry {
                    template: route.template.clone(),
                    routes: vec![route],
                });
            }
        }
        self
    }

    pub fn build(self) -> RouteTable {
        let mut entries = self.entries;
        // stable sort keeps registration order between equally specific paths
        entries.sort_by(|a, b| b.template.cmp_specificity(&a.template));

        debug!(
            paths = entries.len(),
            routes = self.count,
            "Route table built"
        );
        RouteTable { entries }
    }
}

/// Immutable, lock-free route table shared by all requests.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<PathEntry>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.entries.iter().flat_map(|entry| entry.routes.iter())
    }

    pub fn len(&self) -> usize {
        self.routes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most specific entry matching `path`, with raw parameter values.
    pub fn match_path(&self, path: &str) -> Option<(&PathEntry, SmallVec<[String; 4]>)> {
        let segments = path::split_segments(path);
        self.entries.iter().find_map(|entry| {
            entry
                .template
                .matches(&segments)
                .map(|values| (entry, values))
        })
    }

    /// Resolve a request to a route, or to one of the dispatch failures.
    pub fn resolve(
        &self,
        method: &str,
        path: &str,
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Resolution> {
        let (entry, values) = self
            .match_path(path)
            .ok_or_else(|| Error::RouteNotFound(format!("{} {}", method, path)))?;

        trace!(template = entry.template.as_str(), "Path matched");

        let not_allowed = || Error::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
            allow: entry.allowed_methods(),
        };

        let method = HttpMethod::from_str(method).ok_or_else(not_allowed)?;
        let mut candidates = by_method(entry, method);

        if candidates.is_empty() {
            match method {
                HttpMethod::HEAD => candidates = by_method(entry, HttpMethod::GET),
                HttpMethod::OPTIONS => {
                    return Ok(Resolution::Options {
                        allow: entry.allowed_methods(),
                    });
                }
                _ => {}
            }
        }
        if candidates.is_empty() {
            return Err(not_allowed());
        }

        let consumes = match content_type {
            Some(value) => {
                let request_type = MediaType::parse(value)
                    .ok_or_else(|| Error::BadRequest(format!("malformed Content-Type `{}`", value)))?;
                candidates.retain(|route| {
                    route.consumes.is_empty()
                        || route.consumes.iter().any(|c| c.matches(&request_type))
                });
                if candidates.is_empty() {
                    return Err(Error::UnsupportedMediaType(request_type.essence()));
                }
                Some(request_type)
            }
            None => None,
        };

        let accept_ranges = Accept::from_header(accept);
        let (route, produces) = select_by_accept(&candidates, &accept_ranges).ok_or_else(|| {
            Error::NotAcceptable(accept.unwrap_or("*/*").trim().to_string())
        })?;

        let params = PathParams::new(route.template.param_names().clone(), values);
        debug!(
            route = %route.name,
            produces = produces.as_ref().map(|m| m.essence()).unwrap_or_default(),
            "Route resolved"
        );

        Ok(Resolution::Route(RouteMatch {
            route,
            params,
            consumes,
            produces,
        }))
    }
}

fn by_method(entry: &PathEntry, method: HttpMethod) -> Vec<Arc<Route>> {
    entry
        .routes
        .iter()
        .filter(|route| route.method == method)
        .cloned()
        .collect()
}

/// Highest client quality wins; earlier registration wins ties. A route
/// without declared produces is acceptable at the client's top quality,
/// unless that quality is 0.
fn select_by_accept(
    candidates: &[Arc<Route>],
    accept: &Accept,
) -> Option<(Arc<Route>, Option<MediaType>)> {
    let top_quality = accept.ranges.first().map(|(_, q)| *q).unwrap_or(1.0);
    let mut best: Option<(&Arc<Route>, Option<MediaType>, f32)> = None;

    for route in candidates {
        let (produces, quality) = if route.produces.is_empty() {
            // q=0 everywhere means the client accepts nothing
            if top_quality <= 0.0 {
                continue;
            }
            (None, top_quality)
        } else {
            match negotiate(accept, &route.produces) {
                Some((media_type, quality)) => (Some(media_type), quality),
                None => continue,
            }
        };

        if best.as_ref().is_none_or(|(_, _, q)| quality > *q) {
            best = Some((route, produces, quality));
        }
    }

    best.map(|(route, produces, _)| (route.clone(), produces))
}
