//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, GraphKind, Store};
use crate::graph::{
    resolve, resolve_descriptor, CompositeSeries, GraphDefinition, Meta, SeriesBinding, SingleSeries,
};
use crate::render::RenderOptions;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

type NamePath = Path<(String, String, String)>;

// ============================================================================
// Helpers
// ============================================================================

fn error_response(e: DbError) -> Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, "Graph not found").into_response(),
        DbError::Conflict => (StatusCode::CONFLICT, "Graph already exists").into_response(),
        DbError::Graph(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        e => {
            tracing::error!("Store request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn found<T>(result: Result<Option<T>, DbError>, to_json: impl FnOnce(&T) -> Value) -> Response {
    match result {
        Ok(Some(graph)) => Json(to_json(&graph)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Graph not found").into_response(),
        Err(e) => error_response(e),
    }
}

/// Look up single series by the textual ids used in composites.
fn series_lookup(store: &Store) -> impl FnMut(&str) -> Option<SingleSeries> + '_ {
    move |id| {
        let id: i64 = id.trim().parse().ok()?;
        match store.get_by_id(id) {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!("Failed to load graph {} for rendering: {}", id, e);
                None
            }
        }
    }
}

fn text_param<'a>(body: &'a Meta, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ============================================================================
// API: Single series
// ============================================================================

pub async fn handle_get_graph_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    found(state.store.get_by_id(id), SingleSeries::to_json)
}

pub async fn handle_get_graph(
    State(state): State<AppState>,
    Path((service, section, graph)): NamePath,
) -> impl IntoResponse {
    found(state.store.get(&service, &section, &graph), SingleSeries::to_json)
}

/// Find or create a single series, then apply any changes in the body.
pub async fn handle_post_graph(
    State(state): State<AppState>,
    Path((service, section, graph)): NamePath,
    Json(changes): Json<Meta>,
) -> impl IntoResponse {
    let existing = match state.store.get(&service, &section, &graph) {
        Ok(g) => g,
        Err(e) => return error_response(e),
    };
    let series = match existing {
        Some(g) => g,
        None => match state.store.create_graph(&service, &section, &graph) {
            Ok(g) => g,
            // created by a concurrent request
            Err(DbError::Conflict) => match state.store.get(&service, &section, &graph) {
                Ok(Some(g)) => g,
                Ok(None) => return error_response(DbError::NotFound),
                Err(e) => return error_response(e),
            },
            Err(e) => return error_response(e),
        },
    };

    if changes.is_empty() {
        return Json(series.to_json()).into_response();
    }
    match state.store.update_graph(series.id(), &changes) {
        Ok(g) => Json(g.to_json()).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Composites
// ============================================================================

pub async fn handle_get_complex_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    found(state.store.get_complex_by_id(id), CompositeSeries::to_json)
}

pub async fn handle_get_complex(
    State(state): State<AppState>,
    Path((service, section, graph)): NamePath,
) -> impl IntoResponse {
    found(
        state.store.get_complex(&service, &section, &graph),
        CompositeSeries::to_json,
    )
}

pub async fn handle_create_complex(
    State(state): State<AppState>,
    Json(body): Json<Meta>,
) -> impl IntoResponse {
    let (service, section, graph) = match (
        text_param(&body, "service_name"),
        text_param(&body, "section_name"),
        text_param(&body, "graph_name"),
    ) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "service_name, section_name and graph_name are required",
            )
                .into_response()
        }
    };

    match state.store.get_complex(service, section, graph) {
        Ok(Some(_)) => {
            return (StatusCode::CONFLICT, "Complex graph already exists").into_response();
        }
        Ok(None) => {}
        Err(e) => return error_response(e),
    }

    match state.store.create_complex(service, section, graph, &body) {
        Ok(g) => Json(g.to_json()).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Edit / delete / list
// ============================================================================

pub async fn handle_edit(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
    Json(changes): Json<Meta>,
) -> impl IntoResponse {
    let kind: GraphKind = match kind.parse() {
        Ok(k) => k,
        Err(e) => return (StatusCode::NOT_FOUND, e).into_response(),
    };

    let result = match kind {
        GraphKind::Graph => state.store.update_graph(id, &changes).map(|g| g.to_json()),
        GraphKind::Complex => state.store.update_complex(id, &changes).map(|g| g.to_json()),
    };

    match result {
        Ok(v) => Json(v).into_response(),
        Err(e) => error_response(e),
    }
}

fn deleted(result: Result<(), DbError>, kind: GraphKind, id: i64) -> Response {
    match result {
        Ok(()) => Json(json!({"error": 0, "type": kind.to_string(), "id": id})).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_graph_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    deleted(state.store.remove(id), GraphKind::Graph, id)
}

pub async fn handle_delete_graph(
    State(state): State<AppState>,
    Path((service, section, graph)): NamePath,
) -> impl IntoResponse {
    match state.store.get(&service, &section, &graph) {
        Ok(Some(g)) => deleted(state.store.remove(g.id()), GraphKind::Graph, g.id()),
        Ok(None) => (StatusCode::NOT_FOUND, "Graph not found").into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_complex_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    deleted(state.store.remove_complex(id), GraphKind::Complex, id)
}

pub async fn handle_delete_complex(
    State(state): State<AppState>,
    Path((service, section, graph)): NamePath,
) -> impl IntoResponse {
    match state.store.get_complex(&service, &section, &graph) {
        Ok(Some(g)) => deleted(state.store.remove_complex(g.id()), GraphKind::Complex, g.id()),
        Ok(None) => (StatusCode::NOT_FOUND, "Graph not found").into_response(),
        Err(e) => error_response(e),
    }
}

/// Delete every definition of a section.
pub async fn handle_delete_section(
    State(state): State<AppState>,
    Path((service, section)): Path<(String, String)>,
) -> impl IntoResponse {
    let graphs = match state.store.get_graphs(&service, &section) {
        Ok(g) => g,
        Err(e) => return error_response(e),
    };

    for graph in &graphs {
        if let Err(e) = state.store.remove_definition(graph) {
            return error_response(e);
        }
    }
    tracing::info!("Removed {} graphs from {}/{}", graphs.len(), service, section);

    Json(json!({"error": 0, "removed": graphs.len()})).into_response()
}

pub async fn handle_list_graphs(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_graphs() {
        Ok(graphs) => Json(graphs.iter().map(SingleSeries::to_json).collect::<Vec<_>>()).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_list_complex(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_complex() {
        Ok(graphs) => Json(
            graphs
                .iter()
                .map(CompositeSeries::to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_list_all(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_all() {
        Ok(graphs) => Json(graphs.iter().map(GraphDefinition::to_json).collect::<Vec<_>>()).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Output {
    Image,
    Export,
}

fn render(state: &AppState, bindings: &[SeriesBinding], options: &RenderOptions, output: Output) -> Response {
    if let Err(e) = options.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    let renderer = match &state.renderer {
        Some(r) => r,
        None => return (StatusCode::NOT_IMPLEMENTED, "No renderer configured").into_response(),
    };

    match output {
        Output::Image => match renderer.graph(bindings, options) {
            Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
            Err(e) => {
                tracing::error!("Rendering failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        },
        Output::Export => match renderer.export(bindings, options) {
            Ok(export) => Json(export).into_response(),
            Err(e) => {
                tracing::error!("Export failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        },
    }
}

fn render_single(state: &AppState, name: (String, String, String), options: &RenderOptions, output: Output) -> Response {
    let (service, section, graph) = name;
    let series = match state.store.get(&service, &section, &graph) {
        Ok(Some(g)) => g,
        Ok(None) => return (StatusCode::NOT_FOUND, "Graph not found").into_response(),
        Err(e) => return error_response(e),
    };

    let binding = SeriesBinding {
        render_type: series.render_type().to_string(),
        gmode: series.gmode().to_string(),
        stacked: false,
        series,
    };
    render(state, std::slice::from_ref(&binding), options, output)
}

fn render_complex(state: &AppState, name: (String, String, String), options: &RenderOptions, output: Output) -> Response {
    let (service, section, graph) = name;
    let composite = match state.store.get_complex(&service, &section, &graph) {
        Ok(Some(g)) => g,
        Ok(None) => return (StatusCode::NOT_FOUND, "Graph not found").into_response(),
        Err(e) => return error_response(e),
    };

    let bindings = resolve(&composite, series_lookup(&state.store));
    let skipped = composite.components().len() - bindings.len();
    if skipped > 0 {
        tracing::warn!(
            "Complex graph {} references {} missing graphs",
            composite.id(),
            skipped
        );
    }
    render(state, &bindings, options, output)
}

fn render_descriptor(state: &AppState, descriptor: &str, options: &RenderOptions, output: Output) -> Response {
    match resolve_descriptor(descriptor, series_lookup(&state.store)) {
        Ok(bindings) => render(state, &bindings, options, output),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

pub async fn handle_graph(
    State(state): State<AppState>,
    Path(name): NamePath,
    Query(options): Query<RenderOptions>,
) -> impl IntoResponse {
    render_single(&state, name, &options, Output::Image)
}

pub async fn handle_xport(
    State(state): State<AppState>,
    Path(name): NamePath,
    Query(options): Query<RenderOptions>,
) -> impl IntoResponse {
    render_single(&state, name, &options, Output::Export)
}

pub async fn handle_complex_graph(
    State(state): State<AppState>,
    Path(name): NamePath,
    Query(options): Query<RenderOptions>,
) -> impl IntoResponse {
    render_complex(&state, name, &options, Output::Image)
}

pub async fn handle_complex_xport(
    State(state): State<AppState>,
    Path(name): NamePath,
    Query(options): Query<RenderOptions>,
) -> impl IntoResponse {
    render_complex(&state, name, &options, Output::Export)
}

pub async fn handle_descriptor_graph(
    State(state): State<AppState>,
    Path(descriptor): Path<String>,
    Query(options): Query<RenderOptions>,
) -> impl IntoResponse {
    render_descriptor(&state, &descriptor, &options, Output::Image)
}

pub async fn handle_descriptor_xport(
    State(state): State<AppState>,
    Path(descriptor): Path<String>,
    Query(options): Query<RenderOptions>,
) -> impl IntoResponse {
    render_descriptor(&state, &descriptor, &options, Output::Export)
}
