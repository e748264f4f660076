use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use garden_layout_engine::{
    adapter, layout, requirements, ApplyGardenOptions, ApplyGardenResult, ApplyTiming,
    GardenLayoutService, GardenState, LayoutError, LayoutLibrary, MemoryRemote, Normalizer,
    PlanterPotRequirement, RequirementEntry, SavedLayout,
};
use garden_layout_protocol::{GameCommand, TileType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origins of the game pages the layout creator is injected into.
const GAME_ORIGINS: [&str; 2] = ["https://magicgarden.gg", "https://magiccircle.gg"];

#[derive(Clone)]
pub struct AppState {
    pub library: LayoutLibrary,
    pub norm: Normalizer,
}

impl AppState {
    pub fn new(library: LayoutLibrary) -> Self {
        Self {
            library,
            norm: Normalizer::new(),
        }
    }
}

type ApiError = (StatusCode, String);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rev", get(api_rev))
        .route("/api/layouts", get(api_layouts_list).post(api_layouts_save))
        .route("/api/layouts/export", get(api_layouts_export))
        .route("/api/layouts/import", post(api_layouts_import))
        .route(
            "/api/layouts/{id}",
            put(api_layouts_update).delete(api_layouts_delete),
        )
        .route("/api/layouts/{id}/rename", post(api_layouts_rename))
        .route("/api/plan", post(api_plan))
        .route("/api/invert", post(api_invert))
        .route("/api/simulate", post(api_simulate))
        .with_state(Arc::new(state))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // Never `Access-Control-Allow-Origin: *`; any page could read saved layouts.
        .layer(local_only_cors())
}

fn api_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<LayoutError>() {
        Some(e) => {
            let status = match e {
                LayoutError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, e.to_string())
        }
        None => {
            tracing::error!(target: "garden_layout::server", error = %format!("{err:#}"), "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

/// Lenient garden body: an empty object is an empty garden.
fn parse_garden(v: &Value) -> Result<GardenState, ApiError> {
    if v.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(GardenState::default());
    }
    adapter::garden_from_value(v).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "garden must hold tileObjects or boardwalkTileObjects".to_string(),
        )
    })
}

fn parse_optional_garden(v: Option<&Value>) -> Result<GardenState, ApiError> {
    v.map_or_else(|| Ok(GardenState::default()), parse_garden)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct RevOutput {
    pub rev: i64,
}

pub async fn api_rev(State(state): State<Arc<AppState>>) -> ApiResult<RevOutput> {
    let rev = state.library.rev().map_err(api_error)?;
    Ok(Json(RevOutput { rev }))
}

pub async fn api_layouts_list(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SavedLayout>> {
    state.library.list().map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct SaveLayoutInput {
    pub name: String,
    #[serde(default)]
    pub garden: Value,
}

pub async fn api_layouts_save(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SaveLayoutInput>,
) -> ApiResult<SavedLayout> {
    let garden = parse_garden(&input.garden)?;
    state
        .library
        .save(&input.name, &garden)
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct UpdateLayoutInput {
    pub garden: Value,
}

pub async fn api_layouts_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<UpdateLayoutInput>,
) -> ApiResult<SavedLayout> {
    let garden = parse_garden(&input.garden)?;
    state
        .library
        .update(&id, &garden)
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct RenameLayoutInput {
    pub name: String,
}

pub async fn api_layouts_rename(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<RenameLayoutInput>,
) -> ApiResult<SavedLayout> {
    state
        .library
        .rename(&id, &input.name)
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub deleted: bool,
}

pub async fn api_layouts_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DeleteOutput> {
    match state.library.delete(&id) {
        Ok(true) => Ok(Json(DeleteOutput { deleted: true })),
        Ok(false) => Err(api_error(LayoutError::NotFound(id).into())),
        Err(err) => Err(api_error(err)),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// Comma separated layout ids; all layouts when absent.
    #[serde(default)]
    pub ids: Option<String>,
}

pub async fn api_layouts_export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let ids: Option<Vec<String>> = query.ids.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    });
    let json = state.library.export(ids.as_deref()).map_err(api_error)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
}

pub async fn api_layouts_import(
    State(state): State<Arc<AppState>>,
    body: String,
) -> ApiResult<Vec<SavedLayout>> {
    state.library.import(&body).map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct PlanInput {
    pub draft: Value,
    #[serde(default)]
    pub garden: Option<Value>,
    #[serde(default)]
    pub inventory: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    pub summary: Vec<RequirementEntry>,
    pub missing: Vec<RequirementEntry>,
    pub planter_pots: PlanterPotRequirement,
}

/// Requirement summary and pot count for a draft over a posted garden and
/// inventory snapshot.
pub async fn api_plan(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PlanInput>,
) -> ApiResult<PlanOutput> {
    let draft = layout::sanitize_garden(&parse_garden(&input.draft)?, &state.norm);
    let live = parse_optional_garden(input.garden.as_ref())?;
    let inventory = input
        .inventory
        .as_ref()
        .map(adapter::inventory_from_value)
        .unwrap_or_default();

    let summary = requirements::requirement_summary(&draft, &live, &inventory, &state.norm);
    let missing = requirements::missing_items(&summary);
    let planter_pots = PlanterPotRequirement {
        needed: requirements::calculate_planter_pots_needed(&draft, &live, &inventory, &state.norm),
        owned: inventory.planter_pot_charges(),
    };
    Ok(Json(PlanOutput {
        summary,
        missing,
        planter_pots,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvertInput {
    pub draft: Value,
    #[serde(default)]
    pub tile_type: Option<TileType>,
    #[serde(default)]
    pub map: Option<Value>,
}

pub async fn api_invert(Json(input): Json<InvertInput>) -> ApiResult<GardenState> {
    let draft = parse_garden(&input.draft)?;
    let geometry = adapter::geometry_from_value(input.map.as_ref());
    Ok(Json(layout::invert_layout(&draft, input.tile_type, &geometry)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateInput {
    pub draft: Value,
    #[serde(default)]
    pub garden: Option<Value>,
    #[serde(default)]
    pub inventory: Option<Value>,
    #[serde(default)]
    pub map: Option<Value>,
    #[serde(default)]
    pub options: ApplyGardenOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateOutput {
    pub result: ApplyGardenResult,
    pub commands: Vec<GameCommand>,
    pub rejected: Vec<GameCommand>,
    pub garden: GardenState,
}

/// Dry run: applies the draft to an in-memory copy of the posted garden.
pub async fn api_simulate(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SimulateInput>,
) -> ApiResult<SimulateOutput> {
    let draft = parse_garden(&input.draft)?;
    let live = parse_optional_garden(input.garden.as_ref())?;
    let inventory = input
        .inventory
        .as_ref()
        .map(adapter::inventory_from_value)
        .unwrap_or_default();

    let mut remote = MemoryRemote::new(live, inventory);
    if let Some(map) = input.map {
        remote = remote.with_map(map);
    }
    let service = GardenLayoutService::new(remote, state.library.clone())
        .with_timing(ApplyTiming::instant());
    let result = service.apply_garden(&draft, input.options).await;
    tracing::debug!(
        target: "garden_layout::server",
        success = result.success,
        commands = service.remote().sent().len(),
        "simulated apply"
    );

    let remote = service.remote();
    Ok(Json(SimulateOutput {
        result,
        commands: remote.sent(),
        rejected: remote.rejected(),
        garden: remote.garden(),
    }))
}

pub async fn serve(addr: SocketAddr, db_path: PathBuf) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, db_path, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    db_path: PathBuf,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let library = LayoutLibrary::new(db_path);
    // Fail fast when the database cannot be opened.
    let _ = library.open()?;
    let app = build_router(AppState::new(library));
    let addr = listener.local_addr()?;
    tracing::info!(target: "garden_layout::server", %addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::warn!(target: "garden_layout::server", %ip, "rejected peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_origin(origin)
        }))
}

fn is_allowed_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };

    if GAME_ORIGINS.contains(&s) {
        return true;
    }

    // Dev server and local reverse proxies.
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
