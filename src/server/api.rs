//! REST API implementation using rouille.
//!
//! # Key types
//!
//! - [`ApiServer`] - binds the listener and dispatches requests
//! - [`AppState`] - config and render components shared by all handlers
//!
//! # Responses
//!
//! - success: `{status: "success", video_url, cached}`
//! - failure: `{status: "error", error, stdout?, stderr?}` with the status code
//!   of the failure kind (404 / 408 / 400 / 500)
//!
//! CORS headers are added to every response for browser frontends.

use log::{debug, info, warn};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::RenderError;
use crate::render::{
    Orchestrator, PresetInfo, PresetLibrary, QualityTier, RenderOutcome, RenderRequest,
    SubprocessRenderer,
};

/// Everything a handler needs. Immutable after startup.
pub struct AppState {
    pub config: ServerConfig,
    pub orchestrator: Orchestrator,
    pub presets: PresetLibrary,
    pub renderer: SubprocessRenderer,
}

impl AppState {
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            orchestrator: Orchestrator::from_config(&config),
            presets: PresetLibrary::new(&config.scenes_dir, &config.scene_extension),
            renderer: SubprocessRenderer::from_config(&config),
            config,
        }
    }
}

/// Request body for `/render`
#[derive(Debug, Default, Deserialize)]
struct RenderBody {
    #[serde(default)]
    code: String,
    scene_name: Option<String>,
    quality: Option<serde_json::Value>,
}

/// Request body for `/render-preset/{name}`
#[derive(Debug, Default, Deserialize)]
struct PresetBody {
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
    quality: Option<serde_json::Value>,
    scene_name: Option<String>,
}

#[derive(Serialize)]
struct RenderResponse<'a> {
    status: &'static str,
    video_url: &'a str,
    cached: bool,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    status: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<&'a str>,
}

impl<'a> ErrorResponse<'a> {
    fn msg(error: impl Into<String>) -> Self {
        Self {
            status: "error",
            error: error.into(),
            stdout: None,
            stderr: None,
        }
    }

    fn from_render(err: &'a RenderError) -> Self {
        Self {
            status: "error",
            error: err.to_string(),
            stdout: err.stdout(),
            stderr: err.stderr(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    renderer_version: String,
}

#[derive(Serialize)]
struct ScenesResponse {
    scenes: Vec<PresetInfo>,
}

/// REST API server
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Bind and serve until the process exits. Each request runs on a pool thread.
    pub fn run(self) -> anyhow::Result<()> {
        let addr = self.state.config.bind_addr();
        let state = self.state;

        let server = rouille::Server::new(&addr, move |request| handle_request(request, &state))
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

        info!("API server listening on http://{}", server.server_addr());
        server.run();
        Ok(())
    }
}

/// Route one request. Public to the crate so tests can drive it with fake requests.
pub(crate) fn handle_request(request: &Request, state: &AppState) -> Response {
    debug!("{} {}", request.method(), request.raw_url());

    // Handle preflight
    if request.method() == "OPTIONS" {
        return Response::empty_204()
            .with_additional_header("Access-Control-Allow-Origin", "*")
            .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
    }

    let response = route(request, state);
    response.with_additional_header("Access-Control-Allow-Origin", "*")
}

fn route(request: &Request, state: &AppState) -> Response {
    // Paths with parameters are matched by prefix
    let path = request.url();
    if request.method() == "POST" {
        if let Some(name) = path.strip_prefix("/render-preset/") {
            return render_preset(request, state, name);
        }
    }
    if request.method() == "GET" {
        if let Some(file_name) = path.strip_prefix("/video/") {
            return serve_video(state, file_name);
        }
    }

    rouille::router!(request,
        (GET) ["/health"] => {
            health(state)
        },
        (POST) ["/render"] => {
            render_direct(request, state)
        },
        (GET) ["/scenes"] => {
            Response::json(&ScenesResponse { scenes: state.presets.list() })
        },
        _ => {
            serve_static(request, state)
        }
    )
}

fn health(state: &AppState) -> Response {
    match state.renderer.probe_version() {
        Ok(version) => Response::json(&HealthResponse {
            status: "ok",
            renderer_version: version,
        }),
        Err(e) => {
            warn!("Health probe failed: {}", e);
            Response::json(&ErrorResponse::msg(e.to_string())).with_status_code(500)
        }
    }
}

fn render_direct(request: &Request, state: &AppState) -> Response {
    let body: RenderBody = match rouille::input::json_input(request) {
        Ok(body) => body,
        Err(e) => return error_response(&RenderError::bad_request(format!("Invalid JSON: {}", e))),
    };
    let quality = body.quality.as_ref().and_then(serde_json::Value::as_str);
    let render_request = RenderRequest::direct(body.code, body.scene_name, quality);
    outcome_response(state.orchestrator.render(&render_request))
}

/// Tier named by a body's `quality`. Anything that is not a known tier name,
/// including non-strings and `null`, falls back to low.
fn quality_of(value: Option<&serde_json::Value>) -> QualityTier {
    value
        .and_then(serde_json::Value::as_str)
        .map(QualityTier::parse_lenient)
        .unwrap_or_default()
}

fn render_preset(request: &Request, state: &AppState, name: &str) -> Response {
    let body: PresetBody = match read_optional_json(request) {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    let quality = quality_of(body.quality.as_ref());
    let params: Vec<(String, String)> = body
        .params
        .into_iter()
        .map(|(k, v)| (k, param_string(v)))
        .collect();

    match state.presets.resolve(name, &params, quality, body.scene_name) {
        Ok(render_request) => outcome_response(state.orchestrator.render(&render_request)),
        Err(e) => error_response(&e),
    }
}

fn serve_video(state: &AppState, file_name: &str) -> Response {
    let cache = state.orchestrator.cache();
    let Some(path) = cache.open_path(file_name) else {
        return Response::json(&ErrorResponse::msg("Video not found")).with_status_code(404);
    };
    match std::fs::File::open(&path) {
        Ok(file) => Response::from_file(rouille::extension_to_mime(cache.extension()), file),
        Err(e) => {
            warn!("Failed to open cached video {}: {}", path.display(), e);
            Response::json(&ErrorResponse::msg("Video not found")).with_status_code(404)
        }
    }
}

fn serve_static(request: &Request, state: &AppState) -> Response {
    let not_found = || Response::json(&ErrorResponse::msg("Not found")).with_status_code(404);

    let Some(dir) = state.config.static_dir.as_deref() else {
        return not_found();
    };
    if request.method() != "GET" {
        return not_found();
    }
    if request.url() == "/" {
        return serve_index(dir).unwrap_or_else(not_found);
    }

    let response = rouille::match_assets(request, dir);
    if response.is_success() { response } else { not_found() }
}

fn serve_index(dir: &Path) -> Option<Response> {
    let file = std::fs::File::open(dir.join("index.html")).ok()?;
    Some(Response::from_file("text/html; charset=utf-8", file))
}

fn outcome_response(outcome: RenderOutcome) -> Response {
    match outcome {
        Ok(success) => Response::json(&RenderResponse {
            status: "success",
            video_url: &success.artifact.url,
            cached: success.was_cached,
        }),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &RenderError) -> Response {
    Response::json(&ErrorResponse::from_render(err)).with_status_code(err.http_status())
}

/// Parse a JSON body that may be absent entirely.
fn read_optional_json<T>(request: &Request) -> Result<T, RenderError>
where
    T: Default + serde::de::DeserializeOwned,
{
    let mut raw = Vec::new();
    if let Some(mut data) = request.data() {
        data.read_to_end(&mut raw)
            .map_err(|e| RenderError::bad_request(format!("Failed to read body: {}", e)))?;
    }
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&raw).map_err(|e| RenderError::bad_request(format!("Invalid JSON: {}", e)))
}

/// String form of a parameter value: strings verbatim, everything else as JSON text.
fn param_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::render::Fingerprint;
    use crate::render::invoker::test_support::fake_renderer;

    /// Renderer stub: on `--version` prints a version, otherwise writes
    /// `<output>/videos/<fingerprint>.mp4` containing the source file.
    const PRODUCE: &str = r#"
if [ "$1" = "--version" ]; then echo "Manim Community v0.18.1"; exit 0; fi
mkdir -p "$7/videos"
cat "$2" > "$7/videos/$5.mp4"
echo "File ready at $7/videos/$5.mp4"
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        state: AppState,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::with_root(dir.path());
        config.renderer = fake_renderer(dir.path(), script).to_string_lossy().into_owned();
        config.render_timeout_secs = 2;
        crate::config::ensure_dirs(&config).unwrap();
        let state = AppState::from_config(config);
        Fixture { dir, state }
    }

    fn post_json(url: &str, body: &str) -> Request {
        Request::fake_http(
            "POST",
            url,
            vec![("Content-Type".to_owned(), "application/json".to_owned())],
            body.as_bytes().to_vec(),
        )
    }

    fn get(url: &str) -> Request {
        Request::fake_http("GET", url, vec![], vec![])
    }

    fn body_of(response: Response) -> Vec<u8> {
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    fn json_of(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_of(response)).unwrap()
    }

    /// Test: Render then re-render
    /// Validates: 200 with video_url, second call reports cached=true
    #[test]
    fn test_render_and_cache() {
        let fx = fixture(PRODUCE);
        let body = r#"{"code": "class Intro(Scene): pass", "scene_name": "Intro", "quality": "low"}"#;

        let first = handle_request(&post_json("/render", body), &fx.state);
        assert_eq!(first.status_code, 200);
        let first = json_of(first);
        assert_eq!(first["status"], "success");
        assert_eq!(first["cached"], false);

        let expected = Fingerprint::of(&RenderRequest::new(
            "class Intro(Scene): pass",
            "Intro",
            QualityTier::Low,
        ));
        assert_eq!(first["video_url"], format!("/video/{}.mp4", expected));

        let second = json_of(handle_request(&post_json("/render", body), &fx.state));
        assert_eq!(second["cached"], true);
        assert_eq!(second["video_url"], first["video_url"]);
    }

    /// Test: Non-string quality
    /// Validates: numbers, booleans and objects fall back to low instead of a 400
    #[test]
    fn test_non_string_quality_is_low() {
        let fx = fixture(PRODUCE);
        let expected = Fingerprint::of(&RenderRequest::new("x", "MainScene", QualityTier::Low));

        for quality in ["3", "true", "null", r#"{"tier": "high"}"#] {
            let body = format!(r#"{{"code": "x", "quality": {}}}"#, quality);
            let response = handle_request(&post_json("/render", &body), &fx.state);
            assert_eq!(response.status_code, 200, "quality {}", quality);
            assert_eq!(json_of(response)["video_url"], format!("/video/{}.mp4", expected));
        }

        std::fs::write(fx.state.config.scenes_dir.join("plain.py"), "static").unwrap();
        let response = handle_request(
            &post_json("/render-preset/plain", r#"{"params": {}, "quality": 2}"#),
            &fx.state,
        );
        assert_eq!(response.status_code, 200);
        let expected = Fingerprint::of(&RenderRequest::new("static", "plain", QualityTier::Low));
        assert_eq!(json_of(response)["video_url"], format!("/video/{}.mp4", expected));
    }

    /// Test: Video route
    /// Validates: cached bytes are streamed, unknown names are 404
    #[test]
    fn test_serve_video() {
        let fx = fixture(PRODUCE);
        let rendered = json_of(handle_request(
            &post_json("/render", r#"{"code": "payload", "scene_name": "S"}"#),
            &fx.state,
        ));
        let url = rendered["video_url"].as_str().unwrap().to_string();

        let response = handle_request(&get(&url), &fx.state);
        assert_eq!(response.status_code, 200);
        assert_eq!(body_of(response), b"payload");

        let missing = handle_request(&get("/video/000000000000.mp4"), &fx.state);
        assert_eq!(missing.status_code, 404);
        let traversal = handle_request(&get("/video/..%2Fscenecast.json"), &fx.state);
        assert_eq!(traversal.status_code, 404);
    }

    /// Test: Render failure
    /// Validates: non-zero exit is 400 with stderr as error and stdout attached
    #[test]
    fn test_render_failure_is_400() {
        let fx = fixture("echo 'building'; echo \"NameError: name 'x' is not defined\" >&2; exit 1");
        let response = handle_request(&post_json("/render", r#"{"code": "${x}"}"#), &fx.state);
        assert_eq!(response.status_code, 400);
        let json = json_of(response);
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "NameError: name 'x' is not defined\n");
        assert_eq!(json["stdout"], "building\n");
    }

    /// Test: Timeout
    /// Validates: overrunning render answers 408
    #[test]
    fn test_timeout_is_408() {
        let fx = fixture("exec sleep 30");
        let response = handle_request(&post_json("/render", r#"{"code": "x"}"#), &fx.state);
        assert_eq!(response.status_code, 408);
        assert_eq!(json_of(response)["error"], "Rendering timed out (>2 seconds)");
    }

    /// Test: Artifact missing
    /// Validates: zero exit without output is 500 and nothing is cached
    #[test]
    fn test_artifact_missing_is_500() {
        let fx = fixture("echo done; exit 0");
        let response = handle_request(&post_json("/render", r#"{"code": "x"}"#), &fx.state);
        assert_eq!(response.status_code, 500);
        let json = json_of(response);
        assert_eq!(json["error"], "Video file not found after rendering");
        assert_eq!(json["stdout"], "done\n");
        let cached = std::fs::read_dir(&fx.state.config.cache_dir).unwrap().count();
        assert_eq!(cached, 0);
    }

    /// Test: Malformed body
    /// Validates: invalid JSON is a 400 before any render
    #[test]
    fn test_invalid_json_is_400() {
        let fx = fixture(PRODUCE);
        let response = handle_request(&post_json("/render", "{not json"), &fx.state);
        assert_eq!(response.status_code, 400);
    }

    /// Test: Preset render
    /// Validates: params are substituted and the preset name is the scene
    #[test]
    fn test_render_preset() {
        let fx = fixture(PRODUCE);
        std::fs::write(
            fx.state.config.scenes_dir.join("circle.py"),
            "Radius: ${r} Label: ${label}",
        )
        .unwrap();

        let response = handle_request(
            &post_json("/render-preset/circle", r#"{"params": {"r": 5, "label": "A"}, "quality": "high"}"#),
            &fx.state,
        );
        assert_eq!(response.status_code, 200);
        let json = json_of(response);

        let expected = Fingerprint::of(&RenderRequest::new(
            "Radius: 5 Label: A",
            "circle",
            QualityTier::High,
        ));
        assert_eq!(json["video_url"], format!("/video/{}.mp4", expected));

        let bytes = std::fs::read(fx.state.orchestrator.cache().path_of(&expected)).unwrap();
        assert_eq!(bytes, b"Radius: 5 Label: A");
    }

    /// Test: Preset without body
    /// Validates: empty body uses no params and low quality
    #[test]
    fn test_render_preset_empty_body() {
        let fx = fixture(PRODUCE);
        std::fs::write(fx.state.config.scenes_dir.join("plain.py"), "static").unwrap();
        let response = handle_request(&post_json("/render-preset/plain", ""), &fx.state);
        assert_eq!(response.status_code, 200);
    }

    /// Test: Unknown preset
    /// Validates: 404 with the scene name in the message
    #[test]
    fn test_unknown_preset_is_404() {
        let fx = fixture(PRODUCE);
        let response = handle_request(&post_json("/render-preset/nope", "{}"), &fx.state);
        assert_eq!(response.status_code, 404);
        assert_eq!(json_of(response)["error"], "Scene nope not found");
    }

    /// Test: Scenes listing
    /// Validates: `{scenes: [{name, file}]}` for scene files only
    #[test]
    fn test_list_scenes() {
        let fx = fixture(PRODUCE);
        std::fs::write(fx.state.config.scenes_dir.join("graph_traversal.py"), "").unwrap();
        std::fs::write(fx.state.config.scenes_dir.join("README.md"), "").unwrap();

        let json = json_of(handle_request(&get("/scenes"), &fx.state));
        assert_eq!(
            json,
            serde_json::json!({"scenes": [{"name": "graph_traversal", "file": "graph_traversal.py"}]})
        );
    }

    /// Test: Health
    /// Validates: version string on success, 500 when the renderer is missing
    #[test]
    fn test_health() {
        let fx = fixture(PRODUCE);
        let response = handle_request(&get("/health"), &fx.state);
        assert_eq!(response.status_code, 200);
        assert_eq!(json_of(response)["renderer_version"], "Manim Community v0.18.1");

        let mut config = ServerConfig::with_root(fx.dir.path());
        config.renderer = fx.dir.path().join("missing-renderer").to_string_lossy().into_owned();
        let state = AppState::from_config(config);
        let response = handle_request(&get("/health"), &state);
        assert_eq!(response.status_code, 500);
        assert_eq!(json_of(response)["status"], "error");
    }

    /// Test: CORS
    /// Validates: preflight is 204, regular responses carry the allow-origin header
    #[test]
    fn test_cors_headers() {
        let fx = fixture(PRODUCE);
        let preflight = handle_request(&Request::fake_http("OPTIONS", "/render", vec![], vec![]), &fx.state);
        assert_eq!(preflight.status_code, 204);

        let response = handle_request(&get("/scenes"), &fx.state);
        assert!(
            response
                .headers
                .iter()
                .any(|(k, v)| k == "Access-Control-Allow-Origin" && v == "*")
        );
    }

    /// Test: Static frontend
    /// Validates: `/` serves index.html when a static dir is configured, 404 otherwise
    #[test]
    fn test_static_index() {
        let fx = fixture(PRODUCE);
        assert_eq!(handle_request(&get("/"), &fx.state).status_code, 404);

        let site = fx.dir.path().join("site");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(site.join("index.html"), "<html></html>").unwrap();
        let mut config = fx.state.config.clone();
        config.static_dir = Some(site);
        let state = AppState::from_config(config);

        let response = handle_request(&get("/"), &state);
        assert_eq!(response.status_code, 200);
        assert_eq!(body_of(response), b"<html></html>");
    }
}
