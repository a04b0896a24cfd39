mod common;

use common::{secrets_file, CallBehavior, StubConnector, StubService, WEATHER_SECRETS};
use serde_json::json;
use workspace_core::{
    ErrorKind, InvocationStatus, SecretsProvider, SessionAdapter, TransportKind, Workspace, WorkspaceError,
};

fn load(content: &str, service: StubService) -> (tempfile::TempDir, Workspace, std::sync::Arc<common::StubProbe>) {
    let (dir, path) = secrets_file(content);
    let (connector, probe) = StubConnector::new(service);
    let adapter = SessionAdapter::with_connector(connector).unwrap();
    let workspace = Workspace::load(&SecretsProvider::new(path), adapter).unwrap();
    (dir, workspace, probe)
}

fn load_err(content: &str) -> WorkspaceError {
    let (_dir, path) = secrets_file(content);
    let (connector, _probe) = StubConnector::new(StubService::default());
    let adapter = SessionAdapter::with_connector(connector).unwrap();
    Workspace::load(&SecretsProvider::new(path), adapter).unwrap_err()
}

#[test]
fn test_list_tools_of_configured_service() {
    let (_dir, workspace, probe) = load(WEATHER_SECRETS, StubService::default());

    let tools = workspace.list_tools("weather").unwrap();

    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "getForecast");
    assert_eq!(tools[0].description.as_deref(), Some("Weather forecast for a city"));
    assert_eq!(tools[0].input_schema["required"], json!(["city"]));
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_invoke_returns_payload() {
    let (_dir, workspace, probe) = load(WEATHER_SECRETS, StubService::default());

    let result = workspace
        .invoke("weather", "getForecast", json!({"city": "Paris"}))
        .unwrap();

    assert_eq!(result.status, InvocationStatus::Success);
    assert_eq!(result.payload, json!({"city": "Paris"}));
    assert!(result.error.is_none());
    assert_eq!(probe.last_credential.lock().as_deref(), Some("weather-token"));
    assert!(probe.is_closed());
}

#[test]
fn test_unknown_service_never_connects() {
    let (_dir, workspace, probe) = load(WEATHER_SECRETS, StubService::default());

    let err = workspace.invoke("unknownsvc", "x", json!({})).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownService);
    assert_eq!(err.kind().exit_code(), 4);
    assert_eq!(err.to_string(), "service 'unknownsvc' not found. Available: weather");
    assert_eq!(probe.connects(), 0);
}

#[test]
fn test_missing_credential_never_connects() {
    let content = r#"
[maps_mcp]
transport = "streamable_http"
url = "https://maps.example/mcp"
credential = "maps-key"
"#;
    let (_dir, workspace, probe) = load(content, StubService::default());

    let err = workspace.list_tools("maps").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialNotFound);
    assert_eq!(err.kind().exit_code(), 5);
    assert!(err.to_string().contains("maps-key"));
    assert_eq!(probe.connects(), 0);
}

#[test]
fn test_remote_failure_closes_session() {
    let service = StubService {
        call: CallBehavior::RpcError("forecast backend down".into()),
        ..StubService::default()
    };
    let (_dir, workspace, probe) = load(WEATHER_SECRETS, service);

    let err = workspace
        .invoke("weather", "getForecast", json!({"city": "Paris"}))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteTool);
    assert!(err.to_string().contains("forecast backend down"));
    assert_eq!(probe.connects(), 1);
    assert_eq!(probe.closes(), 1);
    assert!(probe.is_closed());
}

#[test]
fn test_non_object_arguments_rejected_before_connect() {
    let (_dir, workspace, probe) = load(WEATHER_SECRETS, StubService::default());

    let err = workspace.invoke("weather", "getForecast", json!(["Paris"])).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert_eq!(probe.connects(), 0);
}

#[test]
fn test_services_listed_in_name_order() {
    let content = r#"
[weather_mcp]
transport = "http"
url = "https://weather.example/mcp"
api_key = "w"

[[ignored]]
name = "not a service"

[services.search]
transport = "stdio"
command = "search-mcp"
args = ["--quiet"]
api_key = "s"
"#;
    let (_dir, workspace, _probe) = load(content, StubService::default());

    let services = workspace.list_services();
    let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();

    assert_eq!(names, vec!["search", "weather"]);
    assert_eq!(services[0].transport, TransportKind::Stdio);
    assert_eq!(services[0].args, vec!["--quiet".to_string()]);
    assert_eq!(services[1].transport, TransportKind::Http);
}

#[test]
fn test_duplicate_service_rejects_whole_file() {
    let err = load_err(
        r#"
[weather_mcp]
transport = "http"
url = "https://a.example/mcp"
api_key = "a"

[forecast_mcp]
service_name = "weather"
transport = "streamable-http"
url = "https://b.example/mcp"
api_key = "b"
"#,
    );

    assert_eq!(err.kind(), ErrorKind::DuplicateService);
    assert_eq!(err.kind().exit_code(), 3);
}

#[test]
fn test_no_services_is_configuration_error() {
    let err = load_err("[openai]\napi_key = \"sk-primary\"\n");

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("no MCP services configured"));
}

#[test]
fn test_missing_secrets_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, _probe) = StubConnector::new(StubService::default());
    let adapter = SessionAdapter::with_connector(connector).unwrap();

    let err = Workspace::load(&SecretsProvider::new(dir.path().join("absent.toml")), adapter).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.kind().exit_code(), 2);
}

#[test]
fn test_secret_values_never_in_errors() {
    let service = StubService {
        reject_initialize: true,
        ..StubService::default()
    };
    let (_dir, workspace, _probe) = load(WEATHER_SECRETS, service);

    let err = workspace.list_tools("weather").unwrap_err();

    assert!(!err.to_string().contains("weather-token"));
    assert!(!format!("{:?}", workspace.secrets()).contains("weather-token"));
    assert!(!format!("{:?}", workspace.secrets()).contains("sk-primary"));
}
