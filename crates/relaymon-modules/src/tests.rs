use crate::registry::{builtin_modules, read_module, scan_modules};
use crate::{ModuleCapability, ModuleError, ParamMap, ParamType, Probe};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn write_metadata(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let module_dir = dir.join(name);
    std::fs::create_dir(&module_dir).unwrap();
    std::fs::write(module_dir.join("metadata.json"), content).unwrap();
    module_dir
}

#[test]
fn builtin_set_is_complete() {
    let modules = builtin_modules();
    let mut names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["fake", "http", "ping"]);

    for module in &modules {
        assert_eq!(module.kind(), "builtin");
    }
}

#[test]
fn fake_module_declares_default_value() {
    let modules = builtin_modules();
    let fake = modules.iter().find(|m| m.name == "fake").unwrap();
    let value2 = fake.parameters.iter().find(|p| p.name == "value2").unwrap();
    assert!(!value2.required);
    assert_eq!(value2.default, Value::from(42));
    assert_eq!(value2.param_type, ParamType::Number);
}

#[test]
fn param_type_round_trips_through_strings() {
    for (name, tag) in [
        ("bool", ParamType::Bool),
        ("number", ParamType::Number),
        ("string", ParamType::String),
        ("map", ParamType::Map),
    ] {
        assert_eq!(name.parse::<ParamType>().unwrap(), tag);
        assert_eq!(tag.to_string(), name);
    }
    assert!("list".parse::<ParamType>().is_err());
}

#[test]
fn read_module_defaults_executable_path() {
    let dir = TempDir::new().unwrap();
    let module_dir = write_metadata(
        dir.path(),
        "disk",
        r#"{"Name": "disk", "Kind": "executable", "Parameters": [
            {"Name": "device", "Type": "string", "Required": true}
        ]}"#,
    );

    let module = read_module(&module_dir).unwrap();
    assert_eq!(module.name, "disk");
    assert_eq!(module.kind(), "executable");
    assert_eq!(module.parameters.len(), 1);
    assert_eq!(module.parameters[0].param_type, ParamType::String);
    match &module.capability {
        ModuleCapability::Executable(path) => assert_eq!(path, &module_dir.join("disk")),
        ModuleCapability::Builtin(_) => panic!("expected executable capability"),
    }
}

#[test]
fn read_module_honors_explicit_executable() {
    let dir = TempDir::new().unwrap();
    let module_dir = write_metadata(
        dir.path(),
        "disk",
        r#"{"Name": "disk", "Kind": "executable", "Executable": "/usr/local/bin/disk-probe"}"#,
    );

    let module = read_module(&module_dir).unwrap();
    match &module.capability {
        ModuleCapability::Executable(path) => {
            assert_eq!(path.as_path(), Path::new("/usr/local/bin/disk-probe"));
        }
        ModuleCapability::Builtin(_) => panic!("expected executable capability"),
    }
}

#[test]
fn read_module_rejects_bad_descriptors() {
    let dir = TempDir::new().unwrap();

    let missing_name = write_metadata(dir.path(), "a", r#"{"Kind": "executable"}"#);
    assert!(matches!(
        read_module(&missing_name),
        Err(ModuleError::MissingName)
    ));

    let missing_kind = write_metadata(dir.path(), "b", r#"{"Name": "b"}"#);
    assert!(matches!(
        read_module(&missing_kind),
        Err(ModuleError::MissingKind)
    ));

    let bad_kind = write_metadata(dir.path(), "c", r#"{"Name": "c", "Kind": "builtin"}"#);
    assert!(matches!(
        read_module(&bad_kind),
        Err(ModuleError::InvalidKind(kind)) if kind == "builtin"
    ));

    let dup_param = write_metadata(
        dir.path(),
        "d",
        r#"{"Name": "d", "Kind": "executable", "Parameters": [
            {"Name": "x", "Type": "string"},
            {"Name": "x", "Type": "number"}
        ]}"#,
    );
    assert!(matches!(
        read_module(&dup_param),
        Err(ModuleError::DuplicateParameter(name)) if name == "x"
    ));

    let bad_type = write_metadata(
        dir.path(),
        "e",
        r#"{"Name": "e", "Kind": "executable", "Parameters": [
            {"Name": "x", "Type": "list"}
        ]}"#,
    );
    assert!(matches!(
        read_module(&bad_type),
        Err(ModuleError::BadParameterType(name, _)) if name == "x"
    ));

    let no_type = write_metadata(
        dir.path(),
        "f",
        r#"{"Name": "f", "Kind": "executable", "Parameters": [{"Name": "x"}]}"#,
    );
    assert!(matches!(
        read_module(&no_type),
        Err(ModuleError::MissingParameterType(name)) if name == "x"
    ));
}

#[test]
fn scan_skips_broken_modules_and_keeps_others() {
    let dir = TempDir::new().unwrap();
    write_metadata(dir.path(), "good", r#"{"Name": "good", "Kind": "executable"}"#);
    write_metadata(dir.path(), "broken", "##invalid##");
    std::fs::write(dir.path().join("not-a-dir"), "ignored").unwrap();

    let registry = scan_modules(Some(dir.path()));
    assert!(registry.contains_key("good"));
    assert!(!registry.contains_key("broken"));
    // built-ins are still present
    assert!(registry.contains_key("ping"));
    assert!(registry.contains_key("fake"));
    assert!(registry.contains_key("http"));
}

#[test]
fn custom_module_shadows_builtin() {
    let dir = TempDir::new().unwrap();
    write_metadata(dir.path(), "ping", r#"{"Name": "ping", "Kind": "executable"}"#);

    let registry = scan_modules(Some(dir.path()));
    assert_eq!(registry["ping"].kind(), "executable");
}

#[test]
fn missing_modules_directory_leaves_builtins() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let registry = scan_modules(Some(missing.as_path()));
    assert_eq!(registry.len(), 3);

    let registry = scan_modules(None);
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn fake_probe_emits_two_events() {
    let mut params = ParamMap::new();
    params.insert("attribute".into(), Value::from("a"));
    params.insert("value1".into(), Value::from(7));
    params.insert("value2".into(), Value::from(42));

    let events = crate::fake::FakeProbe.run(&params).await;
    assert_eq!(events.len(), 2);

    assert_eq!(events[0].service, "value1");
    assert_eq!(events[0].state, "ok");
    assert_eq!(events[0].metric, Some(7.0));
    assert_eq!(events[0].attributes["test"], "a");

    assert_eq!(events[1].service, "value2");
    assert_eq!(events[1].metric, Some(42.0));
}

#[tokio::test]
async fn ping_probe_reports_success_against_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut params = ParamMap::new();
    params.insert("target".into(), Value::from(addr.to_string()));

    let events = crate::ping::PingProbe.run(&params).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, "success");
    assert!(events[0].metric.unwrap() >= 0.0);
}

#[tokio::test]
async fn ping_probe_reports_failure_with_error_attribute() {
    // A closed port on localhost refuses the connection.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut params = ParamMap::new();
    params.insert("target".into(), Value::from(addr.to_string()));

    let events = crate::ping::PingProbe.run(&params).await;
    assert_eq!(events[0].state, "failure");
    assert!(events[0].attributes.contains_key("error"));
}

#[tokio::test]
async fn http_probe_reports_status_and_body() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
            .await
            .unwrap();
    });

    let mut params = ParamMap::new();
    params.insert("url".into(), Value::from(format!("http://{addr}/")));
    params.insert("method".into(), Value::from("GET"));
    params.insert("timeout".into(), Value::from(5));
    params.insert("include_response".into(), Value::from(true));

    let events = crate::http::HttpProbe::new().run(&params).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, "success");
    assert_eq!(events[0].attributes["code"], "200");
    assert_eq!(events[0].attributes["response"], "ok");
    assert!(events[0].metric.unwrap() >= 0.0);
}

#[tokio::test]
async fn http_probe_reports_connection_errors() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut params = ParamMap::new();
    params.insert("url".into(), Value::from(format!("http://{addr}/")));

    let events = crate::http::HttpProbe::new().run(&params).await;
    assert_eq!(events[0].state, "failure");
    assert!(events[0].attributes.contains_key("error"));
    assert!(!events[0].attributes.contains_key("code"));
}
