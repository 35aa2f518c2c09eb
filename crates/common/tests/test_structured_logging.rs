use common::{
    init_structured_logging, ExecutionContext, LoggingConfig, OperationTimer, StructuredLogEntry,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn test_structured_log_entry_serialization() {
    let mut fields = HashMap::new();
    fields.insert("service_type".to_string(), Value::String("Handler<Tick>".to_string()));

    let entry = StructuredLogEntry {
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        level: "ERROR".to_string(),
        target: "ioc::producer".to_string(),
        message: "Operation failed".to_string(),
        fields,
        context: None,
        duration_ms: Some(12),
    };

    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["level"], "ERROR");
    assert_eq!(json["service_type"], "Handler<Tick>");
    assert_eq!(json["duration_ms"], 12);
    assert!(json.get("context").is_none());
}

#[test]
fn test_execution_context_default() {
    let context = ExecutionContext::default();

    assert!(!context.app_version.is_empty());
    assert!(!context.hostname.is_empty());
    assert!(context.pid > 0);
    assert!(!context.thread_id.is_empty());
}

#[test]
fn test_logging_config_presets() {
    let production = LoggingConfig::production();
    assert!(production.json_output);
    assert!(!production.color_output);

    let development = LoggingConfig::development();
    assert_eq!(development.level, tracing::Level::DEBUG);
    assert!(!development.json_output);
}

#[test]
fn test_operation_timer_elapsed() {
    let mut timer = OperationTimer::new("resolve");
    timer.add_field("items_count", 3);

    std::thread::sleep(Duration::from_millis(5));
    assert!(timer.elapsed_ms() >= 5);
    timer.finish();
}

#[test]
fn test_init_structured_logging_twice_fails_without_panic() {
    let first = init_structured_logging(LoggingConfig::default());
    let second = init_structured_logging(LoggingConfig::default());

    // Глобальный subscriber может быть установлен только один раз
    assert!(first.is_ok());
    assert!(second.is_err());
}
