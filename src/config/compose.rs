//! Compose File Rewriting
//!
//! Container launches go through a docker-compose template that is
//! rewritten per run: the benchmarked service gets its image, environment,
//! volumes and memory limit set before `docker compose up` is invoked.
//! Everything else in the template (database service, networks, ...) is
//! left untouched.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::error::BenchError;

/// Rewrites a compose template for one run and writes the result.
///
/// # Arguments
///
/// * `template` - Compose template to read
/// * `output` - Path the rewritten file is written to
/// * `service` - Service key to modify under `services:`
/// * `image` - Image name the service should run
/// * `env` - Environment entries to set (placeholders already substituted)
/// * `volumes` - Volume mounts to set, if any
/// * `mem_limit` - Compose `mem_limit` value, if any
pub fn write_compose_file(
    template: &Path,
    output: &Path,
    service: &str,
    image: &str,
    env: &BTreeMap<String, String>,
    volumes: &[String],
    mem_limit: Option<&str>,
) -> Result<(), BenchError> {
    let content = fs::read_to_string(template)?;

    let mut doc: Value = serde_yaml::from_str(&content).map_err(|e| {
        BenchError::Config(format!(
            "failed to parse compose template '{}': {}",
            template.display(),
            e
        ))
    })?;

    let service_map = doc
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| {
            BenchError::Config(format!(
                "compose template '{}' has no 'services' mapping",
                template.display()
            ))
        })?
        .get_mut(service)
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| {
            BenchError::Config(format!(
                "compose template '{}' has no service '{}'",
                template.display(),
                service
            ))
        })?;

    set_string(service_map, "image", image);

    if let Some(limit) = mem_limit {
        set_string(service_map, "mem_limit", limit);
    }

    if !volumes.is_empty() {
        let list = volumes
            .iter()
            .map(|v| Value::String(v.clone()))
            .collect::<Vec<_>>();
        service_map.insert(
            Value::String("volumes".to_string()),
            Value::Sequence(list),
        );
    }

    if !env.is_empty() {
        if !matches!(service_map.get("environment"), Some(Value::Mapping(_))) {
            service_map.insert(
                Value::String("environment".to_string()),
                Value::Mapping(Mapping::new()),
            );
        }
        let env_map = service_map
            .get_mut("environment")
            .and_then(Value::as_mapping_mut)
            .expect("environment mapping was just inserted");

        for (name, value) in env {
            env_map.insert(
                Value::String(name.clone()),
                Value::String(value.clone()),
            );
        }
    }

    let rendered = serde_yaml::to_string(&doc)
        .map_err(|e| BenchError::Config(format!("failed to render compose file: {}", e)))?;
    fs::write(output, rendered)?;

    debug!(
        "Wrote compose file for service '{}' to {}",
        service,
        output.display()
    );

    Ok(())
}

fn set_string(map: &mut Mapping, key: &str, value: &str) {
    map.insert(
        Value::String(key.to_string()),
        Value::String(value.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEMPLATE: &str = r#"
services:
  bank:
    image: placeholder
    environment:
      NUMBER_OF_ACCOUNTS: "1000"
  postgres:
    image: postgres:16
"#;

    fn rewrite(env: &BTreeMap<String, String>, mem_limit: Option<&str>) -> Value {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.yaml");
        let output = dir.path().join("modified.yaml");
        fs::write(&template, TEMPLATE).unwrap();

        write_compose_file(
            &template,
            &output,
            "bank",
            "bank-go",
            env,
            &["./bankData:/app/bankData".to_string()],
            mem_limit,
        )
        .unwrap();

        serde_yaml::from_str(&fs::read_to_string(&output).unwrap()).unwrap()
    }

    #[test]
    fn test_sets_image_and_volumes() {
        let doc = rewrite(&BTreeMap::new(), None);
        assert_eq!(doc["services"]["bank"]["image"], "bank-go");
        assert_eq!(
            doc["services"]["bank"]["volumes"][0],
            "./bankData:/app/bankData"
        );
    }

    #[test]
    fn test_merges_environment() {
        let mut env = BTreeMap::new();
        env.insert("ALGORITHM".to_string(), "GOROUTINE".to_string());
        env.insert("NUMBER_OF_TRANSACTIONS".to_string(), "100000".to_string());

        let doc = rewrite(&env, None);
        let environment = &doc["services"]["bank"]["environment"];
        assert_eq!(environment["ALGORITHM"], "GOROUTINE");
        assert_eq!(environment["NUMBER_OF_TRANSACTIONS"], "100000");
        // Pre-existing template entries survive
        assert_eq!(environment["NUMBER_OF_ACCOUNTS"], "1000");
    }

    #[test]
    fn test_sets_mem_limit_and_leaves_other_services() {
        let doc = rewrite(&BTreeMap::new(), Some("4g"));
        assert_eq!(doc["services"]["bank"]["mem_limit"], "4g");
        assert_eq!(doc["services"]["postgres"]["image"], "postgres:16");
    }

    #[test]
    fn test_missing_service_is_an_error() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.yaml");
        let output = dir.path().join("modified.yaml");
        fs::write(&template, TEMPLATE).unwrap();

        let result = write_compose_file(
            &template,
            &output,
            "nope",
            "img",
            &BTreeMap::new(),
            &[],
            None,
        );
        assert!(result.is_err());
    }
}
