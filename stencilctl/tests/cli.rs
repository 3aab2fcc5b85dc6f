//! End-to-end runs of the binary against files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

const DEFINITION: &str = r#"
apiVersion: stencil.dev/v1alpha1
kind: ComponentDefinition
metadata:
  name: web-service
spec:
  schema:
    parameters:
      replicas: "integer | default=1"
  resources:
    - id: deployment
      template:
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: "${metadata.name}"
        spec:
          replicas: "${spec.replicas}"
"#;

const COMPONENT: &str = r#"
apiVersion: stencil.dev/v1alpha1
kind: Component
metadata:
  name: checkout
spec:
  componentType: web-service
  addons:
    - name: volume
      instanceId: data
"#;

const ADDON: &str = r#"
apiVersion: stencil.dev/v1alpha1
kind: Addon
metadata:
  name: volume
spec:
  schema:
    parameters:
      size: "string | default=1Gi"
  creates:
    - apiVersion: v1
      kind: PersistentVolumeClaim
      metadata:
        name: "${metadata.name}-${instanceId}"
      spec:
        resources:
          requests:
            storage: "${spec.size}"
"#;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("writing fixture");
    path
}

fn stencilctl() -> Command {
    Command::cargo_bin("stencilctl").expect("binary built")
}

#[test]
fn render_writes_yaml_documents() -> Result {
    let dir = TempDir::new()?;
    let definition = write(dir.path(), "definition.yaml", DEFINITION);
    let component = write(dir.path(), "component.yaml", COMPONENT);
    let addon = write(dir.path(), "addon.yaml", ADDON);

    stencilctl()
        .arg("render")
        .arg("--definition")
        .arg(&definition)
        .arg("--component")
        .arg(&component)
        .arg("--addon")
        .arg(&addon)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("kind: Deployment")
                .and(predicate::str::contains("replicas: 1"))
                .and(predicate::str::contains("name: checkout-data"))
                .and(predicate::str::contains("storage: 1Gi")),
        );
    Ok(())
}

#[test]
fn addon_limit_zero_keeps_base_only() -> Result {
    let dir = TempDir::new()?;
    let definition = write(dir.path(), "definition.yaml", DEFINITION);
    let component = write(dir.path(), "component.yaml", COMPONENT);
    let addon = write(dir.path(), "addon.yaml", ADDON);

    stencilctl()
        .arg("render")
        .arg("--definition")
        .arg(&definition)
        .arg("--component")
        .arg(&component)
        .arg("--addon")
        .arg(&addon)
        .arg("--addon-limit")
        .arg("0")
        .assert()
        .success()
        .stdout(predicate::str::contains("PersistentVolumeClaim").not());
    Ok(())
}

#[test]
fn render_as_json() -> Result {
    let dir = TempDir::new()?;
    let definition = write(dir.path(), "definition.yaml", DEFINITION);
    let component = write(dir.path(), "component.yaml", COMPONENT);
    let addon = write(dir.path(), "addon.yaml", ADDON);

    let out = stencilctl()
        .arg("render")
        .arg("--definition")
        .arg(&definition)
        .arg("--component")
        .arg(&component)
        .arg("--addon")
        .arg(&addon)
        .arg("--output")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let docs: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(docs[0]["spec"]["replicas"], serde_json::json!(1));
    assert_eq!(docs[1]["kind"], serde_json::json!("PersistentVolumeClaim"));
    Ok(())
}

#[test]
fn schema_writes_the_document() -> Result {
    let dir = TempDir::new()?;
    let definition = write(dir.path(), "definition.yaml", DEFINITION);
    let out_path = dir.path().join("schema.json");

    stencilctl()
        .arg("schema")
        .arg("--definition")
        .arg(&definition)
        .arg("--out")
        .arg(&out_path)
        .assert()
        .success();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out_path)?)?;
    assert_eq!(
        doc["web-service"]["properties"]["replicas"]["default"],
        serde_json::json!(1),
    );
    Ok(())
}

#[test]
fn mismatched_component_type_fails() -> Result {
    let dir = TempDir::new()?;
    let definition = write(dir.path(), "definition.yaml", DEFINITION);
    let component = write(
        dir.path(),
        "component.yaml",
        &COMPONENT.replace("web-service", "other-type"),
    );

    stencilctl()
        .arg("render")
        .arg("--definition")
        .arg(&definition)
        .arg("--component")
        .arg(&component)
        .assert()
        .failure()
        .stderr(predicate::str::contains("other-type"));
    Ok(())
}

#[test]
fn unreadable_input_fails() -> Result {
    let dir = TempDir::new()?;
    let definition = write(dir.path(), "definition.yaml", DEFINITION);

    stencilctl()
        .arg("render")
        .arg("--definition")
        .arg(&definition)
        .arg("--component")
        .arg(dir.path().join("nope.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.yaml"));
    Ok(())
}
