/*
 * tests/modules.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end tests for module inlining.
 */

use cumulus_pkg::intrinsics::{GET_ATT, IF, REF, call_arg, get_att_parts};
use cumulus_pkg::{
    ArtifactError, ArtifactLocation, ArtifactStore, ErrorCategory, MemoryModuleSource, ModuleBase,
    PackageError, Packager, RecordingArtifactStore, UploadRequest,
};
use std::sync::Arc;
use cumulus_yaml::{Node, NodePath, parse, to_yaml_string};
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};

const STORAGE: &str = r#"
Parameters:
  Name:
    Type: String
  Retention:
    Type: Number
    Default: 30
  Stage:
    Type: String
    Default: dev
Conditions:
  IsProd: !Equals [!Ref Stage, prod]
  IsDynamic: !Equals [!Ref Stage, !Ref AWS::AccountId]
Resources:
  ModuleExtension:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: !Sub "${Name}-bucket"
      LifecycleConfiguration:
        Rules:
          - ExpirationInDays: !Ref Retention
      Versioning: !If [IsProd, {Status: Enabled}, !Ref AWS::NoValue]
  Bar:
    Type: AWS::S3::BucketPolicy
    DependsOn: ModuleExtension
    Properties:
      Bucket: !Ref ModuleExtension
      Arn: !GetAtt ModuleExtension.Arn
      Elsewhere: !Ref ExternalThing
  Audit:
    Type: AWS::CloudTrail::Trail
    Condition: IsProd
    Properties:
      S3BucketName: !Ref ModuleExtension
  Alarm:
    Type: AWS::CloudWatch::Alarm
    Condition: IsDynamic
    Properties:
      AlarmName: !Sub "${Name}-alarm"
Outputs:
  BucketArn:
    Value: !GetAtt ModuleExtension.Arn
  Label:
    Value: !Sub "${Name}-label"
"#;

fn packager(files: &[(&str, &str)]) -> Packager {
    let source = files
        .iter()
        .fold(MemoryModuleSource::new(), |source, (path, text)| {
            source.with_file(path, text.as_bytes())
        });
    Packager::builder().source(source).build().unwrap()
}

fn run(files: &[(&str, &str)], template: &str) -> cumulus_pkg::Result<Node> {
    packager(files).transform(parse(template)?, &ModuleBase::Dir(".".into()))
}

fn at<'a>(root: &'a Node, path: &str) -> &'a Node {
    let path: NodePath = path.split('/').collect();
    root.get_path(&path)
        .unwrap_or_else(|| panic!("nothing at {}", path))
}

fn resource_names(root: &Node) -> Vec<String> {
    at(root, "Resources").keys().map(str::to_string).collect()
}

#[test]
fn test_module_renaming() {
    let output = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties:\n      Name: logs\n",
    )
    .unwrap();

    assert_eq!(resource_names(&output), vec!["Foo", "FooBar", "FooAlarm"]);
    assert_eq!(at(&output, "Resources/Foo/Type").as_str(), Some("AWS::S3::Bucket"));
    assert_eq!(
        at(&output, "Resources/Foo/Properties/BucketName").as_str(),
        Some("logs-bucket")
    );
    // Default used when the caller leaves the property out.
    assert_eq!(
        at(&output, "Resources/Foo/Properties/LifecycleConfiguration/Rules/0/ExpirationInDays")
            .as_str(),
        Some("30")
    );
    assert!(!at(&output, "Resources/Foo/Properties").contains_key("Versioning"));

    assert_eq!(at(&output, "Resources/FooBar/DependsOn").as_str(), Some("Foo"));
    assert_eq!(
        call_arg(at(&output, "Resources/FooBar/Properties/Bucket"), REF).and_then(Node::as_str),
        Some("Foo")
    );
    assert_eq!(
        call_arg(at(&output, "Resources/FooBar/Properties/Arn"), GET_ATT).and_then(get_att_parts),
        Some(("Foo".to_string(), "Arn".to_string()))
    );
    // Names outside the module are left for the parent.
    assert_eq!(
        call_arg(at(&output, "Resources/FooBar/Properties/Elsewhere"), REF).and_then(Node::as_str),
        Some("ExternalThing")
    );
}

#[test]
fn test_unresolved_condition_moves_to_parent() {
    let output = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties:\n      Name: logs\n",
    )
    .unwrap();
    assert_eq!(at(&output, "Resources/FooAlarm/Condition").as_str(), Some("FooIsDynamic"));
    assert!(at(&output, "Conditions").contains_key("FooIsDynamic"));
    assert!(!at(&output, "Conditions").contains_key("FooIsProd"));
}

#[test]
fn test_condition_pruning() {
    let output = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties:\n      Name: logs\n      Stage: prod\n",
    )
    .unwrap();
    assert!(resource_names(&output).contains(&"FooAudit".to_string()));
    assert!(!at(&output, "Resources/FooAudit").contains_key("Condition"));
    assert_eq!(
        at(&output, "Resources/Foo/Properties/Versioning/Status").as_str(),
        Some("Enabled")
    );
    assert!(call_arg(at(&output, "Resources/Foo/Properties/Versioning"), IF).is_none());
}

#[test]
fn test_outputs_substituted() {
    let output = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties:\n      Name: logs\nOutputs:\n  Arn:\n    Value: !GetAtt Foo.BucketArn\n  Label:\n    Value: !Sub \"${Foo.Label}!\"\n  Raw:\n    Value: !GetAtt Foo.DomainName\n",
    )
    .unwrap();
    assert_eq!(
        call_arg(at(&output, "Outputs/Arn/Value"), GET_ATT).and_then(get_att_parts),
        Some(("Foo".to_string(), "Arn".to_string()))
    );
    assert_eq!(at(&output, "Outputs/Label/Value").as_str(), Some("logs-label!"));
    assert_eq!(
        call_arg(at(&output, "Outputs/Raw/Value"), GET_ATT).and_then(get_att_parts),
        Some(("Foo".to_string(), "DomainName".to_string()))
    );
}

#[test]
fn test_caller_attributes_and_overrides() {
    let output = run(
        &[("storage.yaml", STORAGE)],
        r#"
Resources:
  Foo:
    Type: !Rain::Module storage.yaml
    DependsOn: Network
    DeletionPolicy: Retain
    Properties:
      Name: logs
      Tags: [{Key: team, Value: data}]
    Overrides:
      Bar:
        DependsOn: [Network]
        Properties:
          Bucket: replaced
  Network:
    Type: AWS::EC2::VPC
"#,
    )
    .unwrap();
    assert_eq!(at(&output, "Resources/Foo/DeletionPolicy").as_str(), Some("Retain"));
    assert_eq!(at(&output, "Resources/Foo/DependsOn").as_str(), Some("Network"));
    assert!(at(&output, "Resources/Foo/Properties").contains_key("Tags"));
    assert!(!at(&output, "Resources/Foo/Properties").contains_key("Name"));
    assert!(!at(&output, "Resources/Foo").contains_key("Overrides"));

    assert_eq!(at(&output, "Resources/FooBar/Properties/Bucket").as_str(), Some("replaced"));
    let deps: Vec<&str> = at(&output, "Resources/FooBar/DependsOn")
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(Node::as_str)
        .collect();
    assert_eq!(deps, vec!["Foo", "Network"]);
}

#[test]
fn test_override_rejection() {
    let unknown = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties: {Name: x}\n    Overrides:\n      Nope:\n        Properties: {A: 1}\n",
    )
    .unwrap_err();
    assert_eq!(unknown.category(), ErrorCategory::Validation);
    assert!(unknown.root_cause().to_string().contains("override not found: Nope"));

    let param = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties: {Name: x}\n    Overrides:\n      Bar:\n        Properties: {Retention: 1}\n",
    )
    .unwrap_err();
    assert!(matches!(param.root_cause(), PackageError::Validation(_)));
}

#[test]
fn test_missing_parameter_value() {
    let err = run(
        &[("storage.yaml", STORAGE)],
        "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n",
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Resolution);
    assert!(matches!(err, PackageError::Module { .. }));
}

#[test]
fn test_map_expansion() {
    let module = "Parameters:\n  Label: {Type: String}\nResources:\n  ModuleExtension:\n    Type: AWS::SNS::Topic\n    Properties:\n      TopicName: !Ref Label\nOutputs:\n  Arn:\n    Value: !Ref ModuleExtension\n";
    let output = run(
        &[("topic.yaml", module)],
        r#"
Resources:
  Topic:
    Type: !Rain::Module topic.yaml
    Map: [a, b]
    Properties:
      Label: !Sub "$MapIndex,$MapValue"
Outputs:
  First:
    Value: !GetAtt Topic[0].Arn
  All:
    Value: !GetAtt Topic[].Arn
"#,
    )
    .unwrap();

    assert_eq!(resource_names(&output), vec!["Topic0", "Topic1"]);
    assert_eq!(at(&output, "Resources/Topic0/Properties/TopicName").as_str(), Some("0,a"));
    assert_eq!(at(&output, "Resources/Topic1/Properties/TopicName").as_str(), Some("1,b"));
    assert_eq!(
        call_arg(at(&output, "Outputs/First/Value"), REF).and_then(Node::as_str),
        Some("Topic0")
    );
    let all: Vec<&str> = at(&output, "Outputs/All/Value")
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|n| call_arg(n, REF).and_then(Node::as_str))
        .collect();
    assert_eq!(all, vec!["Topic0", "Topic1"]);
}

#[test]
fn test_map_from_parameter_default() {
    let module = "Resources:\n  ModuleExtension:\n    Type: AWS::SNS::Topic\n    Properties:\n      TopicName: x\n";
    let output = run(
        &[("topic.yaml", module)],
        "Parameters:\n  Names:\n    Type: CommaDelimitedList\n    Default: red, green\nResources:\n  Topic:\n    Type: !Rain::Module topic.yaml\n    Map: !Ref Names\n",
    )
    .unwrap();
    assert_eq!(resource_names(&output), vec!["Topic0", "Topic1"]);
}

/// Lets a test keep a handle on the store it gives the packager.
struct SharedStore(Arc<RecordingArtifactStore>);

impl ArtifactStore for SharedStore {
    fn upload(&self, request: &UploadRequest) -> Result<ArtifactLocation, ArtifactError> {
        self.0.upload(request)
    }
}

#[test]
fn test_asset_path_from_module_property() {
    let module = r#"
Parameters:
  Code:
    Type: String
  LayerPath:
    Type: String
    Default: layer
Resources:
  ModuleExtension:
    Type: AWS::Lambda::Function
    Properties:
      Code: !Rain::S3
        Path: !Ref Code
        BucketProperty: S3Bucket
        KeyProperty: S3Key
  Layer:
    Type: AWS::Lambda::LayerVersion
    Properties:
      Content: !Rain::S3 {Path: !Ref LayerPath, Format: URI}
"#;
    let store = Arc::new(RecordingArtifactStore::new());
    let packager = Packager::builder()
        .source(MemoryModuleSource::new().with_file("lambda/fn.yaml", module))
        .store(SharedStore(store.clone()))
        .build()
        .unwrap();
    let output = packager
        .transform(
            parse("Resources:
  Fn:
    Type: !Rain::Module lambda/fn.yaml
    Properties:
      Code: src
").unwrap(),
            &ModuleBase::Dir(".".into()),
        )
        .unwrap();

    assert_eq!(at(&output, "Resources/Fn/Properties/Code/S3Bucket").as_str(), Some("test-bucket"));
    assert_eq!(at(&output, "Resources/Fn/Properties/Code/S3Key").as_str(), Some("artifact-1"));
    assert_eq!(
        at(&output, "Resources/FnLayer/Properties/Content").as_str(),
        Some("s3://test-bucket/artifact-2")
    );
    let requests = store.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].path.ends_with("lambda/src"));
    // Unset properties fall back to the parameter default.
    assert!(requests[1].path.ends_with("lambda/layer"));
}

#[test]
fn test_asset_path_ref_outside_module() {
    let store = Arc::new(RecordingArtifactStore::new());
    let packager = Packager::builder()
        .store(SharedStore(store.clone()))
        .build()
        .unwrap();
    let err = packager
        .transform(
            parse("Resources:
  Fn:
    Type: AWS::Lambda::Function
    Properties:
      Code: !Rain::S3 {Path: !Ref Code}
").unwrap(),
            &ModuleBase::Dir(".".into()),
        )
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Structural);
    assert!(store.requests().is_empty());
}

#[test]
fn test_nested_modules() {
    let inner = "Parameters:\n  Name: {Type: String}\nResources:\n  ModuleExtension:\n    Type: AWS::SQS::Queue\n    Properties:\n      QueueName: !Ref Name\n  Dlq:\n    Type: AWS::SQS::Queue\n";
    let outer = "Parameters:\n  Prefix: {Type: String}\nResources:\n  ModuleExtension:\n    Type: AWS::SNS::Topic\n  Queue:\n    Type: !Rain::Module inner/queue.yaml\n    Properties:\n      Name: !Sub \"${Prefix}-queue\"\n";
    let output = run(
        &[("outer.yaml", outer), ("inner/queue.yaml", inner)],
        "Resources:\n  Svc:\n    Type: !Rain::Module outer.yaml\n    Properties:\n      Prefix: orders\n",
    )
    .unwrap();

    assert_eq!(resource_names(&output), vec!["Svc", "SvcQueue", "SvcQueueDlq"]);
    assert_eq!(
        at(&output, "Resources/SvcQueue/Properties/QueueName").as_str(),
        Some("orders-queue")
    );
}

#[test]
fn test_module_collision() {
    let module = "Resources:\n  ModuleExtension:\n    Type: X\n  Bar:\n    Type: Y\n";
    let err = run(
        &[("m.yaml", module)],
        "Resources:\n  Foo:\n    Type: !Rain::Module m.yaml\n  FooBar:\n    Type: Z\n",
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[test]
fn test_package_alias_and_hash() {
    let module = "Resources:\n  ModuleExtension:\n    Type: AWS::SNS::Topic\n";
    let hash = hex::encode(Sha256::digest(module.as_bytes()));
    let template = format!(
        "Packages:\n  lib:\n    Source: vendor/lib\n    Hash: {}\nResources:\n  Topic:\n    Type: $lib/topic.yaml\n",
        hash
    );
    let output = run(&[("vendor/lib/topic.yaml", module)], &template).unwrap();
    assert!(!output.unwrap_document().contains_key("Packages"));
    assert_eq!(at(&output, "Resources/Topic/Type").as_str(), Some("AWS::SNS::Topic"));

    let tampered = template.replace(&hash, &"0".repeat(64));
    let err = run(&[("vendor/lib/topic.yaml", module)], &tampered).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[test]
fn test_idempotence() {
    let template = "Resources:\n  Foo:\n    Type: !Rain::Module storage.yaml\n    Properties:\n      Name: logs\n";
    let packager = packager(&[("storage.yaml", STORAGE)]);
    let base = ModuleBase::Dir(".".into());
    let once = packager.transform(parse(template).unwrap(), &base).unwrap();
    let twice = packager.transform(once.clone(), &base).unwrap();
    assert!(once.same_content(&twice));
    assert_eq!(to_yaml_string(&once).unwrap(), to_yaml_string(&twice).unwrap());
}
