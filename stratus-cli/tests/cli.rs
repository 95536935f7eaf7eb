use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

fn stratus(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stratus"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const BUCKET: &str = r#"
Parameters:
  Env:
    Type: String
    AllowedValues: [dev, prod]
    Default: dev
Resources:
  Bucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: !Sub "app-${Env}-data"
      VersioningConfiguration:
        Status: Enabled
"#;

#[test]
fn validate_clean_template() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bucket.yaml", BUCKET);

    let output = stratus(&["validate", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains("1 resources validated successfully"));
}

#[test]
fn validate_reports_errors_with_exit_one() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "bad.json",
        r#"{
  "Resources": {
    "Bucket": {
      "Type": "AWS::S3::Bucket",
      "Properties": { "VersioningConfiguration": { "Status": "Sometimes" } }
    },
    "Group": {
      "Type": "AWS::EC2::SecurityGroup",
      "Properties": {}
    }
  }
}"#,
    );

    let output = stratus(&["validate", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("Resources.Bucket"));
    assert!(text.contains("[InvalidEnumValue] VersioningConfiguration.Status"));
    assert!(text.contains("[RequiredPropertyMissing] GroupDescription"));
}

#[test]
fn validate_json_output_with_parameters() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bucket.yaml", BUCKET);

    let output = stratus(&[
        "validate",
        path.to_str().unwrap(),
        "-p",
        "Env=prod",
        "--format",
        "json",
        "--show-resolved",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(
        json["resolved"]["Resources"]["Bucket"]["Properties"]["BucketName"],
        "app-prod-data"
    );
}

#[test]
fn parameter_constraint_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bucket.yaml", BUCKET);

    let output = stratus(&["validate", path.to_str().unwrap(), "-p", "Env=staging"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Parameters.Env"));
}

#[test]
fn unparsable_and_missing_input_exit_two() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.json", "{ \"Resources\": ");

    assert_eq!(stratus(&["validate", path.to_str().unwrap()]).status.code(), Some(2));
    let missing = dir.path().join("missing.yaml");
    assert_eq!(stratus(&["validate", missing.to_str().unwrap()]).status.code(), Some(2));
}

#[test]
fn cycle_exits_two() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "cycle.yaml",
        r#"
Resources:
  A:
    Type: AWS::SQS::Queue
    DependsOn: B
  B:
    Type: AWS::SQS::Queue
    DependsOn: A
"#,
    );

    let output = stratus(&["validate", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Circular dependency: A -> B -> A"));
    assert_eq!(stratus(&["graph", path.to_str().unwrap()]).status.code(), Some(2));
}

#[test]
fn graph_prints_order_and_edges() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "network.yaml",
        r#"
Resources:
  Subnet:
    Type: AWS::EC2::Subnet
    Properties:
      VpcId: !Ref Vpc
      CidrBlock: 10.0.0.0/24
  Vpc:
    Type: AWS::EC2::VPC
    Properties:
      CidrBlock: 10.0.0.0/16
"#,
    );

    let output = stratus(&["graph", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.contains("1. Vpc"));
    assert!(text.contains("2. Subnet"));
    assert!(text.contains("Subnet -> Vpc (Ref at VpcId)"));
}

#[test]
fn diff_reports_replacement() {
    let dir = TempDir::new().unwrap();
    let old = write(
        &dir,
        "old.yaml",
        r#"
Resources:
  Vpc:
    Type: AWS::EC2::VPC
    Properties:
      CidrBlock: 10.0.0.0/16
  Subnet:
    Type: AWS::EC2::Subnet
    Properties:
      VpcId: !Ref Vpc
      CidrBlock: 10.0.0.0/24
"#,
    );
    let new = write(
        &dir,
        "new.yaml",
        r#"
Resources:
  Vpc:
    Type: AWS::EC2::VPC
    Properties:
      CidrBlock: 10.1.0.0/16
  Subnet:
    Type: AWS::EC2::Subnet
    Properties:
      VpcId: !Ref Vpc
      CidrBlock: 10.0.0.0/24
"#,
    );

    let output = stratus(&["diff", old.to_str().unwrap(), new.to_str().unwrap(), "--verbose"]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.contains("-/+ Vpc AWS::EC2::VPC (Replacement)"));
    assert!(text.contains("VpcId: Replacement, Vpc is replaced"));
    assert!(text.contains("-\"10.0.0.0/16\""));
    assert!(text.contains("+\"10.1.0.0/16\""));
    assert!(text.contains("Impact: 0 to create, 2 to update (2 replacement), 0 to delete"));
}

#[test]
fn schema_lookup() {
    let output = stratus(&["schema", "AWS::SQS::Queue"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("QueueName: String"));

    assert_eq!(stratus(&["schema", "AWS::Nope::Thing"]).status.code(), Some(1));

    let listing = stdout(&stratus(&["schema"]));
    assert!(listing.lines().any(|l| l == "AWS::Lambda::Function"));
}
