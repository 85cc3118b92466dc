use async_trait::async_trait;
use infragraph::{
    ActualState, Asset, Changeset, CloudProvider, Executor, Lifecycle, Outputs, Payload,
    ProviderError, ResourceId, ResourceKind, ResourceTask, RunConfig, SharedTask, TaskState,
    ValueRef,
};
use infragraph_terraform::{DOCUMENT_FILE, TerraformOptions, TerraformTarget};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

const CLUSTER: &str = "minimal.example.com";

fn cluster_tasks() -> Vec<SharedTask> {
    let vpc = ResourceTask::new(CLUSTER, ResourceKind::new("aws_vpc"))
        .property("cidr_block", "172.20.0.0/16")
        .property("enable_dns_hostnames", true)
        .shared();
    let subnet = ResourceTask::new(format!("us-test-1a.{CLUSTER}"), ResourceKind::new("aws_subnet"))
        .property("cidr_block", "172.20.32.0/19")
        .property("vpc_id", ValueRef::id(CLUSTER))
        .shared();
    let role = ResourceTask::new(format!("nodes-role.{CLUSTER}"), ResourceKind::new("aws_iam_role"))
        .property(
            "assume_role_policy",
            Asset::raw(r#"{"Statement":[{"Action":"sts:AssumeRole"}]}"#),
        )
        .shared();
    let template = ResourceTask::new(
        format!("nodes.{CLUSTER}"),
        ResourceKind::new("aws_launch_template"),
    )
    .property("instance_type", "t2.medium")
    .property("user_data", Asset::base64("#!/bin/bash\necho nodeup\n"))
    .depends_on(format!("nodes-role.{CLUSTER}"))
    .shared();
    vec![template, role, subnet, vpc]
}

fn options() -> TerraformOptions {
    TerraformOptions::default()
        .with_provider("aws", json!({ "region": "us-test-1" }))
        .with_required_version(">= 0.15.0")
        .with_required_provider(
            "aws",
            json!({ "source": "hashicorp/aws", "version": ">= 4.0.0" }),
        )
        .with_local("cluster_name", json!(CLUSTER))
        .with_output("vpc_id", ValueRef::id(CLUSTER))
}

async fn render(tasks: Vec<SharedTask>) -> infragraph::Artifact {
    let report = Executor::new(Arc::new(TerraformTarget::new(options())))
        .run(tasks)
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.tasks);
    report.artifact.unwrap()
}

#[tokio::test]
async fn renders_resources_with_symbolic_references() {
    let artifact = render(cluster_tasks()).await;
    let document: Value =
        serde_json::from_str(artifact.get_str(DOCUMENT_FILE).unwrap()).unwrap();

    let resources = &document["resource"];
    assert_eq!(
        resources["aws_subnet"]["us-test-1a-minimal-example-com"]["vpc_id"],
        json!("${aws_vpc.minimal-example-com.id}")
    );
    assert_eq!(
        resources["aws_vpc"]["minimal-example-com"]["enable_dns_hostnames"],
        json!(true)
    );
    assert_eq!(
        resources["aws_launch_template"]["nodes-minimal-example-com"]["depends_on"],
        json!(["aws_iam_role.nodes-role-minimal-example-com"])
    );
    assert_eq!(
        document["output"]["vpc_id"]["value"],
        json!("${aws_vpc.minimal-example-com.id}")
    );
    assert_eq!(document["provider"]["aws"]["region"], json!("us-test-1"));
    assert_eq!(document["terraform"]["required_version"], json!(">= 0.15.0"));
    assert_eq!(document["locals"]["cluster_name"], json!(CLUSTER));
}

#[tokio::test]
async fn payloads_are_extracted_to_data_files() {
    let artifact = render(cluster_tasks()).await;
    let document: Value =
        serde_json::from_str(artifact.get_str(DOCUMENT_FILE).unwrap()).unwrap();

    assert_eq!(
        document["resource"]["aws_launch_template"]["nodes-minimal-example-com"]["user_data"],
        json!(
            "${filebase64(\"${path.module}/data/aws_launch_template_nodes.minimal.example.com_user_data\")}"
        )
    );
    assert_eq!(
        document["resource"]["aws_iam_role"]["nodes-role-minimal-example-com"]["assume_role_policy"],
        json!(
            "${file(\"${path.module}/data/aws_iam_role_nodes-role.minimal.example.com_assume_role_policy\")}"
        )
    );
    assert_eq!(
        artifact.get_str("data/aws_launch_template_nodes.minimal.example.com_user_data"),
        Some("#!/bin/bash\necho nodeup\n")
    );
    let paths: Vec<&str> = artifact.paths().collect();
    assert_eq!(
        paths,
        vec![
            "data/aws_iam_role_nodes-role.minimal.example.com_assume_role_policy",
            "data/aws_launch_template_nodes.minimal.example.com_user_data",
            DOCUMENT_FILE,
        ]
    );
}

#[tokio::test]
async fn rendering_is_byte_for_byte_reproducible() {
    let first = render(cluster_tasks()).await;
    let mut reversed = cluster_tasks();
    reversed.reverse();
    let second = render(reversed).await;

    assert_eq!(first, second);
    assert!(first.get_str(DOCUMENT_FILE).unwrap().ends_with("}\n"));
}

#[tokio::test]
async fn logical_name_collision_is_a_render_error() {
    let a = ResourceTask::new("nodes.example", ResourceKind::new("aws_iam_role")).shared();
    let b = ResourceTask::new("nodes-example", ResourceKind::new("aws_iam_role")).shared();

    let report = Executor::new(Arc::new(TerraformTarget::default()))
        .run(vec![a, b])
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(report.artifact.is_none());
    let failed = report.tasks_in(TaskState::Failed);
    assert_eq!(failed.len(), 1);
    let error = report.tasks[failed[0]].error.clone().unwrap();
    assert!(error.contains("rendered twice"), "{error}");
}

#[tokio::test]
async fn each_run_renders_only_its_own_tasks() {
    let executor = Executor::new(Arc::new(TerraformTarget::default()));

    let failed = executor
        .run(vec![
            ResourceTask::new("nodes.example", ResourceKind::new("aws_iam_role"))
                .property("policy", Asset::raw("{}"))
                .shared(),
            ResourceTask::new("nodes-example", ResourceKind::new("aws_iam_role")).shared(),
        ])
        .await
        .unwrap();
    assert!(!failed.is_success());

    executor.run(cluster_tasks()).await.unwrap();
    let bucket = ResourceTask::new("assets", ResourceKind::new("aws_s3_bucket"))
        .property("bucket", "assets.example.com")
        .shared();
    let report = executor.run(vec![bucket]).await.unwrap();
    assert!(report.is_success());

    let artifact = report.artifact.unwrap();
    assert_eq!(artifact.paths().collect::<Vec<_>>(), vec![DOCUMENT_FILE]);
    let document: Value =
        serde_json::from_str(artifact.get_str(DOCUMENT_FILE).unwrap()).unwrap();
    assert_eq!(
        document["resource"],
        json!({ "aws_s3_bucket": { "assets": { "bucket": "assets.example.com" } } })
    );
}

struct ExistingVpc;

#[async_trait]
impl CloudProvider for ExistingVpc {
    fn name(&self) -> &str {
        "existing"
    }

    async fn find(&self, id: &ResourceId) -> Result<Option<ActualState>, ProviderError> {
        let known: HashMap<&str, ActualState> = HashMap::from([(
            "aws_vpc",
            ActualState::new()
                .with_property("cidr_block", json!("172.20.0.0/16"))
                .with_property("enable_dns_hostnames", json!(true))
                .with_output("id", json!("vpc-12345678")),
        )]);
        Ok(known.get(id.kind.as_str()).cloned())
    }

    async fn create(&self, _: &ResourceId, _: &Payload) -> Result<Outputs, ProviderError> {
        Err(ProviderError::fatal("renderers never create"))
    }

    async fn update(
        &self,
        _: &ResourceId,
        _: &Payload,
        _: &Changeset,
    ) -> Result<Outputs, ProviderError> {
        Err(ProviderError::fatal("renderers never update"))
    }
}

#[tokio::test]
async fn shared_resources_render_as_literal_values() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(Arc::new(TerraformTarget::new(options())))
        .with_provider(Arc::new(ExistingVpc))
        .with_config(
            RunConfig::default()
                .with_lifecycle_override("aws_vpc", Lifecycle::MustExist)
                .with_out_dir(dir.path()),
        );

    let report = executor.run(cluster_tasks()).await.unwrap();
    assert!(report.is_success());

    let written = std::fs::read_to_string(dir.path().join(DOCUMENT_FILE)).unwrap();
    let document: Value = serde_json::from_str(&written).unwrap();
    assert!(document["resource"].get("aws_vpc").is_none());
    assert_eq!(
        document["resource"]["aws_subnet"]["us-test-1a-minimal-example-com"]["vpc_id"],
        json!("vpc-12345678")
    );
    assert_eq!(document["output"]["vpc_id"]["value"], json!("vpc-12345678"));
    assert!(
        dir.path()
            .join("data/aws_launch_template_nodes.minimal.example.com_user_data")
            .exists()
    );
}
