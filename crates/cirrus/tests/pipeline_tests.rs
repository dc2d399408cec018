//! End-to-end runs against the in-memory cloud and database.
//!
//! Run with: cargo test --test pipeline_tests

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};

use cirrus::cloud::MemoryCloud;
use cirrus::config::Settings;
use cirrus::error::CloudError;
use cirrus::{
    AccountConfig, CallDef, Catalog, ColumnDef, MemoryDatabase, Orchestrator, ResourceDescriptor,
    RunError, StorageType,
};

fn sources(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}

fn orchestrator(cloud: &MemoryCloud, database: &MemoryDatabase, catalog: Catalog) -> Orchestrator {
    Orchestrator::new(Arc::new(cloud.clone()), Arc::new(database.clone()), catalog)
}

fn volumes_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register(
        ResourceDescriptor::builder("volumes", "ec2")
            .extract(CallDef::new("describe_volumes", "Volumes[]"))
            .column(ColumnDef::new("size", "Size").storage(StorageType::Integer))
            .column(ColumnDef::new("name", "Name"))
            .build()
            .unwrap(),
    );
    catalog
}

fn volumes_cloud(volumes: Value) -> MemoryCloud {
    MemoryCloud::builder()
        .account("prod", "111111111111")
        .service_regions("ec2", ["us-east-1"])
        .enabled_regions(["us-east-1"])
        .on("ec2", "describe_volumes", move |_, _| Ok(json!({"Volumes": volumes.clone()})))
        .build()
}

#[tokio::test]
async fn test_single_account_end_to_end() {
    let cloud = volumes_cloud(json!([
        {"Name": "root", "Size": 8},
        {"Name": "data", "Size": "100"},
    ]));
    let database = MemoryDatabase::new();

    let report = orchestrator(&cloud, &database, volumes_catalog())
        .run(&[AccountConfig::new("prod")], &sources(&["volumes"]))
        .await
        .unwrap();

    assert_eq!(report.completed, vec![("volumes".to_string(), 2)]);
    let table = database.table("volumes").unwrap();
    let columns: Vec<&str> = table.schema.column_names().collect();
    assert_eq!(columns, vec!["account_id", "name", "region", "size"]);
    assert_eq!(
        table.schema.column("size").unwrap().storage_type,
        StorageType::Integer
    );

    let mut sizes = table.column("size");
    sizes.sort_by_key(Value::as_i64);
    assert_eq!(sizes, vec![json!(8), json!(100)]);
    assert_eq!(table.column("account_id"), vec![json!("111111111111"); 2]);
    assert_eq!(table.column("region"), vec![json!("us-east-1"); 2]);
}

#[tokio::test]
async fn test_rerun_keeps_only_latest_rows() {
    let database = MemoryDatabase::new();
    let accounts = [AccountConfig::new("prod")];

    let first = volumes_cloud(json!([{"Name": "old-1", "Size": 1}, {"Name": "old-2", "Size": 2}]));
    orchestrator(&first, &database, volumes_catalog())
        .run(&accounts, &sources(&["volumes"]))
        .await
        .unwrap();

    let second = volumes_cloud(json!([{"Name": "new", "Size": 3}]));
    orchestrator(&second, &database, volumes_catalog())
        .run(&accounts, &sources(&["volumes"]))
        .await
        .unwrap();

    let table = database.table("volumes").unwrap();
    assert_eq!(table.column("name"), vec![json!("new")]);
}

#[tokio::test]
async fn test_accounts_by_regions_fan_out() {
    let cloud = MemoryCloud::builder()
        .account("prod", "111111111111")
        .account("hub", "999999999999")
        .role("arn:aws:iam::222222222222:role/inventory", "222222222222")
        .service_regions("ec2", ["ap-south-1", "eu-west-1", "us-east-1"])
        .enabled_regions(["eu-west-1", "us-east-1", "us-west-2"])
        .on_paginated("ec2", "describe_volumes", |ctx, _| {
            Ok(vec![
                json!({"Volumes": [{"Name": format!("{}-a", ctx.region), "Size": 1}]}),
                json!({"Volumes": [{"Name": format!("{}-b", ctx.region), "Size": 2}]}),
            ])
        })
        .build();
    let database = MemoryDatabase::new();
    let accounts = [
        AccountConfig::new("prod"),
        AccountConfig::new("hub").with_role("arn:aws:iam::222222222222:role/inventory"),
    ];

    orchestrator(&cloud, &database, volumes_catalog())
        .run(&accounts, &sources(&["volumes"]))
        .await
        .unwrap();

    let rows = database.rows("volumes");
    assert_eq!(rows.len(), 8);
    let pairs: BTreeSet<(String, String)> = rows
        .iter()
        .map(|row| {
            (
                row["account_id"].as_str().unwrap().to_string(),
                row["region"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let expected: BTreeSet<(String, String)> = ["111111111111", "222222222222"]
        .iter()
        .flat_map(|account| {
            ["eu-west-1", "us-east-1"]
                .iter()
                .map(move |region| (account.to_string(), region.to_string()))
        })
        .collect();
    assert_eq!(pairs, expected);

    let assumed = cloud.calls_to("sts", "assume_role");
    assert_eq!(assumed.len(), 1);
    assert_eq!(assumed[0].params["RoleSessionName"], "cirrus");
}

#[tokio::test]
async fn test_explicit_regions_skip_lookups() {
    let mut catalog = Catalog::new();
    catalog.register(
        ResourceDescriptor::builder("volumes", "ec2")
            .extract(CallDef::new("describe_volumes", "Volumes[]").regions(["eu-central-1"]))
            .column(ColumnDef::new("name", "Name"))
            .build()
            .unwrap(),
    );
    let cloud = volumes_cloud(json!([{"Name": "root"}]));
    let database = MemoryDatabase::new();

    orchestrator(&cloud, &database, catalog)
        .run(&[AccountConfig::new("prod")], &sources(&["volumes"]))
        .await
        .unwrap();

    assert_eq!(cloud.region_lookups(), 0);
    assert_eq!(
        database.table("volumes").unwrap().column("region"),
        vec![json!("eu-central-1")]
    );
}

fn buckets_cloud() -> MemoryCloud {
    MemoryCloud::builder()
        .account("prod", "111111111111")
        .on("s3", "list_buckets", |_, _| {
            Ok(json!({"Buckets": [{"Name": "logs"}, {"Name": "assets"}]}))
        })
        .on("s3", "get_bucket_location", |_, params| {
            Ok(match params["Bucket"].as_str() {
                Some("logs") => json!({"LocationConstraint": "eu-west-1"}),
                _ => json!({"LocationConstraint": null}),
            })
        })
        .on("s3", "get_bucket_tagging", |_, params| match params["Bucket"].as_str() {
            Some("logs") => Ok(json!({"TagSet": [{"Key": "team", "Value": "platform"}]})),
            _ => Err(CloudError::Remote {
                code: "NoSuchTagSet".to_string(),
                message: "The TagSet does not exist".to_string(),
            }),
        })
        .on("s3", "get_bucket_versioning", |_, params| {
            Ok(match params["Bucket"].as_str() {
                Some("logs") => json!({"Status": "Enabled"}),
                _ => json!({}),
            })
        })
        .build()
}

#[tokio::test]
async fn test_builtin_buckets_with_expected_errors_and_nulls() {
    let cloud = buckets_cloud();
    let database = MemoryDatabase::new();

    orchestrator(&cloud, &database, Catalog::builtin().unwrap())
        .run(&[AccountConfig::new("prod")], &sources(&["aws_s3_buckets"]))
        .await
        .unwrap();

    let table = database.table("aws_s3_buckets").unwrap();
    let columns: Vec<&str> = table.schema.column_names().collect();
    assert_eq!(columns, vec!["account_id", "name", "region", "tags", "versioning"]);

    let mut rows = table.rows.clone();
    rows.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    let assets = &rows[0];
    let logs = &rows[1];

    assert_eq!(logs["region"], "eu-west-1");
    assert_eq!(logs["tags"], json!({"team": "platform"}));
    assert_eq!(logs["versioning"], "Enabled");

    assert_eq!(assets["region"], "us-east-1");
    assert_eq!(assets["tags"], Value::Null);
    assert_eq!(assets["versioning"], Value::Null);

    let tagging = cloud.calls_to("s3", "get_bucket_tagging");
    assert_eq!(tagging.len(), 2);
    assert!(tagging.iter().all(|call| call.region.as_deref() == Some("us-east-1")));
}

#[tokio::test]
async fn test_unlisted_remote_error_fails_pipeline() {
    let mut catalog = Catalog::new();
    catalog.register(
        ResourceDescriptor::builder("tagged_buckets", "s3")
            .extract(CallDef::new("list_buckets", "Buckets[]"))
            .enrich(
                "tags",
                CallDef::new("get_bucket_tagging", "[@]").params(json!({"Bucket": "{Name}"})),
            )
            .column(ColumnDef::new("name", "Name"))
            .build()
            .unwrap(),
    );
    let database = MemoryDatabase::new();

    let err = orchestrator(&buckets_cloud(), &database, catalog)
        .run(&[AccountConfig::new("prod")], &sources(&["tagged_buckets"]))
        .await
        .unwrap_err();

    match err {
        RunError::Aborted { source, .. } => {
            assert_eq!(source.resource(), "tagged_buckets");
            assert!(source.to_string().contains("NoSuchTagSet"), "{source}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(database.table("tagged_buckets").is_none());
}

#[tokio::test]
async fn test_enrichment_parameters_are_templated() {
    let cloud = MemoryCloud::builder()
        .account("prod", "111111111111")
        .service_regions("dynamodb", ["eu-west-1"])
        .enabled_regions(["eu-west-1"])
        .on("dynamodb", "list_tables", |_, _| Ok(json!({"TableNames": ["orders"]})))
        .on("dynamodb", "describe_table", |_, params| {
            Ok(json!({"Table": {
                "TableName": params["TableName"],
                "ItemCount": 42,
                "TableStatus": "ACTIVE",
                "CreationDateTime": 1_700_000_000,
            }}))
        })
        .on("dynamodb", "list_tags_of_resource", |_, _| {
            Ok(json!({"Tags": [{"Key": "env", "Value": "prod"}]}))
        })
        .build();
    let database = MemoryDatabase::new();

    orchestrator(&cloud, &database, Catalog::builtin().unwrap())
        .run(&[AccountConfig::new("prod")], &sources(&["aws_dynamodb_tables"]))
        .await
        .unwrap();

    let tags = cloud.calls_to("dynamodb", "list_tags_of_resource");
    assert_eq!(
        tags[0].params,
        json!({"ResourceArn": "arn:aws:dynamodb:eu-west-1:111111111111:table/orders"})
    );

    let table = database.table("aws_dynamodb_tables").unwrap();
    assert_eq!(table.column("name"), vec![json!("orders")]);
    assert_eq!(table.column("item_count"), vec![json!(42)]);
    assert_eq!(table.column("status"), vec![json!("ACTIVE")]);
    assert_eq!(table.column("creation_date_time"), vec![json!("2023-11-14T22:13:20Z")]);
    assert_eq!(table.column("tags"), vec![json!({"env": "prod"})]);
    assert_eq!(table.column("size"), vec![Value::Null]);
}

#[tokio::test]
async fn test_committed_tables_survive_sibling_failure() {
    let mut catalog = volumes_catalog();
    catalog.register(
        ResourceDescriptor::builder("broken", "ec2")
            .extract(CallDef::new("describe_snapshots", "Snapshots[]").regions(["us-east-1"]))
            .column(ColumnDef::new("id", "SnapshotId"))
            .build()
            .unwrap(),
    );
    let cloud = volumes_cloud(json!([{"Name": "root", "Size": 8}]));
    let database = MemoryDatabase::new();

    let mut settings = Settings::default();
    settings.global.total_concurrency = 1;
    let err = orchestrator(&cloud, &database, catalog)
        .with_settings(settings)
        .run(&[AccountConfig::new("prod")], &sources(&["volumes", "broken"]))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Aborted { .. }));
    assert_eq!(database.rows("volumes").len(), 1);
    assert!(database.table("broken").is_none());
}

#[tokio::test]
async fn test_suppressed_extraction_skips_templated_enrichment() {
    let mut catalog = Catalog::new();
    catalog.register(
        ResourceDescriptor::builder("things", "ec2")
            .extract(
                CallDef::new("describe_things", "Things[]")
                    .regions(["us-east-1"])
                    .expected_error("OptInRequired"),
            )
            .enrich(
                "detail",
                CallDef::new("describe_thing", "@").params(json!({"Id": "{Name}"})),
            )
            .column(ColumnDef::new("name", "Name"))
            .column(ColumnDef::new("state", "detail.State"))
            .build()
            .unwrap(),
    );
    let cloud = MemoryCloud::builder()
        .account("prod", "111111111111")
        .on("ec2", "describe_things", |_, _| {
            Err(CloudError::Remote {
                code: "OptInRequired".to_string(),
                message: "The account is not subscribed".to_string(),
            })
        })
        .on("ec2", "describe_thing", |_, _| Ok(json!({"State": "on"})))
        .build();
    let database = MemoryDatabase::new();

    let report = orchestrator(&cloud, &database, catalog)
        .run(&[AccountConfig::new("prod")], &sources(&["things"]))
        .await
        .unwrap();

    assert_eq!(report.completed, vec![("things".to_string(), 1)]);
    assert!(cloud.calls_to("ec2", "describe_thing").is_empty());
    let table = database.table("things").unwrap();
    assert_eq!(table.column("account_id"), vec![json!("111111111111")]);
    assert_eq!(table.column("region"), vec![json!("us-east-1")]);
    assert_eq!(table.column("name"), vec![Value::Null]);
    assert_eq!(table.column("state"), vec![Value::Null]);
}

#[tokio::test]
async fn test_throttled_extraction_is_retried() {
    let throttled = Arc::new(AtomicBool::new(true));
    let cloud = MemoryCloud::builder()
        .account("prod", "111111111111")
        .service_regions("ec2", ["us-east-1"])
        .enabled_regions(["us-east-1"])
        .on("ec2", "describe_volumes", move |_, _| {
            if throttled.swap(false, Ordering::SeqCst) {
                return Err(CloudError::Remote {
                    code: "Throttling".to_string(),
                    message: "Rate exceeded".to_string(),
                });
            }
            Ok(json!({"Volumes": [{"Name": "root", "Size": 8}]}))
        })
        .build();
    let database = MemoryDatabase::new();

    let report = orchestrator(&cloud, &database, volumes_catalog())
        .run(&[AccountConfig::new("prod")], &sources(&["volumes"]))
        .await
        .unwrap();

    assert_eq!(report.completed, vec![("volumes".to_string(), 1)]);
    assert_eq!(cloud.calls_to("ec2", "describe_volumes").len(), 2);
}
