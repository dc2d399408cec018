//! Built-in AWS resource types.

use serde_json::json;

use crate::convert::ValueConverter;
use crate::descriptor::{CallDef, ColumnDef, ResourceDescriptor, StorageType};
use crate::error::DescriptorError;

pub(super) fn descriptors() -> Result<Vec<ResourceDescriptor>, DescriptorError> {
    Ok(vec![
        dynamodb_tables()?,
        ebs_volumes()?,
        ec2_instances()?,
        lambda_functions()?,
        rds_instances()?,
        s3_buckets()?,
    ])
}

fn enumeration(values: &[&str]) -> StorageType {
    StorageType::Enum(values.iter().map(|v| v.to_string()).collect())
}

fn tags(path: &str, description: &str) -> ColumnDef {
    ColumnDef::new("tags", path)
        .description(description)
        .converter(ValueConverter::Tags)
        .storage(StorageType::Json)
        .indexed()
}

fn name_tag(description: &str) -> ColumnDef {
    ColumnDef::new("name", "Tags[?Key=='Name'] | [0].Value").description(description)
}

fn dynamodb_tables() -> Result<ResourceDescriptor, DescriptorError> {
    ResourceDescriptor::builder("aws_dynamodb_tables", "dynamodb")
        .extract(CallDef::new("list_tables", r#"TableNames[].{"Name": @}"#))
        .enrich(
            "table",
            CallDef::new("describe_table", "[Table]").params(json!({"TableName": "{Name}"})),
        )
        .enrich(
            "tags",
            CallDef::new("list_tags_of_resource", r#"[{"Tags": @.Tags}]"#).params(json!({
                "ResourceArn": "arn:aws:dynamodb:{metadata.region}:{metadata.account_id}:table/{Name}"
            })),
        )
        .column(ColumnDef::new("arn", "table.TableArn").description("The ARN of the table."))
        .column(
            ColumnDef::new("billing_mode_summary", "table.BillingModeSummary")
                .description("Details of the billing mode of the table.")
                .storage(StorageType::Json),
        )
        .column(
            ColumnDef::new("creation_date_time", "table.CreationDateTime")
                .description("The date and time when the table was created.")
                .converter(ValueConverter::Timestamp)
                .storage(StorageType::Timestamp),
        )
        .column(
            ColumnDef::new("item_count", "table.ItemCount")
                .description("The number of items in the table.")
                .storage(StorageType::BigInt),
        )
        .column(ColumnDef::new("name", "table.TableName").description("The name of the table."))
        .column(
            ColumnDef::new("provisioned_throughput", "table.ProvisionedThroughput")
                .description("The provisioned throughput settings for the table.")
                .storage(StorageType::Json),
        )
        .column(
            ColumnDef::new("size", "table.TableSizeBytes")
                .description("The total size of the table, in bytes.")
                .storage(StorageType::BigInt),
        )
        .column(
            ColumnDef::new("status", "table.TableStatus")
                .description("The current state of the table.")
                .storage(enumeration(&[
                    "ACTIVE",
                    "ARCHIVED",
                    "ARCHIVING",
                    "CREATING",
                    "DELETING",
                    "INACCESSIBLE_ENCRYPTION_CREDENTIALS",
                    "UPDATING",
                ])),
        )
        .column(tags("tags.Tags", "The tags currently associated with the table."))
        .build()
}

fn ebs_volumes() -> Result<ResourceDescriptor, DescriptorError> {
    ResourceDescriptor::builder("aws_ebs_volumes", "ec2")
        .extract(CallDef::new("describe_volumes", "Volumes[]"))
        .column(
            ColumnDef::new("attachments", "Attachments")
                .description("Information about the volume attachments.")
                .storage(StorageType::Json),
        )
        .column(
            ColumnDef::new("availability_zone", "AvailabilityZone")
                .description("The Availability Zone for the volume."),
        )
        .column(
            ColumnDef::new("create_time", "CreateTime")
                .description("The time stamp when volume creation was initiated.")
                .converter(ValueConverter::Timestamp)
                .storage(StorageType::Timestamp),
        )
        .column(
            ColumnDef::new("encrypted", "Encrypted")
                .description("Indicates whether the volume is encrypted.")
                .storage(StorageType::Boolean),
        )
        .column(
            ColumnDef::new("iops", "Iops")
                .description("The number of I/O operations per second provisioned for the volume.")
                .storage(StorageType::Integer),
        )
        .column(
            ColumnDef::new("multi_attach_enabled", "MultiAttachEnabled")
                .description("Indicates whether Amazon EBS Multi-Attach is enabled.")
                .storage(StorageType::Boolean),
        )
        .column(name_tag("The name of the volume."))
        .column(
            ColumnDef::new("size", "Size")
                .description("The size of the volume, in GiBs.")
                .storage(StorageType::Integer),
        )
        .column(
            ColumnDef::new("snapshot_id", "SnapshotId")
                .description("The snapshot from which the volume was created, if applicable."),
        )
        .column(
            ColumnDef::new("state", "State")
                .description("The volume state.")
                .storage(enumeration(&[
                    "available", "creating", "deleted", "deleting", "error", "in-use",
                ])),
        )
        .column(tags("Tags", "Any tags assigned to the volume."))
        .column(
            ColumnDef::new("throughput", "Throughput")
                .description("The throughput that the volume supports, in MiB/s.")
                .storage(StorageType::Integer),
        )
        .column(
            ColumnDef::new("volume_id", "VolumeId")
                .description("The ID of the volume.")
                .indexed(),
        )
        .column(
            ColumnDef::new("volume_type", "VolumeType")
                .description("The volume type.")
                .storage(enumeration(&[
                    "gp2", "gp3", "io1", "io2", "sc1", "st1", "standard",
                ]))
                .indexed(),
        )
        .build()
}

fn ec2_instances() -> Result<ResourceDescriptor, DescriptorError> {
    ResourceDescriptor::builder("aws_ec2_instances", "ec2")
        .extract(CallDef::new("describe_instances", "Reservations[*].Instances[]"))
        .column(
            ColumnDef::new("architecture", "Architecture")
                .description("The architecture of the image.")
                .storage(enumeration(&["arm64", "i386", "x86_64"])),
        )
        .column(
            ColumnDef::new("ebs_optimized", "EbsOptimized")
                .description("Indicates whether the instance is optimized for Amazon EBS I/O.")
                .storage(StorageType::Boolean),
        )
        .column(
            ColumnDef::new("image_id", "ImageId")
                .description("The ID of the AMI used to launch the instance.")
                .indexed(),
        )
        .column(
            ColumnDef::new("instance_id", "InstanceId")
                .description("The ID of the instance.")
                .indexed(),
        )
        .column(
            ColumnDef::new("instance_lifecycle", "InstanceLifecycle")
                .description("Indicates whether this is a Spot Instance or a Scheduled Instance.")
                .storage(enumeration(&["scheduled", "spot"])),
        )
        .column(
            ColumnDef::new("instance_type", "InstanceType")
                .description("The instance type.")
                .indexed(),
        )
        .column(
            ColumnDef::new("launch_time", "LaunchTime")
                .description("The time the instance was launched.")
                .converter(ValueConverter::Timestamp)
                .storage(StorageType::Timestamp),
        )
        .column(name_tag("The name of the instance."))
        .column(
            ColumnDef::new("placement_availability_zone", "Placement.AvailabilityZone")
                .description("The Availability Zone of the instance."),
        )
        .column(
            ColumnDef::new("private_ip_address", "PrivateIpAddress")
                .description("The private IPv4 address assigned to the instance.")
                .storage(StorageType::Inet),
        )
        .column(
            ColumnDef::new("product_codes", "ProductCodes")
                .description("The product codes attached to this instance, if applicable.")
                .storage(StorageType::Json),
        )
        .column(
            ColumnDef::new("public_ip_address", "PublicIpAddress")
                .description("The public IPv4 address assigned to the instance, if applicable.")
                .storage(StorageType::Inet),
        )
        .column(
            ColumnDef::new("state_name", "State.Name")
                .description("The current state of the instance.")
                .storage(enumeration(&[
                    "pending",
                    "running",
                    "shutting-down",
                    "stopped",
                    "stopping",
                    "terminated",
                ]))
                .indexed(),
        )
        .column(
            ColumnDef::new("subnet_id", "SubnetId")
                .description("The ID of the subnet in which the instance is running."),
        )
        .column(tags("Tags", "Any tags assigned to the instance."))
        .column(
            ColumnDef::new("vpc_id", "VpcId")
                .description("The ID of the VPC in which the instance is running."),
        )
        .build()
}

fn lambda_functions() -> Result<ResourceDescriptor, DescriptorError> {
    ResourceDescriptor::builder("aws_lambda_functions", "lambda")
        .extract(CallDef::new("list_functions", "Functions[]"))
        .enrich(
            "tags",
            CallDef::new("list_tags", r#"[{"Tags": @.Tags}]"#)
                .params(json!({"Resource": "{FunctionArn}"})),
        )
        .column(
            ColumnDef::new("architectures", "Architectures")
                .description("The instruction set architectures that the function supports.")
                .storage(StorageType::TextArray),
        )
        .column(ColumnDef::new("arn", "FunctionArn").description("The ARN of the function."))
        .column(
            ColumnDef::new("code_size", "CodeSize")
                .description("The size of the function's deployment package, in bytes.")
                .storage(StorageType::BigInt),
        )
        .column(ColumnDef::new("description", "Description").description("The function's description."))
        .column(
            ColumnDef::new("last_modified", "LastModified")
                .description("The date and time that the function was last updated.")
                .converter(ValueConverter::Timestamp)
                .storage(StorageType::Timestamp),
        )
        .column(
            ColumnDef::new("memory_size", "MemorySize")
                .description("The amount of memory available to the function at runtime.")
                .storage(StorageType::BigInt),
        )
        .column(ColumnDef::new("name", "FunctionName").description("The name of the function."))
        .column(
            ColumnDef::new("package_type", "PackageType")
                .description("The type of deployment package.")
                .storage(enumeration(&["Image", "Zip"])),
        )
        .column(
            ColumnDef::new("runtime", "Runtime")
                .description("The runtime environment for the Lambda function."),
        )
        .column(
            ColumnDef::new("tags", "tags.Tags")
                .description("Any tags assigned to the function.")
                .storage(StorageType::Json)
                .indexed(),
        )
        .column(
            ColumnDef::new("timeout", "Timeout")
                .description("The amount of time in seconds that Lambda allows a function to run.")
                .storage(StorageType::Integer),
        )
        .column(
            ColumnDef::new("vpc_config", "VpcConfig")
                .description("The function's networking configuration.")
                .storage(StorageType::Json),
        )
        .build()
}

fn rds_instances() -> Result<ResourceDescriptor, DescriptorError> {
    ResourceDescriptor::builder("aws_rds_instances", "rds")
        // DocDB and Neptune instances come back from the same call
        .extract(CallDef::new(
            "describe_db_instances",
            r#"DBInstances[?!contains(`["docdb", "neptune"]`, Engine)]"#,
        ))
        .column(
            ColumnDef::new("allocated_storage", "AllocatedStorage")
                .description("The allocated storage size, in gibibytes.")
                .storage(StorageType::Integer),
        )
        .column(
            ColumnDef::new("availability_zone", "AvailabilityZone")
                .description("The Availability Zone the instance is located in."),
        )
        .column(
            ColumnDef::new("db_instance_class", "DBInstanceClass")
                .description("The compute and memory capacity of the instance."),
        )
        .column(
            ColumnDef::new("db_instance_identifier", "DBInstanceIdentifier")
                .description("The user-supplied database identifier.")
                .indexed(),
        )
        .column(
            ColumnDef::new("db_instance_status", "DBInstanceStatus")
                .description("The current state of the database."),
        )
        .column(ColumnDef::new("engine", "Engine").description("The database engine."))
        .column(
            ColumnDef::new("engine_version", "EngineVersion")
                .description("The version of the database engine."),
        )
        .column(
            ColumnDef::new("instance_create_time", "InstanceCreateTime")
                .description("The date and time the instance was created.")
                .converter(ValueConverter::Timestamp)
                .storage(StorageType::Timestamp),
        )
        .column(
            ColumnDef::new("multi_az", "MultiAZ")
                .description("Whether the instance is a Multi-AZ deployment.")
                .storage(StorageType::Boolean),
        )
        .column(
            ColumnDef::new("storage_encrypted", "StorageEncrypted")
                .description("Whether the instance is encrypted.")
                .storage(StorageType::Boolean),
        )
        .column(tags("TagList", "A list of tags."))
        .build()
}

fn s3_buckets() -> Result<ResourceDescriptor, DescriptorError> {
    ResourceDescriptor::builder("aws_s3_buckets", "s3")
        .extract(CallDef::new("list_buckets", r#"Buckets[].{"Name": @.Name}"#))
        .enrich(
            "location",
            // An empty constraint means us-east-1
            CallDef::new(
                "get_bucket_location",
                r#"[{"LocationConstraint": @.LocationConstraint || `"us-east-1"`}]"#,
            )
            .params(json!({"Bucket": "{Name}"})),
        )
        .enrich(
            "tags",
            CallDef::new("get_bucket_tagging", r#"[{"TagSet": @.TagSet}]"#)
                .params(json!({"Bucket": "{Name}"}))
                .expected_error("NoSuchTagSet"),
        )
        .enrich(
            "versioning",
            CallDef::new("get_bucket_versioning", r#"[{"Status": @.Status}]"#)
                .params(json!({"Bucket": "{Name}"})),
        )
        .column(ColumnDef::new("name", "resource.Name").description("The name of the bucket."))
        .column(
            ColumnDef::new("region", "location.LocationConstraint")
                .description("The AWS region.")
                .indexed(),
        )
        .column(tags("tags.TagSet", "Any tags assigned to the bucket."))
        .column(
            ColumnDef::new("versioning", "versioning.Status")
                .description("The versioning state of the bucket."),
        )
        // The bucket's region comes from its location, not from the client
        .exclude_default("region")
        .build()
}
