//! Resource descriptors: everything the engine needs to know about one
//! resource type, as data.
//!
//! Descriptors are assembled in two phases. A [`DescriptorBuilder`] holds the
//! raw declarations (string paths, optional services) and can be filled in
//! from code or deserialized from configuration; [`DescriptorBuilder::build`]
//! then compiles every path and validates the column set.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;

use crate::convert::ValueConverter;
use crate::error::{
    ColumnDeclaredTwiceSnafu, ColumnPathSnafu, DescriptorError, EmptyEnumSnafu, MissingFieldSnafu,
    ReservedEnrichmentNameSnafu, ResultPathSnafu,
};
use crate::path::FieldPath;

/// Root of the enriched item under which the extracted resource lives.
pub const RESOURCE_ROOT: &str = "resource";
/// Root of the enriched item holding the account and region.
pub const METADATA_ROOT: &str = "metadata";

/// Column storage types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    #[default]
    Text,
    /// Timestamp with time zone.
    Timestamp,
    Boolean,
    Integer,
    #[serde(rename = "bigint")]
    BigInt,
    Float,
    Inet,
    TextArray,
    /// Structured document, nested shape preserved.
    Json,
    /// Closed enumeration of string values.
    Enum(Vec<String>),
}

/// One API operation: the extraction call or an enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSpec {
    pub service: String,
    pub operation: String,
    /// Call parameters, possibly containing `{field}` placeholders.
    pub params: Value,
    /// Selects the items out of each response page.
    pub result_path: FieldPath,
    /// Explicit regions; when absent they are resolved per account.
    pub regions: Option<Vec<String>>,
    /// Remote error codes that turn into a placeholder item instead of failing.
    pub expected_errors: Vec<String>,
}

impl CallSpec {
    pub fn is_expected(&self, code: &str) -> bool {
        self.expected_errors.iter().any(|expected| expected == code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub description: String,
    pub field_path: FieldPath,
    pub converter: Option<ValueConverter>,
    pub storage_type: StorageType,
    pub indexed: bool,
}

impl ColumnSpec {
    /// Evaluate the column against an enriched item.
    ///
    /// Converters only ever see non-null values.
    pub fn extract(&self, item: &Value) -> Value {
        match (self.field_path.search(item), self.converter) {
            (Value::Null, _) => Value::Null,
            (value, Some(converter)) => converter.convert(value),
            (value, None) => value,
        }
    }
}

/// A fully built, immutable resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    /// Unique key, also the table name.
    pub key: String,
    pub service: String,
    pub extract: CallSpec,
    pub enrichments: IndexMap<String, CallSpec>,
    pub columns: Vec<ColumnSpec>,
    pub excluded_default_columns: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn builder(key: impl Into<String>, service: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            key: key.into(),
            service: service.into(),
            ..Default::default()
        }
    }
}

/// Declaration of a call before its result path is compiled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallDef {
    /// Defaults to the descriptor's service.
    #[serde(default)]
    pub service: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub params: Value,
    pub result_path: String,
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    #[serde(default)]
    pub expected_errors: Vec<String>,
}

impl CallDef {
    pub fn new(operation: impl Into<String>, result_path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            result_path: result_path.into(),
            ..Default::default()
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    pub fn expected_error(mut self, code: impl Into<String>) -> Self {
        self.expected_errors.push(code.into());
        self
    }

    fn compile(self, descriptor: &str, name: &str, default_service: &str) -> Result<CallSpec, DescriptorError> {
        let result_path = FieldPath::compile(&self.result_path).context(ResultPathSnafu {
            descriptor,
            call: name,
        })?;
        Ok(CallSpec {
            service: self.service.unwrap_or_else(|| default_service.to_string()),
            operation: self.operation,
            params: match self.params {
                Value::Null => Value::Object(Default::default()),
                params => params,
            },
            result_path,
            regions: self.regions,
            expected_errors: self.expected_errors,
        })
    }
}

/// Declaration of a column before its path is compiled and rooted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub path: String,
    #[serde(default)]
    pub converter: Option<ValueConverter>,
    #[serde(default, rename = "type")]
    pub storage_type: StorageType,
    #[serde(default)]
    pub indexed: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn converter(mut self, converter: ValueConverter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn storage(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// First phase of a [`ResourceDescriptor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptorBuilder {
    /// Taken from the enclosing map key when deserialized.
    #[serde(skip)]
    pub key: String,
    pub service: String,
    #[serde(default)]
    pub extract: Option<CallDef>,
    #[serde(default)]
    pub enrichments: IndexMap<String, CallDef>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub excluded_default_columns: BTreeSet<String>,
}

impl DescriptorBuilder {
    pub fn extract(mut self, call: CallDef) -> Self {
        self.extract = Some(call);
        self
    }

    pub fn enrich(mut self, name: impl Into<String>, call: CallDef) -> Self {
        self.enrichments.insert(name.into(), call);
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn exclude_default(mut self, column: impl Into<String>) -> Self {
        self.excluded_default_columns.insert(column.into());
        self
    }

    /// Compile and validate the declarations.
    ///
    /// Column paths that do not start at `resource`, `metadata` or one of the
    /// enrichment names are taken relative to `resource`.
    pub fn build(self) -> Result<ResourceDescriptor, DescriptorError> {
        let key = self.key;
        let extract = self
            .extract
            .context(MissingFieldSnafu {
                descriptor: &key,
                field: "extract call",
            })?
            .compile(&key, "extract", &self.service)?;

        let mut enrichments = IndexMap::with_capacity(self.enrichments.len());
        for (name, call) in self.enrichments {
            ensure!(
                name != RESOURCE_ROOT && name != METADATA_ROOT,
                ReservedEnrichmentNameSnafu {
                    descriptor: &key,
                    name,
                }
            );
            let call = call.compile(&key, &name, &self.service)?;
            enrichments.insert(name, call);
        }

        let mut seen = BTreeSet::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            ensure!(
                seen.insert(column.name.clone()),
                ColumnDeclaredTwiceSnafu {
                    descriptor: &key,
                    column: column.name,
                }
            );
            if let StorageType::Enum(values) = &column.storage_type {
                ensure!(
                    !values.is_empty(),
                    EmptyEnumSnafu {
                        descriptor: &key,
                        column: column.name,
                    }
                );
            }

            let field_path = root_path(&column.path, &enrichments).context(ColumnPathSnafu {
                descriptor: &key,
                column: &column.name,
            })?;
            columns.push(ColumnSpec {
                name: column.name,
                description: column.description,
                field_path,
                converter: column.converter,
                storage_type: column.storage_type,
                indexed: column.indexed,
            });
        }

        Ok(ResourceDescriptor {
            key,
            service: self.service,
            extract,
            enrichments,
            columns,
            excluded_default_columns: self.excluded_default_columns,
        })
    }
}

fn root_path(
    path: &str,
    enrichments: &IndexMap<String, CallSpec>,
) -> Result<FieldPath, crate::error::PathError> {
    let compiled = FieldPath::compile(path)?;
    match compiled.leading_field() {
        Some(RESOURCE_ROOT | METADATA_ROOT) => Ok(compiled),
        Some(field) if enrichments.contains_key(field) => Ok(compiled),
        Some(_) => FieldPath::compile(&format!("{RESOURCE_ROOT}.{path}")),
        None => Ok(compiled),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bucket_builder() -> DescriptorBuilder {
        ResourceDescriptor::builder("aws_s3_buckets", "s3")
            .extract(CallDef::new("list_buckets", "Buckets[]"))
            .enrich(
                "tags",
                CallDef::new("get_bucket_tagging", "[{\"TagSet\": @.TagSet}]")
                    .params(json!({"Bucket": "{Name}"}))
                    .expected_error("NoSuchTagSet"),
            )
    }

    #[test]
    fn test_paths_are_rooted() {
        let descriptor = bucket_builder()
            .column(ColumnDef::new("name", "Name"))
            .column(ColumnDef::new("tags", "tags.TagSet"))
            .column(ColumnDef::new("account", "metadata.account_id"))
            .column(ColumnDef::new("explicit", "resource.Name"))
            .column(ColumnDef::new("first_tag", "Tags[?Key=='Name'] | [0].Value"))
            .build()
            .unwrap();

        let paths: Vec<&str> = descriptor
            .columns
            .iter()
            .map(|c| c.field_path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec![
                "resource.Name",
                "tags.TagSet",
                "metadata.account_id",
                "resource.Name",
                "resource.Tags[?Key=='Name'] | [0].Value",
            ]
        );
    }

    #[test]
    fn test_enrichment_service_defaults_to_descriptor() {
        let descriptor = bucket_builder().build().unwrap();
        let tags = &descriptor.enrichments["tags"];
        assert_eq!(tags.service, "s3");
        assert!(tags.is_expected("NoSuchTagSet"));
        assert!(!tags.is_expected("AccessDenied"));
        assert_eq!(descriptor.extract.params, json!({}));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = bucket_builder()
            .column(ColumnDef::new("name", "Name"))
            .column(ColumnDef::new("name", "Id"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::ColumnDeclaredTwice { .. }));
    }

    #[test]
    fn test_invalid_paths_name_the_column() {
        let err = bucket_builder()
            .column(ColumnDef::new("broken", "Name["))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'broken'"), "{err}");
    }

    #[test]
    fn test_reserved_enrichment_name() {
        let err = bucket_builder()
            .enrich("metadata", CallDef::new("get_bucket_acl", "[@]"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::ReservedEnrichmentName { .. }));
    }

    #[test]
    fn test_missing_extract() {
        let err = ResourceDescriptor::builder("x", "ec2").build().unwrap_err();
        assert!(matches!(err, DescriptorError::MissingField { .. }));
    }

    #[test]
    fn test_column_extract_skips_converter_on_null() {
        let descriptor = bucket_builder()
            .column(ColumnDef::new("tags", "tags.TagSet").converter(ValueConverter::Tags))
            .build()
            .unwrap();
        let column = &descriptor.columns[0];

        assert_eq!(column.extract(&json!({"tags": {}})), Value::Null);
        assert_eq!(
            column.extract(&json!({"tags": {"TagSet": [{"Key": "a", "Value": "b"}]}})),
            json!({"a": "b"})
        );
    }

    #[test]
    fn test_builder_from_yaml() {
        let yaml = r#"
service: ec2
extract:
  operation: describe_volumes
  result_path: "Volumes[]"
  regions: [eu-west-1]
columns:
  - name: size
    path: Size
    type: integer
  - name: state
    path: State
    type:
      enum: [available, in-use]
"#;
        let mut builder: DescriptorBuilder = serde_yaml::from_str(yaml).unwrap();
        builder.key = "volumes".to_string();
        let descriptor = builder.build().unwrap();

        assert_eq!(descriptor.extract.regions, Some(vec!["eu-west-1".to_string()]));
        assert_eq!(descriptor.columns[0].storage_type, StorageType::Integer);
        assert_eq!(
            descriptor.columns[1].storage_type,
            StorageType::Enum(vec!["available".into(), "in-use".into()])
        );
    }
}
