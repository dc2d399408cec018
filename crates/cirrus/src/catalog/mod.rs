//! Registry of resource descriptors.

mod aws;

use indexmap::IndexMap;

use crate::descriptor::ResourceDescriptor;
use crate::error::DescriptorError;

/// Resource types known to the engine, keyed by resource key.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    descriptors: IndexMap<String, ResourceDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resource types shipped with cirrus.
    pub fn builtin() -> Result<Self, DescriptorError> {
        let mut catalog = Self::new();
        for descriptor in aws::descriptors()? {
            catalog.register(descriptor);
        }
        Ok(catalog)
    }

    /// Add a descriptor, replacing any previous one with the same key.
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> Option<ResourceDescriptor> {
        self.descriptors.insert(descriptor.key.clone(), descriptor)
    }

    pub fn get(&self, key: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.descriptors.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_builds() {
        let catalog = Catalog::builtin().unwrap();
        let keys: Vec<&str> = catalog.keys().collect();
        assert_eq!(
            keys,
            vec![
                "aws_dynamodb_tables",
                "aws_ebs_volumes",
                "aws_ec2_instances",
                "aws_lambda_functions",
                "aws_rds_instances",
                "aws_s3_buckets",
            ]
        );
    }

    #[test]
    fn test_s3_buckets_take_region_from_location() {
        let catalog = Catalog::builtin().unwrap();
        let buckets = catalog.get("aws_s3_buckets").unwrap();

        assert!(buckets.excluded_default_columns.contains("region"));
        let region = buckets.columns.iter().find(|c| c.name == "region").unwrap();
        assert_eq!(region.field_path.as_str(), "location.LocationConstraint");
        assert!(buckets.enrichments["tags"].is_expected("NoSuchTagSet"));
    }

    #[test]
    fn test_register_replaces() {
        let mut catalog = Catalog::builtin().unwrap();
        let len = catalog.len();
        let custom = ResourceDescriptor::builder("aws_s3_buckets", "s3")
            .extract(crate::descriptor::CallDef::new("list_buckets", "Buckets[]"))
            .build()
            .unwrap();

        assert!(catalog.register(custom).is_some());
        assert_eq!(catalog.len(), len);
        assert!(catalog.get("aws_s3_buckets").unwrap().enrichments.is_empty());
    }
}
