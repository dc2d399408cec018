//! Error types for the cirrus engine.

use snafu::prelude::*;

// Re-export common errors
pub use cirrus_common::error::{ConfigError, MetricsError};

/// Errors raised while compiling a field path expression.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PathError {
    /// The expression is not valid.
    #[snafu(display("Invalid field path '{expression}' at offset {offset}: {message}"))]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    /// The expression calls a function that does not exist.
    #[snafu(display("Unknown function '{name}' in field path '{expression}'"))]
    UnknownFunction { expression: String, name: String },

    /// A function was called with the wrong number of arguments.
    #[snafu(display("Function '{name}' called with {given} arguments in field path '{expression}'"))]
    Arity {
        expression: String,
        name: String,
        given: usize,
    },
}

/// Errors raised while substituting placeholders into call parameters.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TemplateError {
    /// A placeholder names a field the item does not have.
    #[snafu(display("Placeholder '{{{placeholder}}}' has no value in the item"))]
    MissingValue { placeholder: String },

    /// A placeholder is not a valid field path.
    #[snafu(display("Invalid placeholder '{{{placeholder}}}': {source}"))]
    InvalidPlaceholder {
        placeholder: String,
        source: PathError,
    },

    /// A brace is opened or closed without a partner.
    #[snafu(display("Unbalanced brace in template '{template}'"))]
    UnbalancedBrace { template: String },
}

/// Errors raised while building a resource descriptor.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DescriptorError {
    /// A column's field path does not compile.
    #[snafu(display("Column '{column}' of '{descriptor}' has an invalid field path: {source}"))]
    ColumnPath {
        descriptor: String,
        column: String,
        source: PathError,
    },

    /// A call's result path does not compile.
    #[snafu(display("Call '{call}' of '{descriptor}' has an invalid result path: {source}"))]
    ResultPath {
        descriptor: String,
        call: String,
        source: PathError,
    },

    /// Two columns share a name.
    #[snafu(display("Column '{column}' is declared twice in '{descriptor}'"))]
    ColumnDeclaredTwice { descriptor: String, column: String },

    /// An enrichment uses a name reserved for the enriched item's own fields.
    #[snafu(display("Enrichment name '{name}' of '{descriptor}' is reserved"))]
    ReservedEnrichmentName { descriptor: String, name: String },

    /// An enumeration column lists no values.
    #[snafu(display("Enumeration column '{column}' of '{descriptor}' has no values"))]
    EmptyEnum { descriptor: String, column: String },

    /// A required builder field was never set.
    #[snafu(display("Descriptor '{descriptor}' is missing its {field}"))]
    MissingField {
        descriptor: String,
        field: &'static str,
    },
}

/// Failure reported by the cloud provider or its transport.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CloudError {
    /// The remote API rejected the call with an error code.
    #[snafu(display("{code}: {message}"))]
    Remote { code: String, message: String },

    /// The call never produced a remote response.
    #[snafu(display("transport failure: {message}"))]
    Transport { message: String },
}

impl CloudError {
    /// Remote error code, if the failure came from the API.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            Self::Transport { .. } => None,
        }
    }

    /// Throttled by the remote API.
    pub fn is_throttling(&self) -> bool {
        self.code().is_some_and(|code| THROTTLING_CODES.contains(&code))
    }

    /// Worth another attempt: throttled, or the request never got an answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. }) || self.is_throttling()
    }
}

/// Remote codes that mean "slow down".
pub const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottled",
    "RequestThrottledException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "BandwidthLimitExceeded",
    "SlowDown",
];

/// Errors acquiring an account session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AuthenticationError {
    /// Base credentials for the profile could not be resolved.
    #[snafu(display("Failed to resolve credentials for profile '{profile}': {source}"))]
    BaseCredentials { profile: String, source: CloudError },

    /// The role could not be assumed.
    #[snafu(display("Failed to assume role '{role}' from profile '{profile}': {source}"))]
    AssumeRole {
        profile: String,
        role: String,
        source: CloudError,
    },

    /// The caller identity lookup failed.
    #[snafu(display("Failed to resolve account id for profile '{profile}': {source}"))]
    CallerIdentity { profile: String, source: CloudError },
}

/// Errors determining the regions to query.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegionResolutionError {
    /// The service's region list could not be fetched.
    #[snafu(display("Failed to list regions for service '{service}': {source}"))]
    ServiceRegions { service: String, source: CloudError },

    /// The account's enabled regions could not be fetched.
    #[snafu(display("Failed to describe enabled regions: {source}"))]
    EnabledRegions { source: CloudError },
}

/// A failed API call, with enough context to find it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApiCallError {
    /// The client for a service could not be created.
    #[snafu(display("Failed to open {service} client in {region}: {source}"))]
    Client {
        service: String,
        region: String,
        source: CloudError,
    },

    /// The call failed with an error that is not allow-listed.
    #[snafu(display(
        "{service}.{operation} failed for account {account_id} in {region}: {source}"
    ))]
    Call {
        service: String,
        operation: String,
        account_id: String,
        region: String,
        source: CloudError,
    },
}

impl ApiCallError {
    /// Remote error code carried by the failure, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Client { source, .. } | Self::Call { source, .. } => source.code(),
        }
    }
}

/// Errors enriching a single item.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EnrichmentError {
    /// The item carries no metadata to address the call with.
    #[snafu(display("Cannot enrich '{name}': item has no metadata"))]
    MissingMetadata { name: String },

    /// The call parameters could not be built from the item.
    #[snafu(display("Failed to build parameters for enrichment '{name}': {source}"))]
    Parameters { name: String, source: TemplateError },

    /// The call itself failed.
    #[snafu(display("Enrichment '{name}' failed: {source}"))]
    Failed { name: String, source: ApiCallError },
}

/// Errors surfaced by a database backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    /// Connecting to the database failed.
    #[snafu(display("Failed to connect to database: {source}"))]
    Connect { source: sqlx::Error },

    /// A statement failed.
    #[snafu(display("Statement failed: {source}\n{statement}"))]
    Statement {
        statement: String,
        source: sqlx::Error,
    },

    /// Beginning, committing or rolling back a transaction failed.
    #[snafu(display("Transaction {action} failed: {source}"))]
    Transaction {
        action: &'static str,
        source: sqlx::Error,
    },

    /// The statement referenced a table that does not exist.
    #[snafu(display("Table '{table}' does not exist"))]
    NoSuchTable { table: String },

    /// A table was created twice.
    #[snafu(display("Table '{table}' already exists"))]
    TableExists { table: String },

    /// A row does not fit the table's columns.
    #[snafu(display("Row rejected by '{table}': {message}"))]
    RowRejected { table: String, message: String },
}

/// Errors (re)creating a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// Two columns of the final schema share a name.
    #[snafu(display("Column '{column}' appears twice in table '{table}'"))]
    DuplicateColumn { table: String, column: String },

    /// Dropping the previous table failed.
    #[snafu(display("Failed to drop table '{table}': {source}"))]
    DropTable { table: String, source: DatabaseError },

    /// Creating the table failed.
    #[snafu(display("Failed to create table '{table}': {source}"))]
    CreateTable { table: String, source: DatabaseError },
}

/// Errors writing rows.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// A batch insert failed.
    #[snafu(display("Failed to insert {rows} rows into '{table}': {source}"))]
    Insert {
        table: String,
        rows: usize,
        source: DatabaseError,
    },
}

/// Errors that end a resource pipeline.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("{resource}: {source}"))]
    Authentication {
        resource: String,
        source: AuthenticationError,
    },

    #[snafu(display("{resource}: {source}"))]
    RegionResolution {
        resource: String,
        source: RegionResolutionError,
    },

    #[snafu(display("{resource}: {source}"))]
    Extract {
        resource: String,
        source: ApiCallError,
    },

    #[snafu(display("{resource}: {source}"))]
    Enrich {
        resource: String,
        source: EnrichmentError,
    },

    #[snafu(display("{resource}: {source}"))]
    Schema {
        resource: String,
        source: SchemaError,
    },

    #[snafu(display("{resource}: {source}"))]
    Load {
        resource: String,
        source: LoadError,
    },

    /// Opening or finishing the pipeline's transaction failed.
    #[snafu(display("{resource}: {source}"))]
    Database {
        resource: String,
        source: DatabaseError,
    },

    /// The resource key has no descriptor in the catalog.
    #[snafu(display("{resource}: no descriptor registered"))]
    UnknownResource { resource: String },
}

impl PipelineError {
    /// Key of the resource type whose pipeline failed.
    pub fn resource(&self) -> &str {
        match self {
            Self::Authentication { resource, .. }
            | Self::RegionResolution { resource, .. }
            | Self::Extract { resource, .. }
            | Self::Enrich { resource, .. }
            | Self::Schema { resource, .. }
            | Self::Load { resource, .. }
            | Self::Database { resource, .. }
            | Self::UnknownResource { resource } => resource,
        }
    }
}

/// Errors returned by a whole run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// A pipeline failed and the run was aborted.
    #[snafu(display("Run aborted after {aborted} cancelled pipelines: {source}"))]
    Aborted {
        aborted: usize,
        source: PipelineError,
    },

    /// A pipeline task panicked.
    #[snafu(display("Pipeline task panicked: {message}"))]
    Panicked { message: String },
}

/// Errors starting or running the application.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AppError {
    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("Failed to start metrics endpoint: {source}"))]
    Metrics { source: MetricsError },

    /// Connecting to the database failed before any pipeline ran.
    #[snafu(display("{source}"))]
    Setup { source: DatabaseError },

    #[snafu(display("{source}"))]
    Run { source: RunError },
}
