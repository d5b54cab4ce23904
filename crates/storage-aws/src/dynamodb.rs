//! DynamoDB metadata store.
//!
//! One item per group, keyed by `StudyInstanceUID`. Document fields are stored
//! as top-level attributes; recorded member locations live in the
//! `FileLocations` string set and are kept out of the document on reads.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use dicom_transfer_grouping::{GroupDocument, GroupId};
use dicom_transfer_storage::{MetadataStore, StorageError, StorageSettings};
use serde_json::{Number, Value};

use crate::config::load_sdk_config;
use crate::error::table_error;

/// Hash key attribute of the table.
pub const KEY_ATTRIBUTE: &str = "StudyInstanceUID";

/// String set attribute holding member object keys.
pub const LOCATIONS_ATTRIBUTE: &str = "FileLocations";

/// Read/write capacity units of tables created by `ensure_table`.
const PROVISIONED_CAPACITY: i64 = 5;

/// How long `ensure_table` waits for a table to become active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableWait {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for TableWait {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// `MetadataStore` implementation over DynamoDB.
#[derive(Debug, Clone)]
pub struct DynamoMetadataStore {
    client: DynamoClient,
    table_wait: TableWait,
}

impl DynamoMetadataStore {
    /// Create a store from connection settings.
    pub async fn new(settings: &StorageSettings) -> Self {
        let sdk_config: SdkConfig = load_sdk_config(settings).await;
        Self::from_config(&sdk_config)
    }

    pub fn from_config(sdk_config: &SdkConfig) -> Self {
        Self::from_client(DynamoClient::new(sdk_config))
    }

    /// Create a store from an existing client (for testing).
    pub fn from_client(client: DynamoClient) -> Self {
        Self {
            client,
            table_wait: TableWait::default(),
        }
    }

    pub fn with_table_wait(mut self, table_wait: TableWait) -> Self {
        self.table_wait = table_wait;
        self
    }

    /// Status of a table, or `None` if it does not exist.
    async fn table_status(&self, table: &str) -> Result<Option<TableStatus>, StorageError> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(output) => Ok(Some(
                output
                    .table()
                    .and_then(|t| t.table_status())
                    .cloned()
                    .unwrap_or(TableStatus::Creating),
            )),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception())
                {
                    Ok(None)
                } else {
                    Err(table_error(err, table))
                }
            }
        }
    }

    async fn create_table(&self, table: &str) -> Result<(), StorageError> {
        let build_error = |e: aws_sdk_dynamodb::error::BuildError| StorageError::InvalidConfig {
            message: format!("invalid table definition: {e}"),
        };

        let result = self
            .client
            .create_table()
            .table_name(table)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(KEY_ATTRIBUTE)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_error)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(KEY_ATTRIBUTE)
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(build_error)?,
            )
            .provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(PROVISIONED_CAPACITY)
                    .write_capacity_units(PROVISIONED_CAPACITY)
                    .build()
                    .map_err(build_error)?,
            )
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(table = %table, "created metadata table");
                Ok(())
            }
            // Created concurrently by another process.
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_in_use_exception()) =>
            {
                Ok(())
            }
            Err(err) => Err(table_error(err, table)),
        }
    }

    async fn get_item(
        &self,
        table: &str,
        group_id: &GroupId,
        projection: Option<&str>,
    ) -> Result<Option<HashMap<String, AttributeValue>>, StorageError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(KEY_ATTRIBUTE, AttributeValue::S(group_id.to_string()))
            .consistent_read(true)
            .set_projection_expression(projection.map(str::to_string))
            .send()
            .await
            .map_err(|err| table_error(err, table))?;
        Ok(output.item)
    }
}

#[async_trait]
impl MetadataStore for DynamoMetadataStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StorageError> {
        match self.table_status(table).await? {
            Some(TableStatus::Active) => return Ok(()),
            Some(_) => {}
            None => {
                tracing::warn!(table = %table, "metadata table does not exist, creating it");
                self.create_table(table).await?;
            }
        }

        for _ in 0..self.table_wait.attempts {
            if self.table_status(table).await? == Some(TableStatus::Active) {
                tracing::info!(table = %table, "metadata table is active");
                return Ok(());
            }
            tokio::time::sleep(self.table_wait.interval).await;
        }

        Err(StorageError::InvalidConfig {
            message: format!("timed out waiting for table {table} to become active"),
        })
    }

    async fn put_group_document(
        &self,
        table: &str,
        group_id: &GroupId,
        document: &GroupDocument,
    ) -> Result<(), StorageError> {
        let update: DocumentUpdate = DocumentUpdate::new(document);
        let request = self
            .client
            .update_item()
            .table_name(table)
            .key(KEY_ATTRIBUTE, AttributeValue::S(group_id.to_string()))
            .set_update_expression(update.expression)
            .set_expression_attribute_names(update.names)
            .set_expression_attribute_values(update.values);

        request
            .send()
            .await
            .map_err(|err| table_error(err, table))?;
        tracing::info!(table = %table, group_id = %group_id, "stored group document");
        Ok(())
    }

    async fn get_group_document(
        &self,
        table: &str,
        group_id: &GroupId,
    ) -> Result<GroupDocument, StorageError> {
        let item = self
            .get_item(table, group_id, None)
            .await?
            .filter(|item| !item.is_empty())
            .ok_or_else(|| StorageError::DocumentNotFound {
                table: table.to_string(),
                group_id: group_id.to_string(),
            })?;

        Ok(item
            .into_iter()
            .filter(|(name, _)| name != LOCATIONS_ATTRIBUTE)
            .map(|(name, value)| (name, attribute_to_json(value)))
            .collect())
    }

    async fn append_location(
        &self,
        table: &str,
        group_id: &GroupId,
        location: &str,
    ) -> Result<(), StorageError> {
        self.client
            .update_item()
            .table_name(table)
            .key(KEY_ATTRIBUTE, AttributeValue::S(group_id.to_string()))
            .update_expression(format!("ADD {LOCATIONS_ATTRIBUTE} :location"))
            .expression_attribute_values(":location", AttributeValue::Ss(vec![location.to_string()]))
            .send()
            .await
            .map_err(|err| table_error(err, table))?;
        tracing::debug!(table = %table, group_id = %group_id, location = %location, "recorded location");
        Ok(())
    }

    async fn get_locations(&self, table: &str, group_id: &GroupId) -> Result<Vec<String>, StorageError> {
        let locations: Vec<String> = self
            .get_item(table, group_id, Some(LOCATIONS_ATTRIBUTE))
            .await?
            .and_then(|mut item| item.remove(LOCATIONS_ATTRIBUTE))
            .and_then(|value| match value {
                AttributeValue::Ss(set) => Some(set),
                _ => None,
            })
            .unwrap_or_default();

        if locations.is_empty() {
            tracing::warn!(table = %table, group_id = %group_id, "no file locations recorded");
        }
        Ok(locations)
    }
}

/// `UpdateItem` parts that set every document field except the key.
///
/// Names go through placeholders so reserved words and dotted tag names are
/// accepted.
struct DocumentUpdate {
    expression: Option<String>,
    names: Option<HashMap<String, String>>,
    values: Option<HashMap<String, AttributeValue>>,
}

impl DocumentUpdate {
    fn new(document: &GroupDocument) -> Self {
        let mut assignments: Vec<String> = Vec::with_capacity(document.len());
        let mut names: HashMap<String, String> = HashMap::with_capacity(document.len());
        let mut values: HashMap<String, AttributeValue> = HashMap::with_capacity(document.len());

        for (index, (name, value)) in document
            .iter()
            .filter(|(name, _)| name.as_str() != KEY_ATTRIBUTE && name.as_str() != LOCATIONS_ATTRIBUTE)
            .enumerate()
        {
            assignments.push(format!("#f{index} = :v{index}"));
            names.insert(format!("#f{index}"), name.clone());
            values.insert(format!(":v{index}"), json_to_attribute(value));
        }

        if assignments.is_empty() {
            return Self {
                expression: None,
                names: None,
                values: None,
            };
        }
        Self {
            expression: Some(format!("SET {}", assignments.join(", "))),
            names: Some(names),
            values: Some(values),
        }
    }
}

/// Convert a document value into an attribute.
///
/// Arrays of strings become string sets (duplicates dropped); other arrays and
/// nested objects are stored as JSON text.
pub fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => {
            let strings: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            match strings {
                Some(strings) if !strings.is_empty() => {
                    let mut seen: BTreeSet<&str> = BTreeSet::new();
                    AttributeValue::Ss(
                        strings
                            .into_iter()
                            .filter(|s| seen.insert(*s))
                            .map(str::to_string)
                            .collect(),
                    )
                }
                _ => AttributeValue::S(value.to_string()),
            }
        }
        Value::Object(_) => AttributeValue::S(value.to_string()),
    }
}

/// Convert an attribute back into a document value.
pub fn attribute_to_json(value: AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => parse_number(&n),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Ss(set) => Value::Array(set.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| parse_number(n)).collect()),
        AttributeValue::L(items) => Value::Array(items.into_iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, attribute_to_json(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn parse_number(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}
