//! Nested test-instance records built from several related tables.
//!
//! A test instance has one configuration row (`TEST_INSTANCE.CONFIG`), one
//! parameter row reached through its test type (`TEST_TYPE.TEST_PARAMETERS`)
//! and any number of data rows (`DATA_INSTANCE`). Every identifier is a bound
//! parameter.

use crate::config::{ClientOptions, ConnectionConfig};
use crate::db::{self, DatabaseClient, Value};
use crate::error::{Result, TestbenchError};
use crate::query::{QueryExecutor, Record, Table};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

/// Reserved key holding the data rows of a merged record.
pub const DATA_KEY: &str = "data";

const CONFIG_SQL: &str = "SELECT CONFIG FROM TEST_INSTANCE WHERE ID = $1";

const DATA_SQL: &str = "SELECT * FROM DATA_INSTANCE WHERE TEST_INSTANCE_ID = $1";

const PARAMETERS_SQL: &str = "SELECT TEST_PARAMETERS FROM TEST_TYPE \
     WHERE ID = (SELECT TEST_TYPE_ID FROM TEST_INSTANCE WHERE ID = $1)";

const TRIAL_SQL: &str = "SELECT DATA FROM DATA_INSTANCE WHERE TEST_INSTANCE_ID = $1 AND TRIAL = $2";

const DEVICES_SQL: &str = "SELECT * FROM DEVICE_INSTANCE";

/// Configuration fields overlaid by parameter fields, plus the data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestInstanceRecord {
    fields: Record,
    data: Vec<Record>,
}

impl TestInstanceRecord {
    /// Merges the three parts. Parameters win on key collision and any
    /// `data` key they carry is replaced by `data`.
    pub fn merge(configuration: Record, parameters: Record, data: Vec<Record>) -> Self {
        let mut fields = configuration;
        fields.overlay(parameters);
        if fields.remove(DATA_KEY).is_some() {
            debug!("Replaced a '{DATA_KEY}' field with the fetched data rows");
        }
        Self { fields, data }
    }

    /// Configuration and parameter fields, without the data rows.
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// Data rows in fetch order.
    pub fn data(&self) -> &[Record] {
        &self.data
    }

    /// Looks up a configuration or parameter field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The record as one JSON object, `data` included.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = match self.fields.to_json() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        object.insert(
            DATA_KEY.to_string(),
            serde_json::Value::Array(self.data.iter().map(Record::to_json).collect()),
        );
        serde_json::Value::Object(object)
    }
}

impl Serialize for TestInstanceRecord {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in self.fields.iter() {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(DATA_KEY, &self.data)?;
        map.end()
    }
}

/// Builds the merged record for one test instance on an open session.
pub async fn assemble_test_instance(
    db: &dyn DatabaseClient,
    options: &ClientOptions,
    test_instance_id: i64,
) -> Result<TestInstanceRecord> {
    let executor = QueryExecutor::new(db, options);
    let id = [Value::Int(test_instance_id)];

    let mut configs = executor.execute_to_records(CONFIG_SQL, &id).await?;
    if configs.len() > 1 {
        warn!(
            "Test instance {test_instance_id} has {} configuration rows; using the first",
            configs.len()
        );
    }
    let configuration = if configs.is_empty() {
        Record::new()
    } else {
        configs.swap_remove(0)
    };

    let data = executor.execute_to_records(DATA_SQL, &id).await?;

    let mut parameters = executor.execute_to_records(PARAMETERS_SQL, &id).await?;
    if parameters.len() != 1 {
        return Err(TestbenchError::unexpected_row_count(
            format!("test parameters of test instance {test_instance_id}"),
            1,
            parameters.len(),
        ));
    }
    let parameters = parameters.swap_remove(0);

    debug!(
        test_instance_id,
        data_rows = data.len(),
        "Assembled test instance record"
    );
    Ok(TestInstanceRecord::merge(configuration, parameters, data))
}

/// Fetches the `DATA` column of one trial as single-key records.
pub async fn fetch_trial_data(
    db: &dyn DatabaseClient,
    options: &ClientOptions,
    test_instance_id: i64,
    trial: i64,
) -> Result<Vec<Record>> {
    QueryExecutor::new(db, options)
        .execute_to_records(TRIAL_SQL, &[Value::Int(test_instance_id), Value::Int(trial)])
        .await
}

/// Runs the record reads, one fresh session per call.
pub struct RecordAssembler {
    connection: ConnectionConfig,
    options: ClientOptions,
}

impl RecordAssembler {
    pub fn new(connection: ConnectionConfig, options: ClientOptions) -> Self {
        Self {
            connection,
            options,
        }
    }

    /// Configuration, parameters and data rows of a test instance in one record.
    pub async fn test_instance_record(&self, test_instance_id: i64) -> Result<TestInstanceRecord> {
        let session = self.open().await?;
        let result = assemble_test_instance(session.as_ref(), &self.options, test_instance_id).await;
        close_session(session.as_ref()).await;
        result
    }

    /// The `DATA` values recorded for one trial of a test instance.
    pub async fn data_for_trial(&self, test_instance_id: i64, trial: i64) -> Result<Vec<Record>> {
        let session = self.open().await?;
        let result =
            fetch_trial_data(session.as_ref(), &self.options, test_instance_id, trial).await;
        close_session(session.as_ref()).await;
        result
    }

    /// Every row of `DEVICE_INSTANCE` as a table.
    pub async fn device_instances(&self) -> Result<Table> {
        let session = self.open().await?;
        let result = QueryExecutor::new(session.as_ref(), &self.options)
            .execute_to_table(DEVICES_SQL, &[])
            .await;
        close_session(session.as_ref()).await;
        result
    }

    async fn open(&self) -> Result<Box<dyn DatabaseClient>> {
        info!("Connecting to {}", self.connection.display_string());
        db::connect(&self.connection, &self.options).await
    }
}

async fn close_session(session: &dyn DatabaseClient) {
    if let Err(e) = session.close().await {
        warn!("Closing session failed: {e}");
    }
}
