use std::path::Path;

use chrono::NaiveDateTime;
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};

use tabula_store::{
    FieldError, FieldSpec, Record, RecordStore, StoreConfig, StoreError, StoreResult, Value,
    ValueType, ID_COLUMN,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Note {
    pub id: i64,
    pub version: i64,
    pub created: Option<NaiveDateTime>,
    pub creator: String,
    pub modified: Option<NaiveDateTime>,
    pub modifier: String,
    pub title: String,
    pub body: Option<String>,
}

const NOTE_FIELDS: &[FieldSpec] = &[
    FieldSpec::writable(ID_COLUMN, ValueType::I64),
    FieldSpec::writable("version", ValueType::I64),
    FieldSpec::computed("created", ValueType::DateTime),
    FieldSpec::writable("creator", ValueType::Str),
    FieldSpec::computed("modified", ValueType::DateTime),
    FieldSpec::writable("modifier", ValueType::Str),
    FieldSpec::writable("title", ValueType::Str).required(),
    FieldSpec::writable("body", ValueType::Str),
];

impl Record for Note {
    const TABLE: &'static str = "notes";

    fn fields() -> &'static [FieldSpec] {
        NOTE_FIELDS
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn get(&self, column: &str) -> Value {
        match column {
            ID_COLUMN => self.id.into(),
            "version" => self.version.into(),
            "created" => self.created.into(),
            "creator" => self.creator.as_str().into(),
            "modified" => self.modified.into(),
            "modifier" => self.modifier.as_str().into(),
            "title" => self.title.as_str().into(),
            "body" => self.body.clone().into(),
            _ => Value::Null,
        }
    }

    fn set(&mut self, column: &str, value: Value) -> Result<(), FieldError> {
        match column {
            ID_COLUMN => self.id = value.as_i64().unwrap_or_default(),
            "version" => self.version = value.as_i64().unwrap_or_default(),
            "created" => self.created = value.as_date_time(),
            "creator" => self.creator = value.as_str().unwrap_or_default().to_string(),
            "modified" => self.modified = value.as_date_time(),
            "modifier" => self.modifier = value.as_str().unwrap_or_default().to_string(),
            "title" => self.title = value.as_str().unwrap_or_default().to_string(),
            "body" => self.body = value.as_str().map(str::to_string),
            _ => return Err(FieldError::unknown_column(column)),
        }
        Ok(())
    }
}

pub async fn connect_store(base: &Path) -> StoreResult<RecordStore> {
    let config = StoreConfig::default_sqlite(base.join("tabula.sqlite").to_string_lossy());
    RecordStore::builder(config)
        .table::<Note>()
        .connect(base)
        .await
}

pub async fn create_notes_table(store: &RecordStore) -> StoreResult<()> {
    store
        .connection()
        .execute_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            "CREATE TABLE IF NOT EXISTS notes (\
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\
                 version INTEGER NOT NULL DEFAULT 0,\
                 created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\
                 creator TEXT NOT NULL DEFAULT '',\
                 modified TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\
                 modifier TEXT NOT NULL DEFAULT '',\
                 title TEXT NOT NULL UNIQUE,\
                 body TEXT\
             )",
        ))
        .await
        .map_err(StoreError::from)?;
    Ok(())
}

pub fn note(title: &str) -> Note {
    Note {
        creator: "tester".to_string(),
        modifier: "tester".to_string(),
        title: title.to_string(),
        ..Note::default()
    }
}
