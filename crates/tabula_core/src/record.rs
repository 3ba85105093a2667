use crate::error::FieldError;
use crate::value::{Value, ValueType};

/// Canonical name of the identity column.
pub const ID_COLUMN: &str = "id";

/// How a persisted field participates in SQL generation. Computed
/// columns are read back from storage but never appear in INSERT or
/// UPDATE value lists (backend-maintained, e.g. timestamps).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldRole {
    Writable,
    Computed,
}

/// Registration-time descriptor for one persisted column. Transient
/// fields are simply not listed.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub column: &'static str,
    pub role: FieldRole,
    pub value_type: ValueType,
    pub required: bool,
}

impl FieldSpec {
    pub const fn writable(column: &'static str, value_type: ValueType) -> Self {
        Self {
            column,
            role: FieldRole::Writable,
            value_type,
            required: false,
        }
    }

    pub const fn computed(column: &'static str, value_type: ValueType) -> Self {
        Self {
            column,
            role: FieldRole::Computed,
            value_type,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One persisted entity type. Each implementation corresponds to one
/// table with a numeric identity column, a numeric version column used
/// as the optimistic-lock token, and optional audit columns.
pub trait Record: Clone + Default + Send + Sync + 'static {
    const TABLE: &'static str;

    /// Ordered column descriptors, identity and version included.
    fn fields() -> &'static [FieldSpec];

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);

    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);

    fn get(&self, column: &str) -> Value;
    fn set(&mut self, column: &str, value: Value) -> Result<(), FieldError>;
}

/// Columns eligible for INSERT/UPDATE value lists: writable and not
/// computed, with the identity column only when the operation asks for
/// it (reads and deletes do, inserts and updates do not).
pub fn writable_fields<T: Record>(with_id: bool) -> impl Iterator<Item = &'static FieldSpec> {
    T::fields()
        .iter()
        .filter(move |field| field.role == FieldRole::Writable && (with_id || field.column != ID_COLUMN))
}

/// Required-field check. `with_id` additionally demands a positive id
/// and a populated modified timestamp, which is what a record read
/// back from storage looks like.
pub fn record_is_valid<T: Record>(item: &T, with_id: bool) -> bool {
    if with_id && (item.id() <= 0 || item.get("modified").is_null()) {
        return false;
    }
    for field in T::fields() {
        if !field.required || field.role != FieldRole::Writable {
            continue;
        }
        match item.get(field.column) {
            Value::Null => return false,
            Value::Str(value) if value.is_empty() => return false,
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct Sample {
        id: i64,
        version: i64,
        created: Option<chrono::NaiveDateTime>,
        modified: Option<chrono::NaiveDateTime>,
        name: String,
        note: Option<String>,
    }

    const SAMPLE_FIELDS: &[FieldSpec] = &[
        FieldSpec::writable(ID_COLUMN, ValueType::I64).required(),
        FieldSpec::writable("version", ValueType::I64),
        FieldSpec::computed("created", ValueType::DateTime),
        FieldSpec::computed("modified", ValueType::DateTime),
        FieldSpec::writable("name", ValueType::Str).required(),
        FieldSpec::writable("note", ValueType::Str),
    ];

    impl Record for Sample {
        const TABLE: &'static str = "samples";

        fn fields() -> &'static [FieldSpec] {
            SAMPLE_FIELDS
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
                "modified" => self.modified.into(),
                "name" => self.name.as_str().into(),
                "note" => self.note.clone().into(),
                _ => Value::Null,
            }
        }

        fn set(&mut self, column: &str, value: Value) -> Result<(), FieldError> {
            match column {
                ID_COLUMN => self.id = value.as_i64().unwrap_or_default(),
                "version" => self.version = value.as_i64().unwrap_or_default(),
                "created" => self.created = value.as_date_time(),
                "modified" => self.modified = value.as_date_time(),
                "name" => self.name = value.as_str().unwrap_or_default().to_string(),
                "note" => self.note = value.as_str().map(str::to_string),
                _ => return Err(FieldError::unknown_column(column)),
            }
            Ok(())
        }
    }

    fn columns(with_id: bool) -> Vec<&'static str> {
        writable_fields::<Sample>(with_id)
            .map(|field| field.column)
            .collect()
    }

    #[test]
    fn projection_excludes_computed_columns() {
        let cols = columns(false);
        assert!(!cols.contains(&"created"));
        assert!(!cols.contains(&"modified"));
        assert!(cols.contains(&"name"));
        assert!(cols.contains(&"version"));
    }

    #[test]
    fn projection_includes_id_only_on_request() {
        assert!(!columns(false).contains(&ID_COLUMN));
        assert!(columns(true).contains(&ID_COLUMN));
    }

    #[test]
    fn validation_requires_populated_strings() {
        let mut item = Sample::default();
        assert!(!record_is_valid(&item, false));
        item.name = "alpha".to_string();
        assert!(record_is_valid(&item, false));
        // with_id also demands identity and a modified stamp.
        assert!(!record_is_valid(&item, true));
        item.id = 3;
        item.modified = Some(chrono::NaiveDateTime::default());
        assert!(record_is_valid(&item, true));
    }
}
