use crate::error::AppError;
use serde_json::Value;
use sqlx::{MySql, MySqlPool, query::Query};
use sqlx::mysql::MySqlArguments;

/// SQL bindable value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Null,
}

impl SqlValue {
    pub fn bind_to<'q>(
        self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        match self {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

/// Allowed column and how its JSON value must look.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// Text restricted to a fixed set of values
    OneOf(&'static [&'static str]),
    Id,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
    /// Columns in `SET` order, one per leading entry of `values`.
    pub columns: Vec<&'static str>,
}

impl SqlUpdate {
    /// The converted value a column will be set to, if the patch touches it.
    pub fn value_of(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.values.get(i))
    }
}

/// Builds `UPDATE table SET .. WHERE id_column = ?` from a JSON patch.
///
/// Only columns listed in `allowed` may appear in the patch; each value is
/// checked against the column kind before it gets anywhere near SQL.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[Column],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::bad_request("No fields provided for update"));
    }

    let mut assignments = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);
    let mut columns = Vec::with_capacity(obj.len());

    for (key, value) in obj {
        let column = allowed
            .iter()
            .find(|c| c.name == key)
            .ok_or_else(|| AppError::bad_request(format!("Field '{key}' cannot be updated")))?;

        values.push(convert(column, value)?);
        assignments.push(format!("{} = ?", column.name));
        columns.push(column.name);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        id_column
    );

    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate {
        sql,
        values,
        columns,
    })
}

fn convert(column: &Column, value: &Value) -> Result<SqlValue, AppError> {
    let invalid = || AppError::bad_request(format!("Invalid value for '{}'", column.name));

    if value.is_null() {
        return if column.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(invalid())
        };
    }

    match column.kind {
        ColumnKind::Text => {
            let s = value.as_str().ok_or_else(invalid)?.trim();
            if s.is_empty() && !column.nullable {
                return Err(invalid());
            }
            Ok(SqlValue::String(s.to_string()))
        }
        ColumnKind::OneOf(options) => {
            let s = value.as_str().ok_or_else(invalid)?.trim().to_lowercase();
            if options.contains(&s.as_str()) {
                Ok(SqlValue::String(s))
            } else {
                Err(AppError::bad_request(format!(
                    "'{}' must be one of: {}",
                    column.name,
                    options.join(", ")
                )))
            }
        }
        ColumnKind::Id => value.as_u64().map(SqlValue::U64).ok_or_else(invalid),
    }
}

pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = value.bind_to(query);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Page/per_page clamped to sane bounds, with the row offset.
pub fn paginate(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> (u32, u32, u64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 100);
    let offset = u64::from(page - 1) * u64::from(per_page);
    (page, per_page, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column {
            name: "department",
            kind: ColumnKind::Text,
            nullable: true,
        },
        Column {
            name: "role",
            kind: ColumnKind::OneOf(&["admin", "hr", "employee"]),
            nullable: false,
        },
        Column {
            name: "manager_id",
            kind: ColumnKind::Id,
            nullable: true,
        },
    ];

    #[test]
    fn builds_update_for_allowed_columns() {
        let update = build_update_sql(
            "users",
            &json!({"role": "HR", "manager_id": 4}),
            COLUMNS,
            "id",
            9,
        )
        .unwrap();
        assert!(update.sql.starts_with("UPDATE users SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("role = ?"));
        assert!(update.sql.contains("manager_id = ?"));
        assert_eq!(update.values.len(), 3);
        assert!(update.values.contains(&SqlValue::String("hr".into())));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn converted_values_are_looked_up_by_column() {
        let update = build_update_sql(
            "users",
            &json!({"role": "  Admin ", "department": "Ops"}),
            COLUMNS,
            "id",
            9,
        )
        .unwrap();
        assert_eq!(update.value_of("role"), Some(&SqlValue::String("admin".into())));
        assert_eq!(update.value_of("department"), Some(&SqlValue::String("Ops".into())));
        assert_eq!(update.value_of("manager_id"), None);
        // the trailing id is not a column
        assert_eq!(update.value_of("id"), None);
    }

    #[test]
    fn unknown_column_is_refused() {
        let err = build_update_sql("users", &json!({"password": "x"}), COLUMNS, "id", 1).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn value_must_match_kind() {
        assert!(build_update_sql("users", &json!({"role": "ceo"}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("users", &json!({"manager_id": "4"}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("users", &json!({"role": null}), COLUMNS, "id", 1).is_err());
        let update =
            build_update_sql("users", &json!({"department": null}), COLUMNS, "id", 1).unwrap();
        assert_eq!(update.values[0], SqlValue::Null);
    }

    #[test]
    fn empty_patch_is_refused() {
        assert!(build_update_sql("users", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("users", &json!([1]), COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn pagination_bounds() {
        assert_eq!(paginate(None, None, 20), (1, 20, 0));
        assert_eq!(paginate(Some(0), Some(500), 20), (1, 100, 0));
        assert_eq!(paginate(Some(3), Some(10), 20), (3, 10, 20));
    }
}
