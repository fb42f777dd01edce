use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;

pub const TIMEZONE_KEY: &str = "timezone";
pub const WEEKEND_MODE_KEY: &str = "weekend_mode";

#[derive(Debug, Clone)]
pub struct PreferenceRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for PreferenceRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct PreferenceRepository;

impl PreferenceRepository {
    pub fn get(conn: &Connection, key: &str) -> AppResult<Option<PreferenceRow>> {
        let mut stmt =
            conn.prepare("SELECT key, value, updated_at FROM preferences WHERE key = ?1")?;

        let row = stmt
            .query_row([key], |row| PreferenceRow::try_from(row))
            .optional()?;

        Ok(row)
    }

    pub fn get_value(conn: &Connection, key: &str) -> AppResult<Option<String>> {
        Ok(Self::get(conn, key)?.map(|row| row.value))
    }

    pub fn upsert(conn: &Connection, key: &str, value: &str) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO preferences (key, value)
                VALUES (:key, :value)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
            "#,
            named_params! {":key": key, ":value": value},
        )?;

        Ok(())
    }

    pub fn delete(conn: &Connection, key: &str) -> AppResult<()> {
        conn.execute("DELETE FROM preferences WHERE key = ?1", [key])?;
        Ok(())
    }
}
