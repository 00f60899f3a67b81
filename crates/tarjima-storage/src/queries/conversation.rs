// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared conversation-state rows: per-field write-through with TTL.
//!
//! Every mutator refreshes `expires_at`, so an active wizard never expires
//! mid-conversation. Field updates are individual UPDATE statements on the
//! single writer, which gives last-write-wins per field without multi-field
//! atomicity. List fields are read-modified-written inside one closure, so
//! appends from concurrent workers cannot drop entries.

use rusqlite::params;
use tarjima_core::types::ConversationState;

use crate::database::Database;

/// Timestamp format shared with the schema defaults.
const TS_FMT: &str = "%Y-%m-%dT%H:%M:%fZ";

/// Scalar wizard fields that hold an optional row id.
#[derive(Debug, Clone, Copy)]
pub enum ScalarField {
    CurrentOrder,
    Category,
    Product,
    Language,
    PendingPayment,
    PendingReceipt,
}

impl ScalarField {
    fn column(self) -> &'static str {
        match self {
            Self::CurrentOrder => "current_order_id",
            Self::Category => "category_id",
            Self::Product => "product_id",
            Self::Language => "language_id",
            Self::PendingPayment => "pending_payment_order_id",
            Self::PendingReceipt => "pending_receipt_order_id",
        }
    }
}

fn ttl_modifier(ttl_secs: i64) -> String {
    format!("{ttl_secs:+} seconds")
}

/// Decode a JSON list/map column, surfacing corruption as a conversion error.
fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> Result<T, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Create the row if it does not exist yet. Runs inside a mutator closure.
fn ensure_row(
    conn: &rusqlite::Connection,
    key: &str,
    ttl_mod: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        &format!(
            "INSERT INTO conversation_state (user_key, expires_at)
             VALUES (?1, strftime('{TS_FMT}', 'now', ?2))
             ON CONFLICT(user_key) DO NOTHING"
        ),
        params![key, ttl_mod],
    )?;
    Ok(())
}

fn refresh_clause() -> String {
    format!(
        "updated_at = strftime('{TS_FMT}', 'now'),
         expires_at = strftime('{TS_FMT}', 'now', ?2)"
    )
}

/// Read the state for a key. Expired rows are purged and read as absent.
pub async fn get(
    db: &Database,
    key: &str,
) -> Result<Option<ConversationState>, tarjima_core::TarjimaError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ConversationState>, tokio_rusqlite::Error> {
            let row = {
                let mut stmt = conn.prepare(
                    "SELECT current_order_id, category_id, product_id, language_id,
                            copy_count, file_ids, message_ids,
                            pending_payment_order_id, pending_receipt_order_id, extra,
                            expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     FROM conversation_state WHERE user_key = ?1",
                )?;
                match stmt.query_row(params![key], |row| {
                    let file_ids: String = row.get(5)?;
                    let message_ids: String = row.get(6)?;
                    let extra: String = row.get(9)?;
                    let expired: bool = row.get(10)?;
                    Ok((
                        ConversationState {
                            current_order_id: row.get(0)?,
                            category_id: row.get(1)?,
                            product_id: row.get(2)?,
                            language_id: row.get(3)?,
                            copy_count: row.get(4)?,
                            file_ids: parse_json(5, &file_ids)?,
                            message_ids: parse_json(6, &message_ids)?,
                            pending_payment_order_id: row.get(7)?,
                            pending_receipt_order_id: row.get(8)?,
                            extra: parse_json(9, &extra)?,
                        },
                        expired,
                    ))
                }) {
                    Ok(pair) => Some(pair),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };

            match row {
                Some((_, true)) => {
                    conn.execute(
                        "DELETE FROM conversation_state WHERE user_key = ?1",
                        params![key],
                    )?;
                    Ok(None)
                }
                Some((state, false)) => Ok(Some(state)),
                None => Ok(None),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set one scalar field, creating the row on first write.
pub async fn set_scalar(
    db: &Database,
    key: &str,
    field: ScalarField,
    value: Option<i64>,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            ensure_row(conn, &key, &ttl_mod)?;
            conn.execute(
                &format!(
                    "UPDATE conversation_state SET {} = ?3, {} WHERE user_key = ?1",
                    field.column(),
                    refresh_clause()
                ),
                params![key, ttl_mod, value],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the copy count.
pub async fn set_copy_count(
    db: &Database,
    key: &str,
    count: u32,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            ensure_row(conn, &key, &ttl_mod)?;
            conn.execute(
                &format!(
                    "UPDATE conversation_state SET copy_count = ?3, {} WHERE user_key = ?1",
                    refresh_clause()
                ),
                params![key, ttl_mod, count],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Append to a JSON list column, skipping duplicates.
fn append_to_list(
    conn: &rusqlite::Connection,
    key: &str,
    column: &str,
    item: serde_json::Value,
    ttl_mod: &str,
) -> Result<(), tokio_rusqlite::Error> {
    ensure_row(conn, key, ttl_mod)?;

    let raw: String = conn.query_row(
        &format!("SELECT {column} FROM conversation_state WHERE user_key = ?1"),
        params![key],
        |row| row.get(0),
    )?;
    let mut list: Vec<serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
    if list.contains(&item) {
        return Ok(());
    }
    list.push(item);
    let raw = serde_json::to_string(&list)
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

    conn.execute(
        &format!(
            "UPDATE conversation_state SET {column} = ?3, {} WHERE user_key = ?1",
            refresh_clause()
        ),
        params![key, ttl_mod, raw],
    )?;
    Ok(())
}

/// Record an uploaded file id.
pub async fn append_file_id(
    db: &Database,
    key: &str,
    file_id: &str,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let file_id = file_id.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| {
            append_to_list(conn, &key, "file_ids", serde_json::Value::from(file_id), &ttl_mod)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record an outbound message id for later cleanup.
pub async fn append_message_id(
    db: &Database,
    key: &str,
    message_id: i64,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| {
            append_to_list(
                conn,
                &key,
                "message_ids",
                serde_json::Value::from(message_id),
                &ttl_mod,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Drop the recorded message ids after cleanup.
pub async fn clear_message_ids(
    db: &Database,
    key: &str,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            ensure_row(conn, &key, &ttl_mod)?;
            conn.execute(
                &format!(
                    "UPDATE conversation_state SET message_ids = '[]', {} WHERE user_key = ?1",
                    refresh_clause()
                ),
                params![key, ttl_mod],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set one entry in the free-form extension map.
pub async fn set_extra(
    db: &Database,
    key: &str,
    name: &str,
    value: serde_json::Value,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let name = name.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            ensure_row(conn, &key, &ttl_mod)?;

            let raw: String = conn.query_row(
                "SELECT extra FROM conversation_state WHERE user_key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            let mut map: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&raw)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            map.insert(name, value);
            let raw = serde_json::to_string(&map)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

            conn.execute(
                &format!(
                    "UPDATE conversation_state SET extra = ?3, {} WHERE user_key = ?1",
                    refresh_clause()
                ),
                params![key, ttl_mod, raw],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reset all wizard-scoped fields. The row itself survives.
pub async fn clear(
    db: &Database,
    key: &str,
    ttl_secs: i64,
) -> Result<(), tarjima_core::TarjimaError> {
    let key = key.to_string();
    let ttl_mod = ttl_modifier(ttl_secs);
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE conversation_state SET
                         current_order_id = NULL, category_id = NULL, product_id = NULL,
                         language_id = NULL, copy_count = 0, file_ids = '[]',
                         message_ids = '[]', pending_payment_order_id = NULL,
                         pending_receipt_order_id = NULL, extra = '{{}}', {}
                     WHERE user_key = ?1",
                    refresh_clause()
                ),
                params![key, ttl_mod],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete every expired row. Returns the number purged.
pub async fn purge_expired(db: &Database) -> Result<usize, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<usize, tokio_rusqlite::Error> {
            let purged = conn.execute(
                "DELETE FROM conversation_state
                 WHERE expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;
            Ok(purged)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TTL: i64 = 86_400;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, "convo:1:42").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scalar_write_read_round_trips() {
        let (db, _dir) = setup_db().await;
        set_scalar(&db, "convo:1:42", ScalarField::CurrentOrder, Some(7), TTL)
            .await
            .unwrap();

        let state = get(&db, "convo:1:42").await.unwrap().unwrap();
        assert_eq!(state.current_order_id, Some(7));
        assert_eq!(state.category_id, None);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_appends_skip_duplicates() {
        let (db, _dir) = setup_db().await;
        let key = "convo:1:42";
        append_file_id(&db, key, "file-a", TTL).await.unwrap();
        append_file_id(&db, key, "file-b", TTL).await.unwrap();
        append_file_id(&db, key, "file-a", TTL).await.unwrap();
        append_message_id(&db, key, 100, TTL).await.unwrap();

        let state = get(&db, key).await.unwrap().unwrap();
        assert_eq!(state.file_ids, vec!["file-a", "file-b"]);
        assert_eq!(state.message_ids, vec![100]);

        clear_message_ids(&db, key, TTL).await.unwrap();
        let state = get(&db, key).await.unwrap().unwrap();
        assert!(state.message_ids.is_empty());
        assert_eq!(state.file_ids.len(), 2, "file ids untouched by message cleanup");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn extra_map_merges_entries() {
        let (db, _dir) = setup_db().await;
        let key = "convo:1:42";
        set_extra(&db, key, "quoted_price", serde_json::json!(125000), TTL)
            .await
            .unwrap();
        set_extra(&db, key, "note", serde_json::json!("rush"), TTL)
            .await
            .unwrap();

        let state = get(&db, key).await.unwrap().unwrap();
        assert_eq!(state.extra["quoted_price"], serde_json::json!(125000));
        assert_eq!(state.extra["note"], serde_json::json!("rush"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn clear_resets_fields_but_keeps_row() {
        let (db, _dir) = setup_db().await;
        let key = "convo:1:42";
        set_scalar(&db, key, ScalarField::Category, Some(3), TTL)
            .await
            .unwrap();
        append_file_id(&db, key, "file-a", TTL).await.unwrap();

        clear(&db, key, TTL).await.unwrap();

        let state = get(&db, key).await.unwrap().unwrap();
        assert!(state.is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_rows_read_as_absent_and_are_purged() {
        let (db, _dir) = setup_db().await;
        let key = "convo:1:42";
        // Already-expired TTL simulates an abandoned wizard.
        set_scalar(&db, key, ScalarField::Category, Some(3), -5)
            .await
            .unwrap();

        assert!(get(&db, key).await.unwrap().is_none());

        // The expired row is gone entirely, not just filtered.
        let remaining: i64 = db
            .connection()
            .call(|conn| -> Result<i64, tokio_rusqlite::Error> {
                let n =
                    conn.query_row("SELECT COUNT(*) FROM conversation_state", [], |r| r.get(0))?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn purge_expired_sweeps_only_stale_rows() {
        let (db, _dir) = setup_db().await;
        set_scalar(&db, "convo:1:stale", ScalarField::Category, Some(1), -5)
            .await
            .unwrap();
        set_scalar(&db, "convo:1:fresh", ScalarField::Category, Some(2), TTL)
            .await
            .unwrap();

        let purged = purge_expired(&db).await.unwrap();
        assert_eq!(purged, 1);
        assert!(get(&db, "convo:1:fresh").await.unwrap().is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn writes_refresh_expiry() {
        let (db, _dir) = setup_db().await;
        let key = "convo:1:42";
        set_scalar(&db, key, ScalarField::Category, Some(3), -5)
            .await
            .unwrap();
        // A later write with a fresh TTL resurrects the row before any read.
        set_scalar(&db, key, ScalarField::Product, Some(9), TTL)
            .await
            .unwrap();

        let state = get(&db, key).await.unwrap().unwrap();
        assert_eq!(state.product_id, Some(9));
        db.close().await.unwrap();
    }
}
