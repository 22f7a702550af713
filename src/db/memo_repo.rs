use sqlx::{SqliteConnection, SqlitePool};

use super::{MemoScan, StoreError};
use crate::clock::{system_clock, Clock};
use crate::events::{EventBus, MemoEvent};
use crate::merge::merge;
use crate::models::{is_more_recent, AccessTime, DualSnapshot, Memo, ServerMemoReply};

/// Durable storage for dual-snapshot records and their access times.
///
/// Every public operation runs inside its own transaction over the `memo`
/// and `memo_access` tables.
#[derive(Clone)]
pub struct MemoRepository {
    pool: SqlitePool,
    events: EventBus,
    clock: Clock,
}

#[derive(sqlx::FromRow)]
pub(crate) struct MemoRow {
    pub(crate) id: i64,
    local: String,
    server: Option<String>,
}

impl MemoRow {
    pub(crate) fn into_snapshot(self) -> Result<DualSnapshot, StoreError> {
        let id = self.id;
        let local: Memo = serde_json::from_str(&self.local)
            .map_err(|source| StoreError::Corrupt { id, source })?;
        let server: Option<Memo> = self
            .server
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|source| StoreError::Corrupt { id, source })?;
        Ok(DualSnapshot { id, local, server })
    }
}

#[derive(sqlx::FromRow)]
struct AccessRow {
    id: i64,
    last_access: i64,
}

impl MemoRepository {
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        Self::with_clock(pool, events, system_clock())
    }

    pub fn with_clock(pool: SqlitePool, events: EventBus, clock: Clock) -> Self {
        Self {
            pool,
            events,
            clock,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// The local half of the record, touching its access time.
    pub async fn read(&self, id: i64) -> Result<Option<Memo>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let record = fetch_record(&mut tx, id).await?;
        if record.is_some() {
            touch(&mut tx, id, self.now()).await?;
        }
        tx.commit().await?;
        Ok(record.map(|r| r.local))
    }

    /// Persists a local edit. The server half is never touched.
    ///
    /// Returns the stored memo unchanged (and writes nothing) when `memo`
    /// has the same text, id and group as what is already stored.
    pub async fn write_local_only(&self, memo: Memo) -> Result<Memo, StoreError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        touch(&mut tx, memo.id, now).await?;

        let record = match fetch_record(&mut tx, memo.id).await? {
            Some(existing) if existing.local.content_eq(&memo) => {
                tx.commit().await?;
                tracing::debug!(id = memo.id, "local memo unchanged, skipping write");
                return Ok(existing.local);
            }
            Some(existing) => DualSnapshot::with_local(memo.with_timestamp(now), &existing),
            None => DualSnapshot::local_only(memo.with_timestamp(now)),
        };

        put_record(&mut tx, &record).await?;
        tx.commit().await?;
        tracing::debug!(id = record.id, timestamp = now, "saved local memo");
        Ok(record.local)
    }

    /// Folds a memo fetched from the server into the store.
    ///
    /// Returns `None` (and leaves the store alone) when the reply carries no
    /// memo.
    pub async fn reconcile_after_fetch(
        &self,
        reply: &ServerMemoReply,
    ) -> Result<Option<Memo>, StoreError> {
        let Some(derived) = reply.to_local() else {
            return Ok(None);
        };
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        touch(&mut tx, derived.id, now).await?;

        let Some(existing) = fetch_record(&mut tx, derived.id).await? else {
            put_record(&mut tx, &DualSnapshot::confirmed(derived.clone())).await?;
            tx.commit().await?;
            tracing::debug!(id = derived.id, "stored fetched memo");
            return Ok(Some(derived));
        };

        if !is_more_recent(Some(&derived), existing.server.as_ref()) {
            tx.commit().await?;
            tracing::debug!(id = derived.id, "fetched memo is not newer, keeping local");
            return Ok(Some(existing.local));
        }

        let result = if is_more_recent(Some(&existing.local), existing.server.as_ref()) {
            let ancestor = existing
                .server
                .as_ref()
                .map(|s| s.text.as_str())
                .unwrap_or_default();
            let text = merge(ancestor, &existing.local.text, &derived.text);
            tracing::info!(id = derived.id, "merged local edits with newer server memo");

            let mut merged = derived.clone();
            merged.text = text;
            merged.timestamp = Some(now);
            put_record(
                &mut tx,
                &DualSnapshot {
                    id: derived.id,
                    local: merged.clone(),
                    server: Some(derived),
                },
            )
            .await?;
            merged
        } else {
            tracing::debug!(id = derived.id, "replacing unchanged local memo with server memo");
            put_record(&mut tx, &DualSnapshot::confirmed(derived.clone())).await?;
            derived
        };

        tx.commit().await?;
        Ok(Some(result))
    }

    /// Stores what the server answered to a push of the memo at `old_id`.
    ///
    /// A reply without a memo means the server deleted or refused it, so the
    /// local record goes too. When the server answers under another id the
    /// old record is replaced in the same transaction, and the id change is
    /// announced once the new record is committed.
    pub async fn reconcile_after_push(
        &self,
        old_id: i64,
        reply: &ServerMemoReply,
    ) -> Result<Option<Memo>, StoreError> {
        let Some(derived) = reply.to_local() else {
            tracing::info!(id = old_id, "server dropped memo, deleting local copy");
            self.delete(old_id, None).await?;
            return Ok(None);
        };

        let reassigned = old_id != derived.id;
        let mut tx = self.pool.begin().await?;
        if reassigned {
            remove_record(&mut tx, old_id).await?;
        }
        put_record(&mut tx, &DualSnapshot::confirmed(derived.clone())).await?;
        touch(&mut tx, derived.id, self.now()).await?;
        tx.commit().await?;
        tracing::debug!(id = derived.id, "stored pushed memo");

        if reassigned {
            self.announce_removal(old_id, Some(derived.id));
        }
        Ok(Some(derived))
    }

    /// Removes the record and its access time.
    ///
    /// With `new_id` this announces an id change instead of a deletion.
    pub async fn delete(&self, id: i64, new_id: Option<i64>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        remove_record(&mut tx, id).await?;
        tx.commit().await?;
        self.announce_removal(id, new_id);
        Ok(())
    }

    fn announce_removal(&self, id: i64, new_id: Option<i64>) {
        match new_id {
            Some(new_id) => {
                tracing::info!(old_id = id, new_id, "memo id reassigned");
                self.events.emit(MemoEvent::IdChanged {
                    old_id: id,
                    new_id,
                });
            }
            None => {
                tracing::info!(id, "deleted memo");
                self.events.emit(MemoEvent::Deleted(id));
            }
        }
    }

    /// Records whose local half still has to reach the server.
    pub async fn list_dirty(&self) -> Result<Vec<DualSnapshot>, StoreError> {
        let rows: Vec<MemoRow> = sqlx::query_as(
            r#"
            SELECT id, local, server FROM memo
            WHERE server IS NULL
               OR COALESCE(local_timestamp, 0) > COALESCE(server_timestamp, 0)
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MemoRow::into_snapshot).collect()
    }

    /// Most recently touched first.
    pub async fn access_times(&self) -> Result<Vec<AccessTime>, StoreError> {
        let rows: Vec<AccessRow> =
            sqlx::query_as("SELECT id, last_access FROM memo_access ORDER BY last_access DESC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| AccessTime {
                id: r.id,
                last_access: r.last_access,
            })
            .collect())
    }

    /// Memos the server has not assigned an id to yet.
    pub async fn list_new(&self) -> Result<Vec<DualSnapshot>, StoreError> {
        self.scan(Some(0)).collect_all().await
    }

    pub async fn list_all(&self) -> Result<Vec<DualSnapshot>, StoreError> {
        self.scan(None).collect_all().await
    }

    /// A lazy scan over records ordered by id, stopping before `below`.
    pub fn scan(&self, below: Option<i64>) -> MemoScan {
        MemoScan::new(self.pool.clone(), below)
    }

    /// The full record, without touching its access time.
    pub async fn get_record(&self, id: i64) -> Result<Option<DualSnapshot>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, id).await
    }

    #[cfg(test)]
    pub(crate) async fn put_record(&self, record: &DualSnapshot) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        put_record(&mut conn, record).await
    }
}

async fn fetch_record(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<DualSnapshot>, StoreError> {
    let row: Option<MemoRow> = sqlx::query_as("SELECT id, local, server FROM memo WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(MemoRow::into_snapshot).transpose()
}

async fn put_record(conn: &mut SqliteConnection, record: &DualSnapshot) -> Result<(), StoreError> {
    let corrupt = |source| StoreError::Corrupt {
        id: record.id,
        source,
    };
    let local = serde_json::to_string(&record.local).map_err(corrupt)?;
    let server = record
        .server
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(corrupt)?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO memo (id, local, server, local_timestamp, server_timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id)
    .bind(&local)
    .bind(&server)
    .bind(record.local.timestamp)
    .bind(record.server.as_ref().and_then(|s| s.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn remove_record(conn: &mut SqliteConnection, id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM memo WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM memo_access WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn touch(conn: &mut SqliteConnection, id: i64, now: i64) -> Result<(), StoreError> {
    sqlx::query("INSERT OR REPLACE INTO memo_access (id, last_access) VALUES (?, ?)")
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
