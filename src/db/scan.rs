use futures::stream::{self, Stream, TryStreamExt};
use sqlx::SqlitePool;

use super::memo_repo::MemoRow;
use super::StoreError;
use crate::models::DualSnapshot;

const DEFAULT_PAGE_SIZE: i64 = 100;

/// Pages through memo records in id order, stopping before an optional
/// upper bound.
///
/// Nothing is read until the first page is requested, and `restart` rewinds
/// to the lowest id.
pub struct MemoScan {
    pool: SqlitePool,
    below: Option<i64>,
    page_size: i64,
    after: Option<i64>,
    done: bool,
}

impl MemoScan {
    pub fn new(pool: SqlitePool, below: Option<i64>) -> Self {
        Self {
            pool,
            below,
            page_size: DEFAULT_PAGE_SIZE,
            after: None,
            done: false,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The next batch of records, or `None` once the range is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<DualSnapshot>>, StoreError> {
        if self.done {
            return Ok(None);
        }

        let rows: Vec<MemoRow> = sqlx::query_as(
            r#"
            SELECT id, local, server FROM memo
            WHERE (?1 IS NULL OR id > ?1)
              AND (?2 IS NULL OR id < ?2)
            ORDER BY id
            LIMIT ?3
            "#,
        )
        .bind(self.after)
        .bind(self.below)
        .bind(self.page_size)
        .fetch_all(&self.pool)
        .await?;

        if (rows.len() as i64) < self.page_size {
            self.done = true;
        }
        let Some(last) = rows.last() else {
            return Ok(None);
        };
        self.after = Some(last.id);

        rows.into_iter()
            .map(MemoRow::into_snapshot)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn restart(&mut self) {
        self.after = None;
        self.done = false;
    }

    pub async fn collect_all(mut self) -> Result<Vec<DualSnapshot>, StoreError> {
        let mut records = Vec::new();
        while let Some(page) = self.next_page().await? {
            records.extend(page);
        }
        Ok(records)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<DualSnapshot, StoreError>> {
        stream::try_unfold(self, |mut scan| async move {
            let page = scan.next_page().await?;
            Ok::<_, StoreError>(
                page.map(|records| (stream::iter(records.into_iter().map(Ok)), scan)),
            )
        })
        .try_flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, MemoRepository};
    use crate::events::EventBus;
    use crate::models::Memo;
    use tempfile::TempDir;

    async fn setup(ids: &[i64]) -> (MemoRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let repo = MemoRepository::new(pool, EventBus::new());
        for id in ids {
            repo.write_local_only(Memo::new(*id, format!("memo {id}")))
                .await
                .unwrap();
        }
        (repo, temp_dir)
    }

    #[tokio::test]
    async fn test_pages_in_id_order() {
        let (repo, _temp) = setup(&[5, -4, 1, -2, 3]).await;
        let mut scan = repo.scan(None).with_page_size(2);

        let mut pages = Vec::new();
        while let Some(page) = scan.next_page().await.unwrap() {
            pages.push(page.iter().map(|r| r.id).collect::<Vec<_>>());
        }
        assert_eq!(pages, vec![vec![-4, -2], vec![1, 3], vec![5]]);
        assert!(scan.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bound_and_restart() {
        let (repo, _temp) = setup(&[-3, -1, 2]).await;
        let mut scan = repo.scan(Some(0)).with_page_size(1);

        assert_eq!(scan.next_page().await.unwrap().unwrap()[0].id, -3);
        assert_eq!(scan.next_page().await.unwrap().unwrap()[0].id, -1);
        assert!(scan.next_page().await.unwrap().is_none());

        scan.restart();
        assert_eq!(scan.next_page().await.unwrap().unwrap()[0].id, -3);
    }

    #[tokio::test]
    async fn test_stream() {
        let (repo, _temp) = setup(&[4, -6, 9]).await;
        let ids: Vec<i64> = repo
            .scan(None)
            .with_page_size(2)
            .into_stream()
            .map_ok(|r| r.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec![-6, 4, 9]);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (repo, _temp) = setup(&[]).await;
        assert!(repo.scan(None).collect_all().await.unwrap().is_empty());
    }
}
