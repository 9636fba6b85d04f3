//! 同步日志 DAO - lab_rpki_sync_log 表

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::storage::entities::{SyncLog, SyncLogState, SyncLogSyncState};

pub struct SyncLogDao<'a> {
    conn: &'a Connection,
}

impl<'a> SyncLogDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 开始一次同步：写入 state=syncing 的日志行，返回 syncLogId
    pub fn insert_start(&self, sync_state: &SyncLogSyncState) -> Result<u64> {
        let sql = r#"
            INSERT INTO lab_rpki_sync_log (sync_style, state, start_time, sync_state)
            VALUES (?1, ?2, ?3, ?4)
        "#;
        self.conn.execute(
            sql,
            params![
                sync_state.sync_style.as_str(),
                SyncLogState::Syncing.as_str(),
                sync_state.start_time,
                serde_json::to_string(sync_state)?,
            ],
        )?;
        let id = self.conn.last_insert_rowid() as u64;
        debug!("insert_start(): syncLogId={}, syncStyle={}", id, sync_state.sync_style);
        Ok(id)
    }

    /// 结束一次同步：更新 state、end_time 以及完整快照
    pub fn update_end(&self, id: u64, state: SyncLogState, sync_state: &SyncLogSyncState) -> Result<()> {
        let sql = r#"
            UPDATE lab_rpki_sync_log
            SET state = ?1, end_time = ?2, sync_state = ?3
            WHERE id = ?4
        "#;
        let end_time = sync_state.end_time.unwrap_or_else(Utc::now);
        let affected = self.conn.execute(
            sql,
            params![state.as_str(), end_time, serde_json::to_string(sync_state)?, id as i64],
        )?;
        if affected == 0 {
            return Err(SyncError::database(format!("lab_rpki_sync_log 中不存在 id={}", id)));
        }
        debug!("update_end(): syncLogId={}, state={}", id, state);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Result<Option<SyncLog>> {
        let sql = r#"
            SELECT id, sync_style, state, start_time, end_time, sync_state
            FROM lab_rpki_sync_log WHERE id = ?1
        "#;
        let row = self
            .conn
            .query_row(sql, params![id as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                    row.get::<_, Option<DateTime<Utc>>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()?;

        let Some((id, sync_style, state, start_time, end_time, sync_state)) = row else {
            return Ok(None);
        };
        Ok(Some(SyncLog {
            id: id as u64,
            sync_style: sync_style
                .parse()
                .map_err(|_| SyncError::InvalidData(format!("未知 sync_style: {}", sync_style)))?,
            state: state
                .parse()
                .map_err(|_| SyncError::InvalidData(format!("未知 state: {}", state)))?,
            start_time,
            end_time,
            sync_state: serde_json::from_str(&sync_state)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dao::test_helpers::create_test_db;
    use crate::storage::entities::SyncResult;
    use crate::sync::SyncStyle;

    #[test]
    fn start_then_end() {
        let conn = create_test_db();
        let dao = SyncLogDao::new(&conn);

        let mut sync_state = SyncLogSyncState::new(SyncStyle::Sync);
        let id = dao.insert_start(&sync_state).unwrap();
        assert!(id > 0);

        let log = dao.get(id).unwrap().unwrap();
        assert_eq!(log.state, SyncLogState::Syncing);
        assert_eq!(log.sync_style, SyncStyle::Sync);
        assert!(log.end_time.is_none());

        sync_state.rrdp_urls = vec!["https://a/rrdp".to_string()];
        sync_state.rrdp_result = Some(SyncResult {
            add_files_len: 3,
            ..Default::default()
        });
        sync_state.end_time = Some(Utc::now());
        dao.update_end(id, SyncLogState::Synced, &sync_state).unwrap();

        let log = dao.get(id).unwrap().unwrap();
        assert_eq!(log.state, SyncLogState::Synced);
        assert!(log.end_time.is_some());
        assert_eq!(log.sync_state.rrdp_urls, vec!["https://a/rrdp".to_string()]);
        assert_eq!(log.sync_state.rrdp_result.unwrap().add_files_len, 3);
        assert!(log.sync_state.rsync_result.is_none());
    }

    #[test]
    fn update_missing_row_fails() {
        let conn = create_test_db();
        let dao = SyncLogDao::new(&conn);
        let sync_state = SyncLogSyncState::new(SyncStyle::Rsync);
        assert!(dao.update_end(999, SyncLogState::Failed, &sync_state).is_err());
        assert!(dao.get(999).unwrap().is_none());
    }
}
