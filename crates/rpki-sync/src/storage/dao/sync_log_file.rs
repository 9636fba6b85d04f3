//! 同步文件 DAO - lab_rpki_sync_log_file 表
//!
//! 负责两件事：
//! - 为 update / del 文件在对应对象表中找到旧行 id（cert_id）
//! - 写完对象表后标记文件状态（updateCertTable=finished，并决定 rtr 是否还需刷新）

use std::time::Instant;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info};

use crate::error::{Result, SyncError};
use crate::storage::entities::{SyncLogFileModel, SyncLogFileState};

pub struct SyncLogFileDao<'a> {
    conn: &'a Connection,
}

impl<'a> SyncLogFileDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 记录一次同步中发现的文件，返回行 id
    pub fn insert(&self, file: &SyncLogFileModel) -> Result<u64> {
        let sql = r#"
            INSERT INTO lab_rpki_sync_log_file
                (sync_log_id, file_path, file_name, file_type, sync_type, state, json_all)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#;
        self.conn.execute(
            sql,
            params![
                file.sync_log_id as i64,
                file.file_path,
                file.file_name,
                file.file_type.as_str(),
                file.sync_type.as_str(),
                serde_json::to_string(&file.state)?,
                file.json_all,
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    /// 取出某次同步中尚未写入对象表的文件（updateCertTable=notYet），并解析出旧行 id
    pub fn get_pending_by_sync_log_id(&self, sync_log_id: u64) -> Result<Vec<SyncLogFileModel>> {
        let start = Instant::now();
        let sql = r#"
            SELECT id, sync_log_id, file_path, file_name, file_type, sync_type, state, json_all
            FROM lab_rpki_sync_log_file
            WHERE sync_log_id = ?1 AND json_extract(state, '$.updateCertTable') = 'notYet'
            ORDER BY id
        "#;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![sync_log_id as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut files = Vec::new();
        for row in rows {
            let (id, sync_log_id, file_path, file_name, file_type, sync_type, state, json_all) = row?;
            files.push(SyncLogFileModel {
                id: id as u64,
                sync_log_id: sync_log_id as u64,
                file_path,
                file_name,
                file_type: file_type
                    .parse()
                    .map_err(|_| SyncError::InvalidData(format!("未知 file_type: {}", file_type)))?,
                sync_type: sync_type
                    .parse()
                    .map_err(|_| SyncError::InvalidData(format!("未知 sync_type: {}", sync_type)))?,
                cert_id: None,
                state: serde_json::from_str(&state)?,
                json_all,
                cert_model: None,
            });
        }
        debug!("get_pending_by_sync_log_id(): syncLogId={}, len={}", sync_log_id, files.len());

        self.resolve_existing_ids(&mut files)?;
        info!(
            "get_pending_by_sync_log_id(): syncLogId={}, len={}, time(s)={:.3}",
            sync_log_id,
            files.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(files)
    }

    /// 为 update / del 文件填充 cert_id；add 文件跳过，找不到旧行不算错误
    pub fn resolve_existing_ids(&self, files: &mut [SyncLogFileModel]) -> Result<()> {
        for file in files.iter_mut() {
            if !file.sync_type.has_existing_row() {
                continue;
            }
            let table = file.file_type.table_name();
            let sql = format!("SELECT id FROM {} WHERE file_path = ?1 AND file_name = ?2", table);
            let cert_id = self
                .conn
                .query_row(&sql, params![file.file_path, file.file_name], |row| row.get::<_, i64>(0))
                .optional()
                .map_err(|e| {
                    error!(
                        "resolve_existing_ids(): 查询旧行失败: {}, {}, {}, {}",
                        table, file.file_path, file.file_name, e
                    );
                    SyncError::from(e)
                })?;

            file.cert_id = cert_id.map(|id| id as u64);
            debug!(
                "resolve_existing_ids(): {} {}/{} -> {:?}",
                table, file.file_path, file.file_name, file.cert_id
            );
        }
        Ok(())
    }

    /// 写完对象表后更新文件状态与 json_all。
    ///
    /// 不自行开启事务：应在调用方写对象表的同一个事务内调用，遇错即返由调用方回滚。
    pub fn update_json_all_and_state(&self, files: &mut [SyncLogFileModel]) -> Result<()> {
        debug!("update_json_all_and_state(): len={}", files.len());
        let sql = r#"
            UPDATE lab_rpki_sync_log_file
            SET state = json_set(state, '$.updateCertTable', ?1, '$.rtr', ?2),
                json_all = ?3
            WHERE id = ?4
        "#;
        for file in files.iter_mut() {
            let new_state = SyncLogFileState::after_cert_table_update(file.file_type, file.sync_type);
            let affected = self
                .conn
                .execute(
                    sql,
                    params![
                        new_state.update_cert_table.as_str(),
                        new_state.rtr.as_str(),
                        file.json_all,
                        file.id as i64,
                    ],
                )
                .map_err(|e| {
                    error!(
                        "update_json_all_and_state(): 更新失败, syncLogFileId={}, {}",
                        file.id, e
                    );
                    SyncError::from(e)
                })?;
            if affected == 0 {
                return Err(SyncError::database(format!(
                    "lab_rpki_sync_log_file 中不存在 id={}",
                    file.id
                )));
            }
            file.state = new_state;
        }
        Ok(())
    }
}
