//! CRL DAO - lab_rpki_crl / lab_rpki_crl_revoked_cert 表
//!
//! lab_rpki_crl_revoked_cert 没有级联删除，删除 CRL 只能通过本 DAO：
//! 先删吊销条目，再删 CRL 本身（外键开启时反过来会失败）。

use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info};

use crate::error::{Result, SyncError};
use crate::storage::entities::{CertModel, SyncLogFileModel};

pub struct CrlDao<'a> {
    conn: &'a Connection,
}

impl<'a> CrlDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 批量写入 CRL：整批一个事务，任一条失败整批回滚
    pub fn add_crls(&self, files: &[SyncLogFileModel]) -> Result<()> {
        let start = Instant::now();
        let now = Utc::now();
        debug!("add_crls(): len={}", files.len());

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| SyncError::database(format!("开启事务失败: {}", e)))?;
        for file in files {
            if let Err(e) = insert_crl(&tx, file, now) {
                error!(
                    "add_crls(): insert_crl 失败, syncLogFileId={}, {}/{}: {}",
                    file.id, file.file_path, file.file_name, e
                );
                return Err(e);
            }
        }
        tx.commit()
            .map_err(|e| SyncError::database(format!("提交事务失败: {}", e)))?;

        info!(
            "add_crls(): len={}, time(s)={:.3}",
            files.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// 按 cert_id 批量删除 CRL：整批一个事务，任一条失败整批回滚；没有 cert_id 的记录跳过
    pub fn del_crls(&self, files: &[SyncLogFileModel]) -> Result<()> {
        let start = Instant::now();
        debug!("del_crls(): len={}", files.len());

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| SyncError::database(format!("开启事务失败: {}", e)))?;
        let mut deleted = 0usize;
        for file in files {
            // 对象表中没有旧行，无需删除
            let Some(crl_id) = file.cert_id else {
                debug!(
                    "del_crls(): 没有对应的 lab_rpki_crl 行，跳过, syncLogFileId={}, {}/{}",
                    file.id, file.file_path, file.file_name
                );
                continue;
            };
            if let Err(e) = del_crl_by_id(&tx, crl_id) {
                error!("del_crls(): del_crl_by_id 失败, crlId={}: {}", crl_id, e);
                return Err(e);
            }
            deleted += 1;
        }
        tx.commit()
            .map_err(|e| SyncError::database(format!("提交事务失败: {}", e)))?;

        info!(
            "del_crls(): len={}, deleted={}, time(s)={:.3}",
            files.len(),
            deleted,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// 按文件删除旧 CRL（若存在）。
    ///
    /// 不自行开启事务，在调用方的事务中执行；不存在时直接返回 Ok。
    pub fn del_crl_by_file(&self, file_path: &str, file_name: &str) -> Result<()> {
        debug!("del_crl_by_file(): {}/{}", file_path, file_name);
        match self.get_id_by_file(file_path, file_name)? {
            Some(crl_id) => del_crl_by_id(self.conn, crl_id),
            None => Ok(()),
        }
    }

    pub fn get_id_by_file(&self, file_path: &str, file_name: &str) -> Result<Option<u64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM lab_rpki_crl WHERE file_path = ?1 AND file_name = ?2",
                params![file_path, file_name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(|id| id as u64))
    }

    /// 某个 CRL 的吊销条目数
    pub fn count_revoked_certs(&self, crl_id: u64) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM lab_rpki_crl_revoked_cert WHERE crl_id = ?1",
            params![crl_id as i64],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn del_crl_by_id(conn: &Connection, crl_id: u64) -> Result<()> {
    debug!("del_crl_by_id(): crlId={}", crl_id);
    conn.execute(
        "DELETE FROM lab_rpki_crl_revoked_cert WHERE crl_id = ?1",
        params![crl_id as i64],
    )?;
    conn.execute("DELETE FROM lab_rpki_crl WHERE id = ?1", params![crl_id as i64])?;
    Ok(())
}

fn insert_crl(conn: &Connection, file: &SyncLogFileModel, now: DateTime<Utc>) -> Result<()> {
    let crl = match &file.cert_model {
        Some(CertModel::Crl(crl)) => crl,
        None => {
            return Err(SyncError::InvalidData(format!(
                "syncLogFileId={} 没有解析后的 CRL",
                file.id
            )))
        }
    };

    let sql = r#"
        INSERT INTO lab_rpki_crl (
            crl_number, this_update, next_update, has_expired, aki,
            file_path, file_name, file_hash, json_all, sync_log_id,
            sync_log_file_id, update_time, state)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    "#;
    let aki = (!crl.aki.is_empty()).then_some(crl.aki.as_str());
    conn.execute(
        sql,
        params![
            crl.crl_number,
            crl.this_update,
            crl.next_update,
            crl.has_expired,
            aki,
            crl.file_path,
            crl.file_name,
            crl.file_hash,
            serde_json::to_string(crl)?,
            file.sync_log_id as i64,
            file.id as i64,
            now,
            serde_json::to_string(&file.state)?,
        ],
    )?;
    let crl_id = conn.last_insert_rowid();

    if !crl.revoked_cert_models.is_empty() {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO lab_rpki_crl_revoked_cert (crl_id, sn, revocation_time) VALUES (?1, ?2, ?3)",
        )?;
        for revoked in &crl.revoked_cert_models {
            stmt.execute(params![crl_id, revoked.sn, revoked.revocation_time])?;
        }
    }
    Ok(())
}
