//! 存储模块 - 同步核心的数据持久化层
//!
//! - StorageManager: 持有 SQLite 连接，负责初始化与 migration
//! - DAO Layer: 每张表一个专门的操作模块
//! - Entities: 数据实体定义

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{Result, SyncError};

pub mod dao;
pub mod entities;
pub mod migrate;

pub use dao::{CrlDao, SyncLogDao, SyncLogFileDao, TransactionManager};
pub use entities::*;

/// 存储管理器
///
/// 单连接 + 互斥锁：进程内的写操作天然串行，同一 (filePath, fileName) 不会被并发写。
#[derive(Debug, Clone)]
pub struct StorageManager {
    conn: Arc<Mutex<Connection>>,
}

impl StorageManager {
    /// 打开（或创建）数据库文件并执行 migration
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::Io(format!("创建数据库目录 {} 失败: {}", parent.display(), e))
                })?;
            }
        }

        let mut conn = Connection::open(db_path)
            .map_err(|e| SyncError::database(format!("打开数据库 {} 失败: {}", db_path.display(), e)))?;
        migrate::init_db(&mut conn)?;
        info!("数据库初始化完成: {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate::init_db(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 获取连接；持有期间其他调用方等待
    pub async fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_parent_dir_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("sync.db");

        let storage = StorageManager::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        let conn = storage.connection().await;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM lab_rpki_crl", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sync.db");

        {
            let storage = StorageManager::open(&db_path).await.unwrap();
            let conn = storage.connection().await;
            SyncLogDao::new(&conn)
                .insert_start(&SyncLogSyncState::new(crate::sync::SyncStyle::Rrdp))
                .unwrap();
        }

        let storage = StorageManager::open(&db_path).await.unwrap();
        let conn = storage.connection().await;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM lab_rpki_sync_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
