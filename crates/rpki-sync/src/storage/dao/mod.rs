//! 数据访问层 (DAO) - 每张表一个专门的操作模块
//!
//! DAO 只持有 `&Connection`：传入普通连接时各方法按自身约定开启事务，
//! 传入事务（`&Transaction` 可解引用为 `&Connection`）时则参与调用方的事务。

pub mod crl;
pub mod sync_log;
pub mod sync_log_file;

pub use crl::CrlDao;
pub use sync_log::SyncLogDao;
pub use sync_log_file::SyncLogFileDao;

use rusqlite::Connection;
use tracing::warn;

use crate::error::{Result, SyncError};

/// 事务管理器 - 统一管理跨表操作的事务
pub struct TransactionManager<'a> {
    conn: &'a Connection,
}

impl<'a> TransactionManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 执行事务操作：闭包返回 Err 时整体回滚
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| SyncError::database(format!("开始事务失败: {}", e)))?;

        let result = match f(&tx) {
            Ok(result) => result,
            Err(e) => {
                warn!("事务执行失败，回滚: {}", e);
                if let Err(rollback_err) = tx.rollback() {
                    warn!("回滚失败: {}", rollback_err);
                }
                return Err(e);
            }
        };

        tx.commit()
            .map_err(|e| SyncError::database(format!("提交事务失败: {}", e)))?;
        Ok(result)
    }
}
