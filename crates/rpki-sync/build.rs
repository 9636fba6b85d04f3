//! 编译期生成 GIT_SHA、BUILD_TIMESTAMP（供 version.rs 使用）
//! 以及 DB_VERSION（扫描 migrations/ 下 V{version}__*.sql 取最大版本号）

use std::env;
use std::fs;
use std::path::Path;
use vergen::EmitBuilder;

fn main() {
    let _ = EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit();

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let migrations_dir = Path::new(&manifest_dir).join("migrations");
    let max_version = fs::read_dir(&migrations_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| entry.file_name().to_str().and_then(migration_version))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    println!("cargo:rustc-env=RPKI_SYNC_DB_VERSION={}", max_version);
    println!("cargo:rerun-if-changed=migrations/");
}

/// refinery 文件名格式: V{version}__{name}.sql
fn migration_version(file_name: &str) -> Option<i64> {
    let rest = file_name.strip_prefix('V')?.strip_suffix(".sql")?;
    rest.split("__").next()?.parse::<i64>().ok()
}
