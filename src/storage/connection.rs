use crate::storage::entity::{access_token, parcel, tree, tree_report, upload_batch, user_role};
use log::info;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
    Statement,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl StorageConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        // 内存数据库：每个连接各自一份，所以只能有一个连接
        let (max_connections, min_connections) = if url.contains(":memory:") {
            (1, 1)
        } else {
            (10, 2)
        };
        Self {
            url,
            max_connections,
            min_connections,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

pub async fn establish_connection(config: &StorageConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);
    if !config.is_memory() {
        opt.idle_timeout(Duration::from_secs(60))
            .max_lifetime(Duration::from_secs(600));
    }

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式
    if !config.is_memory() {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
    }

    // 创建表（如果不存在）
    create_table(&db, parcel::Entity).await?;
    create_table(&db, tree::Entity).await?;
    create_table(&db, upload_batch::Entity).await?;
    create_table(&db, tree_report::Entity).await?;
    create_table(&db, user_role::Entity).await?;
    create_table(&db, access_token::Entity).await?;

    // 唯一索引：组合标识不允许重复
    for sql in [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_parcels_unique ON parcels(block_number, sector_number, parcel_number);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_trees_unique ON trees(parcel_id, row_index, col_index);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_parcels_trees_report_unique ON parcels_trees_report(bloc, sector, parcel, \"row\", \"col\");",
        "CREATE INDEX IF NOT EXISTS idx_parcels_trees_report_upload ON parcels_trees_report(upload_id);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_roles_unique ON user_roles(user_id, role);",
    ] {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            sql.to_string(),
        ))
        .await?;
    }

    info!("数据库连接已建立，表结构初始化完成");

    Ok(db)
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let stmt = builder.build(schema.create_table_from_entity(entity).if_not_exists());
    db.execute(stmt).await?;
    Ok(())
}
