use super::{
    CatalogStore, ConversationStats, ConversationStore, ConversationTurn, NewProduct, NewTenant,
    Product, Role, Tenant, TenantRegistry, UsageRecord, UsageStore,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

const PRAGMA_SQL: &str =
    "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000; PRAGMA foreign_keys=ON;";

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS tenants (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name    TEXT NOT NULL,
    identifier      TEXT NOT NULL UNIQUE,
    platform        TEXT NOT NULL DEFAULT 'telegram',
    access_token    TEXT NOT NULL UNIQUE,
    platform_api_id INTEGER NOT NULL UNIQUE,
    shop_name       TEXT,
    owner_id        INTEGER NOT NULL,
    description     TEXT
);
CREATE INDEX IF NOT EXISTS idx_tenants_owner ON tenants(owner_id);

CREATE TABLE IF NOT EXISTS products (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id   INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    price       TEXT NOT NULL,
    description TEXT,
    catalog     TEXT NOT NULL DEFAULT '',
    subcategory TEXT NOT NULL DEFAULT '',
    image_url   TEXT,
    in_stock    INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_products_tenant ON products(tenant_id);

CREATE TABLE IF NOT EXISTS conversation_turns (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    role              TEXT NOT NULL,
    content           TEXT NOT NULL,
    chat_id           INTEGER NOT NULL,
    tenant_identifier TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turns_chat ON conversation_turns(tenant_identifier, chat_id, id);

CREATE TABLE IF NOT EXISTS usage_records (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_identifier TEXT NOT NULL,
    chat_id           INTEGER NOT NULL,
    prompt_tokens     INTEGER NOT NULL,
    completion_tokens INTEGER NOT NULL,
    total_tokens      INTEGER NOT NULL,
    cost_usd          REAL NOT NULL,
    cost_local        REAL NOT NULL,
    timestamp         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_tenant ON usage_records(tenant_identifier);";

const TENANT_COLUMNS: &str = "id, display_name, identifier, platform, access_token, \
     platform_api_id, shop_name, owner_id, description";

const PRODUCT_COLUMNS: &str =
    "id, tenant_id, name, price, description, catalog, subcategory, image_url, in_stock";

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Role::try_from(text).map_err(|e| FromSqlError::Other(e.into()))
    }
}

/// SQLite-backed implementation of every store trait.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.execute_batch(PRAGMA_SQL)
            .context("Failed to set database pragmas")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .context("Failed to set database pragmas")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to create database schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

fn text_conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        display_name: row.get(1)?,
        identifier: row.get(2)?,
        platform: row.get(3)?,
        access_token: row.get(4)?,
        platform_api_id: row.get(5)?,
        shop_name: row.get(6)?,
        owner_id: row.get(7)?,
        description: row.get(8)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let price_text: String = row.get(3)?;
    let price = Decimal::from_str(&price_text).map_err(|e| text_conversion_error(3, e))?;
    Ok(Product {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        price,
        description: row.get(4)?,
        catalog: row.get(5)?,
        subcategory: row.get(6)?,
        image_url: row.get(7)?,
        in_stock: row.get::<_, i64>(8)? != 0,
    })
}

fn turn_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationTurn> {
    Ok(ConversationTurn {
        id: row.get(0)?,
        role: row.get(1)?,
        content: row.get(2)?,
        chat_id: row.get(3)?,
        tenant_identifier: row.get(4)?,
    })
}

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    let timestamp_text: String = row.get(7)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_text)
        .map_err(|e| text_conversion_error(7, e))?
        .with_timezone(&Utc);
    Ok(UsageRecord {
        tenant_identifier: row.get(0)?,
        chat_id: row.get(1)?,
        prompt_tokens: row.get::<_, i64>(2)?.try_into().unwrap_or_default(),
        completion_tokens: row.get::<_, i64>(3)?.try_into().unwrap_or_default(),
        total_tokens: row.get::<_, i64>(4)?.try_into().unwrap_or_default(),
        cost_usd: row.get(5)?,
        cost_local: row.get(6)?,
        timestamp,
    })
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SqliteStore {
    fn find_tenant_where(&self, clause: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Tenant>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE {clause}");
            conn.query_row(&sql, &[param], tenant_from_row)
                .optional()
                .context("Failed to query tenant")
        })
    }

    fn products_where(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Product>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE {clause} ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params, product_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read products")
        })
    }
}

impl TenantRegistry for SqliteStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Tenant>> {
        self.find_tenant_where("identifier = ?1", &identifier)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        self.find_tenant_where("id = ?1", &id)
    }

    fn find_by_token(&self, access_token: &str) -> Result<Option<Tenant>> {
        self.find_tenant_where("access_token = ?1", &access_token)
    }

    fn find_by_platform_id(&self, platform_api_id: i64) -> Result<Option<Tenant>> {
        self.find_tenant_where("platform_api_id = ?1", &platform_api_id)
    }

    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Tenant>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE owner_id = ?1 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![owner_id], tenant_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list tenants")
        })
    }

    fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO tenants (
                    display_name, identifier, platform, access_token, platform_api_id,
                    shop_name, owner_id, description
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    tenant.display_name,
                    tenant.identifier,
                    tenant.platform,
                    tenant.access_token,
                    tenant.platform_api_id,
                    tenant.shop_name,
                    tenant.owner_id,
                    tenant.description,
                ],
            )
            .context("Failed to insert tenant")?;
            let id = conn.last_insert_rowid();
            Ok(Tenant {
                id,
                display_name: tenant.display_name,
                identifier: tenant.identifier,
                platform: tenant.platform,
                access_token: tenant.access_token,
                platform_api_id: tenant.platform_api_id,
                shop_name: tenant.shop_name,
                owner_id: tenant.owner_id,
                description: tenant.description,
            })
        })
    }

    fn update_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE tenants SET display_name = ?1, shop_name = ?2, description = ?3
                 WHERE id = ?4",
                params![
                    tenant.display_name,
                    tenant.shop_name,
                    tenant.description,
                    tenant.id
                ],
            )
            .context("Failed to update tenant")?;
            Ok(())
        })
    }

    fn delete_tenant(&self, id: i64) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM products WHERE tenant_id = ?1", params![id])
                .context("Failed to delete tenant products")?;
            let removed = tx
                .execute("DELETE FROM tenants WHERE id = ?1", params![id])
                .context("Failed to delete tenant")?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }
}

impl CatalogStore for SqliteStore {
    fn products_for_tenant(&self, tenant_id: i64) -> Result<Vec<Product>> {
        self.products_where("tenant_id = ?1", &[&tenant_id])
    }

    fn products_in_catalog(&self, tenant_id: i64, catalog: &str) -> Result<Vec<Product>> {
        self.products_where("tenant_id = ?1 AND catalog = ?2", &[&tenant_id, &catalog])
    }

    fn products_in_subcategory(&self, tenant_id: i64, subcategory: &str) -> Result<Vec<Product>> {
        self.products_where(
            "tenant_id = ?1 AND subcategory = ?2",
            &[&tenant_id, &subcategory],
        )
    }

    fn product(&self, id: i64) -> Result<Option<Product>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
            conn.query_row(&sql, params![id], product_from_row)
                .optional()
                .context("Failed to query product")
        })
    }

    fn insert_product(&self, product: NewProduct) -> Result<Product> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO products (
                    tenant_id, name, price, description, catalog, subcategory, image_url, in_stock
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    product.tenant_id,
                    product.name,
                    product.price.to_string(),
                    product.description,
                    product.catalog,
                    product.subcategory,
                    product.image_url,
                    i64::from(product.in_stock),
                ],
            )
            .context("Failed to insert product")?;
            Ok(Product {
                id: conn.last_insert_rowid(),
                tenant_id: product.tenant_id,
                name: product.name,
                price: product.price,
                description: product.description,
                catalog: product.catalog,
                subcategory: product.subcategory,
                image_url: product.image_url,
                in_stock: product.in_stock,
            })
        })
    }

    fn update_product(&self, product: &Product) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE products SET name = ?1, price = ?2, description = ?3, catalog = ?4,
                    subcategory = ?5, image_url = ?6, in_stock = ?7
                 WHERE id = ?8",
                params![
                    product.name,
                    product.price.to_string(),
                    product.description,
                    product.catalog,
                    product.subcategory,
                    product.image_url,
                    i64::from(product.in_stock),
                    product.id,
                ],
            )
            .context("Failed to update product")?;
            Ok(())
        })
    }

    fn delete_product(&self, id: i64) -> Result<bool> {
        self.with_connection(|conn| {
            let removed = conn
                .execute("DELETE FROM products WHERE id = ?1", params![id])
                .context("Failed to delete product")?;
            Ok(removed > 0)
        })
    }
}

impl ConversationStore for SqliteStore {
    fn append_turn(
        &self,
        chat_id: i64,
        tenant_identifier: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO conversation_turns (role, content, chat_id, tenant_identifier)
                 VALUES (?1, ?2, ?3, ?4)",
                params![role.as_str(), content, chat_id, tenant_identifier],
            )
            .context("Failed to append conversation turn")?;
            Ok(ConversationTurn {
                id: conn.last_insert_rowid(),
                role,
                content: content.to_string(),
                chat_id,
                tenant_identifier: tenant_identifier.to_string(),
            })
        })
    }

    fn recent_turns(
        &self,
        chat_id: i64,
        tenant_identifier: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, chat_id, tenant_identifier
                 FROM conversation_turns
                 WHERE chat_id = ?1 AND tenant_identifier = ?2
                 ORDER BY id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![chat_id, tenant_identifier, limit], turn_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read conversation history")
        })
    }

    fn conversation_stats(&self, tenant_identifier: &str) -> Result<ConversationStats> {
        self.with_connection(|conn| {
            let (messages, dialogues): (i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COUNT(DISTINCT chat_id)
                     FROM conversation_turns WHERE tenant_identifier = ?1",
                    params![tenant_identifier],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .context("Failed to compute conversation stats")?;
            Ok(ConversationStats {
                total_messages: messages.try_into().unwrap_or_default(),
                total_dialogues: dialogues.try_into().unwrap_or_default(),
            })
        })
    }
}

impl UsageStore for SqliteStore {
    fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO usage_records (
                    tenant_identifier, chat_id, prompt_tokens, completion_tokens, total_tokens,
                    cost_usd, cost_local, timestamp
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.tenant_identifier,
                    record.chat_id,
                    to_sql_count(record.prompt_tokens),
                    to_sql_count(record.completion_tokens),
                    to_sql_count(record.total_tokens),
                    record.cost_usd,
                    record.cost_local,
                    record.timestamp.to_rfc3339(),
                ],
            )
            .context("Failed to record usage")?;
            Ok(())
        })
    }

    fn usage_for_tenant(&self, tenant_identifier: &str) -> Result<Vec<UsageRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tenant_identifier, chat_id, prompt_tokens, completion_tokens,
                        total_tokens, cost_usd, cost_local, timestamp
                 FROM usage_records WHERE tenant_identifier = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![tenant_identifier], usage_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read usage records")
        })
    }
}
