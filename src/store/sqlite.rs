//! SQLite-backed inventory store
//!
//! One `InventoryStore` owns the only writable connection. Every mutation goes
//! through `append_movement`, which inserts the movement and updates the
//! product's stock inside a single IMMEDIATE transaction. Readers open their
//! own query-only connection (`StoreReader`) and read products and movements
//! inside one deferred transaction, which in WAL mode pins a snapshot of some
//! committed prefix of the log.

use super::clock::{Clock, SystemClock};
use super::error::StoreError;
use super::replay_stock;
use super::types::{
    Movement, MovementRecord, MovementType, NewProduct, Product, ReplayMismatch, StoreSnapshot,
};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Bumped whenever the table layout changes incompatibly
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    product_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE,
    category        TEXT NOT NULL,
    initial_stock   INTEGER NOT NULL,
    current_stock   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS movements (
    movement_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id      INTEGER NOT NULL REFERENCES products(product_id),
    timestamp       INTEGER NOT NULL,
    movement_type   TEXT NOT NULL CHECK(movement_type IN ('incoming', 'outgoing')),
    quantity        INTEGER NOT NULL CHECK(quantity > 0)
);

CREATE INDEX IF NOT EXISTS idx_movements_timestamp ON movements(timestamp, movement_id);
CREATE INDEX IF NOT EXISTS idx_movements_product ON movements(product_id);
"#;

/// Single-writer handle to the inventory database
pub struct InventoryStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl InventoryStore {
    /// Open (or create) the database file using the wall clock
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(db_path, Arc::new(SystemClock))
    }

    /// Open (or create) the database file with an explicit time source
    ///
    /// Does NOT create tables; call `create_schema` before appending.
    pub fn open_with_clock(
        db_path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        apply_optimized_pragmas(&conn)?;

        log::info!("📦 Inventory store opened: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            clock,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("writer connection: {}", e)))
    }

    /// Establish the products/movements tables
    ///
    /// Idempotent on a compatible database. With `reset` the tables are
    /// dropped first. Without it, an unknown schema version or a partial table
    /// set is a `StoreError::Schema`.
    pub fn create_schema(&self, reset: bool) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if reset {
            tx.execute_batch(
                "DROP TABLE IF EXISTS movements;
                 DROP TABLE IF EXISTS products;",
            )?;
            tx.pragma_update(None, "user_version", 0_i64)?;
            log::info!("🧹 Dropped existing inventory tables (reset requested)");
        }

        let version = user_version(&tx)?;
        let tables = known_table_count(&tx)?;

        match (version, tables) {
            (0, 0) => {
                tx.execute_batch(SCHEMA_SQL)?;
                tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
                log::info!("🔧 Created inventory schema (version {})", SCHEMA_VERSION);
            }
            (SCHEMA_VERSION, 2) => {
                log::info!("✅ Inventory schema already present (version {})", SCHEMA_VERSION);
            }
            (version, tables) => {
                return Err(StoreError::Schema(format!(
                    "incompatible schema in {} (user_version={}, tables={}/2); reset required",
                    self.db_path.display(),
                    version,
                    tables
                )));
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Insert the initial product catalog
    ///
    /// No-op (returns 0) when products already exist and `reset` is false.
    /// With `reset`, existing movements and products are removed first.
    pub fn seed_products(&self, products: &[NewProduct], reset: bool) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_schema(&tx)?;

        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;

        if existing > 0 && !reset {
            log::info!("📦 {} products already present, skipping seed", existing);
            return Ok(0);
        }

        if reset {
            tx.execute_batch(
                "DELETE FROM movements;
                 DELETE FROM products;
                 DELETE FROM sqlite_sequence WHERE name IN ('movements', 'products');",
            )?;
        }

        for product in products {
            if product.initial_stock < 0 {
                return Err(StoreError::InvalidQuantity(product.initial_stock));
            }
            tx.execute(
                "INSERT INTO products (name, category, initial_stock, current_stock)
                 VALUES (?1, ?2, ?3, ?3)",
                params![product.name, product.category, product.initial_stock],
            )?;
        }

        tx.commit()?;
        log::info!("🌱 Seeded {} products", products.len());
        Ok(products.len())
    }

    /// Record one movement and apply its stock effect atomically
    ///
    /// Fails with `InsufficientStock` (nothing recorded) when an outgoing
    /// movement would drive stock below zero.
    pub fn append_movement(
        &self,
        product_id: i64,
        movement_type: MovementType,
        quantity: i64,
    ) -> Result<MovementRecord, StoreError> {
        if quantity <= 0 {
            return Err(StoreError::InvalidQuantity(quantity));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_schema(&tx)?;

        let current: i64 = tx
            .query_row(
                "SELECT current_stock FROM products WHERE product_id = ?1",
                [product_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::UnknownProduct(product_id))?;

        let stock_after = current
            .checked_add(movement_type.signed(quantity))
            .ok_or(StoreError::InvalidQuantity(quantity))?;
        if stock_after < 0 {
            // tx dropped here: rolled back, store unchanged
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: current,
            });
        }

        let last_timestamp: i64 = tx.query_row(
            "SELECT COALESCE(MAX(timestamp), 0) FROM movements",
            [],
            |row| row.get(0),
        )?;
        let timestamp = self.clock.now_ms().max(last_timestamp);

        tx.execute(
            "INSERT INTO movements (product_id, timestamp, movement_type, quantity)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_id, timestamp, movement_type.as_str(), quantity],
        )?;
        let movement_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE products SET current_stock = ?1 WHERE product_id = ?2",
            params![stock_after, product_id],
        )?;

        tx.commit()?;

        log::debug!(
            "✅ movement #{} {} {} × product {} → stock {}",
            movement_id,
            movement_type,
            quantity,
            product_id,
            stock_after
        );

        Ok(MovementRecord {
            movement: Movement {
                movement_id,
                product_id,
                timestamp,
                movement_type,
                quantity,
            },
            stock_after,
        })
    }

    /// All products, ordered by id
    pub fn query_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        ensure_schema(&tx)?;
        let products = select_products(&tx)?;
        tx.commit()?;
        Ok(products)
    }

    /// Movements with timestamp >= `since` (all when `None`), oldest first
    pub fn query_movements(&self, since: Option<i64>) -> Result<Vec<Movement>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        ensure_schema(&tx)?;
        let movements = select_movements(&tx, since)?;
        tx.commit()?;
        Ok(movements)
    }

    /// Replay the full log and report products whose stock disagrees with it
    pub fn verify_replay(&self) -> Result<Vec<ReplayMismatch>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        ensure_schema(&tx)?;
        let products = select_products(&tx)?;
        let movements = select_movements(&tx, None)?;
        tx.commit()?;

        let replayed = replay_stock(&products, &movements);
        let mismatches: Vec<ReplayMismatch> = products
            .iter()
            .filter_map(|p| {
                let replayed_stock = replayed.get(&p.product_id).copied().unwrap_or(p.initial_stock);
                (replayed_stock != p.current_stock).then(|| ReplayMismatch {
                    product_id: p.product_id,
                    stored_stock: p.current_stock,
                    replayed_stock,
                })
            })
            .collect();

        if !mismatches.is_empty() {
            log::error!("❌ Replay audit found {} inconsistent products", mismatches.len());
        }

        Ok(mismatches)
    }

    /// Open an independent query-only reader on the same database
    pub fn reader(&self) -> Result<StoreReader, StoreError> {
        StoreReader::open(&self.db_path, self.clock())
    }

    /// Close the writer connection, surfacing any close error
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| StoreError::LockPoisoned(format!("writer connection: {}", e)))?;
        conn.close().map_err(|(_, e)| StoreError::Unavailable(e))?;
        log::info!("📦 Inventory store closed: {}", self.db_path.display());
        Ok(())
    }
}

/// Query-only snapshot reader
///
/// Holds its own connection so reads never wait on the writer's mutex.
pub struct StoreReader {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl StoreReader {
    pub fn open(db_path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;

        // Read-only from here on (must be after PRAGMAs)
        conn.pragma_update(None, "query_only", "ON")?;
        ensure_schema(&conn)?;

        log::debug!("📥 Store reader opened: {}", db_path.as_ref().display());

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("reader connection: {}", e)))
    }

    /// Products plus movements since `since`, read from one consistent snapshot
    pub fn read_snapshot(&self, since: Option<i64>) -> Result<StoreSnapshot, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let products = select_products(&tx)?;
        let movements = select_movements(&tx, since)?;
        tx.commit()?;
        Ok(StoreSnapshot { products, movements })
    }

    pub fn query_products(&self) -> Result<Vec<Product>, StoreError> {
        let conn = self.lock()?;
        select_products(&conn)
    }

    pub fn query_movements(&self, since: Option<i64>) -> Result<Vec<Movement>, StoreError> {
        let conn = self.lock()?;
        select_movements(&conn, since)
    }
}

fn user_version(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn known_table_count(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('products', 'movements')",
        [],
        |row| row.get(0),
    )?)
}

fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    match user_version(conn)? {
        SCHEMA_VERSION => Ok(()),
        0 => Err(StoreError::Schema("store not initialized".to_string())),
        other => Err(StoreError::Schema(format!(
            "unsupported schema version {} (expected {})",
            other, SCHEMA_VERSION
        ))),
    }
}

fn select_products(conn: &Connection) -> Result<Vec<Product>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT product_id, name, category, initial_stock, current_stock
         FROM products
         ORDER BY product_id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(Product {
            product_id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            initial_stock: row.get(3)?,
            current_stock: row.get(4)?,
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn select_movements(conn: &Connection, since: Option<i64>) -> Result<Vec<Movement>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT movement_id, product_id, timestamp, movement_type, quantity
         FROM movements
         WHERE timestamp >= ?1
         ORDER BY timestamp ASC, movement_id ASC",
    )?;

    let rows = stmt.query_map([since.unwrap_or(i64::MIN)], |row| {
        let type_str: String = row.get(3)?;
        let movement_type = MovementType::from_str(&type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown movement_type {:?}", type_str).into(),
            )
        })?;

        Ok(Movement {
            movement_id: row.get(0)?,
            product_id: row.get(1)?,
            timestamp: row.get(2)?,
            movement_type,
            quantity: row.get(4)?,
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::clock::ManualClock;
    use tempfile::{tempdir, TempDir};

    const T0: i64 = 1_700_000_000_000;

    fn setup_store() -> (TempDir, InventoryStore, Arc<ManualClock>) {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let store = InventoryStore::open_with_clock(dir.path().join("inventory.db"), clock.clone())
            .unwrap();
        store.create_schema(false).unwrap();
        (dir, store, clock)
    }

    fn seed_one(store: &InventoryStore, stock: i64) -> i64 {
        store
            .seed_products(&[NewProduct::new("Widget", "Type A", stock)], false)
            .unwrap();
        store.query_products().unwrap()[0].product_id
    }

    #[test]
    fn test_create_schema_idempotent() {
        let (_dir, store, _clock) = setup_store();
        store.create_schema(false).unwrap();
        store.create_schema(false).unwrap();
        assert!(store.query_products().unwrap().is_empty());
    }

    #[test]
    fn test_incompatible_schema_rejected_without_reset() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE products (product_name TEXT PRIMARY KEY, category TEXT, instock_items INTEGER);",
            )
            .unwrap();
        }

        let store = InventoryStore::open(&db_path).unwrap();
        let err = store.create_schema(false).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));

        // Reset drops the legacy table and rebuilds
        store.create_schema(true).unwrap();
        assert!(store.query_products().unwrap().is_empty());
    }

    #[test]
    fn test_operations_before_schema_fail_with_schema_error() {
        let dir = tempdir().unwrap();
        let store = InventoryStore::open(dir.path().join("empty.db")).unwrap();

        assert!(matches!(store.query_products(), Err(StoreError::Schema(_))));
        assert!(matches!(
            store.append_movement(1, MovementType::Incoming, 5),
            Err(StoreError::Schema(_))
        ));
        assert!(matches!(store.reader(), Err(StoreError::Schema(_))));
    }

    #[test]
    fn test_seed_is_noop_when_products_exist() {
        let (_dir, store, _clock) = setup_store();
        assert_eq!(
            store
                .seed_products(&[NewProduct::new("A", "Type A", 10)], false)
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .seed_products(&[NewProduct::new("B", "Type B", 20)], false)
                .unwrap(),
            0
        );

        let products = store.query_products().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "A");

        // Reset replaces the catalog and clears the log
        store
            .append_movement(products[0].product_id, MovementType::Incoming, 3)
            .unwrap();
        store
            .seed_products(&[NewProduct::new("B", "Type B", 20)], true)
            .unwrap();
        let products = store.query_products().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "B");
        assert_eq!(products[0].product_id, 1);
        assert!(store.query_movements(None).unwrap().is_empty());
    }

    #[test]
    fn test_append_updates_stock_atomically() {
        let (_dir, store, _clock) = setup_store();
        let id = seed_one(&store, 100);

        let record = store.append_movement(id, MovementType::Incoming, 20).unwrap();
        assert_eq!(record.stock_after, 120);
        assert_eq!(record.movement.timestamp, T0);
        assert_eq!(record.movement.movement_id, 1);

        let err = store.append_movement(id, MovementType::Outgoing, 150).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 150,
                available: 120,
                ..
            }
        ));

        assert_eq!(store.query_products().unwrap()[0].current_stock, 120);
        assert_eq!(store.query_movements(None).unwrap().len(), 1);
    }

    #[test]
    fn test_outgoing_to_exactly_zero_allowed() {
        let (_dir, store, _clock) = setup_store();
        let id = seed_one(&store, 10);

        let record = store.append_movement(id, MovementType::Outgoing, 10).unwrap();
        assert_eq!(record.stock_after, 0);
        assert!(store.append_movement(id, MovementType::Outgoing, 1).is_err());
    }

    #[test]
    fn test_rejects_unknown_product_and_bad_quantity() {
        let (_dir, store, _clock) = setup_store();
        seed_one(&store, 10);

        assert!(matches!(
            store.append_movement(99, MovementType::Incoming, 1),
            Err(StoreError::UnknownProduct(99))
        ));
        assert!(matches!(
            store.append_movement(1, MovementType::Incoming, 0),
            Err(StoreError::InvalidQuantity(0))
        ));
        assert!(store.query_movements(None).unwrap().is_empty());
    }

    #[test]
    fn test_stock_overflow_rejected() {
        let (_dir, store, _clock) = setup_store();
        let product_id = seed_one(&store, 10);

        assert!(matches!(
            store.append_movement(product_id, MovementType::Incoming, i64::MAX),
            Err(StoreError::InvalidQuantity(i64::MAX))
        ));
        assert_eq!(store.query_products().unwrap()[0].current_stock, 10);
        assert!(store.query_movements(None).unwrap().is_empty());
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let (_dir, store, clock) = setup_store();
        let id = seed_one(&store, 10);

        store.append_movement(id, MovementType::Incoming, 1).unwrap();
        clock.advance_ms(-5_000); // clock steps backwards
        let record = store.append_movement(id, MovementType::Incoming, 1).unwrap();

        assert_eq!(record.movement.timestamp, T0);
        let movements = store.query_movements(None).unwrap();
        assert!(movements.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(movements.windows(2).all(|w| w[0].movement_id < w[1].movement_id));
    }

    #[test]
    fn test_query_movements_since() {
        let (_dir, store, clock) = setup_store();
        let id = seed_one(&store, 10);

        store.append_movement(id, MovementType::Incoming, 1).unwrap();
        clock.advance_minutes(10);
        store.append_movement(id, MovementType::Incoming, 2).unwrap();

        let recent = store.query_movements(Some(T0 + 60_000)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].quantity, 2);
    }

    #[test]
    fn test_reader_sees_committed_state() {
        let (_dir, store, _clock) = setup_store();
        let id = seed_one(&store, 50);
        let reader = store.reader().unwrap();

        store.append_movement(id, MovementType::Outgoing, 5).unwrap();

        let snapshot = reader.read_snapshot(None).unwrap();
        assert_eq!(snapshot.products[0].current_stock, 45);
        assert_eq!(snapshot.movements.len(), 1);
    }

    #[test]
    fn test_reader_is_query_only() {
        let (_dir, store, _clock) = setup_store();
        seed_one(&store, 50);
        let reader = store.reader().unwrap();

        let conn = reader.conn.lock().unwrap();
        let result = conn.execute("UPDATE products SET current_stock = 0", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_replay_detects_tampering() {
        let (_dir, store, _clock) = setup_store();
        let id = seed_one(&store, 50);
        store.append_movement(id, MovementType::Incoming, 7).unwrap();
        assert!(store.verify_replay().unwrap().is_empty());

        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE products SET current_stock = 1", []).unwrap();
        }

        let mismatches = store.verify_replay().unwrap();
        assert_eq!(
            mismatches,
            vec![ReplayMismatch {
                product_id: id,
                stored_stock: 1,
                replayed_stock: 57,
            }]
        );
    }

    #[test]
    fn test_close_releases_connection() {
        let (dir, store, _clock) = setup_store();
        seed_one(&store, 5);
        store.close().unwrap();

        let reopened = InventoryStore::open(dir.path().join("inventory.db")).unwrap();
        reopened.create_schema(false).unwrap();
        assert_eq!(reopened.query_products().unwrap().len(), 1);
    }
}
