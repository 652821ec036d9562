//! SQLite store backend (sqlx).
//!
//! All writes go through `INSERT ... ON CONFLICT` so replaying a block is
//! harmless. Wei quantities are stored as decimal TEXT; SQLite integers
//! are 64-bit and transfer values are not.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use async_trait::async_trait;
use chrono::Utc;

use chainsink_core::error::StoreError;
use chainsink_core::event::{EventInput, EventSignature};
use chainsink_core::store::EvmStore;
use chainsink_core::types::{BlockRow, ContractInfo, FeeRow, SwapRow, SyncRow, TokenInfo, TxRow};

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// A private in-memory database, one connection so every query sees it.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let statements = [
            "CREATE TABLE IF NOT EXISTS blocks (
                chain       TEXT    NOT NULL,
                number      INTEGER NOT NULL,
                hash        TEXT    NOT NULL,
                parent_hash TEXT    NOT NULL,
                timestamp   INTEGER NOT NULL,
                PRIMARY KEY (chain, number)
            )",
            "CREATE TABLE IF NOT EXISTS transactions (
                chain        TEXT    NOT NULL,
                timestamp    INTEGER NOT NULL,
                tx_hash      TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                chain_id     INTEGER,
                from_address TEXT    NOT NULL,
                to_address   TEXT,
                value_wei    TEXT    NOT NULL,
                total_gas    TEXT    NOT NULL,
                PRIMARY KEY (chain, timestamp, tx_hash)
            )",
            "CREATE INDEX IF NOT EXISTS idx_transactions_block
                ON transactions (chain, block_number)",
            "CREATE TABLE IF NOT EXISTS event_signatures (
                chain            TEXT NOT NULL,
                signature_hash   TEXT NOT NULL,
                name             TEXT NOT NULL,
                full_signature   TEXT NOT NULL,
                contract_address TEXT,
                inputs           TEXT NOT NULL,
                PRIMARY KEY (chain, signature_hash)
            )",
            "CREATE TABLE IF NOT EXISTS contract_abis (
                chain        TEXT NOT NULL,
                address      TEXT NOT NULL,
                abi          TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (chain, address)
            )",
            "CREATE TABLE IF NOT EXISTS contract_info (
                chain           TEXT NOT NULL,
                address         TEXT NOT NULL,
                factory         TEXT NOT NULL,
                fee             INTEGER,
                name            TEXT NOT NULL,
                token0_address  TEXT NOT NULL,
                token0_name     TEXT NOT NULL,
                token0_symbol   TEXT NOT NULL,
                token0_decimals INTEGER NOT NULL,
                token1_address  TEXT NOT NULL,
                token1_name     TEXT NOT NULL,
                token1_symbol   TEXT NOT NULL,
                token1_decimals INTEGER NOT NULL,
                PRIMARY KEY (chain, address)
            )",
            "CREATE TABLE IF NOT EXISTS token_info (
                chain    TEXT NOT NULL,
                address  TEXT NOT NULL,
                name     TEXT NOT NULL,
                symbol   TEXT NOT NULL,
                decimals INTEGER NOT NULL,
                PRIMARY KEY (chain, address)
            )",
            "CREATE TABLE IF NOT EXISTS swap_events (
                chain            TEXT    NOT NULL,
                tx_hash          TEXT    NOT NULL,
                log_index        INTEGER NOT NULL,
                contract_address TEXT    NOT NULL,
                token0_symbol    TEXT    NOT NULL,
                token1_symbol    TEXT    NOT NULL,
                amount0          REAL    NOT NULL,
                amount1          REAL    NOT NULL,
                timestamp        INTEGER NOT NULL,
                PRIMARY KEY (chain, tx_hash, log_index)
            )",
            "CREATE TABLE IF NOT EXISTS sync_events (
                chain            TEXT    NOT NULL,
                tx_hash          TEXT    NOT NULL,
                log_index        INTEGER NOT NULL,
                contract_address TEXT    NOT NULL,
                factory_address  TEXT    NOT NULL,
                token0_symbol    TEXT    NOT NULL,
                token0_address   TEXT    NOT NULL,
                token1_symbol    TEXT    NOT NULL,
                token1_address   TEXT    NOT NULL,
                reserve0         REAL    NOT NULL,
                reserve1         REAL    NOT NULL,
                fee              REAL,
                timestamp        INTEGER NOT NULL,
                PRIMARY KEY (chain, tx_hash, log_index)
            )",
            "CREATE TABLE IF NOT EXISTS fee_events (
                chain            TEXT    NOT NULL,
                tx_hash          TEXT    NOT NULL,
                log_index        INTEGER NOT NULL,
                contract_address TEXT    NOT NULL,
                fee              INTEGER NOT NULL,
                timestamp        INTEGER NOT NULL,
                PRIMARY KEY (chain, tx_hash, log_index)
            )",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }
}

fn row_to_token(prefix: &str, row: &sqlx::sqlite::SqliteRow) -> Result<TokenInfo, StoreError> {
    Ok(TokenInfo {
        address: row.try_get(format!("{prefix}_address").as_str()).map_err(db_err)?,
        name: row.try_get(format!("{prefix}_name").as_str()).map_err(db_err)?,
        symbol: row.try_get(format!("{prefix}_symbol").as_str()).map_err(db_err)?,
        decimals: row.try_get::<i64, _>(format!("{prefix}_decimals").as_str()).map_err(db_err)?
            as u8,
    })
}

#[async_trait]
impl EvmStore for SqliteStore {
    async fn insert_block(&self, chain: &str, block: &BlockRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blocks (chain, number, hash, parent_hash, timestamp)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (chain, number) DO NOTHING",
        )
        .bind(chain)
        .bind(block.number as i64)
        .bind(&block.hash)
        .bind(&block.parent_hash)
        .bind(block.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_block(&self, chain: &str, number: u64) -> Result<Option<BlockRow>, StoreError> {
        let row = sqlx::query(
            "SELECT number, hash, parent_hash, timestamp FROM blocks
             WHERE chain = ? AND number = ?",
        )
        .bind(chain)
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|row| {
            Ok(BlockRow {
                number: row.try_get::<i64, _>("number").map_err(db_err)? as u64,
                hash: row.try_get("hash").map_err(db_err)?,
                parent_hash: row.try_get("parent_hash").map_err(db_err)?,
                timestamp: row.try_get("timestamp").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn insert_transactions_bulk(
        &self,
        chain: &str,
        rows: &[TxRow],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for row in rows {
            sqlx::query(
                "INSERT INTO transactions
                     (chain, timestamp, tx_hash, block_number, chain_id,
                      from_address, to_address, value_wei, total_gas)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (chain, timestamp, tx_hash) DO NOTHING",
            )
            .bind(chain)
            .bind(row.timestamp)
            .bind(&row.tx_hash)
            .bind(row.block_number as i64)
            .bind(row.chain_id.map(|id| id as i64))
            .bind(&row.from_address)
            .bind(&row.to_address)
            .bind(row.value.to_string())
            .bind(row.total_gas.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn query_transactions(
        &self,
        chain: &str,
        block_number: u64,
    ) -> Result<Vec<TxRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT timestamp, tx_hash, block_number, chain_id, from_address,
                    to_address, value_wei, total_gas
             FROM transactions
             WHERE chain = ? AND block_number = ?
             ORDER BY tx_hash",
        )
        .bind(chain)
        .bind(block_number as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let value: String = row.try_get("value_wei").map_err(db_err)?;
                let total_gas: String = row.try_get("total_gas").map_err(db_err)?;
                Ok(TxRow {
                    block_number: row.try_get::<i64, _>("block_number").map_err(db_err)? as u64,
                    chain: chain.to_string(),
                    tx_hash: row.try_get("tx_hash").map_err(db_err)?,
                    chain_id: row
                        .try_get::<Option<i64>, _>("chain_id")
                        .map_err(db_err)?
                        .map(|id| id as u64),
                    from_address: row.try_get("from_address").map_err(db_err)?,
                    to_address: row.try_get("to_address").map_err(db_err)?,
                    value: value.parse().unwrap_or(0),
                    total_gas: total_gas.parse().unwrap_or(0),
                    timestamp: row.try_get("timestamp").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn insert_event_signature(
        &self,
        chain: &str,
        signature: &EventSignature,
    ) -> Result<(), StoreError> {
        let inputs = serde_json::to_string(&signature.inputs)?;
        sqlx::query(
            "INSERT INTO event_signatures
                 (chain, signature_hash, name, full_signature, contract_address, inputs)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain, signature_hash) DO UPDATE SET
                 name = excluded.name,
                 full_signature = excluded.full_signature,
                 inputs = excluded.inputs,
                 contract_address =
                     COALESCE(event_signatures.contract_address, excluded.contract_address)",
        )
        .bind(chain)
        .bind(&signature.signature_hash)
        .bind(&signature.name)
        .bind(&signature.full_signature)
        .bind(&signature.contract_address)
        .bind(inputs)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_event_signature(
        &self,
        chain: &str,
        signature_hash: &str,
    ) -> Result<Option<EventSignature>, StoreError> {
        let row = sqlx::query(
            "SELECT signature_hash, name, full_signature, contract_address, inputs
             FROM event_signatures
             WHERE chain = ? AND signature_hash = ?",
        )
        .bind(chain)
        .bind(signature_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|row| {
            let inputs: String = row.try_get("inputs").map_err(db_err)?;
            let inputs: Vec<EventInput> = serde_json::from_str(&inputs)?;
            Ok(EventSignature {
                signature_hash: row.try_get("signature_hash").map_err(db_err)?,
                name: row.try_get("name").map_err(db_err)?,
                full_signature: row.try_get("full_signature").map_err(db_err)?,
                contract_address: row.try_get("contract_address").map_err(db_err)?,
                inputs,
            })
        })
        .transpose()
    }

    async fn insert_contract_abi(
        &self,
        chain: &str,
        address: &str,
        abi_json: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO contract_abis (chain, address, abi, last_updated)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (chain, address) DO UPDATE SET
                 abi = excluded.abi,
                 last_updated = excluded.last_updated",
        )
        .bind(chain)
        .bind(address)
        .bind(abi_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_contract_abi(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT abi FROM contract_abis WHERE chain = ? AND address = ?")
            .bind(chain)
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row.try_get("abi").map_err(db_err)).transpose()
    }

    async fn insert_contract_info(
        &self,
        chain: &str,
        info: &ContractInfo,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO contract_info
                 (chain, address, factory, fee, name,
                  token0_address, token0_name, token0_symbol, token0_decimals,
                  token1_address, token1_name, token1_symbol, token1_decimals)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain, address) DO UPDATE SET
                 factory = excluded.factory,
                 fee = excluded.fee,
                 name = excluded.name,
                 token0_address = excluded.token0_address,
                 token0_name = excluded.token0_name,
                 token0_symbol = excluded.token0_symbol,
                 token0_decimals = excluded.token0_decimals,
                 token1_address = excluded.token1_address,
                 token1_name = excluded.token1_name,
                 token1_symbol = excluded.token1_symbol,
                 token1_decimals = excluded.token1_decimals",
        )
        .bind(chain)
        .bind(&info.address)
        .bind(&info.factory)
        .bind(info.fee.map(|fee| fee as i64))
        .bind(&info.name)
        .bind(&info.token0.address)
        .bind(&info.token0.name)
        .bind(&info.token0.symbol)
        .bind(info.token0.decimals as i64)
        .bind(&info.token1.address)
        .bind(&info.token1.name)
        .bind(&info.token1.symbol)
        .bind(info.token1.decimals as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_contract_info(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<ContractInfo>, StoreError> {
        let row = sqlx::query(
            "SELECT address, factory, fee, name,
                    token0_address, token0_name, token0_symbol, token0_decimals,
                    token1_address, token1_name, token1_symbol, token1_decimals
             FROM contract_info
             WHERE chain = ? AND address = ?",
        )
        .bind(chain)
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|row| {
            Ok(ContractInfo {
                address: row.try_get("address").map_err(db_err)?,
                factory: row.try_get("factory").map_err(db_err)?,
                fee: row
                    .try_get::<Option<i64>, _>("fee")
                    .map_err(db_err)?
                    .map(|fee| fee as u64),
                name: row.try_get("name").map_err(db_err)?,
                token0: row_to_token("token0", &row)?,
                token1: row_to_token("token1", &row)?,
            })
        })
        .transpose()
    }

    async fn insert_token_info(&self, chain: &str, info: &TokenInfo) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO token_info (chain, address, name, symbol, decimals)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (chain, address) DO UPDATE SET
                 name = excluded.name,
                 symbol = excluded.symbol,
                 decimals = excluded.decimals",
        )
        .bind(chain)
        .bind(&info.address)
        .bind(&info.name)
        .bind(&info.symbol)
        .bind(info.decimals as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_token_info(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<TokenInfo>, StoreError> {
        let row = sqlx::query(
            "SELECT address, name, symbol, decimals FROM token_info
             WHERE chain = ? AND address = ?",
        )
        .bind(chain)
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|row| {
            Ok(TokenInfo {
                address: row.try_get("address").map_err(db_err)?,
                name: row.try_get("name").map_err(db_err)?,
                symbol: row.try_get("symbol").map_err(db_err)?,
                decimals: row.try_get::<i64, _>("decimals").map_err(db_err)? as u8,
            })
        })
        .transpose()
    }

    async fn insert_swap_event(&self, chain: &str, row: &SwapRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO swap_events
                 (chain, tx_hash, log_index, contract_address,
                  token0_symbol, token1_symbol, amount0, amount1, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain, tx_hash, log_index) DO NOTHING",
        )
        .bind(chain)
        .bind(&row.tx_hash)
        .bind(row.log_index as i64)
        .bind(&row.contract_address)
        .bind(&row.token0_symbol)
        .bind(&row.token1_symbol)
        .bind(row.amount0)
        .bind(row.amount1)
        .bind(row.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_swap_events(&self, chain: &str) -> Result<Vec<SwapRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT tx_hash, log_index, contract_address, token0_symbol,
                    token1_symbol, amount0, amount1, timestamp
             FROM swap_events
             WHERE chain = ?
             ORDER BY timestamp, log_index",
        )
        .bind(chain)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                Ok(SwapRow {
                    contract_address: row.try_get("contract_address").map_err(db_err)?,
                    token0_symbol: row.try_get("token0_symbol").map_err(db_err)?,
                    token1_symbol: row.try_get("token1_symbol").map_err(db_err)?,
                    amount0: row.try_get("amount0").map_err(db_err)?,
                    amount1: row.try_get("amount1").map_err(db_err)?,
                    tx_hash: row.try_get("tx_hash").map_err(db_err)?,
                    log_index: row.try_get::<i64, _>("log_index").map_err(db_err)? as u32,
                    timestamp: row.try_get("timestamp").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn insert_sync_event(&self, chain: &str, row: &SyncRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_events
                 (chain, tx_hash, log_index, contract_address, factory_address,
                  token0_symbol, token0_address, token1_symbol, token1_address,
                  reserve0, reserve1, fee, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain, tx_hash, log_index) DO NOTHING",
        )
        .bind(chain)
        .bind(&row.tx_hash)
        .bind(row.log_index as i64)
        .bind(&row.contract_address)
        .bind(&row.factory_address)
        .bind(&row.token0_symbol)
        .bind(&row.token0_address)
        .bind(&row.token1_symbol)
        .bind(&row.token1_address)
        .bind(row.reserve0)
        .bind(row.reserve1)
        .bind(row.fee)
        .bind(row.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_sync_events(&self, chain: &str) -> Result<Vec<SyncRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT tx_hash, log_index, contract_address, factory_address,
                    token0_symbol, token0_address, token1_symbol, token1_address,
                    reserve0, reserve1, fee, timestamp
             FROM sync_events
             WHERE chain = ?
             ORDER BY timestamp, log_index",
        )
        .bind(chain)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                Ok(SyncRow {
                    contract_address: row.try_get("contract_address").map_err(db_err)?,
                    factory_address: row.try_get("factory_address").map_err(db_err)?,
                    token0_symbol: row.try_get("token0_symbol").map_err(db_err)?,
                    token0_address: row.try_get("token0_address").map_err(db_err)?,
                    token1_symbol: row.try_get("token1_symbol").map_err(db_err)?,
                    token1_address: row.try_get("token1_address").map_err(db_err)?,
                    reserve0: row.try_get("reserve0").map_err(db_err)?,
                    reserve1: row.try_get("reserve1").map_err(db_err)?,
                    fee: row.try_get("fee").map_err(db_err)?,
                    tx_hash: row.try_get("tx_hash").map_err(db_err)?,
                    log_index: row.try_get::<i64, _>("log_index").map_err(db_err)? as u32,
                    timestamp: row.try_get("timestamp").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn insert_fee_event(&self, chain: &str, row: &FeeRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO fee_events
                 (chain, tx_hash, log_index, contract_address, fee, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain, tx_hash, log_index) DO NOTHING",
        )
        .bind(chain)
        .bind(&row.tx_hash)
        .bind(row.log_index as i64)
        .bind(&row.contract_address)
        .bind(row.fee as i64)
        .bind(row.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query_fee_events(&self, chain: &str) -> Result<Vec<FeeRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT tx_hash, log_index, contract_address, fee, timestamp
             FROM fee_events
             WHERE chain = ?
             ORDER BY timestamp, log_index",
        )
        .bind(chain)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                Ok(FeeRow {
                    contract_address: row.try_get("contract_address").map_err(db_err)?,
                    fee: row.try_get::<i64, _>("fee").map_err(db_err)? as u64,
                    tx_hash: row.try_get("tx_hash").map_err(db_err)?,
                    log_index: row.try_get::<i64, _>("log_index").map_err(db_err)? as u32,
                    timestamp: row.try_get("timestamp").map_err(db_err)?,
                })
            })
            .collect()
    }
}
