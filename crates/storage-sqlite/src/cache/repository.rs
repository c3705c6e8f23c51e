use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;

use finfetch_market_data::{CacheEntry, FreshnessStore, HistoryPoint, MarketDataError};

use super::model::{format_date, format_timestamp, IndicatorSnapshotDB, PriceHistoryDB};
use crate::db::{self, get_connection, WriteHandle};
use crate::errors::{IntoMarketData, StorageError};
use crate::schema::indicator_snapshots::dsl as snapshots_dsl;
use crate::schema::price_history::dsl as history_dsl;

/// SQLite-backed [`FreshnessStore`].
///
/// Reads use the connection pool; every write goes through the single
/// writer actor.
pub struct SqliteFreshnessStore {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SqliteFreshnessStore {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Open (creating if needed) the database at `path`, run migrations and
    /// start the writer actor. Must be called from within a Tokio runtime.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let db_path = db::init(path.as_ref())?;
        let pool = db::create_pool(&db_path)?;
        db::run_migrations(&pool)?;
        let writer = db::spawn_writer(&pool)?;
        debug!("Opened freshness cache at {}", db_path);
        Ok(Self::new(pool, writer))
    }
}

// =============================================================================
// FreshnessStore Implementation
// =============================================================================

#[async_trait]
impl FreshnessStore for SqliteFreshnessStore {
    // =========================================================================
    // Queries
    // =========================================================================

    fn entry(&self, symbol: &str) -> Result<Option<CacheEntry>, MarketDataError> {
        let mut conn = get_connection(&self.pool)?;

        let row = snapshots_dsl::indicator_snapshots
            .find(symbol)
            .select(IndicatorSnapshotDB::as_select())
            .first(&mut conn)
            .optional()
            .into_market_data()?;

        row.map(CacheEntry::try_from).transpose().into_market_data()
    }

    fn history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HistoryPoint>, MarketDataError> {
        let mut conn = get_connection(&self.pool)?;

        let rows = history_dsl::price_history
            .filter(history_dsl::symbol.eq(symbol))
            .filter(history_dsl::date.ge(format_date(start)))
            .filter(history_dsl::date.le(format_date(end)))
            .order(history_dsl::date.asc())
            .select(PriceHistoryDB::as_select())
            .load(&mut conn)
            .into_market_data()?;

        rows.into_iter()
            .map(HistoryPoint::try_from)
            .collect::<Result<Vec<_>, StorageError>>()
            .into_market_data()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    async fn put_entry(&self, symbol: &str, entry: CacheEntry) -> Result<(), MarketDataError> {
        let row = IndicatorSnapshotDB::from_entry(symbol, &entry);

        self.writer
            .exec(move |conn: &mut SqliteConnection| {
                diesel::replace_into(snapshots_dsl::indicator_snapshots)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
            .into_market_data()
    }

    async fn write_history(
        &self,
        symbol: &str,
        points: &[HistoryPoint],
    ) -> Result<usize, MarketDataError> {
        if points.is_empty() {
            return Ok(0);
        }

        let rows: Vec<PriceHistoryDB> = points
            .iter()
            .map(|p| PriceHistoryDB::from_point(symbol, p))
            .collect();

        self.writer
            .exec(move |conn: &mut SqliteConnection| {
                let mut total_upserted = 0;
                for chunk in rows.chunks(1_000) {
                    total_upserted += diesel::replace_into(history_dsl::price_history)
                        .values(chunk)
                        .execute(conn)?;
                }
                Ok(total_upserted)
            })
            .await
            .into_market_data()
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, MarketDataError> {
        let cutoff_ts = format_timestamp(cutoff);
        let cutoff_date = format_date(cutoff.date_naive());

        self.writer
            .exec(move |conn: &mut SqliteConnection| {
                let snapshots = diesel::delete(
                    snapshots_dsl::indicator_snapshots
                        .filter(snapshots_dsl::last_fetched_at.lt(cutoff_ts)),
                )
                .execute(conn)?;
                let rows = diesel::delete(
                    history_dsl::price_history.filter(history_dsl::date.lt(cutoff_date)),
                )
                .execute(conn)?;
                Ok(snapshots + rows)
            })
            .await
            .into_market_data()
    }
}
