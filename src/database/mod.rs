//! # Database Connection
//!
//! Pool construction from an explicit [`DatabaseConfig`](crate::config::DatabaseConfig).
//! Jobs receive the pool through [`PgRecordStore`](crate::store::PgRecordStore);
//! nothing opens connections from ambient state.
//!
//! ```rust,no_run
//! use citation_corpus::config::DatabaseConfig;
//! use citation_corpus::database::DatabaseConnection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! assert!(db.health_check().await?);
//! db.close().await;
//! # Ok(())
//! # }
//! ```

pub mod connection;

pub use connection::DatabaseConnection;
