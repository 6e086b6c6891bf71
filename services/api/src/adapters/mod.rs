pub mod db;
pub mod feed;
pub mod storage;

pub use db::DbAdapter;
pub use feed::PgChangeFeed;
pub use storage::PublicBucket;
